use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::models::AuthPayload;

const TOKEN_TTL_SECS: i64 = 3600; // 1 hour
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Passwords do not match.")]
    PasswordMismatch,
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("Password must be at least 6 characters long.")]
    PasswordTooShort,
}

/// Form checks run before a registration reaches the session store.
pub fn validate_registration(
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<(), RegistrationError> {
    if password != confirm_password {
        return Err(RegistrationError::PasswordMismatch);
    }
    if !email.contains('@') || !email.contains('.') {
        return Err(RegistrationError::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(RegistrationError::PasswordTooShort);
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password, DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password, hash)
}

pub fn create_jwt(user_id: &str, secret: &[u8]) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = AuthPayload {
        sub: user_id.to_owned(),
        exp: (Utc::now().timestamp() + TOKEN_TTL_SECS) as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

pub fn validate_jwt(token: &str, secret: &[u8]) -> Result<AuthPayload, jsonwebtoken::errors::Error> {
    let token_data = decode::<AuthPayload>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_rules_in_order() {
        assert_eq!(
            validate_registration("a@b.co", "secret1", "secret2"),
            Err(RegistrationError::PasswordMismatch)
        );
        assert_eq!(
            validate_registration("not-an-email", "secret1", "secret1"),
            Err(RegistrationError::InvalidEmail)
        );
        assert_eq!(
            validate_registration("a@b.co", "abc", "abc"),
            Err(RegistrationError::PasswordTooShort)
        );
        assert_eq!(validate_registration("a@b.co", "secret1", "secret1"), Ok(()));
    }

    #[test]
    fn test_jwt_roundtrip_and_wrong_secret() {
        let token = create_jwt("user-42", b"k1").unwrap();
        assert_eq!(validate_jwt(&token, b"k1").unwrap().sub, "user-42");
        assert!(validate_jwt(&token, b"k2").is_err());
    }

    #[test]
    fn test_password_hash_verifies() {
        let hashed = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hashed).unwrap());
        assert!(!verify_password("hunter23", &hashed).unwrap());
    }
}
