//! REST API over the session store using Axum (port 11111 by default).
//!
//! There is one process-wide session: a token is only honoured while the user
//! it was issued to is still the signed-in user.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::agents::{AgentDesk, AgentError};
use crate::ai::{AiError, SuggestionProvider};
use crate::auth::{
    create_jwt, hash_password, validate_jwt, validate_registration, RegistrationError,
};
use crate::autosave::DraftAutoSaver;
use crate::dispatch::{DispatchError, Dispatcher, EmailCampaignRequest, SmsCampaignRequest};
use crate::drafts::DraftSave;
use crate::models::{
    Agent, Campaign, ChatMessage, EmailData, EmailTemplate, NewUser, Role, SmtpConfiguration,
    User, UserActivity,
};
use crate::session::{SessionError, SharedSession};
use crate::smtp::{recheck, SmtpImportReport};
use crate::support::{SupportDesk, SupportError};

/// Shared app state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    session: SharedSession,
    dispatcher: Dispatcher,
    autosaver: Arc<Mutex<DraftAutoSaver>>,
    agents: AgentDesk,
    support: SupportDesk, // shares the provider below
    ai: Arc<dyn SuggestionProvider>,
    jwt_secret: Arc<[u8]>,
}

impl AppState {
    pub fn new(
        session: SharedSession,
        dispatcher: Dispatcher,
        autosaver: DraftAutoSaver,
        agents: AgentDesk,
        ai: Arc<dyn SuggestionProvider>,
        jwt_secret: &str,
    ) -> Self {
        Self {
            support: SupportDesk::new(session.clone(), ai.clone()),
            session,
            dispatcher,
            autosaver: Arc::new(Mutex::new(autosaver)),
            agents,
            ai,
            jwt_secret: Arc::from(jwt_secret.as_bytes()),
        }
    }
}

// ============================================================================
// DTOs
// ============================================================================

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRest {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginRest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRest {
    pub full_name: String,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct SmtpImportRest {
    pub text: String,
}

#[derive(Serialize, Deserialize)]
pub struct SmtpImportResponse {
    pub message: String,
    #[serde(flatten)]
    pub report: SmtpImportReport,
}

#[derive(Serialize, Deserialize)]
pub struct SuggestRest {
    pub prompt: String,
}

#[derive(Serialize, Deserialize)]
pub struct SuggestResponse {
    pub text: String,
}

#[derive(Serialize, Deserialize)]
pub struct ApplyTemplateRest {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub fields: Map<String, Value>, // agent field values, keyed by field name
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSendResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_template: Option<EmailTemplate>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFileResponse {
    pub file_name: String,
}

#[derive(Serialize, Deserialize)]
pub struct SupportAskRest {
    pub text: String,
}

/// Generic REST response (JSON)
#[derive(Serialize, Deserialize)]
pub struct RestResponse {
    pub success: bool,
    pub message: String,
}

impl RestResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden,
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Admin access required.".to_string()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            ApiError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        let body = Json(RestResponse {
            success: false,
            message,
        });
        (status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::DuplicateEmail(_) => ApiError::Conflict(e.to_string()),
            SessionError::InvalidCredentials | SessionError::NotAuthenticated => {
                ApiError::Unauthorized(e.to_string())
            }
            SessionError::EmptySmtpInput => ApiError::BadRequest(e.to_string()),
            SessionError::Storage(_) | SessionError::Hash(_) => {
                error!(error = %e, "Session operation failed");
                ApiError::Internal("Internal storage error.".to_string())
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Session(inner) => inner.into(),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<AiError> for ApiError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::Unavailable => ApiError::Unavailable(e.user_message()),
            other => {
                warn!(error = %other, "Suggestion failed");
                ApiError::BadGateway(other.user_message())
            }
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Session(inner) => inner.into(),
            AgentError::UnknownAgent(_) | AgentError::UnknownTemplate(_) => {
                ApiError::NotFound(e.to_string())
            }
            AgentError::AiUnavailable => ApiError::Unavailable(e.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<SupportError> for ApiError {
    fn from(e: SupportError) -> Self {
        match e {
            SupportError::Session(inner) => inner.into(),
            SupportError::EmptyQuestion => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(e: RegistrationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

// ============================================================================
// Router
// ============================================================================

async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let unauthorized = || ApiError::Unauthorized("Missing or invalid token.".to_string());
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(unauthorized)?;

    let claims = validate_jwt(token, &state.jwt_secret).map_err(|_| unauthorized())?;
    // A valid token is not enough: its user must still be the signed-in one
    let user = state
        .session
        .lock()
        .await
        .current_user()
        .filter(|u| u.id == claims.sub)
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("Session is no longer active.".to_string()))?;

    // Handlers read the caller via Extension<User>
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Create Axum router with the session, dispatch and AI endpoints
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/logout", post(logout_handler))
        .route("/me", get(me_handler))
        .route("/profile", put(profile_handler))
        .route("/activities", get(my_activities_handler))
        .route("/users", get(users_handler))
        .route("/users/:user_id/activities", get(user_activities_handler))
        .route("/smtp", get(list_smtp_handler).put(save_smtp_handler))
        .route("/smtp/import", post(import_smtp_handler))
        .route("/drafts", get(list_drafts_handler).post(save_draft_handler))
        .route("/drafts/autosave", post(autosave_draft_handler))
        .route("/drafts/:subject", delete(delete_draft_handler))
        .route("/send", post(send_email_handler))
        .route("/campaigns", get(list_campaigns_handler))
        .route("/campaigns/email", post(email_campaign_handler))
        .route("/campaigns/sms", post(sms_campaign_handler))
        .route("/ai/suggest", post(suggest_handler))
        .route("/agents", get(list_agents_handler))
        .route("/agents/:agent_id", get(select_agent_handler))
        .route("/agents/:agent_id/drafts", post(save_agent_draft_handler))
        .route("/agents/:agent_id/drafts/autosave", post(autosave_agent_draft_handler))
        .route(
            "/agents/:agent_id/templates/:template_id/apply",
            post(apply_template_handler),
        )
        .route(
            "/agents/:agent_id/fields/:field_name/generate",
            post(generate_file_handler),
        )
        .route("/agents/:agent_id/send", post(agent_send_handler))
        .route(
            "/support/messages",
            get(support_history_handler).post(support_ask_handler),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/health", get(health_handler))
        .merge(auth_routes)
        .with_state(state)
}

fn issue_token(state: &AppState, user: User) -> Result<Json<LoginResponse>, ApiError> {
    let token = create_jwt(&user.id, &state.jwt_secret).map_err(|e| {
        error!(error = %e, "Failed to sign token");
        ApiError::Internal("Could not issue token.".to_string())
    })?;
    Ok(Json(LoginResponse { token, user }))
}

fn require_admin(user: &User) -> Result<(), ApiError> {
    if user.role == Role::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

// ============================================================================
// Accounts
// ============================================================================

async fn health_handler() -> Json<RestResponse> {
    RestResponse::ok("Surprise Sender session API healthy")
}

/// Run bcrypt work on the blocking pool, never while the session lock is held.
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, bcrypt::BcryptError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| {
            error!(error = %e, "Blocking task failed");
            ApiError::Internal("Internal error.".to_string())
        })?
        .map_err(|e| ApiError::from(SessionError::Hash(e)))
}

async fn register_handler(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRest>,
) -> Result<Json<LoginResponse>, ApiError> {
    validate_registration(&payload.email, &payload.password, &payload.confirm_password)?;
    let password = payload.password;
    let password_hash = run_blocking(move || hash_password(&password)).await?;

    let user = {
        let mut session = state.session.lock().await;
        let created = session.register_account_with_hash(
            NewUser {
                full_name: payload.full_name,
                email: payload.email,
                company: payload.company,
            },
            &password_hash,
        )?;
        session.login(created)?
    };
    issue_token(&state, user)
}

async fn login_handler(
    State(state): State<AppState>,
    Json(payload): Json<LoginRest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let credential = state.session.lock().await.credential_for(&payload.email)?;
    let password = payload.password;
    let accepted = run_blocking(move || credential.verify(&password)).await?;

    let user = state
        .session
        .lock()
        .await
        .finish_authentication(&payload.email, accepted)?;
    issue_token(&state, user)
}

async fn logout_handler(State(state): State<AppState>) -> Result<Json<RestResponse>, ApiError> {
    state.autosaver.lock().await.cancel();
    state.agents.cancel_autosaves().await;
    state.session.lock().await.logout()?;
    Ok(RestResponse::ok("Logged out"))
}

async fn me_handler(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}

async fn profile_handler(
    State(state): State<AppState>,
    Json(payload): Json<ProfileRest>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .session
        .lock()
        .await
        .update_profile(payload.full_name, payload.company)?;
    Ok(Json(user))
}

async fn my_activities_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Json<Vec<UserActivity>> {
    Json(state.session.lock().await.get_activities(&user.id).to_vec())
}

async fn users_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<User>>, ApiError> {
    require_admin(&user)?;
    Ok(Json(state.session.lock().await.registered_users().to_vec()))
}

async fn user_activities_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<UserActivity>>, ApiError> {
    require_admin(&user)?;
    Ok(Json(state.session.lock().await.get_activities(&user_id).to_vec()))
}

// ============================================================================
// SMTP
// ============================================================================

async fn list_smtp_handler(State(state): State<AppState>) -> Json<Vec<SmtpConfiguration>> {
    Json(state.session.lock().await.smtp_configurations().to_vec())
}

async fn save_smtp_handler(
    State(state): State<AppState>,
    Json(configs): Json<Vec<SmtpConfiguration>>,
) -> Result<Json<RestResponse>, ApiError> {
    // Never trust the client's own format check
    let (valid, invalid): (Vec<_>, Vec<_>) = configs
        .into_iter()
        .map(recheck)
        .partition(SmtpConfiguration::is_valid_format);
    let total = valid.len();
    state.session.lock().await.save_smtp_configurations(valid)?;

    let mut message = format!("Saved {total} SMTP configurations");
    if !invalid.is_empty() {
        message.push_str(&format!(
            ". {} entries had an invalid format (host:port:user:pass required) and were not saved.",
            invalid.len()
        ));
    }
    Ok(RestResponse::ok(message))
}

async fn import_smtp_handler(
    State(state): State<AppState>,
    Json(payload): Json<SmtpImportRest>,
) -> Result<Json<SmtpImportResponse>, ApiError> {
    let report = state.session.lock().await.import_smtp_block(&payload.text)?;
    Ok(Json(SmtpImportResponse {
        message: report.message(),
        report,
    }))
}

// ============================================================================
// Drafts
// ============================================================================

async fn list_drafts_handler(State(state): State<AppState>) -> Json<Vec<EmailData>> {
    Json(state.session.lock().await.email_drafts().to_vec())
}

async fn save_draft_handler(
    State(state): State<AppState>,
    Json(draft): Json<EmailData>,
) -> Result<Json<RestResponse>, ApiError> {
    let outcome = state.session.lock().await.save_email_draft(draft)?;
    let message = match outcome {
        DraftSave::Created => "Draft saved successfully!",
        DraftSave::Updated => "Draft updated.",
    };
    Ok(RestResponse::ok(message))
}

async fn autosave_draft_handler(
    State(state): State<AppState>,
    Json(draft): Json<EmailData>,
) -> (StatusCode, Json<RestResponse>) {
    let scheduled = state.autosaver.lock().await.edit(draft);
    let message = if scheduled {
        "Auto-save scheduled"
    } else {
        "Nothing to save"
    };
    (StatusCode::ACCEPTED, RestResponse::ok(message))
}

async fn delete_draft_handler(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> Result<Json<RestResponse>, ApiError> {
    let removed = state.session.lock().await.delete_email_draft(&subject)?;
    Ok(RestResponse::ok(format!(
        "Draft \"{subject}\" deleted ({removed} removed)."
    )))
}

// ============================================================================
// Sending
// ============================================================================

async fn send_email_handler(
    State(state): State<AppState>,
    Json(email): Json<EmailData>,
) -> Result<(StatusCode, Json<RestResponse>), ApiError> {
    let to = email.to.clone();
    state.dispatcher.send_email(email).await?;
    Ok((
        StatusCode::ACCEPTED,
        RestResponse::ok(format!("Logging send request for email to {to}...")),
    ))
}

async fn email_campaign_handler(
    State(state): State<AppState>,
    Json(request): Json<EmailCampaignRequest>,
) -> Result<(StatusCode, Json<RestResponse>), ApiError> {
    let message = format!(
        "Campaign \"{}\" queued for sending via SMTP ID {}.",
        request.campaign_name, request.smtp_id
    );
    state.dispatcher.queue_email_campaign(request).await?;
    Ok((StatusCode::ACCEPTED, RestResponse::ok(message)))
}

async fn sms_campaign_handler(
    State(state): State<AppState>,
    Json(request): Json<SmsCampaignRequest>,
) -> Result<(StatusCode, Json<RestResponse>), ApiError> {
    let message = format!(
        "SMS Campaign \"{}\" queued for sending via {}.",
        request.campaign_name, request.gateway
    );
    state.dispatcher.queue_sms_campaign(request).await?;
    Ok((StatusCode::ACCEPTED, RestResponse::ok(message)))
}

async fn list_campaigns_handler(State(state): State<AppState>) -> Json<Vec<Campaign>> {
    Json(state.dispatcher.campaigns().await)
}

// ============================================================================
// AI
// ============================================================================

async fn suggest_handler(
    State(state): State<AppState>,
    Json(payload): Json<SuggestRest>,
) -> Result<Json<SuggestResponse>, ApiError> {
    let text = state.ai.generate_text_suggestion(&payload.prompt).await?;
    Ok(Json(SuggestResponse { text }))
}

// ============================================================================
// Agents
// ============================================================================

async fn list_agents_handler(State(state): State<AppState>) -> Json<Vec<Agent>> {
    Json(state.agents.agents().await)
}

async fn select_agent_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.agents.select(&agent_id).await?))
}

async fn save_agent_draft_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(draft): Json<EmailData>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.agents.save_draft(&agent_id, draft).await?))
}

async fn autosave_agent_draft_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(draft): Json<EmailData>,
) -> Result<(StatusCode, Json<RestResponse>), ApiError> {
    let scheduled = state.agents.autosave(&agent_id, draft).await?;
    let message = if scheduled {
        "Auto-save scheduled"
    } else {
        "Nothing to save"
    };
    Ok((StatusCode::ACCEPTED, RestResponse::ok(message)))
}

async fn apply_template_handler(
    State(state): State<AppState>,
    Path((agent_id, template_id)): Path<(String, String)>,
    Json(payload): Json<ApplyTemplateRest>,
) -> Result<Json<EmailData>, ApiError> {
    let email = state
        .agents
        .load_template(&agent_id, &template_id, payload.to, payload.fields)
        .await?;
    Ok(Json(email))
}

async fn generate_file_handler(
    State(state): State<AppState>,
    Path((agent_id, field_name)): Path<(String, String)>,
) -> Result<Json<GeneratedFileResponse>, ApiError> {
    let file_name = state
        .agents
        .generate_file_placeholder(&agent_id, &field_name, state.ai.is_available())
        .await?;
    Ok(Json(GeneratedFileResponse { file_name }))
}

async fn agent_send_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(email): Json<EmailData>,
) -> Result<(StatusCode, Json<AgentSendResponse>), ApiError> {
    let to = email.to.clone();
    // Delivery runs on its own; the response does not wait for it
    let sent = state.agents.send(&agent_id, email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(AgentSendResponse {
            message: format!("Message to {to} logged for processing."),
            created_template: sent.created_template,
        }),
    ))
}

// ============================================================================
// Support
// ============================================================================

async fn support_history_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    Ok(Json(state.support.history(&user.id).await?))
}

async fn support_ask_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<SupportAskRest>,
) -> Result<Json<ChatMessage>, ApiError> {
    Ok(Json(state.support.ask(&user.id, &payload.text).await?))
}
