//! Seed script for Surprise Sender
//!
//! Populates the Sled data directory with:
//! - demo accounts (one admin by naming convention, two plain users)
//! - a block of SMTP entries, one of them malformed
//! - a couple of drafts for the admin
//! Run: cargo run --bin load_data

use surprise_sender::config::AppConfig;
use surprise_sender::models::{EmailData, NewUser};
use surprise_sender::session::{SessionError, SessionStore};
use surprise_sender::smtp::unsaved_lines;
use surprise_sender::storage::Storage;
use surprise_sender::telemetry;

const DEMO_PASSWORD: &str = "surprise123";

const SMTP_BLOCK: &str = "\
smtp.mailgun.org:587:postmaster@mg.example.com:mg-secret:Mailgun
smtp.sendgrid.net:465:apikey:sg-secret
email-smtp.eu-west-1.amazonaws.com:587:AKIAEXAMPLE:ses-secret:SES Ireland
smtp.broken.example.com:587";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let _log_guard = telemetry::init(&config.log);

    // Open the same data dir the server uses; hydrating seeds the default admin on first run
    let storage = Storage::open(&config.data_dir)?;
    let mut session = SessionStore::new(storage).with_demo_password(config.demo_password.clone());
    session.hydrate();

    // admin-* emails resolve to the admin role
    let accounts = [
        ("Ada Admin", "admin-1@surprisesender.com", Some("Surprise Sender HQ")),
        ("Uche Okafor", "uche@example.org", Some("Okafor Events")),
        ("Mira Patel", "mira@example.org", None),
    ];
    for (full_name, email, company) in accounts {
        let new_user = NewUser {
            full_name: full_name.to_string(),
            email: email.to_string(),
            company: company.map(str::to_string),
        };
        match session.register_account(new_user, DEMO_PASSWORD) {
            Ok(user) => println!("✅ Registered {} ({})", user.email, user.role),
            Err(SessionError::DuplicateEmail(_)) => println!("↩️  {} already registered", email),
            Err(e) => return Err(e.into()),
        }
    }

    // SMTP entries and drafts are logged against whoever is signed in.
    let admin = session.authenticate("admin-1@surprisesender.com", DEMO_PASSWORD)?;
    println!("✅ Signed in as {}", admin.email);

    // Re-running the seed must not duplicate relays that are already saved
    let fresh_lines = unsaved_lines(SMTP_BLOCK, session.smtp_configurations());
    if fresh_lines.is_empty() {
        println!("↩️  SMTP configurations already seeded");
    } else {
        let report = session.import_smtp_block(&fresh_lines.join("\n"))?;
        println!("✅ {}", report.message());
    }

    let drafts = [
        EmailData::new("team@example.org", "Friday launch", "We go live at noon."),
        EmailData {
            is_html: true,
            ..EmailData::new("vip@example.org", "You're invited", "<h1>Surprise!</h1>")
        },
    ];
    // Drafts upsert on (subject, to), so re-running updates in place
    for draft in drafts {
        let outcome = session.save_email_draft(draft)?;
        println!("✅ Draft {:?}", outcome);
    }

    println!(
        "✅ Seeded {} users, {} SMTP configurations, {} drafts into {}",
        session.registered_users().len(),
        session.smtp_configurations().len(),
        session.email_drafts().len(),
        config.data_dir
    );
    Ok(())
}
