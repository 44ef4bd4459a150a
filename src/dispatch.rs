//! Simulated sending. Nothing leaves the process: requests are validated,
//! logged, and after a fixed latency recorded as queued campaigns.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::models::{Campaign, CampaignKind, CampaignStatus, EmailData};
use crate::session::{SessionError, SharedSession};

pub const DEFAULT_SEND_LATENCY: Duration = Duration::from_millis(2000);
const MAX_ALPHANUMERIC_SENDER_ID: usize = 11;
const MAX_NUMERIC_SENDER_ID: usize = 15;
/// Campaign history kept in memory; older entries fall off the end.
pub const MAX_OUTBOX_CAMPAIGNS: usize = 100;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Error: Please provide a recipient.")]
    MissingRecipient,

    #[error("Error: Please fill all required fields including Campaign Name, Subject, Body, Recipients, and select an SMTP Configuration.")]
    IncompleteEmailCampaign,

    #[error("Error: Please fill all required fields: Campaign Name, Message, Recipients, Sender ID, and select an SMS Gateway.")]
    IncompleteSmsCampaign,

    #[error("Error: SMTP configuration '{0}' not found. Select one of your saved configurations.")]
    UnknownSmtpConfiguration(String),

    #[error("Error: Alphanumeric Sender ID cannot be more than 11 characters.")]
    AlphanumericSenderIdTooLong,

    #[error("Error: Numeric Sender ID cannot be more than 15 digits.")]
    NumericSenderIdTooLong,

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct EmailCampaignRequest {
    pub campaign_name: String,
    pub subject: String,
    pub body: String,
    /// Comma-separated addresses.
    pub recipients: String,
    pub smtp_id: String,
    pub schedule_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct SmsCampaignRequest {
    pub campaign_name: String,
    pub message: String,
    /// Phone numbers separated by commas or newlines.
    pub recipients: String,
    pub sender_id: String,
    pub gateway: String,
    pub schedule_at: Option<DateTime<Utc>>,
}

impl EmailCampaignRequest {
    pub fn validate(&self) -> Result<(), DispatchError> {
        let required = [
            &self.campaign_name,
            &self.subject,
            &self.body,
            &self.recipients,
            &self.smtp_id,
        ];
        if required.iter().any(|field| field.trim().is_empty()) {
            return Err(DispatchError::IncompleteEmailCampaign);
        }
        Ok(())
    }

    pub fn recipient_count(&self) -> usize {
        count_recipients(&self.recipients, &[','])
    }
}

impl SmsCampaignRequest {
    pub fn validate(&self) -> Result<(), DispatchError> {
        let required = [
            &self.campaign_name,
            &self.message,
            &self.recipients,
            &self.sender_id,
            &self.gateway,
        ];
        if required.iter().any(|field| field.trim().is_empty()) {
            return Err(DispatchError::IncompleteSmsCampaign);
        }
        // Carriers allow longer numeric sender ids than alphanumeric ones
        let numeric = self.sender_id.chars().all(|c| c.is_ascii_digit());
        let len = self.sender_id.chars().count();
        if !numeric && len > MAX_ALPHANUMERIC_SENDER_ID {
            return Err(DispatchError::AlphanumericSenderIdTooLong);
        }
        if numeric && len > MAX_NUMERIC_SENDER_ID {
            return Err(DispatchError::NumericSenderIdTooLong);
        }
        Ok(())
    }

    pub fn recipient_count(&self) -> usize {
        count_recipients(&self.recipients, &[',', '\n'])
    }
}

fn count_recipients(list: &str, separators: &[char]) -> usize {
    list.split(separators).filter(|r| !r.trim().is_empty()).count()
}

/// Last six digits of the current millisecond clock, behind a kind prefix.
fn campaign_id(prefix: char, now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().to_string();
    let tail = &millis[millis.len().saturating_sub(6)..];
    format!("{prefix}{tail}")
}

#[derive(Clone)]
pub struct Dispatcher {
    session: SharedSession,
    latency: Duration,
    outbox: Arc<Mutex<Vec<Campaign>>>, // newest first
}

impl Dispatcher {
    pub fn new(session: SharedSession, latency: Duration) -> Self {
        Self {
            session,
            latency,
            outbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Campaigns recorded so far, newest first.
    pub async fn campaigns(&self) -> Vec<Campaign> {
        self.outbox.lock().await.clone()
    }

    /// Log a single composed email and acknowledge it after the latency.
    pub async fn send_email(&self, email: EmailData) -> Result<JoinHandle<()>, DispatchError> {
        if email.to.trim().is_empty() {
            return Err(DispatchError::MissingRecipient);
        }
        self.session.lock().await.log_current_activity(format!(
            "Initiated send email from main composer to {}: {}",
            email.to, email.subject
        ))?;
        info!(to = %email.to, subject = %email.subject, is_html = email.is_html, "Email queued for sending");

        let latency = self.latency;
        Ok(tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            info!(to = %email.to, "Email has been queued for processing by the backend");
        }))
    }

    pub async fn queue_email_campaign(
        &self,
        request: EmailCampaignRequest,
    ) -> Result<JoinHandle<Campaign>, DispatchError> {
        request.validate()?;
        {
            let mut session = self.session.lock().await;
            // The relay has to be one of the saved configurations
            if session.find_smtp_configuration(&request.smtp_id).is_none() {
                return Err(DispatchError::UnknownSmtpConfiguration(request.smtp_id));
            }
            session.log_current_activity(format!(
                "Submitted Bulk Email campaign: {} via SMTP ID {}",
                request.campaign_name, request.smtp_id
            ))?;
        }
        info!(
            campaign = %request.campaign_name,
            smtp_id = %request.smtp_id,
            body_len = request.body.len(),
            "Bulk email campaign submitted"
        );

        let recipients = request.recipient_count();
        Ok(self.record_after_latency(
            'c',
            request.campaign_name,
            CampaignKind::Email,
            recipients,
            request.schedule_at,
        ))
    }

    pub async fn queue_sms_campaign(
        &self,
        request: SmsCampaignRequest,
    ) -> Result<JoinHandle<Campaign>, DispatchError> {
        request.validate()?;
        self.session.lock().await.log_current_activity(format!(
            "Submitted Bulk SMS campaign: {} via Gateway {}",
            request.campaign_name, request.gateway
        ))?;
        info!(
            campaign = %request.campaign_name,
            gateway = %request.gateway,
            sender_id = %request.sender_id,
            "Bulk SMS campaign submitted"
        );

        let recipients = request.recipient_count();
        Ok(self.record_after_latency(
            's',
            request.campaign_name,
            CampaignKind::Sms,
            recipients,
            request.schedule_at,
        ))
    }

    fn record_after_latency(
        &self,
        prefix: char,
        name: String,
        kind: CampaignKind,
        recipients: usize,
        schedule_at: Option<DateTime<Utc>>,
    ) -> JoinHandle<Campaign> {
        let outbox = self.outbox.clone();
        let latency = self.latency;
        tokio::spawn(async move {
            // Simulated SMTP/gateway round trip
            tokio::time::sleep(latency).await;
            let now = Utc::now();
            let campaign = Campaign {
                id: campaign_id(prefix, now),
                name,
                kind,
                status: if schedule_at.is_some() {
                    CampaignStatus::Scheduled
                } else {
                    CampaignStatus::Queued
                },
                recipients,
                sent_date: schedule_at.unwrap_or(now),
                created_date: now,
            };
            info!(id = %campaign.id, status = ?campaign.status, recipients, "Campaign queued");
            let mut outbox = outbox.lock().await;
            outbox.insert(0, campaign.clone());
            outbox.truncate(MAX_OUTBOX_CAMPAIGNS);
            campaign
        })
    }
}
