use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Access level of an account. Always derived from the email, see [`crate::role::resolve_role`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub email: String, // unique key within the registered users
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// Registration payload: everything except the generated id, role and timestamp.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub user_id: String,
}

/// Result of the client-side `host:port:user:pass` format check.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCheck {
    #[serde(rename = "Valid Format")]
    Valid,
    #[serde(rename = "Invalid Format")]
    Invalid,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfiguration {
    pub id: String,
    pub host: String,
    pub port: String,
    pub user: String,
    pub pass: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_side_check: Option<FormatCheck>,
}

impl SmtpConfiguration {
    pub fn is_valid_format(&self) -> bool {
        self.client_side_check == Some(FormatCheck::Valid)
    }
}

/// An email composition. Agent pages attach their own dynamic fields, kept in `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EmailData {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub is_html: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EmailData {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// True when nothing has been typed into to, subject or body yet.
    pub fn is_blank(&self) -> bool {
        self.to.is_empty() && self.subject.is_empty() && self.body.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignKind {
    Email,
    #[serde(rename = "SMS")]
    Sms,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    Scheduled,
    Queued,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CampaignKind,
    pub status: CampaignStatus,
    pub recipients: usize,
    pub sent_date: DateTime<Utc>,
    pub created_date: DateTime<Utc>,
}

/// Reusable subject/body pair; `{Placeholder}` tokens are filled from agent fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub is_html: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_placeholders: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentFieldKind {
    Text,
    Textarea,
    File,
}

/// Extra input an agent asks for on top of to/subject/body.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: AgentFieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_accept: Option<String>,
    #[serde(default, rename = "allowAIGeneration")]
    pub allow_ai_generation: bool,
}

/// A purpose-built composer (outreach, invoicing, ...) with its own templates and drafts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub templates: Vec<EmailTemplate>,
    pub drafts: Vec<EmailData>,
    #[serde(default)]
    pub specific_fields: Vec<AgentField>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatSender {
    User,
    Ai,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub sender: ChatSender,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthPayload {
    pub sub: String, // user id
    pub exp: usize,
}
