//! Agents: purpose-built composers, each with its own templates, a short
//! draft list and a debounced auto-save.
//!
//! Agent state is in memory only. The catalog is rebuilt from
//! [`builtin_agents`] at start; templates and drafts added at runtime are
//! lost on restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::autosave::Debouncer;
use crate::models::{Agent, AgentField, AgentFieldKind, EmailData, EmailTemplate, User};
use crate::session::{SessionError, SharedSession};

pub const MAX_AGENT_DRAFTS: usize = 5;
pub const DEFAULT_AGENT_SEND_LATENCY: Duration = Duration::from_millis(1500);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent '{0}' not found.")]
    UnknownAgent(String),

    #[error("Template '{0}' not found for this agent.")]
    UnknownTemplate(String),

    #[error("Field '{0}' does not accept AI-generated files.")]
    UnsupportedField(String),

    #[error("AI features disabled or user not logged in.")]
    AiUnavailable,

    #[error("Error: Please provide a recipient.")]
    MissingRecipient,

    #[error(transparent)]
    Session(#[from] SessionError),
}

pub type AgentResult<T> = Result<T, AgentError>;

// ============================================================================
// Registry
// ============================================================================

/// The agent catalog with its templates and drafts.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self { agents }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_agents())
    }

    pub fn all(&self) -> &[Agent] {
        &self.agents
    }

    pub fn find(&self, agent_id: &str) -> AgentResult<&Agent> {
        self.agents
            .iter()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| AgentError::UnknownAgent(agent_id.to_string()))
    }

    fn find_mut(&mut self, agent_id: &str) -> AgentResult<&mut Agent> {
        self.agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| AgentError::UnknownAgent(agent_id.to_string()))
    }

    /// Newest first, at most five. A draft with the same subject and body replaces the older copy.
    pub fn save_draft(&mut self, agent_id: &str, draft: EmailData) -> AgentResult<&Agent> {
        let agent = self.find_mut(agent_id)?;
        agent
            .drafts
            .retain(|d| d.subject != draft.subject || d.body != draft.body);
        agent.drafts.truncate(MAX_AGENT_DRAFTS - 1);
        agent.drafts.insert(0, draft);
        Ok(agent)
    }

    /// Add a template to the agent, newest first.
    pub fn add_template(&mut self, agent_id: &str, template: EmailTemplate) -> AgentResult<()> {
        self.find_mut(agent_id)?.templates.insert(0, template);
        Ok(())
    }
}

/// Substitute `{Placeholder}` tokens with non-empty string field values.
/// Field names match placeholders case-insensitively (`{CEOName}` takes `ceoName`).
pub fn fill_template(template: &EmailTemplate, fields: &Map<String, Value>) -> (String, String) {
    let mut subject = template.subject.clone();
    let mut body = template.body.clone();
    for placeholder in &template.dynamic_placeholders {
        let name = placeholder.trim_matches(|c| c == '{' || c == '}');
        let value = fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty());
        if let Some(value) = value {
            subject = subject.replace(placeholder.as_str(), value);
            body = body.replace(placeholder.as_str(), value);
        }
    }
    (subject, body)
}

/// Template for content the agent has never sent before; `None` when it already
/// has one with the same subject and body, or either is empty.
pub fn auto_template(agent: &Agent, email: &EmailData, now: DateTime<Utc>) -> Option<EmailTemplate> {
    if email.subject.is_empty() || email.body.is_empty() {
        return None;
    }
    if agent
        .templates
        .iter()
        .any(|t| t.subject == email.subject && t.body == email.body)
    {
        return None;
    }

    let short: String = email.subject.chars().take(20).collect();
    Some(EmailTemplate {
        id: format!("agent-{}-tpl-{}", agent.id, now.timestamp_millis()),
        name: format!("Auto: {short}... ({})", now.format("%H:%M")),
        subject: email.subject.clone(),
        body: email.body.clone(),
        is_html: email.is_html,
        dynamic_placeholders: agent
            .specific_fields
            .iter()
            .map(|f| format!("{{{}}}", f.label.split_whitespace().collect::<String>()))
            .collect(),
    })
}

/// Nothing typed yet, agent fields included.
fn is_blank_draft(draft: &EmailData) -> bool {
    draft.is_blank()
        && draft.extra.values().all(|value| match value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        })
}

// ============================================================================
// Desk
// ============================================================================

/// Result of sending through an agent.
pub struct AgentSend {
    /// Set when the content was new to the agent and got saved as a template
    pub created_template: Option<EmailTemplate>,
    pub delivery: JoinHandle<()>,
}

/// Agent operations on top of the session: every action is logged for the signed-in user.
#[derive(Clone)]
pub struct AgentDesk {
    session: SharedSession,
    registry: Arc<Mutex<AgentRegistry>>,
    autosavers: Arc<Mutex<HashMap<String, Debouncer>>>, // one pending save per agent composer
    quiet_period: Duration,
    send_latency: Duration,
}

impl AgentDesk {
    pub fn new(
        session: SharedSession,
        registry: AgentRegistry,
        quiet_period: Duration,
        send_latency: Duration,
    ) -> Self {
        Self {
            session,
            registry: Arc::new(Mutex::new(registry)),
            autosavers: Arc::new(Mutex::new(HashMap::new())),
            quiet_period,
            send_latency,
        }
    }

    pub async fn agents(&self) -> Vec<Agent> {
        self.registry.lock().await.all().to_vec()
    }

    async fn signed_in_user(&self) -> AgentResult<User> {
        self.session
            .lock()
            .await
            .current_user()
            .cloned()
            .ok_or(AgentError::Session(SessionError::NotAuthenticated))
    }

    async fn log(&self, description: String) -> AgentResult<()> {
        self.session
            .lock()
            .await
            .log_current_activity(description)?;
        Ok(())
    }

    /// Open an agent's composer.
    pub async fn select(&self, agent_id: &str) -> AgentResult<Agent> {
        let agent = self.registry.lock().await.find(agent_id)?.clone();
        self.log(format!("Selected agent: {}", agent.name)).await?;
        Ok(agent)
    }

    pub async fn save_draft(&self, agent_id: &str, draft: EmailData) -> AgentResult<Agent> {
        let subject = draft.subject.clone();
        let agent = self.registry.lock().await.save_draft(agent_id, draft)?.clone();
        self.log(format!(
            "Manually saved draft for agent {}: {}",
            agent.name, subject
        ))
        .await?;
        Ok(agent)
    }

    /// Record an edit in an agent composer. Returns false when nothing was scheduled.
    pub async fn autosave(&self, agent_id: &str, draft: EmailData) -> AgentResult<bool> {
        self.registry.lock().await.find(agent_id)?;
        if is_blank_draft(&draft) {
            return Ok(false);
        }

        let session = self.session.clone();
        let registry = self.registry.clone();
        let id = agent_id.to_string();
        let mut autosavers = self.autosavers.lock().await;
        let debouncer = autosavers
            .entry(agent_id.to_string())
            .or_insert_with(|| Debouncer::new(self.quiet_period));
        debouncer.schedule(async move {
            if !session.lock().await.is_authenticated() {
                debug!(agent = %id, "Skipping agent auto-save: nobody signed in");
                return;
            }
            let subject = draft.subject.clone();
            let name = match registry.lock().await.save_draft(&id, draft) {
                Ok(agent) => agent.name.clone(),
                Err(e) => {
                    warn!(agent = %id, error = %e, "Agent auto-save failed");
                    return;
                }
            };
            let logged = session
                .lock()
                .await
                .log_current_activity(format!("Auto-draft saved for agent {name}: {subject}"));
            if let Err(e) = logged {
                warn!(agent = %id, error = %e, "Agent auto-save could not be logged");
            }
        });
        Ok(true)
    }

    /// Drop every pending agent auto-save.
    pub async fn cancel_autosaves(&self) {
        for debouncer in self.autosavers.lock().await.values_mut() {
            debouncer.cancel();
        }
    }

    /// Compose from a template, keeping the recipient and the agent fields.
    pub async fn load_template(
        &self,
        agent_id: &str,
        template_id: &str,
        to: String,
        fields: Map<String, Value>,
    ) -> AgentResult<EmailData> {
        let (agent_name, template) = {
            let registry = self.registry.lock().await;
            let agent = registry.find(agent_id)?;
            let template = agent
                .templates
                .iter()
                .find(|t| t.id == template_id)
                .cloned()
                .ok_or_else(|| AgentError::UnknownTemplate(template_id.to_string()))?;
            (agent.name.clone(), template)
        };

        let (subject, body) = fill_template(&template, &fields);
        self.log(format!(
            "Loaded template \"{}\" for agent {}",
            template.name, agent_name
        ))
        .await?;
        Ok(EmailData {
            to,
            subject,
            body,
            is_html: template.is_html,
            extra: fields,
        })
    }

    /// Stand-in file name for a file field that allows AI generation.
    pub async fn generate_file_placeholder(
        &self,
        agent_id: &str,
        field_name: &str,
        ai_available: bool,
    ) -> AgentResult<String> {
        if !ai_available || !self.session.lock().await.is_authenticated() {
            return Err(AgentError::AiUnavailable);
        }
        let (agent_name, field): (String, AgentField) = {
            let registry = self.registry.lock().await;
            let agent = registry.find(agent_id)?;
            let field = agent
                .specific_fields
                .iter()
                .find(|f| f.name == field_name && f.kind == AgentFieldKind::File && f.allow_ai_generation)
                .cloned()
                .ok_or_else(|| AgentError::UnsupportedField(field_name.to_string()))?;
            (agent.name.clone(), field)
        };

        let file_name = format!(
            "ai_generated_{}.pdf",
            field
                .name
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("_")
        );
        self.log(format!(
            "AI generated file placeholder for {} in agent {}.",
            field.label, agent_name
        ))
        .await?;
        Ok(file_name)
    }

    /// Log a send through the agent. New content becomes a template first.
    pub async fn send(&self, agent_id: &str, email: EmailData) -> AgentResult<AgentSend> {
        self.signed_in_user().await?;
        if email.to.trim().is_empty() {
            return Err(AgentError::MissingRecipient);
        }

        let (agent_name, created_template) = {
            let mut registry = self.registry.lock().await;
            let agent = registry.find(agent_id)?;
            let name = agent.name.clone();
            let template = auto_template(agent, &email, Utc::now());
            if let Some(template) = &template {
                registry.add_template(agent_id, template.clone())?;
            }
            (name, template)
        };

        {
            let mut session = self.session.lock().await;
            if let Some(template) = &created_template {
                session.log_current_activity(format!(
                    "Auto-created template \"{}\" for agent {}",
                    template.name, agent_name
                ))?;
            }
            session.log_current_activity(format!(
                "Sent message via agent {} to {}: {}",
                agent_name, email.to, email.subject
            ))?;
        }
        info!(agent = %agent_id, to = %email.to, subject = %email.subject, "Agent message queued");

        let latency = self.send_latency;
        let delivery = tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            info!(
                to = %email.to,
                agent = %agent_name,
                "Message logged for processing by backend"
            );
        });
        Ok(AgentSend {
            created_template,
            delivery,
        })
    }
}

// ============================================================================
// Catalog
// ============================================================================

fn field(name: &str, label: &str, kind: AgentFieldKind, placeholder: &str) -> AgentField {
    AgentField {
        name: name.to_string(),
        label: label.to_string(),
        kind,
        placeholder: Some(placeholder.to_string()),
        file_accept: None,
        allow_ai_generation: false,
    }
}

fn template(id: &str, name: &str, subject: &str, body: &str, placeholders: &[&str]) -> EmailTemplate {
    EmailTemplate {
        id: id.to_string(),
        name: name.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        is_html: false,
        dynamic_placeholders: placeholders.iter().map(|p| p.to_string()).collect(),
    }
}

/// Agents available out of the box.
pub fn builtin_agents() -> Vec<Agent> {
    vec![
        Agent {
            id: "ceo-outreach".into(),
            name: "CEO Outreach".into(),
            description: "Personal cold emails to founders and executives.".into(),
            category: Some("Sales".into()),
            templates: vec![template(
                "ceo-outreach-tpl-intro",
                "Warm introduction",
                "A quick idea for {CompanyName}",
                "Dear {CEOName},\n\nI have been following {CompanyName} and would love ten minutes of your time.",
                &["{CEOName}", "{CompanyName}"],
            )],
            drafts: Vec::new(),
            specific_fields: vec![
                field("ceoName", "CEO Name", AgentFieldKind::Text, "Jane Doe"),
                field("companyName", "Company Name", AgentFieldKind::Text, "Acme Inc."),
            ],
        },
        Agent {
            id: "invoice-reminder".into(),
            name: "Invoice Reminder".into(),
            description: "Polite payment reminders with the invoice attached.".into(),
            category: Some("Finance".into()),
            templates: vec![template(
                "invoice-reminder-tpl-due",
                "Payment due",
                "Invoice {InvoiceNumber} is due",
                "Hello,\n\nThis is a reminder that invoice {InvoiceNumber} for {AmountDue} is now due.",
                &["{InvoiceNumber}", "{AmountDue}"],
            )],
            drafts: Vec::new(),
            specific_fields: vec![
                field("invoiceNumber", "Invoice Number", AgentFieldKind::Text, "INV-0001"),
                field("amountDue", "Amount Due", AgentFieldKind::Text, "$1,200"),
                AgentField {
                    file_accept: Some(".pdf".into()),
                    allow_ai_generation: true,
                    ..field("invoiceFile", "Invoice File", AgentFieldKind::File, "invoice.pdf")
                },
            ],
        },
        Agent {
            id: "event-invite".into(),
            name: "Event Invitation".into(),
            description: "Invitations for launches, webinars and parties.".into(),
            category: Some("Marketing".into()),
            templates: Vec::new(),
            drafts: Vec::new(),
            specific_fields: vec![
                field("eventName", "Event Name", AgentFieldKind::Text, "Spring Launch"),
                field("eventDate", "Event Date", AgentFieldKind::Text, "May 4"),
                field("details", "Details", AgentFieldKind::Textarea, "Venue, dress code, RSVP"),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::storage::Storage;
    use chrono::TimeZone;
    use serde_json::json;

    fn desk() -> (SharedSession, AgentDesk) {
        let mut store = SessionStore::new(Storage::temporary().unwrap());
        store.hydrate();
        let session = store.into_shared();
        let desk = AgentDesk::new(
            session.clone(),
            AgentRegistry::builtin(),
            Duration::from_millis(3500),
            DEFAULT_AGENT_SEND_LATENCY,
        );
        (session, desk)
    }

    fn fields(value: serde_json::Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    async fn descriptions(session: &SharedSession) -> Vec<String> {
        session
            .lock()
            .await
            .get_activities("admin-0")
            .iter()
            .map(|a| a.description.clone())
            .collect()
    }

    #[test]
    fn test_agent_drafts_capped_and_deduplicated() {
        let mut registry = AgentRegistry::builtin();
        for n in 0..7 {
            registry
                .save_draft("event-invite", EmailData::new("a@x.io", format!("s{n}"), "b"))
                .unwrap();
        }
        // Same subject and body, different recipient: replaces the older copy
        let agent = registry
            .save_draft("event-invite", EmailData::new("other@x.io", "s3", "b"))
            .unwrap();

        let subjects: Vec<&str> = agent.drafts.iter().map(|d| d.subject.as_str()).collect();
        assert_eq!(subjects, ["s3", "s6", "s5", "s4", "s2"]);
        assert_eq!(agent.drafts[0].to, "other@x.io");
        assert!(matches!(
            registry.save_draft("nope", EmailData::default()),
            Err(AgentError::UnknownAgent(_))
        ));
    }

    #[test]
    fn test_fill_template_matches_fields_case_insensitively() {
        let registry = AgentRegistry::builtin();
        let template = &registry.find("ceo-outreach").unwrap().templates[0];
        let (subject, body) = fill_template(
            template,
            &fields(json!({"ceoName": "Ada", "companyName": ""})),
        );
        assert_eq!(subject, "A quick idea for {CompanyName}");
        assert!(body.starts_with("Dear Ada,"));
    }

    #[test]
    fn test_auto_template_only_for_new_complete_content() {
        let registry = AgentRegistry::builtin();
        let agent = registry.find("ceo-outreach").unwrap();
        let now = Utc.timestamp_millis_opt(1_717_000_123_456).unwrap();

        let existing = EmailData::new("a@x.io", &agent.templates[0].subject, &agent.templates[0].body);
        assert!(auto_template(agent, &existing, now).is_none());
        assert!(auto_template(agent, &EmailData::new("a@x.io", "Hi", ""), now).is_none());

        let created = auto_template(
            agent,
            &EmailData::new("a@x.io", "A very long subject line indeed", "Body"),
            now,
        )
        .unwrap();
        assert_eq!(created.id, "agent-ceo-outreach-tpl-1717000123456");
        assert_eq!(created.name, "Auto: A very long subject ... (16:28)");
        assert_eq!(created.dynamic_placeholders, ["{CEOName}", "{CompanyName}"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_creates_template_once_and_logs() {
        let (session, desk) = desk();
        desk.select("invoice-reminder").await.unwrap();

        let email = EmailData::new("ap@x.io", "Friendly nudge", "Please settle the balance.");
        let first = desk.send("invoice-reminder", email.clone()).await.unwrap();
        first.delivery.await.unwrap();
        let template = first.created_template.unwrap();
        assert!(template.id.starts_with("agent-invoice-reminder-tpl-"));

        let second = desk.send("invoice-reminder", email).await.unwrap();
        assert!(second.created_template.is_none());

        let agent = desk.agents().await.into_iter().find(|a| a.id == "invoice-reminder").unwrap();
        assert_eq!(agent.templates.len(), 2);
        assert_eq!(agent.templates[0].id, template.id);

        let log = descriptions(&session).await;
        let tail = &log[log.len() - 4..];
        assert_eq!(tail[0], "Selected agent: Invoice Reminder");
        assert_eq!(
            tail[1],
            format!("Auto-created template \"{}\" for agent Invoice Reminder", template.name)
        );
        assert_eq!(tail[2], "Sent message via agent Invoice Reminder to ap@x.io: Friendly nudge");
        assert_eq!(tail[3], tail[2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_session_and_recipient() {
        let (session, desk) = desk();
        assert!(matches!(
            desk.send("ceo-outreach", EmailData::new("", "s", "b")).await,
            Err(AgentError::MissingRecipient)
        ));
        session.lock().await.logout().unwrap();
        assert!(matches!(
            desk.send("ceo-outreach", EmailData::new("a@x.io", "s", "b")).await,
            Err(AgentError::Session(SessionError::NotAuthenticated))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_is_debounced_per_agent() {
        let (session, desk) = desk();
        assert!(desk.autosave("ceo-outreach", EmailData::new("a@x.io", "Hel", "")).await.unwrap());
        assert!(desk.autosave("event-invite", EmailData::new("b@x.io", "Party", "")).await.unwrap());
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(desk.autosave("ceo-outreach", EmailData::new("a@x.io", "Hello", "")).await.unwrap());
        tokio::time::sleep(Duration::from_millis(3600)).await;

        let agents = desk.agents().await;
        let ceo = agents.iter().find(|a| a.id == "ceo-outreach").unwrap();
        let event = agents.iter().find(|a| a.id == "event-invite").unwrap();
        assert_eq!(ceo.drafts.len(), 1);
        assert_eq!(ceo.drafts[0].subject, "Hello");
        assert_eq!(event.drafts.len(), 1);
        assert!(descriptions(&session)
            .await
            .contains(&"Auto-draft saved for agent CEO Outreach: Hello".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_ignores_blank_and_field_only_edits_count() {
        let (_session, desk) = desk();
        assert!(!desk.autosave("event-invite", EmailData::default()).await.unwrap());

        let mut only_fields = EmailData::default();
        only_fields.extra.insert("eventName".into(), json!("Gala"));
        assert!(desk.autosave("event-invite", only_fields).await.unwrap());

        desk.cancel_autosaves().await;
        tokio::time::sleep(Duration::from_millis(4000)).await;
        let agents = desk.agents().await;
        assert!(agents.iter().all(|a| a.drafts.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_template_fills_and_keeps_fields() {
        let (session, desk) = desk();
        let email = desk
            .load_template(
                "invoice-reminder",
                "invoice-reminder-tpl-due",
                "ap@x.io".into(),
                fields(json!({"invoiceNumber": "INV-7", "amountDue": "$40"})),
            )
            .await
            .unwrap();
        assert_eq!(email.subject, "Invoice INV-7 is due");
        assert!(email.body.contains("INV-7 for $40"));
        assert_eq!(email.extra["invoiceNumber"], "INV-7");
        assert_eq!(
            descriptions(&session).await.last().unwrap(),
            "Loaded template \"Payment due\" for agent Invoice Reminder"
        );

        assert!(matches!(
            desk.load_template("invoice-reminder", "missing", String::new(), Map::new()).await,
            Err(AgentError::UnknownTemplate(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_placeholder_needs_ai_and_an_ai_field() {
        let (_session, desk) = desk();
        assert!(matches!(
            desk.generate_file_placeholder("invoice-reminder", "invoiceFile", false).await,
            Err(AgentError::AiUnavailable)
        ));
        assert!(matches!(
            desk.generate_file_placeholder("invoice-reminder", "amountDue", true).await,
            Err(AgentError::UnsupportedField(_))
        ));
        let name = desk
            .generate_file_placeholder("invoice-reminder", "invoiceFile", true)
            .await
            .unwrap();
        assert_eq!(name, "ai_generated_invoicefile.pdf");
    }
}
