//! Outbound server descriptors and the `host:port:user:pass[:label]` line format.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::{FormatCheck, SmtpConfiguration};

/// Stored SMTP configurations. Saving replaces the whole collection.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct SmtpConfigStore {
    configs: Vec<SmtpConfiguration>,
}

impl SmtpConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored collection verbatim. Callers append to [`Self::all`] themselves.
    pub fn save_all(&mut self, configs: Vec<SmtpConfiguration>) {
        self.configs = configs;
    }

    pub fn all(&self) -> &[SmtpConfiguration] {
        &self.configs
    }

    pub fn find(&self, id: &str) -> Option<&SmtpConfiguration> {
        self.configs.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

/// Parse one line. Fields are trimmed; a missing label defaults to `"{host} ({user})"`.
pub fn parse_smtp_line(line: &str, id: String) -> SmtpConfiguration {
    let mut parts = line.split(':').map(str::trim);
    let mut next = || parts.next().unwrap_or("").to_string();
    let host = next();
    let port = next();
    let user = next();
    let pass = next();
    let label = next();

    let label = if label.is_empty() {
        let shown_user = if user.is_empty() { "default" } else { user.as_str() };
        format!("{host} ({shown_user})")
    } else {
        label
    };

    recheck(SmtpConfiguration {
        id,
        host,
        port,
        user,
        pass,
        label: Some(label),
        client_side_check: None,
    })
}

/// Recompute the format check from the fields, ignoring whatever check the entry carried.
pub fn recheck(mut config: SmtpConfiguration) -> SmtpConfiguration {
    let complete = [&config.host, &config.port, &config.user, &config.pass]
        .iter()
        .all(|field| !field.trim().is_empty());
    config.client_side_check = Some(if complete {
        FormatCheck::Valid
    } else {
        FormatCheck::Invalid
    });
    config
}

/// Non-blank lines of `text` whose host is not among the saved relays.
pub fn unsaved_lines<'a>(text: &'a str, saved: &[SmtpConfiguration]) -> Vec<&'a str> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| {
            let host = line.split(':').next().unwrap_or_default().trim();
            !saved.iter().any(|config| config.host == host)
        })
        .collect()
}

/// Parse a multi-line block, skipping blank lines. Ids are `smtp-cfg-{millis}-{index}`.
pub fn parse_smtp_block(text: &str) -> Vec<SmtpConfiguration> {
    let stamp = Utc::now().timestamp_millis();
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| parse_smtp_line(line, format!("smtp-cfg-{stamp}-{index}")))
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmtpImportReport {
    pub processed: usize,
    pub saved: usize,
    pub invalid: usize,
}

impl SmtpImportReport {
    pub fn message(&self) -> String {
        let mut message = format!(
            "Processed {} SMTP entries. {} configurations with valid format saved.",
            self.processed, self.saved
        );
        if self.invalid > 0 {
            message.push_str(&format!(
                " {} entries had an invalid format (host:port:user:pass required) and were not saved.",
                self.invalid
            ));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_line_parses_valid() {
        let cfg = parse_smtp_line("smtp.x.com:587:u:p:Label", "id-1".into());
        assert_eq!(cfg.host, "smtp.x.com");
        assert_eq!(cfg.port, "587");
        assert_eq!(cfg.user, "u");
        assert_eq!(cfg.pass, "p");
        assert_eq!(cfg.label.as_deref(), Some("Label"));
        assert_eq!(cfg.client_side_check, Some(FormatCheck::Valid));
    }

    #[test]
    fn test_missing_credentials_is_invalid() {
        let cfg = parse_smtp_line("smtp.x.com:587", "id".into());
        assert_eq!(cfg.client_side_check, Some(FormatCheck::Invalid));
        assert_eq!(cfg.label.as_deref(), Some("smtp.x.com (default)"));
    }

    #[test]
    fn test_whitespace_only_fields_do_not_count() {
        let cfg = parse_smtp_line(" mail.io : 465 :  : secret ", "id".into());
        assert_eq!(cfg.host, "mail.io");
        assert!(!cfg.is_valid_format());
    }

    #[test]
    fn test_default_label_uses_user() {
        let cfg = parse_smtp_line("mail.io:465:bob:pw", "id".into());
        assert_eq!(cfg.label.as_deref(), Some("mail.io (bob)"));
        assert!(cfg.is_valid_format());
    }

    #[test]
    fn test_block_skips_blank_lines_and_numbers_ids() {
        let configs = parse_smtp_block("a.io:25:u:p\n\n   \nb.io:587\n");
        assert_eq!(configs.len(), 2);
        assert!(configs[0].id.starts_with("smtp-cfg-") && configs[0].id.ends_with("-0"));
        assert!(configs[1].id.ends_with("-1"));
        assert!(configs[0].is_valid_format());
        assert!(!configs[1].is_valid_format());
    }

    #[test]
    fn test_recheck_ignores_claimed_format() {
        let forged = SmtpConfiguration {
            id: "x".into(),
            host: "smtp.x.com".into(),
            port: "587".into(),
            user: "  ".into(),
            pass: String::new(),
            label: None,
            client_side_check: Some(FormatCheck::Valid),
        };
        assert!(!recheck(forged.clone()).is_valid_format());

        let unchecked = SmtpConfiguration {
            user: "u".into(),
            pass: "p".into(),
            client_side_check: None,
            ..forged
        };
        assert!(recheck(unchecked).is_valid_format());
    }

    #[test]
    fn test_unsaved_lines_skip_known_hosts() {
        let saved = parse_smtp_block("a.io:25:u:p");
        let block = "a.io:587:other:pw\n\n b.io :25:u:p\nc.io:25";
        assert_eq!(unsaved_lines(block, &saved), [" b.io :25:u:p", "c.io:25"]);
        assert!(unsaved_lines("a.io:25:u:p", &saved).is_empty());
    }

    #[test]
    fn test_save_all_replaces() {
        let mut store = SmtpConfigStore::new();
        store.save_all(parse_smtp_block("a.io:25:u:p\nb.io:25:u:p"));
        let first_id = store.all()[0].id.clone();
        store.save_all(vec![parse_smtp_line("c.io:25:u:p", "only".into())]);
        assert_eq!(store.len(), 1);
        assert!(store.find(&first_id).is_none());
        assert!(store.find("only").is_some());
    }

    #[test]
    fn test_report_message_mentions_invalid_entries() {
        let report = SmtpImportReport { processed: 3, saved: 2, invalid: 1 };
        assert!(report.message().contains("2 configurations with valid format saved"));
        assert!(report.message().contains("1 entries had an invalid format"));
        let clean = SmtpImportReport { processed: 1, saved: 1, invalid: 0 };
        assert!(!clean.message().contains("invalid"));
    }
}
