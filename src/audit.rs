//! Append-only audit log
//!
//! One line per operation: `<ISO> <ACTION>[ <chunkId>][ <details>]`, where
//! details are either a bare string or a single-line JSON object. The log is
//! advisory: by the time an entry is appended the operation has already been
//! committed to storage, so append failures are reported and swallowed, never
//! propagated to the caller.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::chunk::is_chunk_id;
use crate::constants::AUDIT_LOG_FILE;
use crate::errors::Result;

/// Operations recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Store,
    Update,
    Query,
    Retrieve,
    Relevant,
    Obsolete,
    Init,
    Reload,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "STORE",
            Self::Update => "UPDATE",
            Self::Query => "QUERY",
            Self::Retrieve => "RETRIEVE",
            Self::Relevant => "RELEVANT",
            Self::Obsolete => "OBSOLETE",
            Self::Init => "INIT",
            Self::Reload => "RELOAD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STORE" => Some(Self::Store),
            "UPDATE" => Some(Self::Update),
            "QUERY" => Some(Self::Query),
            "RETRIEVE" => Some(Self::Retrieve),
            "RELEVANT" => Some(Self::Relevant),
            "OBSOLETE" => Some(Self::Obsolete),
            "INIT" => Some(Self::Init),
            "RELOAD" => Some(Self::Reload),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detail payload of an audit entry
#[derive(Debug, Clone)]
pub enum AuditDetail {
    Text(String),
    Object(serde_json::Value),
}

impl fmt::Display for AuditDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Object(v) => f.write_str(&v.to_string()),
        }
    }
}

impl From<&str> for AuditDetail {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AuditDetail {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<serde_json::Value> for AuditDetail {
    fn from(v: serde_json::Value) -> Self {
        Self::Object(v)
    }
}

/// A parsed audit log line
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub chunk_id: Option<String>,
    pub details: Option<String>,
}

/// Append-only log over a single file
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(AUDIT_LOG_FILE),
        }
    }

    /// Ensure the log file and its parent directory exist
    pub fn initialize(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(())
    }

    /// Append one entry; failures are reported and swallowed
    pub fn log(
        &self,
        action: AuditAction,
        chunk_id: Option<&str>,
        details: Option<AuditDetail>,
    ) {
        let mut line = format!(
            "{} {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            action
        );
        if let Some(id) = chunk_id {
            line.push(' ');
            line.push_str(id);
        }
        if let Some(details) = details {
            line.push(' ');
            // Entries are line-delimited; flatten any embedded newlines
            line.push_str(&details.to_string().replace('\n', " "));
        }
        line.push('\n');

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!(%e, action = %action, "audit log append failed");
        }
    }

    /// Raw log text, optionally filtered to entries at or after `since`
    pub fn read_since(&self, since: Option<DateTime<Utc>>) -> Result<String> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(String::new()),
            Err(e) => return Err(e.into()),
        };
        let Some(since) = since else {
            return Ok(text);
        };

        let mut filtered = String::with_capacity(text.len());
        for line in text.lines() {
            let Some(first) = line.split(' ').next() else { continue };
            let Ok(ts) = DateTime::parse_from_rfc3339(first) else {
                continue;
            };
            if ts.with_timezone(&Utc) >= since {
                filtered.push_str(line);
                filtered.push('\n');
            }
        }
        Ok(filtered)
    }

    /// Parsed entries, optionally filtered like [`read_since`](Self::read_since)
    pub fn entries(&self, since: Option<DateTime<Utc>>) -> Result<Vec<AuditEntry>> {
        let text = self.read_since(since)?;
        let mut entries = Vec::new();
        for line in text.lines() {
            let mut tokens = line.split(' ');
            let Some(ts) = tokens
                .next()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            else {
                continue;
            };
            let Some(action) = tokens.next().and_then(AuditAction::parse) else {
                continue;
            };

            let mut rest: Vec<&str> = tokens.collect();
            let chunk_id = match rest.first() {
                Some(first) if is_chunk_id(first) => Some(rest.remove(0).to_string()),
                _ => None,
            };
            let details = if rest.is_empty() {
                None
            } else {
                Some(rest.join(" "))
            };

            entries.push(AuditEntry {
                timestamp: ts.with_timezone(&Utc),
                action,
                chunk_id,
                details,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_log() -> (AuditLog, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let log = AuditLog::new(dir.path());
        log.initialize().expect("initialize");
        (log, dir)
    }

    #[test]
    fn test_log_and_read_back() {
        let (log, _dir) = test_log();
        log.log(AuditAction::Store, Some("a1b2c3"), Some("stored".into()));
        log.log(AuditAction::Init, None, Some("loaded 0 chunks".into()));

        let text = log.read_since(None).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("STORE a1b2c3 stored"));
        assert!(lines[1].contains("INIT loaded 0 chunks"));
    }

    #[test]
    fn test_object_details_single_line() {
        let (log, _dir) = test_log();
        log.log(
            AuditAction::Query,
            None,
            Some(json!({"query": "hello\nworld", "ids": ["a1b2c3"]}).into()),
        );
        let text = log.read_since(None).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains(r#""ids":["a1b2c3"]"#));
    }

    #[test]
    fn test_read_since_filters() {
        let (log, _dir) = test_log();
        log.log(AuditAction::Store, Some("aaaaaa"), None);
        let cutoff = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        log.log(AuditAction::Update, Some("bbbbbb"), None);

        let text = log.read_since(Some(cutoff)).unwrap();
        assert!(!text.contains("aaaaaa"));
        assert!(text.contains("bbbbbb"));
    }

    #[test]
    fn test_entries_parse_chunk_id_and_details() {
        let (log, _dir) = test_log();
        log.log(
            AuditAction::Obsolete,
            Some("a1b2c3"),
            Some("superseded by xyz".into()),
        );
        log.log(AuditAction::Retrieve, None, Some("aaaaaa,bbbbbb".into()));

        let entries = log.entries(None).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].action, AuditAction::Obsolete);
        assert_eq!(entries[0].chunk_id.as_deref(), Some("a1b2c3"));
        assert_eq!(entries[0].details.as_deref(), Some("superseded by xyz"));

        // A non-hex first token stays in details
        assert_eq!(entries[1].action, AuditAction::Retrieve);
        assert_eq!(entries[1].chunk_id, None);
        assert_eq!(entries[1].details.as_deref(), Some("aaaaaa,bbbbbb"));
    }

    #[test]
    fn test_append_failure_does_not_panic() {
        let dir = TempDir::new().unwrap();
        // Point at a path whose parent does not exist; append will fail
        let log = AuditLog {
            path: dir.path().join("missing/sub/audit.log"),
        };
        log.log(AuditAction::Store, Some("a1b2c3"), None);
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path());
        assert_eq!(log.read_since(None).unwrap(), "");
    }
}
