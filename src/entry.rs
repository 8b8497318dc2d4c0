//! User-facing audit log entries.
//!
//! An [`AuditLogEntry`] is the structured projection of one audited action.
//! It is created once by the projector and never modified afterwards; the
//! serialized form is what snapshot files carry, one JSON object per line.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditResult {
    /// Operation succeeded
    Success,
    /// Operation failed
    Failure,
}

impl AuditResult {
    /// Interprets the trail's `res=` value.
    ///
    /// Returns `None` for anything other than the spellings the audit
    /// subsystem uses for the two outcomes.
    pub fn from_trail(value: &str) -> Option<Self> {
        match value {
            "success" | "yes" | "1" => Some(AuditResult::Success),
            "failed" | "failure" | "fail" | "no" | "0" => Some(AuditResult::Failure),
            _ => None,
        }
    }

    /// Spelling written back into the trail.
    pub fn as_trail_str(&self) -> &'static str {
        match self {
            AuditResult::Success => "success",
            AuditResult::Failure => "failed",
        }
    }
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditResult::Success => write!(f, "success"),
            AuditResult::Failure => write!(f, "failure"),
        }
    }
}

/// A parsed, read-only audit log entry.
///
/// # Example
///
/// ```
/// use auditlog_core::{AuditLogEntry, AuditResult};
///
/// let entry = AuditLogEntry::new("set-hostname", AuditResult::Success, 1_700_000_000_123)
///     .with_username("root")
///     .with_address("10.0.0.7")
///     .with_hostname("bmc-01")
///     .with_message_args(vec!["bmc-02".to_string()]);
///
/// assert_eq!(entry.operation(), "set-hostname");
/// assert_eq!(entry.event_timestamp(), 1_700_000_000_123);
/// assert_eq!(entry.message_args(), ["bmc-02"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditLogEntry {
    operation: String,
    username: String,
    address: String,
    hostname: String,
    result: AuditResult,
    detail: String,
    /// Milliseconds since the Unix epoch
    event_timestamp: u64,
    #[serde(default)]
    message_args: Vec<String>,
}

impl AuditLogEntry {
    /// Creates an entry with the required attributes; the rest start empty.
    pub fn new(operation: impl Into<String>, result: AuditResult, event_timestamp: u64) -> Self {
        Self {
            operation: operation.into(),
            username: String::new(),
            address: String::new(),
            hostname: String::new(),
            result,
            detail: String::new(),
            event_timestamp,
            message_args: Vec::new(),
        }
    }

    /// Sets the acting user.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Sets the source address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Sets the hostname.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the free-form detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Sets the message arguments.
    pub fn with_message_args(mut self, args: Vec<String>) -> Self {
        self.message_args = args;
        self
    }

    /// Returns the operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the source address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the hostname.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the outcome.
    pub fn result(&self) -> AuditResult {
        self.result
    }

    /// Returns the free-form detail.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Returns the event time in milliseconds since the Unix epoch.
    pub fn event_timestamp(&self) -> u64 {
        self.event_timestamp
    }

    /// Returns the message arguments in trail order.
    pub fn message_args(&self) -> &[String] {
        &self.message_args
    }
}

impl fmt::Display for AuditLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AuditLogEntry[op={}, result={}, ts={}, user={}",
            self.operation, self.result, self.event_timestamp, self.username
        )?;
        if !self.address.is_empty() {
            write!(f, ", addr={}", self.address)?;
        }
        if !self.hostname.is_empty() {
            write!(f, ", host={}", self.hostname)?;
        }
        if !self.message_args.is_empty() {
            write!(f, ", args={}", self.message_args.len())?;
        }
        write!(f, "]")
    }
}
