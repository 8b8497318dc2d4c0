//! Projection of assembled events into [`AuditLogEntry`] values.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::assembler::AuditEvent;
use crate::entry::{AuditLogEntry, AuditResult};
use crate::error::FieldError;
use crate::trail::is_arg_field;

/// Event types tracked when no explicit set is configured.
pub const DEFAULT_TRACKED_TYPES: [&str; 3] = ["USYS_CONFIG", "USER_LOGIN", "USER_LOGOUT"];

/// Maps events to entries.
///
/// Field mapping:
///
/// | trail field | entry attribute |
/// |-------------|-----------------|
/// | `op`        | operation       |
/// | `acct` (else `user`) | username |
/// | `addr`      | address         |
/// | `hostname`  | hostname        |
/// | `res`       | result          |
/// | `detail`    | detail          |
/// | `a0`..`aN`  | message args, by index |
///
/// The first occurrence of a field across the event's records wins. Other
/// fields stay in the records' raw text only.
#[derive(Debug, Clone)]
pub struct EntryProjector {
    tracked: BTreeSet<String>,
}

impl EntryProjector {
    /// Creates a projector for the given event type tags.
    pub fn new<I, T>(tracked: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tracked: tracked.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if events of this type are projected.
    pub fn tracks(&self, type_tag: &str) -> bool {
        self.tracked.contains(type_tag)
    }

    /// Projects one event.
    ///
    /// Returns `Ok(None)` for untracked event types.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] when the timestamp or result cannot be
    /// interpreted. The caller drops the event and carries on.
    pub fn project(&self, event: &AuditEvent) -> Result<Option<AuditLogEntry>, FieldError> {
        if !self.tracks(event.type_tag()) {
            return Ok(None);
        }

        let timestamp = parse_stamp(event.stamp())?;
        let result_text = event.field("res").unwrap_or_default();
        let result = AuditResult::from_trail(result_text)
            .ok_or_else(|| FieldError::Result(result_text.to_string()))?;

        let text = |name: &str| event.field(name).unwrap_or_default().to_string();
        let username = event
            .field("acct")
            .or_else(|| event.field("user"))
            .unwrap_or_default();

        let entry = AuditLogEntry::new(text("op"), result, timestamp)
            .with_username(username)
            .with_address(text("addr"))
            .with_hostname(text("hostname"))
            .with_detail(text("detail"))
            .with_message_args(message_args(event));

        Ok(Some(entry))
    }
}

impl Default for EntryProjector {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKED_TYPES)
    }
}

fn message_args(event: &AuditEvent) -> Vec<String> {
    let mut args = BTreeMap::new();
    for field in event.fields() {
        let Some(index) = field.name().and_then(is_arg_field) else {
            continue;
        };
        args.entry(index)
            .or_insert_with(|| field.value().unwrap_or_default().to_string());
    }
    args.into_values().collect()
}

/// Converts `<secs>[.<millis>]` into milliseconds since the epoch.
fn parse_stamp(stamp: &str) -> Result<u64, FieldError> {
    let bad = || FieldError::Timestamp(stamp.to_string());

    let (secs, millis) = match stamp.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (stamp, "0"),
    };
    if millis.is_empty() || millis.len() > 3 || !millis.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }

    let secs: u64 = secs.parse().map_err(|_| bad())?;
    let scale = 10u64.pow(3 - millis.len() as u32);
    let millis: u64 = millis.parse::<u64>().map_err(|_| bad())? * scale;

    secs.checked_mul(1000)
        .and_then(|ms| ms.checked_add(millis))
        .ok_or_else(bad)
}
