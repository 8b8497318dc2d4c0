//! Raw trail records.

/// One raw record as read from the trail.
///
/// Only the header (`type=... msg=audit(<stamp>:<serial>):`) is decoded at
/// this layer, because grouping records into events needs the serial. The
/// field body is left as text for the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    type_tag: String,
    stamp: String,
    serial: u64,
    text: String,
    body_offset: usize,
}

impl RawRecord {
    /// Builds a record in the canonical text form.
    ///
    /// ```
    /// use auditlog_core::trail::RawRecord;
    ///
    /// let record = RawRecord::new("USYS_CONFIG", "1700000000.250", 10, "op=reboot res=success");
    /// assert_eq!(record.serial(), 10);
    /// assert_eq!(record.body(), "op=reboot res=success");
    /// ```
    pub fn new(
        type_tag: impl Into<String>,
        stamp: impl Into<String>,
        serial: u64,
        body: &str,
    ) -> Self {
        let type_tag = type_tag.into();
        let stamp = stamp.into();
        let head = format!("type={} msg=audit({}:{}): ", type_tag, stamp, serial);
        let body_offset = head.len();
        Self {
            type_tag,
            stamp,
            serial,
            text: head + body,
            body_offset,
        }
    }

    /// Parses one line of the text trail.
    ///
    /// The error is a human readable reason; the caller attaches the line
    /// number.
    pub fn parse(line: &str) -> Result<Self, String> {
        let rest = line
            .trim_start()
            .strip_prefix("type=")
            .ok_or_else(|| "record does not start with 'type='".to_string())?;

        let tag_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let type_tag = &rest[..tag_end];
        if type_tag.is_empty() {
            return Err("empty record type".to_string());
        }

        let rest = rest[tag_end..]
            .trim_start()
            .strip_prefix("msg=audit(")
            .ok_or_else(|| "missing 'msg=audit(' header".to_string())?;

        let close = rest
            .find(')')
            .ok_or_else(|| "unterminated audit header".to_string())?;
        let (stamp, serial) = rest[..close]
            .rsplit_once(':')
            .ok_or_else(|| "audit header has no serial".to_string())?;
        let serial = serial
            .parse::<u64>()
            .map_err(|_| format!("bad serial '{}'", serial))?;

        let after = &rest[close + 1..];
        let after = after.strip_prefix(':').unwrap_or(after).trim_start();
        let body_offset = line.len() - after.len();

        Ok(Self {
            type_tag: type_tag.to_string(),
            stamp: stamp.to_string(),
            serial,
            text: line.to_string(),
            body_offset,
        })
    }

    /// Returns the record type tag, e.g. `USYS_CONFIG`.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Returns the undecoded `<secs>.<millis>` stamp.
    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    /// Returns the event serial number.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Returns the full record text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the field portion following the header.
    pub fn body(&self) -> &str {
        &self.text[self.body_offset..]
    }
}
