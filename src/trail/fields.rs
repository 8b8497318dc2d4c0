//! Field-level decoding of record bodies.
//!
//! Bodies are whitespace separated `name=value` tokens. Values are bare,
//! `"double quoted"` or `'single quoted'`; user-space records nest their
//! payload inside `msg='...'`, which is flattened into the surrounding
//! field list. The audit subsystem hex-encodes values that contain spaces
//! or quotes, so bare upper-case hex in an encoded field is decoded.

/// One `name=value` pair of a record.
///
/// Either side may be missing when the token was malformed or the audit
/// subsystem wrote a placeholder (`?`, `(null)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: Option<String>,
    value: Option<String>,
}

impl Field {
    /// Creates a field.
    pub fn new(name: Option<String>, value: Option<String>) -> Self {
        Self { name, value }
    }

    fn from_parts(name: &str, value: Option<String>) -> Self {
        let name = (!name.is_empty()).then(|| name.to_string());
        Self { name, value }
    }

    /// Returns the field name, if known.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the decoded value, if present.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Splits a record body into fields.
pub fn split_fields(body: &str) -> Vec<Field> {
    let mut fields = Vec::new();
    scan_into(body, &mut fields);
    fields
}

fn scan_into(mut rest: &str, out: &mut Vec<Field>) {
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return;
        }

        let name_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        rest = &rest[name_end..];

        let Some(value) = rest.strip_prefix('=') else {
            out.push(Field::from_parts(name, None));
            continue;
        };

        if let Some(quoted) = value.strip_prefix('\'') {
            let Some(end) = quoted.find('\'') else {
                out.push(Field::from_parts(name, None));
                return;
            };
            let inner = &quoted[..end];
            if name == "msg" {
                scan_into(inner, out);
            } else {
                out.push(Field::from_parts(name, Some(inner.to_string())));
            }
            rest = &quoted[end + 1..];
        } else if let Some(quoted) = value.strip_prefix('"') {
            let Some(end) = quoted.find('"') else {
                out.push(Field::from_parts(name, None));
                return;
            };
            out.push(Field::from_parts(name, Some(quoted[..end].to_string())));
            rest = &quoted[end + 1..];
        } else {
            let end = value.find(char::is_whitespace).unwrap_or(value.len());
            out.push(Field::from_parts(name, decode_bare(name, &value[..end])));
            rest = &value[end..];
        }
    }
}

fn decode_bare(name: &str, raw: &str) -> Option<String> {
    if raw.is_empty() || raw == "?" || raw == "(null)" {
        return None;
    }
    if is_encoded_field(name) {
        if let Some(decoded) = decode_hex(raw) {
            return Some(decoded);
        }
    }
    Some(raw.to_string())
}

/// Whether the audit subsystem may hex-encode this field.
pub(crate) fn is_encoded_field(name: &str) -> bool {
    match name {
        "op" | "acct" | "hostname" | "addr" | "detail" | "exe" | "cmd" => true,
        _ => is_arg_field(name).is_some(),
    }
}

/// Index of an `a<N>` argument field.
pub(crate) fn is_arg_field(name: &str) -> Option<usize> {
    let digits = name.strip_prefix('a')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn decode_hex(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    if bytes.len() < 2
        || bytes.len() % 2 != 0
        || !bytes
            .iter()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(b))
    {
        return None;
    }

    let decoded = bytes
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            u8::try_from(hi * 16 + lo).ok()
        })
        .collect::<Option<Vec<u8>>>()?;

    let text = String::from_utf8(decoded).ok()?;
    if text.chars().any(|c| c.is_control() && c != '\t' && c != '\n') {
        return None;
    }
    Some(text)
}

/// Renders a value the way the trail writer stores it.
///
/// Safe values are double-quoted; anything containing whitespace, quotes or
/// control characters is written as upper-case hex. Empty values become `?`.
pub(crate) fn encode_value(value: &str) -> String {
    if value.is_empty() {
        return "?".to_string();
    }
    let needs_hex = value
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '"' || c == '\'');
    if needs_hex {
        value.bytes().map(|b| format!("{:02X}", b)).collect()
    } else {
        format!("\"{}\"", value)
    }
}
