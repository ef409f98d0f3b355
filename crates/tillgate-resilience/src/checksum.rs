//! Canonical-JSON checksum computation and submission verification.
//!
//! A submission envelope and its embedded transaction each carry a
//! `payload_checksum` computed over a canonical byte encoding of their
//! fields. Canonicalization is a versioned wire contract shared with the
//! point-of-sale signers; any divergence breaks verification of payloads
//! already in flight, so the rules below are byte-exact and must not change
//! without bumping [`CHECKSUM_CONTRACT_VERSION`]:
//!
//! - objects serialize as `{"k":v,...}` with keys sorted lexicographically
//!   by Unicode code point, arrays as `[v,...]`, no whitespace
//! - strings are JSON-escaped, booleans and null use their JSON literals
//! - integers serialize without a decimal point; every other number is
//!   rendered with exactly [`CANONICAL_DECIMAL_PLACES`] decimal places
//! - the `payload_checksum` field of the object being hashed is excluded
//!   from its own hash input; a nested transaction's checksum field stays
//!   in when the parent envelope is hashed
//!
//! The digest is lowercase hex SHA-256 of the canonical UTF-8 bytes.
//! Verification never fails hard: mismatches come back as a structured
//! error list and the caller decides whether to reject.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Version of the canonical encoding rules in this module.
pub const CHECKSUM_CONTRACT_VERSION: u32 = 1;

/// Decimal places used for non-integer numbers in the canonical form.
pub const CANONICAL_DECIMAL_PLACES: usize = 2;

/// Field carrying an object's own checksum; excluded from its hash input.
pub const CHECKSUM_FIELD: &str = "payload_checksum";

/// Outcome of submission checksum verification.
///
/// An empty error list means both the transaction and the envelope checks
/// passed.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChecksumReport {
    /// Verification errors, in check order.
    pub errors: Vec<String>,
}

impl ChecksumReport {
    /// True when verification found no mismatches.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Computes the canonical checksum of a payload object.
///
/// The object's own [`CHECKSUM_FIELD`] is skipped; nested objects are
/// hashed in full, checksum fields included.
pub fn compute_checksum(payload: &Map<String, Value>) -> String {
    let mut canonical = String::new();
    canonicalize_object(payload, true, &mut canonical);

    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}

/// Verifies the checksums of a submission envelope.
///
/// Two independent checks: the embedded `transaction` object against its
/// claimed checksum, then the envelope itself (transaction checksum left
/// embedded) against the envelope's claimed checksum. Both must pass for
/// an empty error list.
pub fn validate_submission_checksums(envelope: &Value) -> ChecksumReport {
    let mut report = ChecksumReport::default();

    let Some(envelope_fields) = envelope.as_object() else {
        report.errors.push("submission envelope is not an object".to_string());
        return report;
    };

    match envelope_fields.get("transaction").and_then(Value::as_object) {
        Some(transaction) => {
            match transaction.get(CHECKSUM_FIELD).and_then(Value::as_str) {
                Some(claimed) if compute_checksum(transaction) == claimed => {},
                Some(_) => report.errors.push("transaction checksum mismatch".to_string()),
                None => report.errors.push("transaction checksum missing".to_string()),
            }
        },
        None => report.errors.push("transaction missing from submission".to_string()),
    }

    match envelope_fields.get(CHECKSUM_FIELD).and_then(Value::as_str) {
        Some(claimed) if compute_checksum(envelope_fields) == claimed => {},
        Some(_) => report.errors.push("submission checksum mismatch".to_string()),
        None => report.errors.push("submission checksum missing".to_string()),
    }

    report
}

fn canonicalize(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => canonicalize_number(number, out),
        Value::String(string) => escape_string(string, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                canonicalize(item, out);
            }
            out.push(']');
        },
        Value::Object(fields) => canonicalize_object(fields, false, out),
    }
}

fn canonicalize_object(fields: &Map<String, Value>, skip_checksum: bool, out: &mut String) {
    let mut keys: Vec<&String> = fields
        .keys()
        .filter(|key| !(skip_checksum && key.as_str() == CHECKSUM_FIELD))
        .collect();
    keys.sort_unstable();

    out.push('{');
    for (index, key) in keys.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        escape_string(key, out);
        out.push(':');
        canonicalize(&fields[key.as_str()], out);
    }
    out.push('}');
}

fn canonicalize_number(number: &serde_json::Number, out: &mut String) {
    if number.is_i64() || number.is_u64() {
        out.push_str(&number.to_string());
    } else {
        // Fixed precision keeps 10.5 and 10.50 byte-identical
        let value = number.as_f64().unwrap_or(0.0);
        out.push_str(&format!("{:.*}", CANONICAL_DECIMAL_PLACES, value));
    }
}

// RFC 8259 escaping, matching what standard JSON serializers emit.
fn escape_string(string: &str, out: &mut String) {
    out.push('"');
    for character in string.chars() {
        match character {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            control if (control as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", control as u32));
            },
            other => out.push(other),
        }
    }
    out.push('"');
}
