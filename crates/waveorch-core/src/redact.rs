//! Secret and PII redaction
//!
//! Everything an agent produces may contain credentials, so all agent-originated
//! text goes through [`redact`] (or [`redact_value`] for structured data) before it
//! is logged or persisted.
//!
//! Rules run in a fixed order. JWTs and bearer headers are handled before the
//! vendor key and generic `key=value` rules so a token is masked exactly once.
//!
//! No rule is anchored on its surroundings: a secret glued to the previous word
//! is still a secret. A marker keeps at most the original leading characters of
//! the match and continues with `*`, which no rule accepts, so redacting
//! already-redacted text is a no-op.

use regex::{Captures, NoExpand, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Marker used for whole-value and generic redactions
pub const REDACTED: &str = "***REDACTED***";

/// Field names whose values are always masked wholesale (substring, case-insensitive)
const SENSITIVE_KEYWORDS: &[&str] = &[
    "key",
    "token",
    "secret",
    "password",
    "credential",
    "auth",
    "api_key",
    "apikey",
    "access_token",
];

enum Mask {
    /// Replace the whole match with a constant
    Fixed(&'static str),
    /// Regex replacement template (`${1}` etc.)
    Template(&'static str),
    /// Keep the first N characters of the match, then append a marker
    KeepPrefix(usize, &'static str),
}

struct Rule {
    pattern: Regex,
    mask: Mask,
}

impl Rule {
    fn new(pattern: &str, mask: Mask) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("redaction pattern must compile"),
            mask,
        }
    }

    fn apply(&self, text: &str) -> String {
        match self.mask {
            Mask::Fixed(marker) => self.pattern.replace_all(text, NoExpand(marker)).into_owned(),
            Mask::Template(template) => self.pattern.replace_all(text, template).into_owned(),
            Mask::KeepPrefix(len, marker) => self
                .pattern
                .replace_all(text, |caps: &Captures| {
                    let prefix: String = caps[0].chars().take(len).collect();
                    format!("{prefix}{marker}")
                })
                .into_owned(),
        }
    }
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            // JWT: three base64url segments, masked wholesale so no claims leak
            Rule::new(
                r"eyJ[A-Za-z0-9_-]+\.eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+",
                Mask::Fixed("***REDACTED_JWT***"),
            ),
            // Bearer / Authorization header values
            Rule::new(
                r#"(?i)(bearer|authorization)(["\s:=]+['"]?)([A-Za-z0-9_.~+/-]{16,}=*)"#,
                Mask::Template("${1}${2}***REDACTED_TOKEN***"),
            ),
            // Anthropic before OpenAI: both start with `sk-`
            Rule::new(
                r"sk-ant-[A-Za-z0-9-]{20,}",
                Mask::Fixed("sk-ant-***REDACTED***"),
            ),
            Rule::new(
                r"sk-(?:proj-)?[A-Za-z0-9_-]{20,}",
                Mask::Fixed("sk-***REDACTED***"),
            ),
            // AWS access key id and secret access key
            Rule::new(r"AKIA[0-9A-Z]{16}", Mask::Fixed("AKIA***REDACTED***")),
            Rule::new(
                r#"(?i)(aws_secret_access_key|aws_secret)(["\s:=]+['"]?)([A-Za-z0-9/+=]{40})"#,
                Mask::Template("${1}${2}***REDACTED***"),
            ),
            // Source control and chat platform tokens
            Rule::new(r"gh[pousr]_[A-Za-z0-9_]{36,}", Mask::KeepPrefix(4, REDACTED)),
            Rule::new(r"gl(?:pat|ptt)-[A-Za-z0-9_-]{20,}", Mask::KeepPrefix(6, REDACTED)),
            Rule::new(r"xox[bpas]-[A-Za-z0-9-]{10,}", Mask::KeepPrefix(5, REDACTED)),
            // Generic key=value credentials
            Rule::new(
                r#"(?i)(api[_-]?key|token|secret|password|credential)(["\s:=]+['"]?)([A-Za-z0-9_-]{16,})"#,
                Mask::Template("${1}${2}***REDACTED***"),
            ),
            Rule::new(
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
                Mask::Fixed("***@***.***"),
            ),
            // International numbers first so the domestic rule never sees their digits
            Rule::new(
                r"\+[0-9]{1,3}(?:[-. ]?[0-9]{2,4}){2,3}(?:[-. ]?[0-9]{1,4})?",
                Mask::KeepPrefix(3, REDACTED),
            ),
            Rule::new(r"1[3-9][0-9]{9}", Mask::KeepPrefix(3, "********")),
        ]
    })
}

/// Mask every recognizable secret or PII substring in `input`
pub fn redact(input: &str) -> String {
    rules()
        .iter()
        .fold(input.to_string(), |text, rule| rule.apply(&text))
}

/// True when a field name suggests its value is a credential
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Redact arbitrary structured data
///
/// Strings are passed through [`redact`]; values under sensitive field names are
/// replaced wholesale, whatever their shape.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact(s)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(fields) => {
            let redacted: Map<String, Value> = fields
                .iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_value(v)
                    };
                    (k.clone(), v)
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
    }
}

/// Redact any serializable value, returning a JSON-friendly structure
///
/// Values that cannot be represented as JSON fall back to their redacted
/// `Debug` text.
pub fn redact_any<T: Serialize + std::fmt::Debug + ?Sized>(input: &T) -> Value {
    match serde_json::to_value(input) {
        Ok(value) => redact_value(&value),
        Err(_) => Value::String(redact(&format!("{:?}", input))),
    }
}

/// Redact a flat string map: sensitive keys lose their value, the rest are pattern-redacted
pub fn redact_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| {
            let v = if is_sensitive_key(k) {
                REDACTED.to_string()
            } else {
                redact(v)
            };
            (k.clone(), v)
        })
        .collect()
}
