//! Compile request payloads
//!
//! The body is parsed strictly as JSON first. When that fails on a syntax
//! error, a bounded recovery pass pulls the `filename` and `code` string
//! fields out of the raw text so clients that forget to escape newlines in
//! their source still get a compile.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// A validated compile request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    /// Requested source filename, before sanitising
    pub filename: Option<String>,
    /// Contract source text, non-empty after trimming
    pub code: String,
}

/// Payload rejection; always a 400
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Expected Content-Type application/json")]
    UnsupportedContentType,

    #[error("Invalid request body. Expected JSON with {{ filename, code }}.")]
    NotAnObject,

    #[error("Invalid request body: {0}")]
    Malformed(String),

    #[error("Field 'code' must be a non-empty string")]
    MissingCode,
}

impl CompileRequest {
    pub fn new(filename: Option<String>, code: impl Into<String>) -> Result<Self, PayloadError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(PayloadError::MissingCode);
        }
        Ok(Self {
            filename: filename.filter(|name| !name.is_empty()),
            code,
        })
    }

    /// Build from an already-parsed JSON value.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, PayloadError> {
        let object = value.as_object().ok_or(PayloadError::NotAnObject)?;
        let code = match object.get("code") {
            Some(serde_json::Value::String(code)) => code.clone(),
            _ => return Err(PayloadError::MissingCode),
        };
        // A non-string filename is ignored rather than rejected.
        let filename = object
            .get("filename")
            .and_then(|name| name.as_str())
            .map(str::to_string);
        Self::new(filename, code)
    }
}

/// Returns true for `application/json` and `application/*+json` media types.
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

/// Parse a request body into a [`CompileRequest`].
pub fn parse_payload(content_type: Option<&str>, body: &[u8]) -> Result<CompileRequest, PayloadError> {
    match content_type {
        Some(content_type) if is_json_content_type(content_type) => {}
        _ => return Err(PayloadError::UnsupportedContentType),
    }

    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => CompileRequest::from_value(&value),
        Err(err) if err.is_syntax() || err.is_eof() => {
            let text = String::from_utf8_lossy(body);
            match recover_fields(&text) {
                Some(request) => {
                    tracing::debug!(error = %err, "recovered compile payload from malformed JSON");
                    request
                }
                None => Err(PayloadError::Malformed(err.to_string())),
            }
        }
        Err(err) => Err(PayloadError::Malformed(err.to_string())),
    }
}

static STRING_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(filename|code)"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("static regex")
});

/// Best-effort extraction of `filename` and `code` from text that is not
/// valid JSON.
///
/// Grammar: an object whose interesting members are `"name": "<string>"`
/// pairs. String bodies follow JSON escaping, except that raw control
/// characters (unescaped newlines, tabs) are tolerated. Returns `None` when
/// no `code` field can be recovered, and `Some(Err(..))` when one was found
/// but is blank.
pub fn recover_fields(text: &str) -> Option<Result<CompileRequest, PayloadError>> {
    let mut filename = None;
    let mut code = None;

    for captures in STRING_FIELD.captures_iter(text) {
        let value = match decode_json_string(&captures[2]) {
            Some(value) => value,
            None => continue,
        };
        match &captures[1] {
            "filename" if filename.is_none() => filename = Some(value),
            "code" if code.is_none() => code = Some(value),
            _ => {}
        }
    }

    code.map(|code| CompileRequest::new(filename, code))
}

fn decode_json_string(raw: &str) -> Option<String> {
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for ch in raw.chars() {
        match ch {
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if (c as u32) < 0x20 => quoted.push_str(&format!("\\u{:04x}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    serde_json::from_str(&quoted).ok()
}

/// Reduce a client-supplied filename to a single path segment.
///
/// Both `/` and `\` count as separators so a Windows-style traversal is
/// caught on unix hosts too. Falls back to `default` when nothing usable
/// remains.
pub fn sanitize_filename(name: &str, default: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match base {
        "" | "." | ".." => default.to_string(),
        other if other.contains('\0') => default.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: Option<&str> = Some("application/json");

    #[test]
    fn parses_well_formed_payload() {
        let body = br#"{"filename":"counter.algo.ts","code":"export class A {}"}"#;
        let request = parse_payload(JSON, body).unwrap();
        assert_eq!(request.filename.as_deref(), Some("counter.algo.ts"));
        assert_eq!(request.code, "export class A {}");
    }

    #[test]
    fn filename_is_optional() {
        let request = parse_payload(JSON, br#"{"code":"x"}"#).unwrap();
        assert!(request.filename.is_none());
    }

    #[test]
    fn non_string_filename_is_ignored() {
        let request = parse_payload(JSON, br#"{"filename":42,"code":"x"}"#).unwrap();
        assert!(request.filename.is_none());
    }

    #[test]
    fn rejects_blank_missing_or_non_string_code() {
        for body in [
            &br#"{"code":""}"#[..],
            br#"{"code":"   \n\t"}"#,
            br#"{"filename":"a.algo.ts"}"#,
            br#"{"code":7}"#,
        ] {
            assert_eq!(parse_payload(JSON, body), Err(PayloadError::MissingCode));
        }
    }

    #[test]
    fn rejects_non_object_json() {
        assert_eq!(parse_payload(JSON, b"[1,2]"), Err(PayloadError::NotAnObject));
        assert_eq!(parse_payload(JSON, br#""code""#), Err(PayloadError::NotAnObject));
    }

    #[test]
    fn rejects_non_json_content_type() {
        assert_eq!(
            parse_payload(Some("text/plain"), br#"{"code":"x"}"#),
            Err(PayloadError::UnsupportedContentType)
        );
        assert_eq!(
            parse_payload(None, br#"{"code":"x"}"#),
            Err(PayloadError::UnsupportedContentType)
        );
    }

    #[test]
    fn accepts_json_content_type_variants() {
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("Application/JSON"));
        assert!(is_json_content_type("application/vnd.api+json"));
        assert!(!is_json_content_type("text/json-ish"));
    }

    #[test]
    fn recovers_code_with_raw_newlines() {
        let body = "{\"filename\": \"a.algo.ts\", \"code\": \"line one\nline two\"}";
        let request = parse_payload(JSON, body.as_bytes()).unwrap();
        assert_eq!(request.filename.as_deref(), Some("a.algo.ts"));
        assert_eq!(request.code, "line one\nline two");
    }

    #[test]
    fn recovers_escaped_quotes_and_backslashes() {
        // Trailing comma makes this invalid JSON.
        let body = r#"{"code": "key: 'a', s = \"q\" + \\path\\", }"#;
        let request = parse_payload(JSON, body.as_bytes()).unwrap();
        assert_eq!(request.code, r#"key: 'a', s = "q" + \path\"#);
    }

    #[test]
    fn recovery_without_code_is_malformed() {
        let result = parse_payload(JSON, br#"{"filename": "a.algo.ts""#);
        assert!(matches!(result, Err(PayloadError::Malformed(_))));
    }

    #[test]
    fn recovered_blank_code_is_rejected() {
        let result = parse_payload(JSON, b"{\"code\": \"  \n \",}");
        assert_eq!(result, Err(PayloadError::MissingCode));
    }

    #[test]
    fn sanitize_strips_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd", "c.algo.ts"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\win.algo.ts", "c.algo.ts"), "win.algo.ts");
        assert_eq!(sanitize_filename("/abs/path/x.algo.ts", "c.algo.ts"), "x.algo.ts");
        assert_eq!(sanitize_filename("plain.algo.ts", "c.algo.ts"), "plain.algo.ts");
    }

    #[test]
    fn sanitize_falls_back_to_default() {
        assert_eq!(sanitize_filename("", "c.algo.ts"), "c.algo.ts");
        assert_eq!(sanitize_filename("dir/", "c.algo.ts"), "c.algo.ts");
        assert_eq!(sanitize_filename("..", "c.algo.ts"), "c.algo.ts");
        assert_eq!(sanitize_filename("a/..", "c.algo.ts"), "c.algo.ts");
    }
}
