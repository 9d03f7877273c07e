//! Unverified claims decoding for bearer credentials
//!
//! Credentials are compact `header.claims.signature` strings. Only the
//! claims segment is read here, for local expiry decisions; the signature
//! is the server's business.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde_json::{Map, Value};

/// URL-safe alphabet, accepting the segment with or without `=` padding.
/// Standard-alphabet digits are mapped onto it before decoding.
const CLAIMS_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claims read out of a credential's middle segment.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClaims {
    /// `sub` claim (empty when the credential carries none)
    pub subject: String,
    /// `exp` claim, epoch seconds
    pub expires_at: Option<i64>,
    /// `role` claim
    pub role: Option<String>,
    /// Every other claim, untouched
    pub extra: Map<String, Value>,
}

/// Result of decoding a credential.
#[derive(Debug, Clone, PartialEq)]
pub enum Claims {
    Decoded(DecodedClaims),
    Undecodable,
}

impl Claims {
    pub fn decoded(&self) -> Option<&DecodedClaims> {
        match self {
            Claims::Decoded(claims) => Some(claims),
            Claims::Undecodable => None,
        }
    }

    /// Expiry claim, if the credential decoded and carries one.
    pub fn expires_at(&self) -> Option<i64> {
        self.decoded().and_then(|c| c.expires_at)
    }
}

/// Decode the claims of a credential. Never fails loudly: anything that is
/// not three segments with a base64 JSON object in the middle is
/// [`Claims::Undecodable`].
pub fn decode(credential: &str) -> Claims {
    let parts: Vec<&str> = credential.split('.').collect();
    if parts.len() != 3 {
        return Claims::Undecodable;
    }

    let segment: String = parts[1]
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();
    let bytes = match CLAIMS_ENGINE.decode(segment) {
        Ok(bytes) => bytes,
        Err(_) => return Claims::Undecodable,
    };

    let mut object = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => map,
        _ => return Claims::Undecodable,
    };

    let subject = match object.remove("sub") {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let expires_at = object.remove("exp").and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        _ => None,
    });
    let role = match object.remove("role") {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };

    Claims::Decoded(DecodedClaims {
        subject,
        expires_at,
        role,
        extra: object,
    })
}

/// Build an unsigned credential carrying `claims`. Test helper.
#[cfg(test)]
pub(crate) fn encode_unsigned(claims: &Value) -> String {
    let header = CLAIMS_ENGINE.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = CLAIMS_ENGINE.encode(claims.to_string());
    format!("{}.{}.sig", header, body)
}
