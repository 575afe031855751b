// validator/jwt.rs - Verification of the student-built step 2 token
//
// Segments are decoded leniently (padding and the standard alphabet are
// accepted) but the HMAC check is real: the signature must be HS256 over the
// exact `header.payload` text, keyed with the user id.

use jsonwebtoken::{crypto, Algorithm, DecodingKey};
use serde_json::Value;
use thiserror::Error;

use crate::puzzle::cipher::{base64_url, decode_segment};
use crate::puzzle::STEP2_COMPLETION_MARKER;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenRejection {
    #[error("a JWT has exactly three dot-separated parts, found {0}")]
    Shape(usize),

    #[error("the {0} segment is not valid Base64url-encoded JSON")]
    Encoding(&'static str),

    #[error("the header must declare alg HS256")]
    Algorithm,

    #[error("the payload must set challenge and completion_status to \"step2-complete\"")]
    Markers,

    #[error("the signature does not verify with HMAC-SHA256 under your user id")]
    Signature,
}

/// Check a student token and return its decoded payload when it is accepted
pub fn verify_student_token(token: &str, secret: &str) -> Result<Value, TokenRejection> {
    let token = token.trim();
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenRejection::Shape(parts.len()));
    }

    // Read alg loosely so "none" or a missing alg is reported as the algorithm
    let header: Value = decode_json_segment(parts[0], "header")?;
    if !header.is_object() {
        return Err(TokenRejection::Encoding("header"));
    }
    if header.get("alg").and_then(Value::as_str) != Some("HS256") {
        return Err(TokenRejection::Algorithm);
    }

    let payload: Value = decode_json_segment(parts[1], "payload")?;
    let marker = |field: &str| payload.get(field).and_then(Value::as_str) == Some(STEP2_COMPLETION_MARKER);
    if !marker("challenge") || !marker("completion_status") {
        return Err(TokenRejection::Markers);
    }

    let signature = decode_segment(parts[2])
        .map(|bytes| base64_url(&bytes))
        .ok_or(TokenRejection::Encoding("signature"))?;
    let signed_input = format!("{}.{}", parts[0], parts[1]);
    let key = DecodingKey::from_secret(secret.as_bytes());

    match crypto::verify(&signature, signed_input.as_bytes(), &key, Algorithm::HS256) {
        Ok(true) => Ok(payload),
        Ok(false) => Err(TokenRejection::Signature),
        Err(e) => {
            tracing::debug!("HS256 verification errored: {}", e);
            Err(TokenRejection::Signature)
        }
    }
}

fn decode_json_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
    name: &'static str,
) -> Result<T, TokenRejection> {
    let bytes = decode_segment(segment).ok_or(TokenRejection::Encoding(name))?;
    serde_json::from_slice(&bytes).map_err(|_| TokenRejection::Encoding(name))
}
