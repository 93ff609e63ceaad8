//! Webhook signature verification.
//!
//! The processor signs each webhook with HMAC-SHA256 over the raw request body and sends the digest in a header,
//! hex-encoded (optionally prefixed with `sha256=`). Base64-encoded digests are also accepted.
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Verified,
    /// No secret is configured and the server is not in production posture. The event is accepted unsigned.
    Bypassed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("No webhook signature was provided")]
    MissingSignature,
    #[error("The webhook signature is not a valid digest")]
    MalformedSignature,
    #[error("The webhook signature does not match the payload")]
    Mismatch,
    #[error("No webhook secret is configured")]
    SecretNotConfigured,
}

pub fn calculate_hmac(secret: &[u8], payload: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC can take a key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Hex-encoded HMAC-SHA256 of `payload`, in the format the processor sends.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    hex::encode(calculate_hmac(secret.as_bytes(), payload))
}

fn decode_digest(signature: &str) -> Option<Vec<u8>> {
    let sig = signature.trim();
    let sig = sig.strip_prefix("sha256=").unwrap_or(sig);
    if sig.len() == 64 {
        if let Ok(bytes) = hex::decode(sig) {
            return Some(bytes);
        }
    }
    base64::decode(sig).ok().filter(|b| b.len() == 32)
}

/// Verifies a webhook signature against the configured secret.
///
/// With no secret configured, unsigned events are let through only when `production` is false. In production the
/// missing secret is itself an error.
pub fn verify_signature(
    secret: Option<&str>,
    payload: &[u8],
    signature: Option<&str>,
    production: bool,
) -> Result<SignatureCheck, SignatureError> {
    let secret = match secret.filter(|s| !s.is_empty()) {
        Some(s) => s,
        None if production => {
            error!("🔐️ No webhook secret is configured in production. Rejecting webhook.");
            return Err(SignatureError::SecretNotConfigured);
        },
        None => {
            warn!("🔐️ No webhook secret is configured. Accepting unsigned webhook (development only).");
            return Ok(SignatureCheck::Bypassed);
        },
    };
    let signature = signature.filter(|s| !s.trim().is_empty()).ok_or(SignatureError::MissingSignature)?;
    let provided = decode_digest(signature).ok_or(SignatureError::MalformedSignature)?;
    let expected = calculate_hmac(secret.as_bytes(), payload);
    if bool::from(expected.ct_eq(&provided)) {
        trace!("🔐️ Webhook signature ✅️");
        Ok(SignatureCheck::Verified)
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const BODY: &[u8] = br#"{"id":"EVxyz","type":"updated","entity":"transfer"}"#;

    #[test]
    fn accepts_valid_hex_signature() {
        let sig = sign_payload("whsec", BODY);
        assert_eq!(sig.len(), 64);
        assert_eq!(verify_signature(Some("whsec"), BODY, Some(&sig), true), Ok(SignatureCheck::Verified));
        let prefixed = format!("sha256={sig}");
        assert_eq!(verify_signature(Some("whsec"), BODY, Some(&prefixed), true), Ok(SignatureCheck::Verified));
    }

    #[test]
    fn accepts_base64_signature() {
        let sig = base64::encode(calculate_hmac(b"whsec", BODY));
        assert_eq!(verify_signature(Some("whsec"), BODY, Some(&sig), false), Ok(SignatureCheck::Verified));
    }

    #[test]
    fn rejects_tampered_body() {
        let sig = sign_payload("whsec", BODY);
        let tampered = br#"{"id":"EVxyz","type":"updated","entity":"merchant"}"#;
        assert_eq!(verify_signature(Some("whsec"), tampered, Some(&sig), false), Err(SignatureError::Mismatch));
    }

    #[test]
    fn rejects_wrong_secret() {
        let sig = sign_payload("other", BODY);
        assert_eq!(verify_signature(Some("whsec"), BODY, Some(&sig), false), Err(SignatureError::Mismatch));
    }

    #[test]
    fn rejects_missing_or_garbage_signature() {
        assert_eq!(verify_signature(Some("whsec"), BODY, None, false), Err(SignatureError::MissingSignature));
        assert_eq!(verify_signature(Some("whsec"), BODY, Some(""), false), Err(SignatureError::MissingSignature));
        assert_eq!(
            verify_signature(Some("whsec"), BODY, Some("not-a-digest"), false),
            Err(SignatureError::MalformedSignature)
        );
    }

    #[test]
    fn bypass_only_outside_production() {
        assert_eq!(verify_signature(None, BODY, None, false), Ok(SignatureCheck::Bypassed));
        assert_eq!(verify_signature(Some(""), BODY, None, false), Ok(SignatureCheck::Bypassed));
        assert_eq!(verify_signature(None, BODY, None, true), Err(SignatureError::SecretNotConfigured));
    }
}
