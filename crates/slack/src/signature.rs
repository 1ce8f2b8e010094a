//! Inbound request authentication.
//!
//! Every payload carries the app's legacy verification token. When a signing
//! secret is configured the `X-Slack-Signature` header is checked as well:
//! `v0=` followed by the hex HMAC-SHA256 of `v0:{timestamp}:{raw body}`.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const SIGNATURE_VERSION: &str = "v0";
const MAX_CLOCK_SKEW_SECS: i64 = 60 * 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("unrecognized verification token")]
    UnknownToken,
    #[error("missing signature headers")]
    MissingSignature,
    #[error("request timestamp is outside the accepted window")]
    StaleTimestamp,
    #[error("request signature does not match")]
    BadSignature,
}

#[derive(Clone, Debug)]
pub struct RequestVerifier {
    verification_token: SecretString,
    signing_secret: Option<SecretString>,
}

impl RequestVerifier {
    pub fn new(verification_token: SecretString, signing_secret: Option<SecretString>) -> Self {
        Self { verification_token, signing_secret }
    }

    pub fn verify_token(&self, token: &str) -> Result<(), VerificationError> {
        let expected = self.verification_token.expose_secret().as_bytes();
        if bool::from(token.as_bytes().ct_eq(expected)) {
            Ok(())
        } else {
            Err(VerificationError::UnknownToken)
        }
    }

    /// Checks the signing headers against the raw body. Always passes when no
    /// signing secret is configured.
    pub fn verify_signature(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now_unix: i64,
    ) -> Result<(), VerificationError> {
        let Some(secret) = &self.signing_secret else {
            return Ok(());
        };
        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            return Err(VerificationError::MissingSignature);
        };

        let sent_at: i64 = timestamp.trim().parse().map_err(|_| VerificationError::StaleTimestamp)?;
        if (now_unix - sent_at).abs() > MAX_CLOCK_SKEW_SECS {
            return Err(VerificationError::StaleTimestamp);
        }

        let digest = signature
            .trim()
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .and_then(|hex_digest| hex::decode(hex_digest).ok())
            .ok_or(VerificationError::BadSignature)?;

        let mut mac = keyed_mac(secret.expose_secret().as_bytes(), timestamp.trim(), body)
            .ok_or(VerificationError::BadSignature)?;
        mac.verify_slice(&digest).map_err(|_| VerificationError::BadSignature)
    }
}

fn keyed_mac(secret: &[u8], timestamp: &str, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Some(mac)
}

#[cfg(test)]
fn sign(secret: &[u8], timestamp: &str, body: &[u8]) -> Option<String> {
    let digest = keyed_mac(secret, timestamp, body)?.finalize().into_bytes();
    Some(format!("{SIGNATURE_VERSION}={}", hex::encode(digest)))
}
