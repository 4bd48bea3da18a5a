//! Signed gateway events: signature verification and payload types.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::Amount;
use crate::model::ReservationId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("webhook secret is not configured")]
    NotConfigured,

    #[error("missing signature header")]
    MissingSignature,

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("timestamp {timestamp} is outside the tolerance window (now {now})")]
    TimestampOutOfTolerance { timestamp: i64, now: i64 },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl WebhookError {
    /// HTTP status for the webhook response.
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookError::NotConfigured => 503,
            WebhookError::MissingSignature
            | WebhookError::InvalidSignature(_)
            | WebhookError::TimestampOutOfTolerance { .. }
            | WebhookError::MalformedPayload(_) => 400,
        }
    }
}

/// Check `header` against an HMAC-SHA256 of `"{t}.{payload}"`.
///
/// Any of several `v1` entries may match, which allows secret rotation.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_seconds: i64,
    now: i64,
) -> Result<(), WebhookError> {
    if secret.is_empty() {
        return Err(WebhookError::NotConfigured);
    }
    let header = header.ok_or(WebhookError::MissingSignature)?;

    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp
        .ok_or_else(|| WebhookError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(WebhookError::InvalidSignature("no v1 signature".to_string()));
    }
    if (now - timestamp).abs() > tolerance_seconds {
        return Err(WebhookError::TimestampOutOfTolerance { timestamp, now });
    }

    let expected = hex::encode(signature_bytes(payload, secret, timestamp)?);
    let valid = signatures
        .iter()
        .any(|sig| constant_time_eq(expected.as_bytes(), sig.as_bytes()));
    if !valid {
        return Err(WebhookError::InvalidSignature("signature mismatch".to_string()));
    }

    debug!(timestamp, "webhook signature verified");
    Ok(())
}

/// Build a signature header for `payload`, as the gateway would.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, WebhookError> {
    let mac = signature_bytes(payload, secret, timestamp)?;
    Ok(format!("t={timestamp},v1={}", hex::encode(mac)))
}

fn signature_bytes(payload: &[u8], secret: &str, timestamp: i64) -> Result<Vec<u8>, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// How an event affects the settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Succeeded,
    Failed,
    Refunded,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Gateway-side unix timestamp; orders events per settlement.
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    pub reservation_id: ReservationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_last4: Option<String>,
}

impl GatewayEvent {
    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            "checkout.session.completed" | "charge.succeeded" => EventKind::Succeeded,
            "charge.failed" | "payment_intent.payment_failed" => EventKind::Failed,
            "charge.refunded" => EventKind::Refunded,
            _ => EventKind::Other,
        }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(payload).map_err(|e| WebhookError::MalformedPayload(e.to_string()))
    }
}
