//! Boundary validation of inbound frames.
//!
//! Everything that reaches the engine has passed through here: sizes are
//! bounded, the frame decodes into a known variant, and every identity it
//! names parses.

use beacon_core::error::AppError;
use beacon_core::types::Identity;

use super::serializer::deserialize_inbound;
use super::types::InboundMessage;

/// Maximum identities accepted in one `verify_batch`.
pub const MAX_BATCH_SIZE: usize = 500;

/// Maximum length of an application event type.
const MAX_EVENT_TYPE_LEN: usize = 64;

/// A decoded frame with its identities parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedInbound {
    /// Liveness signal.
    Heartbeat,
    /// Single verification.
    Verify(Identity),
    /// Batch verification.
    VerifyBatch(Vec<Identity>),
    /// Explicit going-offline.
    GoingOffline,
    /// Application event.
    Send {
        /// Application event type.
        event_type: String,
        /// Optional recipient.
        to: Option<Identity>,
        /// Opaque payload.
        payload: serde_json::Value,
    },
}

/// Decode and validate a raw text frame.
pub fn parse_inbound(raw: &str, max_size: usize) -> Result<ValidatedInbound, AppError> {
    if raw.len() > max_size {
        return Err(AppError::validation(format!(
            "Message exceeds maximum size of {max_size} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::validation("Empty message"));
    }

    let msg = deserialize_inbound(raw)
        .map_err(|e| AppError::validation(format!("Malformed message: {e}")))?;

    match msg {
        InboundMessage::Heartbeat => Ok(ValidatedInbound::Heartbeat),
        InboundMessage::GoingOffline => Ok(ValidatedInbound::GoingOffline),
        InboundMessage::Verify { identity } => Ok(ValidatedInbound::Verify(Identity::parse(identity)?)),
        InboundMessage::VerifyBatch { identities } => {
            if identities.len() > MAX_BATCH_SIZE {
                return Err(AppError::validation(format!(
                    "Batch exceeds maximum of {MAX_BATCH_SIZE} identities"
                )));
            }
            let parsed = identities
                .into_iter()
                .map(Identity::parse)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ValidatedInbound::VerifyBatch(parsed))
        }
        InboundMessage::Send {
            event_type,
            to,
            payload,
        } => {
            validate_event_type(&event_type)?;
            let to = to.map(Identity::parse).transpose()?;
            Ok(ValidatedInbound::Send {
                event_type,
                to,
                payload,
            })
        }
    }
}

/// Validates an application event type name.
pub fn validate_event_type(event_type: &str) -> Result<(), AppError> {
    if event_type.is_empty() || event_type.len() > MAX_EVENT_TYPE_LEN {
        return Err(AppError::validation("Invalid event type length"));
    }

    if !event_type
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':')
    {
        return Err(AppError::validation("Event type contains invalid characters"));
    }

    Ok(())
}
