//! The bus wire format (spec.md §6.1): a JSON body plus a header carrying
//! the concrete message-type name, so a receiver can reconstruct the
//! payload before even looking at the body.

use cortex_types::{Message, MessageEnvelope};
use thiserror::Error;

pub const HEADER_NAME: &str = "cortex-message-type";

#[derive(Error, Debug)]
pub enum WireError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("missing or unrecognized {header}: {found:?}", header = HEADER_NAME)]
    UnknownMessageType { found: Option<String> },
}

fn type_tag(message: &Message) -> &'static str {
    match message {
        Message::TaskRequest { .. } => "task_request",
        Message::TaskReply { .. } => "task_reply",
        Message::PlanProposal { .. } => "plan_proposal",
        Message::PlanApprovalResponse { .. } => "plan_approval_response",
        Message::SupervisionAlert { .. } => "supervision_alert",
        Message::EscalationAlert { .. } => "escalation_alert",
        Message::Unknown => "unknown",
    }
}

/// A wire frame ready to hand to a transport: the header value plus the
/// JSON body. Transports (in-memory, AMQP) carry these two parts however
/// is idiomatic for them — see `cortex-bus`.
pub struct WireFrame {
    pub message_type: String,
    pub body: Vec<u8>,
}

pub fn encode(envelope: &MessageEnvelope) -> Result<WireFrame, WireError> {
    let body = serde_json::to_vec(envelope)?;
    Ok(WireFrame {
        message_type: type_tag(&envelope.message).to_string(),
        body,
    })
}

/// Decodes a frame, enforcing §4.2/§7: a missing or unrecognized header is
/// a permanent deserialisation failure, as is a malformed body. A known
/// header whose body actually decodes to the `Unknown` arm (tag mismatch
/// inside the JSON itself) is likewise rejected — the header is the
/// authoritative claim, and it must match what's inside.
pub fn decode(message_type: Option<&str>, body: &[u8]) -> Result<MessageEnvelope, WireError> {
    let message_type = message_type.ok_or(WireError::UnknownMessageType { found: None })?;
    if !KNOWN_TYPES.contains(&message_type) {
        return Err(WireError::UnknownMessageType {
            found: Some(message_type.to_string()),
        });
    }
    let envelope: MessageEnvelope = serde_json::from_slice(body)?;
    if envelope.message.is_unknown() {
        return Err(WireError::UnknownMessageType {
            found: Some(message_type.to_string()),
        });
    }
    Ok(envelope)
}

const KNOWN_TYPES: [&str; 6] = [
    "task_request",
    "task_reply",
    "plan_proposal",
    "plan_approval_response",
    "supervision_alert",
    "escalation_alert",
];
