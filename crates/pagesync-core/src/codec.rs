//! `[event, ...args]` JSON frame codec.
//!
//! Every WebSocket text frame carries exactly one event packet. Inbound
//! packets carry a single argument; outbound packets carry one or more.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::messages::{
    ClientMessage, ServerMessage, EVENT_AUTH, EVENT_PAGE_EVENT, EVENT_PAGE_SYNC,
};

/// Decode one inbound text frame.
pub fn decode(text: &str) -> Result<ClientMessage, ProtocolError> {
    let frame: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
    let Value::Array(mut items) = frame else {
        return Err(ProtocolError::NotAnArray);
    };
    if items.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }
    let Value::String(event) = items.remove(0) else {
        return Err(ProtocolError::InvalidEventName);
    };
    let payload = if items.is_empty() {
        Value::Null
    } else {
        items.swap_remove(0)
    };

    match event.as_str() {
        EVENT_AUTH => Ok(ClientMessage::Auth(payload)),
        EVENT_PAGE_SYNC => Ok(ClientMessage::PageSync(payload_as(EVENT_PAGE_SYNC, payload)?)),
        EVENT_PAGE_EVENT => Ok(ClientMessage::PageEvent(payload_as(EVENT_PAGE_EVENT, payload)?)),
        _ => Err(ProtocolError::UnknownEvent(event)),
    }
}

fn payload_as<T: DeserializeOwned>(event: &'static str, payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::MalformedPayload { event, source })
}

/// Build the JSON packet for an outbound message.
pub fn to_frame(message: &ServerMessage) -> Value {
    let event = Value::from(message.event());
    match message {
        ServerMessage::Connect { session_id } => {
            Value::Array(vec![event, Value::from(session_id.as_str())])
        }
        ServerMessage::Auth(ok) => Value::Array(vec![event, Value::Bool(*ok)]),
        ServerMessage::Commit { name, payload } => {
            Value::Array(vec![event, Value::from(name.as_str()), payload.clone()])
        }
        ServerMessage::PageSync {
            page,
            name,
            payload,
        } => Value::Array(vec![
            event,
            Value::from(page.as_str()),
            Value::from(name.as_str()),
            payload.clone(),
        ]),
        ServerMessage::Reset { pages } => Value::Array(vec![
            event,
            Value::Array(pages.iter().map(|p| Value::from(p.as_str())).collect()),
        ]),
    }
}

/// Encode an outbound message as a text frame.
pub fn encode(message: &ServerMessage) -> String {
    to_frame(message).to_string()
}
