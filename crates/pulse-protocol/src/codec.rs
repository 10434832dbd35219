//! Text frame codec.

use serde_json::Value;

use crate::{InboundFrame, OutboundFrame, ProtocolError, ProtocolResult};

/// Decode one text frame.
///
/// The text must be a JSON object with a string `type` field; all other
/// fields are kept as-is for handlers to interpret.
pub fn decode_frame(text: &str) -> ProtocolResult<InboundFrame> {
    let value: Value = serde_json::from_str(text)?;

    let Value::Object(mut fields) = value else {
        return Err(ProtocolError::MalformedFrame(
            "frame is not a JSON object".to_string(),
        ));
    };

    let frame_type = match fields.shift_remove("type") {
        Some(Value::String(t)) => t,
        Some(_) => {
            return Err(ProtocolError::MalformedFrame(
                "'type' is not a string".to_string(),
            ))
        }
        None => {
            return Err(ProtocolError::MalformedFrame(
                "missing 'type' field".to_string(),
            ))
        }
    };

    Ok(InboundFrame { frame_type, fields })
}

/// Encode one outbound frame as compact JSON text.
pub fn encode_frame(frame: &OutboundFrame) -> ProtocolResult<String> {
    Ok(serde_json::to_string(frame)?)
}
