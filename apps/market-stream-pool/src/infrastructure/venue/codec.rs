//! Frame Codec
//!
//! Decodes inbound venue text frames and encodes outbound control requests.
//!
//! A frame is either a JSON array of event objects or a single object.
//! Array elements are decoded independently so that one malformed element
//! does not cost its siblings:
//!
//! ```json
//! [{"ev":"T","sym":"AAPL","p":189.5,"s":100,"t":1700000000123},
//!  {"ev":"T","sym":"MSFT"}]
//! ```
//!
//! decodes to one trade and one element error.

use serde_json::Value;

use super::messages::{
    AggregateMessage, ControlRequest, QuoteMessage, StatusMessage, TradeMessage, VenueMessage,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown `ev` discriminator.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// Element has no `ev` discriminator.
    #[error("missing event type")]
    MissingEventType,

    /// Invalid frame format.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// Result of decoding one element of a frame.
pub type ElementResult = Result<VenueMessage, CodecError>;

/// JSON codec for the venue stream.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into per-element results.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame as a whole is not a JSON array or
    /// object. Element-level failures are reported inside the vector.
    pub fn decode(&self, text: &str) -> Result<Vec<ElementResult>, CodecError> {
        let trimmed = text.trim();
        if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {preview}..."
            )));
        }

        match serde_json::from_str::<Value>(trimmed)? {
            Value::Array(elements) => Ok(elements.into_iter().map(Self::decode_value).collect()),
            value @ Value::Object(_) => Ok(vec![Self::decode_value(value)]),
            _ => Err(CodecError::InvalidFormat(
                "frame is neither array nor object".to_string(),
            )),
        }
    }

    /// Decode one event object.
    fn decode_value(value: Value) -> ElementResult {
        let event_type = value
            .get("ev")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingEventType)?
            .to_string();

        let message = match event_type.as_str() {
            "status" => VenueMessage::Status(serde_json::from_value::<StatusMessage>(value)?),
            "T" => VenueMessage::Trade(serde_json::from_value::<TradeMessage>(value)?),
            "Q" => VenueMessage::Quote(serde_json::from_value::<QuoteMessage>(value)?),
            "AM" | "A" => {
                VenueMessage::Aggregate(serde_json::from_value::<AggregateMessage>(value)?)
            }
            _ => return Err(CodecError::UnknownEventType(event_type)),
        };
        Ok(message)
    }

    /// Encode a control request as a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, request: &ControlRequest) -> Result<String, CodecError> {
        Ok(serde_json::to_string(request)?)
    }
}
