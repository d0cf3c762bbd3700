//! Frame codec: subscription requests out, envelopes in.
//!
//! The codec is deliberately forgiving on the way in. The feed mixes
//! data frames, acknowledgements and the occasional odd frame on one
//! socket, so decoding classifies a frame (see [`Decoded`]) instead of
//! failing on anything that isn't a perfect data frame. Only frames
//! that are not JSON at all are errors.

use chrono::Utc;
use serde_json::{Map, Value};

use crate::types::{ACK_CHANNEL, UNKNOWN_CHANNEL, generate_request_id};
use crate::{Decoded, Envelope, ProtocolError, SubscriptionRequest};

/// JSON frame codec for the GMGN feed.
///
/// ## Example
///
/// ```rust
/// use gmgn_protocol::{Channel, Decoded, FrameCodec, SubscriptionRequest};
///
/// let codec = FrameCodec;
/// let request = SubscriptionRequest::new(Channel::ChainStat, vec![]);
/// let text = codec.encode(&request).unwrap();
///
/// match codec.decode(text.as_bytes()).unwrap() {
///     Decoded::Envelope(env) => assert_eq!(env.channel, "chain_stat"),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Serializes a request to wire text.
    ///
    /// A request with an empty `id` is sent with a freshly generated one;
    /// the frame must always carry an id.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn encode(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<String, ProtocolError> {
        if request.id.is_empty() {
            let mut request = request.clone();
            request.id = generate_request_id();
            return serde_json::to_string(&request).map_err(ProtocolError::Encode);
        }
        serde_json::to_string(request).map_err(ProtocolError::Encode)
    }

    /// Classifies one inbound frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the frame is not well-formed
    /// JSON.
    pub fn decode(&self, frame: &[u8]) -> Result<Decoded, ProtocolError> {
        let value: Value =
            serde_json::from_slice(frame).map_err(ProtocolError::Decode)?;

        let Value::Object(mut body) = value else {
            return Ok(Decoded::Unexpected(value));
        };

        let channel = match body.get("channel") {
            Some(Value::String(name)) => name.clone(),
            _ => UNKNOWN_CHANNEL.to_owned(),
        };
        if channel == ACK_CHANNEL {
            return Ok(Decoded::Ack(Value::Object(body)));
        }

        let action = text_field(&body, "action");
        let id = text_field(&body, "id");
        // No `data` field means the whole body is the payload.
        let payload = match body.remove("data") {
            Some(data) => data,
            None => Value::Object(body),
        };

        Ok(Decoded::Envelope(Envelope {
            action,
            channel,
            id,
            payload,
            received_at: Some(Utc::now()),
        }))
    }

    /// Wraps a non-object frame into an envelope on [`UNKNOWN_CHANNEL`],
    /// for consumers that asked to see such frames.
    pub fn wrap_unexpected(&self, value: Value) -> Envelope {
        Envelope {
            action: None,
            channel: UNKNOWN_CHANNEL.to_owned(),
            id: None,
            payload: value,
            received_at: Some(Utc::now()),
        }
    }
}

/// Reads an optional envelope field. Strings are taken as-is, other
/// scalars (numeric ids) are rendered, `null` counts as absent.
fn text_field(body: &Map<String, Value>, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
