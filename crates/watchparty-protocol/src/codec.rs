//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The coordinator doesn't care HOW commands and events are serialized, it
//! just needs something that implements [`Codec`]. Today that is
//! [`JsonCodec`], which browser clients can speak without extra tooling.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync`: one codec instance is shared by every connection task
///   the transport spawns, and Tokio may poll those tasks on any worker
///   thread.
/// - `'static`: the codec owns everything it needs, so it can live inside
///   the long-lived `WatchParty` coordinator without borrowing from a
///   shorter scope.
///
/// ## Generic methods
///
/// `encode` and `decode` are generic over the message type. The same codec
/// handles [`ClientCommand`](crate::ClientCommand) going in and
/// [`ServerEvent`](crate::ServerEvent) going out:
///
/// - `encode<T: Serialize>`: `T` can be turned into bytes
/// - `decode<T: DeserializeOwned>`: `T` can be built from bytes
///
/// `DeserializeOwned` (rather than `Deserialize<'de>`) means the decoded
/// value owns its strings instead of borrowing them from the frame, so the
/// transport is free to reuse its read buffer right after decoding.
///
/// Because the methods are generic, `Codec` is not object safe. Code that
/// needs one takes it as a type parameter (`C: Codec`), which is how the
/// coordinator is parameterised.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON is what browser clients speak natively, and it keeps frames
/// readable in DevTools and logs. Every command and event is a flat object
/// whose `type` field names the variant.
///
/// This is behind the `json` feature flag (enabled by default), so a build
/// that brings its own codec can drop the `serde_json` dependency.
///
/// ## Example
///
/// ```rust
/// use watchparty_protocol::{ClientCommand, Codec, JsonCodec, RoomId};
///
/// let codec = JsonCodec;
/// let cmd: ClientCommand = codec
///     .decode(br#"{"type":"JoinRoom","room_id":"movie-night"}"#)
///     .unwrap();
/// assert_eq!(cmd.room_id(), &RoomId::from("movie-night"));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
