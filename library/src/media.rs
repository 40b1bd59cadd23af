//! Platform capabilities the voice core is written against.
//!
//! The browser implementations live in [`crate::web`]; tests substitute
//! in-memory fakes. Everything here is single-threaded: the session runs
//! on one logical thread of control, so handles are `Rc` and futures are
//! not `Send`.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use async_trait::async_trait;

use chit_voice_protocol::{IceCandidate, ParticipantId};

use crate::error::Result;

/// A local future with no output, as handed to [`Spawn`].
pub type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Schedules local (non-`Send`) futures.
///
/// Bridges the synchronous signaling listener into the async event
/// handler; in the browser this is `wasm_bindgen_futures::spawn_local`.
pub trait Spawn {
    /// Run the future to completion on the current logical thread.
    fn spawn_local(&self, future: LocalFuture);
}

/// Microphone access.
#[async_trait(?Send)]
pub trait MediaDevices {
    /// Request microphone capture from the user.
    ///
    /// # Errors
    /// [`crate::Error::PermissionDenied`] when the user refuses,
    /// [`crate::Error::DeviceUnavailable`] when no device can be opened.
    async fn capture_microphone(&self) -> Result<Rc<dyn LocalTrack>>;
}

/// The captured outbound audio track.
///
/// Owned exclusively by the session controller; peers receive clones of
/// the handle for attachment only and never change its state.
pub trait LocalTrack {
    /// Enable or disable the outbound audio.
    fn set_enabled(&self, enabled: bool);

    /// Whether the outbound audio is currently enabled.
    fn is_enabled(&self) -> bool;

    /// Stop capture and release the device. The track is single-use.
    fn stop(&self);

    /// Downcast hook for platform adapters.
    fn as_any(&self) -> &dyn Any;
}

/// Inbound audio of one remote peer.
pub trait RemoteStream {
    /// Stable identity of the stream, used to de-duplicate re-attachment.
    fn stream_id(&self) -> String;

    /// Stop every track on the stream.
    fn stop_tracks(&self);

    /// Downcast hook for platform adapters.
    fn as_any(&self) -> &dyn Any;
}

/// Asynchronous notifications of a single peer connection.
#[derive(Clone)]
pub enum PeerEvent {
    /// A locally gathered ICE candidate to relay to the peer.
    IceCandidate(IceCandidate),
    /// The peer's audio arrived.
    RemoteStream(Rc<dyn RemoteStream>),
    /// The connection reported failed or disconnected.
    ConnectionLost,
}

impl std::fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IceCandidate(candidate) => f.debug_tuple("IceCandidate").field(candidate).finish(),
            Self::RemoteStream(stream) => {
                f.debug_tuple("RemoteStream").field(&stream.stream_id()).finish()
            }
            Self::ConnectionLost => f.write_str("ConnectionLost"),
        }
    }
}

/// Callback receiving [`PeerEvent`]s together with the peer they concern.
pub type PeerEventHandler = Rc<dyn Fn(ParticipantId, PeerEvent)>;

/// Factory for peer connections.
pub trait PeerConnector {
    /// Create a connection toward `peer` with the local track attached
    /// and `events` wired to its asynchronous notifications.
    ///
    /// # Errors
    /// Fails when the platform refuses to construct the connection.
    fn connect(
        &self,
        peer: &ParticipantId,
        local_track: Rc<dyn LocalTrack>,
        events: PeerEventHandler,
    ) -> Result<Rc<dyn PeerLink>>;
}

/// A single-use negotiated media channel toward one peer.
///
/// Closed, never reused: a removed peer that comes back gets a fresh
/// link.
#[async_trait(?Send)]
pub trait PeerLink {
    /// Create an offer and install it as the local description.
    async fn create_offer(&self) -> Result<String>;

    /// Apply the remote offer, create an answer and install it as the
    /// local description.
    async fn create_answer(&self, offer: &str) -> Result<String>;

    /// Apply the remote answer.
    async fn apply_answer(&self, answer: &str) -> Result<()>;

    /// Add a relayed remote candidate.
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    /// Close the underlying connection. Idempotent.
    fn close(&self);
}

/// Playback binding for remote streams.
pub trait AudioOutput {
    /// Bind the stream to an audible sink for `participant`.
    ///
    /// # Errors
    /// Fails when the platform cannot construct the sink.
    fn bind(&self, participant: &ParticipantId, stream: &Rc<dyn RemoteStream>) -> Result<()>;

    /// Remove the sink for `participant`, if any.
    fn unbind(&self, participant: &ParticipantId);
}
