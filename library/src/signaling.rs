//! Contract of the room signaling channel.
//!
//! The channel itself is supplied by the embedding application (it is
//! shared with text chat); the voice core only depends on this trait and
//! on the event set of the protocol crate.

use std::rc::Rc;

use chit_voice_protocol::{ClientEvent, ServerEvent};

use crate::error::Result;

/// What the channel delivers to a subscriber.
#[derive(Debug, Clone)]
pub enum SignalingEvent {
    /// A named voice event pushed by the server.
    Server(ServerEvent),
    /// The underlying channel went away; the session must tear down.
    Disconnected,
}

/// Listener installed through [`SignalingClient::subscribe`].
pub type SignalingListener = Rc<dyn Fn(SignalingEvent)>;

/// Bidirectional event channel scoped to a joined room.
///
/// Delivery guarantees are weak on purpose: events from the same sender
/// arrive in send order, nothing is promised across senders.
pub trait SignalingClient {
    /// Emit a named event toward the server.
    ///
    /// # Errors
    /// Fails when the channel is not connected or the transport rejects
    /// the message.
    fn send(&self, event: ClientEvent) -> Result<()>;

    /// Whether the channel is currently connected.
    fn is_connected(&self) -> bool;

    /// Install a listener and hand back the guard that keeps it alive.
    fn subscribe(&self, listener: SignalingListener) -> Subscription;
}

/// Scoped registration on the signaling channel.
///
/// Holding the value keeps the listener installed; dropping it removes
/// the listener, on every exit path. Implementations provide the
/// cancellation closure.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Wrap the closure that removes the listener again.
    #[must_use]
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
