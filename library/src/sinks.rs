//! Table binding each remote peer's inbound audio to a playback sink.
//!
//! An entry lives exactly as long as the owning peer record; the
//! orchestrating session detaches it whenever the mesh removes the peer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, warn};

use chit_voice_protocol::ParticipantId;

use crate::media::{AudioOutput, RemoteStream};

/// Remote-stream table plus the playback capability it feeds.
pub struct AudioSinks {
    output: Rc<dyn AudioOutput>,
    streams: RefCell<HashMap<ParticipantId, Rc<dyn RemoteStream>>>,
}

impl AudioSinks {
    /// Wrap a playback capability.
    #[must_use]
    pub fn new(output: Rc<dyn AudioOutput>) -> Self {
        Self {
            output,
            streams: RefCell::new(HashMap::new()),
        }
    }

    /// Register a stream for playback.
    ///
    /// Re-attachment with an unchanged stream is a no-op so playback is
    /// not restarted mid-word; a changed stream replaces the old binding.
    pub fn attach(&self, participant: ParticipantId, stream: Rc<dyn RemoteStream>) {
        {
            let streams = self.streams.borrow();
            if let Some(existing) = streams.get(&participant) {
                if existing.stream_id() == stream.stream_id() {
                    debug!("sink for {participant} unchanged, ignoring re-attachment");
                    return;
                }
            }
        }
        if let Err(error) = self.output.bind(&participant, &stream) {
            warn!("failed to bind audio sink for {participant}: {error}");
            return;
        }
        self.streams.borrow_mut().insert(participant, stream);
    }

    /// Stop the participant's stream and remove its sink.
    pub fn detach(&self, participant: &ParticipantId) {
        if let Some(stream) = self.streams.borrow_mut().remove(participant) {
            stream.stop_tracks();
            self.output.unbind(participant);
            debug!("released audio sink for {participant}");
        }
    }

    /// Detach every sink; used on session teardown.
    pub fn clear(&self) {
        let ids: Vec<ParticipantId> = self.streams.borrow().keys().cloned().collect();
        for id in &ids {
            self.detach(id);
        }
    }

    /// Number of live sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.borrow().len()
    }

    /// Whether no sink is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.borrow().is_empty()
    }
}
