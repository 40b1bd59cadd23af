//! Playback via autoplaying `<audio>` elements.
//!
//! The elements are held here and never inserted into the DOM; audio
//! plays regardless, and dropping the element releases the sink.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::JsCast;
use web_sys::HtmlAudioElement;

use chit_voice_protocol::ParticipantId;

use crate::error::{Error, Result};
use crate::media::{AudioOutput, RemoteStream};
use crate::web::js_error;
use crate::web::media::WebRemoteStream;

/// One hidden audio element per remote participant.
#[derive(Default)]
pub struct WebAudioOutput {
    elements: RefCell<HashMap<ParticipantId, HtmlAudioElement>>,
}

impl WebAudioOutput {
    /// Empty output table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioOutput for WebAudioOutput {
    fn bind(&self, participant: &ParticipantId, stream: &Rc<dyn RemoteStream>) -> Result<()> {
        let stream = stream
            .as_any()
            .downcast_ref::<WebRemoteStream>()
            .ok_or_else(|| {
                Error::Platform(anyhow::anyhow!("remote stream is not a browser stream"))
            })?;
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| Error::Platform(anyhow::anyhow!("no document object")))?;
        let element: HtmlAudioElement = document
            .create_element("audio")
            .map_err(|error| js_error("failed to create audio element", &error))?
            .dyn_into()
            .map_err(|_| Error::Platform(anyhow::anyhow!("created element is not <audio>")))?;
        element.set_autoplay(true);
        element.set_src_object(Some(stream.stream()));

        if let Some(old) = self
            .elements
            .borrow_mut()
            .insert(participant.clone(), element)
        {
            old.set_src_object(None);
        }
        Ok(())
    }

    fn unbind(&self, participant: &ParticipantId) {
        if let Some(element) = self.elements.borrow_mut().remove(participant) {
            let _ = element.pause();
            element.set_src_object(None);
        }
    }
}
