//! Microphone capture and stream wrappers.

use std::any::Any;
use std::rc::Rc;

use async_trait::async_trait;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{DomException, MediaStream, MediaStreamConstraints, MediaStreamTrack};

use crate::error::{Error, Result};
use crate::media::{LocalTrack, MediaDevices, RemoteStream};
use crate::web::js_error;

/// `navigator.mediaDevices` backed microphone access.
pub struct WebMediaDevices;

#[async_trait(?Send)]
impl MediaDevices for WebMediaDevices {
    async fn capture_microphone(&self) -> Result<Rc<dyn LocalTrack>> {
        let window = web_sys::window()
            .ok_or_else(|| Error::Platform(anyhow::anyhow!("no window object")))?;
        let devices = window
            .navigator()
            .media_devices()
            .map_err(|error| js_error("media devices unavailable", &error))?;

        let constraints = MediaStreamConstraints::new();
        constraints.set_audio(&JsValue::TRUE);
        constraints.set_video(&JsValue::FALSE);

        let promise = devices
            .get_user_media_with_constraints(&constraints)
            .map_err(|error| js_error("getUserMedia rejected", &error))?;
        let stream = JsFuture::from(promise)
            .await
            .map_err(|error| capture_error(&error))?;
        let stream: MediaStream = stream
            .dyn_into()
            .map_err(|value| js_error("getUserMedia returned a non-stream", &value))?;
        Ok(Rc::new(WebLocalTrack::new(stream)))
    }
}

/// Map the `DOMException` name onto the capture error taxonomy.
fn capture_error(error: &JsValue) -> Error {
    let name = error.dyn_ref::<DomException>().map(DomException::name);
    match name.as_deref() {
        Some("NotAllowedError" | "SecurityError") => Error::PermissionDenied,
        Some("NotFoundError" | "NotReadableError" | "OverconstrainedError") => {
            Error::DeviceUnavailable
        }
        _ => js_error("getUserMedia failed", error),
    }
}

/// The captured outbound stream.
pub struct WebLocalTrack {
    stream: MediaStream,
}

impl WebLocalTrack {
    /// Wrap a captured stream.
    #[must_use]
    pub fn new(stream: MediaStream) -> Self {
        Self { stream }
    }

    /// The underlying stream, for attachment to peer connections.
    #[must_use]
    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    fn audio_tracks(&self) -> Vec<MediaStreamTrack> {
        self.stream
            .get_audio_tracks()
            .iter()
            .filter_map(|track| track.dyn_into::<MediaStreamTrack>().ok())
            .collect()
    }
}

impl LocalTrack for WebLocalTrack {
    fn set_enabled(&self, enabled: bool) {
        for track in self.audio_tracks() {
            track.set_enabled(enabled);
        }
    }

    fn is_enabled(&self) -> bool {
        self.audio_tracks()
            .first()
            .map_or(false, MediaStreamTrack::enabled)
    }

    fn stop(&self) {
        for track in self.stream.get_tracks().iter() {
            if let Ok(track) = track.dyn_into::<MediaStreamTrack>() {
                track.stop();
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One remote peer's inbound stream.
pub struct WebRemoteStream {
    stream: MediaStream,
}

impl WebRemoteStream {
    /// Wrap a stream delivered by a track event.
    #[must_use]
    pub fn new(stream: MediaStream) -> Self {
        Self { stream }
    }

    /// The underlying stream, for binding to a playback element.
    #[must_use]
    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }
}

impl RemoteStream for WebRemoteStream {
    fn stream_id(&self) -> String {
        self.stream.id()
    }

    fn stop_tracks(&self) {
        for track in self.stream.get_tracks().iter() {
            if let Ok(track) = track.dyn_into::<MediaStreamTrack>() {
                track.stop();
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
