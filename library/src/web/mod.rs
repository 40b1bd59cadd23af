//! Browser implementations of the platform capabilities, on `web-sys`.
//!
//! Everything here is thin: the session and mesh logic never reach into
//! the browser directly, they go through the traits in [`crate::media`].

mod media;
mod peer;
mod sink;
mod spawn;
mod visibility;

pub use media::{WebLocalTrack, WebMediaDevices, WebRemoteStream};
pub use peer::WebPeerConnector;
pub use sink::WebAudioOutput;
pub use spawn::WebSpawner;
pub use visibility::{watch_visibility, VisibilityWatch};

use wasm_bindgen::JsValue;

use crate::error::Error;

/// `JsValue` failures carry no `std::error::Error`; fold them into the
/// platform variant with their debug rendering.
pub(crate) fn js_error(context: &str, value: &JsValue) -> Error {
    Error::Platform(anyhow::anyhow!("{context}: {value:?}"))
}
