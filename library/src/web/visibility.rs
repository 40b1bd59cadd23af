//! Tab-visibility capability for driving auto-mute.
//!
//! The session never touches the visibility API itself; the embedder
//! forwards the reported flag into `VoiceSession::set_auto_mute`.

use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::Document;

use crate::error::{Error, Result};
use crate::web::js_error;

/// Scoped `visibilitychange` registration; dropping it removes the
/// listener.
pub struct VisibilityWatch {
    document: Document,
    closure: Closure<dyn FnMut()>,
}

impl Drop for VisibilityWatch {
    fn drop(&mut self) {
        let _ = self
            .document
            .remove_event_listener_with_callback("visibilitychange", self.closure.as_ref().unchecked_ref());
    }
}

/// Observe the document's hidden flag. `on_change` is called with the
/// current value immediately and again on every change.
///
/// # Errors
/// Fails outside a browsing context or when the listener cannot be
/// installed.
pub fn watch_visibility(on_change: impl Fn(bool) + 'static) -> Result<VisibilityWatch> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| Error::Platform(anyhow::anyhow!("no document object")))?;

    on_change(document.hidden());

    let document_clone = document.clone();
    let closure = Closure::wrap(Box::new(move || {
        on_change(document_clone.hidden());
    }) as Box<dyn FnMut()>);
    document
        .add_event_listener_with_callback("visibilitychange", closure.as_ref().unchecked_ref())
        .map_err(|error| js_error("failed to observe visibility", &error))?;

    Ok(VisibilityWatch { document, closure })
}
