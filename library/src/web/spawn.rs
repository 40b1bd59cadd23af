use crate::media::{LocalFuture, Spawn};

/// Runs futures on the browser microtask queue.
pub struct WebSpawner;

impl Spawn for WebSpawner {
    fn spawn_local(&self, future: LocalFuture) {
        wasm_bindgen_futures::spawn_local(future);
    }
}
