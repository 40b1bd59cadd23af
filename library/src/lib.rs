/*!
Full-mesh voice chat for chit game rooms.

# Overview

Every participant of an active match holds one direct peer connection to
every other participant; connection setup metadata travels over the
room's signaling channel, audio travels peer to peer. This crate owns the
hard part of that arrangement: the session state machine
(`idle → starting → online`), reconciliation of the peer table against
roster snapshots, the offer/answer/candidate exchange per peer, and the
three-input mute logic applied to the outbound track.

The signaling channel itself is supplied by the embedding application
through the [`SignalingClient`] trait (it is shared with text chat), and
the platform's media stack is reached through the capability traits in
[`media`]. Browser implementations of those capabilities, built on
`web-sys`, live in [`web`] and only compile for `wasm32`.

```no_run
# use std::rc::Rc;
# fn demo(
#     signaling: Rc<dyn chit_voice::SignalingClient>,
#     devices: Rc<dyn chit_voice::media::MediaDevices>,
#     connector: Rc<dyn chit_voice::media::PeerConnector>,
#     output: Rc<dyn chit_voice::media::AudioOutput>,
#     spawner: Rc<dyn chit_voice::media::Spawn>,
# ) {
use chit_voice::VoiceSession;

let session =
    VoiceSession::new("player-42".into(), signaling, devices, connector, output, spawner);
# }
```

On `wasm32` the [`web`] module provides the browser capabilities:
`web::WebMediaDevices` (microphone), `web::WebPeerConnector`
(`RtcPeerConnection` with the [`IceConfig`] STUN hints),
`web::WebAudioOutput` (autoplaying audio elements) and
`web::watch_visibility` for driving [`VoiceSession::set_auto_mute`].
*/

#![allow(
    clippy::module_name_repetitions,
    clippy::future_not_send, // false positive in single threaded (WASM) context
)]
// clippy WARN level lints
#![warn(
    clippy::cargo,
    clippy::pedantic,
    clippy::dbg_macro,
    clippy::unwrap_used,
    clippy::large_include_file,
    clippy::map_err_ignore,
    clippy::panic,
    clippy::todo,
    clippy::undocumented_unsafe_blocks,
    clippy::unimplemented
)]
// clippy DENY level lints, they always have a quick fix that should be preferred
#![deny(
    clippy::wildcard_imports,
    clippy::multiple_inherent_impl,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_name_method,
    clippy::self_named_module_files,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::unnecessary_self_imports,
    clippy::unneeded_field_pattern
)]

pub mod config;
mod error;
pub mod media;
pub mod mesh;
pub mod roster;
pub mod session;
pub mod signaling;
pub mod sinks;
#[cfg(test)]
pub(crate) mod testing;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use chit_voice_protocol as protocol;

pub use config::IceConfig;
pub use error::{Error, Result};
pub use session::{track_enabled, SessionStatus, VoiceSession, REASON_LOCAL};
pub use signaling::{SignalingClient, SignalingEvent, SignalingListener, Subscription};
