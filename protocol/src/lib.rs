/*!
Helper crate that declares the voice signaling types shared between the
`chit-voice` client library and the `chit-voice-signaling-server`.
*/

#![warn(missing_docs)]

use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod events;

pub use events::{ClientEvent, ServerEvent};

/// Unique identifier of a room whose match carries the voice session.
/// Issued by the room service; the voice layer treats it as opaque.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct RoomId(String);

impl RoomId {
    /// Wrap a `String` into a `RoomId`
    #[must_use]
    pub const fn new(inner: String) -> Self {
        Self(inner)
    }

    /// Return reference to the underlying string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl Display for RoomId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a voice participant, shared with the room roster.
///
/// Ordering is lexicographic over the underlying string; the mesh uses it
/// as the deterministic initiator tie-break, so the derive order matters.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Wrap a `String` into a `ParticipantId`
    #[must_use]
    pub const fn new(inner: String) -> Self {
        Self(inner)
    }

    /// Return reference to the underlying string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Acquire the underlying type
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl FromStr for ParticipantId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl From<&str> for ParticipantId {
    fn from(val: &str) -> Self {
        Self(val.to_owned())
    }
}

impl Display for ParticipantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A voice participant as broadcast by the signaling server.
///
/// The three flags are independent inputs; everything the UI shows is
/// derived from them via [`Participant::effective_muted`] and
/// [`Participant::is_speaking`].
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Identity of the participant; roster entries are keyed by it.
    pub participant_id: ParticipantId,
    /// Human-readable name shown next to the speaking indicator.
    pub display_name: String,
    /// Manual mute toggle.
    pub is_muted: bool,
    /// Tab-visibility driven mute, independent of the manual flag.
    pub is_auto_muted: bool,
    /// Whether the participant currently holds the push-to-talk input.
    pub push_to_talk_pressed: bool,
}

impl Participant {
    /// A freshly registered participant: muted until they opt in.
    #[must_use]
    pub fn new(participant_id: ParticipantId, display_name: String) -> Self {
        Self {
            participant_id,
            display_name,
            is_muted: true,
            is_auto_muted: false,
            push_to_talk_pressed: false,
        }
    }

    /// Muted for any reason, manual or visibility-driven.
    #[must_use]
    pub const fn effective_muted(&self) -> bool {
        self.is_muted || self.is_auto_muted
    }

    /// Audible right now: unmuted and holding push-to-talk.
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        !self.effective_muted() && self.push_to_talk_pressed
    }
}

/// A single ICE candidate relayed verbatim between peers.
///
/// Field names follow the browser's JSON representation so the payload
/// can be fed back into the platform without translation.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// The candidate line itself.
    pub candidate: String,
    /// Identifier of the media description the candidate belongs to.
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to.
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
}
