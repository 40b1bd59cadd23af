/*!
Signaling events exchanged between a voice client and the signaling
server, scoped to a joined room.

The wire format is a JSON object with an `event` name and an optional
`data` payload, matching what the room service emits to browsers.
*/

use serde::{Deserialize, Serialize};

use crate::{IceCandidate, Participant, ParticipantId};

/// Events sent by a client to the signaling server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Announce local readiness after microphone capture succeeded.
    #[serde(rename = "voice:ready")]
    Ready,

    /// SDP offer relayed to a single target participant.
    #[serde(rename = "voice:offer", rename_all = "camelCase")]
    Offer {
        /// Recipient of the offer.
        target_participant_id: ParticipantId,
        /// The offer description, passed along without modification.
        sdp: String,
    },

    /// SDP answer relayed to a single target participant.
    #[serde(rename = "voice:answer", rename_all = "camelCase")]
    Answer {
        /// Recipient of the answer.
        target_participant_id: ParticipantId,
        /// The answer description, passed along without modification.
        sdp: String,
    },

    /// Locally gathered ICE candidate relayed to a single target.
    #[serde(rename = "voice:ice-candidate", rename_all = "camelCase")]
    IceCandidate {
        /// Recipient of the candidate.
        target_participant_id: ParticipantId,
        /// The candidate, passed along without modification.
        candidate: IceCandidate,
    },

    /// Manual mute toggle.
    #[serde(rename = "voice:mute", rename_all = "camelCase")]
    Mute {
        /// New state of the manual mute flag.
        is_muted: bool,
    },

    /// Tab-visibility driven mute toggle.
    #[serde(rename = "voice:auto-mute", rename_all = "camelCase")]
    AutoMute {
        /// New state of the auto-mute flag.
        is_muted: bool,
    },

    /// Push-to-talk state change.
    #[serde(rename = "voice:push-to-talk", rename_all = "camelCase")]
    PushToTalk {
        /// Whether the push-to-talk input is currently held.
        is_pressed: bool,
    },

    /// Explicit departure from the voice session.
    #[serde(rename = "voice:leave")]
    Leave,
}

/// Events pushed by the signaling server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full roster snapshot; absence from it is deletion.
    #[serde(rename = "voice:participants")]
    Participants {
        /// Every participant currently registered in the room.
        participants: Vec<Participant>,
    },

    /// Single-participant flag update, patched into the roster in place.
    #[serde(rename = "voice:status")]
    Status(Participant),

    /// Inbound SDP offer with server-attributed sender.
    #[serde(rename = "voice:offer", rename_all = "camelCase")]
    Offer {
        /// Sender of the offer.
        from_participant_id: ParticipantId,
        /// The offer description.
        sdp: String,
    },

    /// Inbound SDP answer with server-attributed sender.
    #[serde(rename = "voice:answer", rename_all = "camelCase")]
    Answer {
        /// Sender of the answer.
        from_participant_id: ParticipantId,
        /// The answer description.
        sdp: String,
    },

    /// Inbound ICE candidate with server-attributed sender.
    #[serde(rename = "voice:ice-candidate", rename_all = "camelCase")]
    IceCandidate {
        /// Sender of the candidate.
        from_participant_id: ParticipantId,
        /// The candidate.
        candidate: IceCandidate,
    },

    /// Voice is unavailable because no match is active in the room.
    #[serde(rename = "voice:inactive")]
    Inactive {
        /// Why voice is unavailable, e.g. `match_inactive`.
        reason: String,
    },

    /// Server-forced teardown, e.g. when the match completes.
    #[serde(rename = "voice:shutdown")]
    Shutdown {
        /// Why the session was torn down, e.g. `match_complete`.
        reason: String,
    },
}
