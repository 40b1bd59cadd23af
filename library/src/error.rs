use chit_voice_protocol::ParticipantId;

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the voice core.
///
/// Per-peer negotiation failures never abort the session; they are logged
/// at the point of occurrence and only reach this type when a caller asks
/// for them explicitly. Session-level failures (microphone capture,
/// signaling loss) always leave the session idle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The user denied the microphone permission prompt.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No usable capture device, or the device could not be opened.
    #[error("microphone unavailable")]
    DeviceUnavailable,

    /// The signaling channel is not connected.
    #[error("signaling channel unavailable")]
    SignalingUnavailable,

    /// Offer/answer/candidate processing failed for a single peer.
    #[error("negotiation with {participant} failed: {message}")]
    NegotiationFailure {
        /// The peer the failure is isolated to.
        participant: ParticipantId,
        /// Platform-provided detail.
        message: String,
    },

    /// Failure inside a platform adapter (browser API call, etc).
    #[error(transparent)]
    Platform(#[from] anyhow::Error),
}
