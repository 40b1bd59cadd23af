//! The local voice session: capture lifecycle, state machine, mute
//! logic, and the glue between signaling events, the peer mesh and the
//! audio sinks.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info, warn};

use chit_voice_protocol::{ClientEvent, Participant, ParticipantId, ServerEvent};

use crate::error::{Error, Result};
use crate::media::{
    AudioOutput, LocalTrack, MediaDevices, PeerConnector, PeerEvent, PeerEventHandler, Spawn,
};
use crate::mesh::PeerMesh;
use crate::roster::Roster;
use crate::signaling::{SignalingClient, SignalingEvent, SignalingListener, Subscription};
use crate::sinks::AudioSinks;

/// Teardown reason for a user-initiated leave; no notice is shown for it.
pub const REASON_LOCAL: &str = "local";

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session; joining is possible.
    Idle,
    /// Microphone capture is in flight.
    Starting,
    /// Capturing and meshed; flags and signaling are live.
    Online,
}

/// The outbound track is audible iff not auto-muted and either unmuted
/// or actively pushing to talk. Pure; reapplied after every flag change.
#[must_use]
pub const fn track_enabled(manual_muted: bool, auto_muted: bool, push_active: bool) -> bool {
    !auto_muted && (!manual_muted || push_active)
}

struct SessionState {
    status: SessionStatus,
    /// Bumped on every teardown so in-flight async work can detect that
    /// the session it started under is gone.
    epoch: u64,
    track: Option<Rc<dyn LocalTrack>>,
    mesh: Option<Rc<PeerMesh>>,
    subscription: Option<Subscription>,
    manual_muted: bool,
    auto_muted: bool,
    push_active: bool,
    match_active: bool,
    roster: Roster,
    notice: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            epoch: 0,
            track: None,
            mesh: None,
            subscription: None,
            manual_muted: true,
            auto_muted: false,
            push_active: false,
            match_active: false,
            roster: Roster::default(),
            notice: None,
        }
    }
}

struct SessionInner {
    self_id: ParticipantId,
    signaling: Rc<dyn SignalingClient>,
    devices: Rc<dyn MediaDevices>,
    connector: Rc<dyn PeerConnector>,
    spawner: Rc<dyn Spawn>,
    sinks: AudioSinks,
    state: RefCell<SessionState>,
}

/// Handle to the voice session. Cheap to clone; all clones refer to the
/// same session.
#[derive(Clone)]
pub struct VoiceSession {
    inner: Rc<SessionInner>,
}

impl VoiceSession {
    /// Assemble a session from the platform capabilities and the shared
    /// signaling channel. The session starts idle with default flags
    /// (`manual_muted = true`).
    pub fn new(
        self_id: ParticipantId,
        signaling: Rc<dyn SignalingClient>,
        devices: Rc<dyn MediaDevices>,
        connector: Rc<dyn PeerConnector>,
        output: Rc<dyn AudioOutput>,
        spawner: Rc<dyn Spawn>,
    ) -> Self {
        Self {
            inner: Rc::new(SessionInner {
                self_id,
                signaling,
                devices,
                connector,
                spawner,
                sinks: AudioSinks::new(output),
                state: RefCell::new(SessionState::default()),
            }),
        }
    }

    /// The local participant id.
    #[must_use]
    pub fn self_id(&self) -> ParticipantId {
        self.inner.self_id.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().status
    }

    /// Snapshot of the roster, in server order.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        self.inner.state.borrow().roster.participants().to_vec()
    }

    /// One roster entry.
    #[must_use]
    pub fn participant(&self, id: &ParticipantId) -> Option<Participant> {
        self.inner.state.borrow().roster.get(id).cloned()
    }

    /// Ids of peers the mesh currently holds a connection record for.
    #[must_use]
    pub fn connected_peers(&self) -> Vec<ParticipantId> {
        self.inner
            .state
            .borrow()
            .mesh
            .as_ref()
            .map(|mesh| mesh.peer_ids())
            .unwrap_or_default()
    }

    /// Whether the outbound track is currently audible.
    #[must_use]
    pub fn transmitting(&self) -> bool {
        self.inner
            .state
            .borrow()
            .track
            .as_ref()
            .is_some_and(|track| track.is_enabled())
    }

    /// The transient user-facing message, if one is pending.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        self.inner.state.borrow().notice.clone()
    }

    /// Take and clear the transient user-facing message.
    pub fn take_notice(&self) -> Option<String> {
        self.inner.state.borrow_mut().notice.take()
    }

    /// Tell the session whether a match is running in the room. Going
    /// inactive while a session exists forces a teardown.
    pub fn set_match_active(&self, active: bool) {
        let must_leave = {
            let mut state = self.inner.state.borrow_mut();
            state.match_active = active;
            !active && state.status != SessionStatus::Idle
        };
        if must_leave {
            self.leave("match_inactive");
        }
    }

    /// Join the room's voice mesh.
    ///
    /// Requests microphone capture; on success the track starts
    /// disabled, the session goes online and readiness is announced.
    /// A no-op while not idle.
    ///
    /// # Errors
    /// Capture failures ([`Error::PermissionDenied`],
    /// [`Error::DeviceUnavailable`]) and a disconnected signaling
    /// channel ([`Error::SignalingUnavailable`]); the session stays
    /// idle in every failure case.
    pub async fn join(&self) -> Result<()> {
        let epoch = {
            let mut state = self.inner.state.borrow_mut();
            if state.status != SessionStatus::Idle {
                return Ok(());
            }
            if !state.match_active {
                state.notice = Some("voice is available once the match starts".to_owned());
                return Ok(());
            }
            if !self.inner.signaling.is_connected() {
                state.notice = Some("connection to the room was lost".to_owned());
                return Err(Error::SignalingUnavailable);
            }
            state.status = SessionStatus::Starting;
            state.epoch += 1;
            state.epoch
        };

        let track = match self.inner.devices.capture_microphone().await {
            Ok(track) => track,
            Err(error) => {
                let mut state = self.inner.state.borrow_mut();
                if state.epoch == epoch && state.status == SessionStatus::Starting {
                    state.status = SessionStatus::Idle;
                    state.notice = Some(match &error {
                        Error::PermissionDenied => {
                            "microphone access was denied".to_owned()
                        }
                        Error::DeviceUnavailable => "no microphone is available".to_owned(),
                        other => format!("microphone capture failed: {other}"),
                    });
                }
                return Err(error);
            }
        };

        {
            let mut state = self.inner.state.borrow_mut();
            if state.epoch != epoch || state.status != SessionStatus::Starting {
                // Torn down while the permission prompt was open.
                track.stop();
                return Ok(());
            }
            track.set_enabled(false);
            state.mesh = Some(Rc::new(PeerMesh::new(
                self.inner.self_id.clone(),
                Rc::clone(&self.inner.connector),
                Rc::clone(&self.inner.signaling),
                Rc::clone(&track),
                self.peer_event_handler(),
            )));
            state.track = Some(track);
            state.subscription = Some(self.inner.signaling.subscribe(self.listener()));
            state.status = SessionStatus::Online;
            state.notice = None;
        }
        info!("voice session online as {}", self.inner.self_id);

        if let Err(error) = self.inner.signaling.send(ClientEvent::Ready) {
            warn!("failed to announce readiness: {error}");
            self.leave("signaling_lost");
            return Err(error);
        }
        self.apply_track_enablement();
        Ok(())
    }

    /// Tear the session down: close every peer connection, release every
    /// sink, stop the capture track, notify the server, reset the flags
    /// to their defaults and go idle. Idempotent.
    pub fn leave(&self, reason: &str) {
        let (mesh, track, subscription) = {
            let mut state = self.inner.state.borrow_mut();
            if state.status == SessionStatus::Idle {
                return;
            }
            info!("leaving voice session ({reason})");
            state.status = SessionStatus::Idle;
            state.epoch += 1;
            state.manual_muted = true;
            state.auto_muted = false;
            state.push_active = false;
            state.roster.clear();
            state.notice =
                (reason != REASON_LOCAL).then(|| format!("voice session ended ({reason})"));
            (
                state.mesh.take(),
                state.track.take(),
                state.subscription.take(),
            )
        };
        if let Some(mesh) = mesh {
            mesh.close_all();
        }
        self.inner.sinks.clear();
        if let Some(track) = track {
            track.stop();
        }
        if self.inner.signaling.is_connected() {
            if let Err(error) = self.inner.signaling.send(ClientEvent::Leave) {
                debug!("leave notification not delivered: {error}");
            }
        }
        drop(subscription);
    }

    /// Set the manual mute flag. Only effective while online; recomputes
    /// track enablement and broadcasts the new flag.
    pub fn set_manual_mute(&self, muted: bool) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.status != SessionStatus::Online {
                return;
            }
            state.manual_muted = muted;
            if let Some(me) = state.roster.get_mut(&self.inner.self_id) {
                me.is_muted = muted;
            }
        }
        self.apply_track_enablement();
        self.broadcast(ClientEvent::Mute { is_muted: muted });
    }

    /// Set the visibility-driven mute flag. Independent of the manual
    /// flag and push-to-talk; same enablement and broadcast rules.
    pub fn set_auto_mute(&self, muted: bool) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.status != SessionStatus::Online {
                return;
            }
            state.auto_muted = muted;
            if let Some(me) = state.roster.get_mut(&self.inner.self_id) {
                me.is_auto_muted = muted;
            }
        }
        self.apply_track_enablement();
        self.broadcast(ClientEvent::AutoMute { is_muted: muted });
    }

    /// Set the push-to-talk state. Only effective while online.
    pub fn set_push_to_talk(&self, pressed: bool) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.status != SessionStatus::Online {
                return;
            }
            state.push_active = pressed;
            if let Some(me) = state.roster.get_mut(&self.inner.self_id) {
                me.push_to_talk_pressed = pressed;
            }
        }
        self.apply_track_enablement();
        self.broadcast(ClientEvent::PushToTalk { is_pressed: pressed });
    }

    /// Feed one signaling event into the session. Wired automatically
    /// through the subscription taken on join; exposed for embedders
    /// that dispatch events themselves.
    pub async fn handle_event(&self, event: SignalingEvent) {
        match event {
            SignalingEvent::Disconnected => self.leave("signaling_lost"),
            SignalingEvent::Server(event) => self.handle_server_event(event).await,
        }
    }

    async fn handle_server_event(&self, event: ServerEvent) {
        if self.inner.state.borrow().status != SessionStatus::Online {
            debug!("not online, ignoring server event");
            return;
        }
        match event {
            ServerEvent::Participants { participants } => {
                let ids: Vec<ParticipantId> = participants
                    .iter()
                    .map(|p| p.participant_id.clone())
                    .collect();
                let mesh = {
                    let mut state = self.inner.state.borrow_mut();
                    state.roster.replace(participants);
                    state.mesh.clone()
                };
                if let Some(mesh) = mesh {
                    let removed = mesh.reconcile(&ids).await;
                    for id in &removed {
                        self.inner.sinks.detach(id);
                    }
                }
            }
            ServerEvent::Status(participant) => {
                self.inner.state.borrow_mut().roster.apply_status(participant);
            }
            ServerEvent::Offer {
                from_participant_id,
                sdp,
            } => {
                if let Some(mesh) = self.mesh() {
                    mesh.handle_offer(from_participant_id, sdp).await;
                }
            }
            ServerEvent::Answer {
                from_participant_id,
                sdp,
            } => {
                if let Some(mesh) = self.mesh() {
                    mesh.handle_answer(&from_participant_id, sdp).await;
                }
            }
            ServerEvent::IceCandidate {
                from_participant_id,
                candidate,
            } => {
                if let Some(mesh) = self.mesh() {
                    mesh.handle_candidate(&from_participant_id, candidate).await;
                }
            }
            ServerEvent::Inactive { reason } => {
                self.inner.state.borrow_mut().match_active = false;
                self.leave(&reason);
            }
            ServerEvent::Shutdown { reason } => {
                self.inner.state.borrow_mut().match_active = false;
                self.leave(&reason);
            }
        }
    }

    fn handle_peer_event(&self, peer: ParticipantId, event: PeerEvent) {
        match event {
            PeerEvent::IceCandidate(candidate) => {
                if self.inner.state.borrow().status != SessionStatus::Online {
                    return;
                }
                self.broadcast(ClientEvent::IceCandidate {
                    target_participant_id: peer,
                    candidate,
                });
            }
            PeerEvent::RemoteStream(stream) => {
                let live = self.mesh().is_some_and(|mesh| mesh.contains(&peer));
                if live {
                    self.inner.sinks.attach(peer, stream);
                } else {
                    // Arrived after the record went away; never play it.
                    stream.stop_tracks();
                }
            }
            PeerEvent::ConnectionLost => {
                if let Some(mesh) = self.mesh() {
                    if mesh.handle_connection_lost(&peer) {
                        self.inner.sinks.detach(&peer);
                    }
                }
            }
        }
    }

    fn mesh(&self) -> Option<Rc<PeerMesh>> {
        self.inner.state.borrow().mesh.clone()
    }

    fn apply_track_enablement(&self) {
        let state = self.inner.state.borrow();
        if let Some(track) = &state.track {
            track.set_enabled(track_enabled(
                state.manual_muted,
                state.auto_muted,
                state.push_active,
            ));
        }
    }

    fn broadcast(&self, event: ClientEvent) {
        if let Err(error) = self.inner.signaling.send(event) {
            warn!("failed to broadcast voice event: {error}");
        }
    }

    fn listener(&self) -> SignalingListener {
        let weak = Rc::downgrade(&self.inner);
        let spawner = Rc::clone(&self.inner.spawner);
        Rc::new(move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let session = VoiceSession { inner };
            spawner.spawn_local(Box::pin(async move {
                session.handle_event(event).await;
            }));
        })
    }

    fn peer_event_handler(&self) -> PeerEventHandler {
        let weak = Rc::downgrade(&self.inner);
        Rc::new(move |peer, event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            VoiceSession { inner }.handle_peer_event(peer, event);
        })
    }
}
