//! In-memory capability fakes shared by the unit tests.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::channel::oneshot;
use futures::task::noop_waker;

use chit_voice_protocol::{ClientEvent, IceCandidate, ParticipantId, ServerEvent};

use crate::error::{Error, Result};
use crate::media::{
    AudioOutput, LocalFuture, LocalTrack, MediaDevices, PeerConnector, PeerEvent,
    PeerEventHandler, PeerLink, RemoteStream, Spawn,
};
use crate::signaling::{SignalingClient, SignalingEvent, SignalingListener, Subscription};

/// Signaling channel that records outbound events and lets tests push
/// inbound ones.
pub struct FakeSignaling {
    connected: Cell<bool>,
    sent: RefCell<Vec<ClientEvent>>,
    listeners: Rc<RefCell<HashMap<u64, SignalingListener>>>,
    next_listener: Cell<u64>,
}

impl FakeSignaling {
    pub fn connected() -> Self {
        Self {
            connected: Cell::new(true),
            sent: RefCell::new(Vec::new()),
            listeners: Rc::new(RefCell::new(HashMap::new())),
            next_listener: Cell::new(0),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
    }

    pub fn sent(&self) -> Vec<ClientEvent> {
        self.sent.borrow().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn dispatch(&self, event: SignalingEvent) {
        let listeners: Vec<SignalingListener> =
            self.listeners.borrow().values().map(Rc::clone).collect();
        for listener in listeners {
            listener(event.clone());
        }
    }

    /// Push a server event to every subscriber.
    pub fn emit(&self, event: ServerEvent) {
        self.dispatch(SignalingEvent::Server(event));
    }

    /// Drop the channel and tell every subscriber.
    pub fn disconnect(&self) {
        self.connected.set(false);
        self.dispatch(SignalingEvent::Disconnected);
    }
}

impl SignalingClient for FakeSignaling {
    fn send(&self, event: ClientEvent) -> Result<()> {
        if !self.connected.get() {
            return Err(Error::SignalingUnavailable);
        }
        self.sent.borrow_mut().push(event);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.get()
    }

    fn subscribe(&self, listener: SignalingListener) -> Subscription {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().insert(id, listener);
        let listeners = Rc::clone(&self.listeners);
        Subscription::new(move || {
            listeners.borrow_mut().remove(&id);
        })
    }
}

/// Capture track whose enablement and stop state are observable.
#[derive(Default)]
pub struct FakeTrack {
    enabled: Cell<bool>,
    stopped: Cell<bool>,
}

impl FakeTrack {
    pub fn stopped(&self) -> bool {
        self.stopped.get()
    }
}

impl LocalTrack for FakeTrack {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn stop(&self) {
        self.stopped.set(true);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Microphone source: succeeds with a fresh [`FakeTrack`] unless primed
/// to fail, and can be gated to model the open permission prompt.
#[derive(Default)]
pub struct FakeDevices {
    fail_with: RefCell<Option<Error>>,
    gate: RefCell<Option<oneshot::Receiver<()>>>,
    captured: RefCell<Vec<Rc<FakeTrack>>>,
}

impl FakeDevices {
    pub fn fail_next(&self, error: Error) {
        *self.fail_with.borrow_mut() = Some(error);
    }

    /// Make the next capture wait until the returned sender fires.
    pub fn gate_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.borrow_mut() = Some(rx);
        tx
    }

    pub fn capture_count(&self) -> usize {
        self.captured.borrow().len()
    }

    pub fn last_track(&self) -> Option<Rc<FakeTrack>> {
        self.captured.borrow().last().map(Rc::clone)
    }
}

#[async_trait(?Send)]
impl MediaDevices for FakeDevices {
    async fn capture_microphone(&self) -> Result<Rc<dyn LocalTrack>> {
        let gate = self.gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(error) = self.fail_with.borrow_mut().take() {
            return Err(error);
        }
        let track = Rc::new(FakeTrack::default());
        self.captured.borrow_mut().push(Rc::clone(&track));
        Ok(track)
    }
}

/// Peer link that records every negotiation step.
pub struct FakeLink {
    peer: ParticipantId,
    offers: Cell<u32>,
    answers: Cell<u32>,
    applied_answers: RefCell<Vec<String>>,
    candidates: RefCell<Vec<IceCandidate>>,
    fail_candidates: Cell<bool>,
    closed: Cell<bool>,
}

impl FakeLink {
    fn new(peer: ParticipantId) -> Self {
        Self {
            peer,
            offers: Cell::new(0),
            answers: Cell::new(0),
            applied_answers: RefCell::new(Vec::new()),
            candidates: RefCell::new(Vec::new()),
            fail_candidates: Cell::new(false),
            closed: Cell::new(false),
        }
    }

    pub fn offered(&self) -> u32 {
        self.offers.get()
    }

    pub fn answered(&self) -> u32 {
        self.answers.get()
    }

    pub fn applied_answers(&self) -> Vec<String> {
        self.applied_answers.borrow().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.borrow().clone()
    }

    pub fn fail_candidates(&self, fail: bool) {
        self.fail_candidates.set(fail);
    }

    pub fn closed(&self) -> bool {
        self.closed.get()
    }
}

#[async_trait(?Send)]
impl PeerLink for FakeLink {
    async fn create_offer(&self) -> Result<String> {
        self.offers.set(self.offers.get() + 1);
        Ok(format!("offer-for-{}", self.peer))
    }

    async fn create_answer(&self, _offer: &str) -> Result<String> {
        self.answers.set(self.answers.get() + 1);
        Ok(format!("answer-for-{}", self.peer))
    }

    async fn apply_answer(&self, answer: &str) -> Result<()> {
        self.applied_answers.borrow_mut().push(answer.to_owned());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        if self.fail_candidates.get() {
            return Err(Error::NegotiationFailure {
                participant: self.peer.clone(),
                message: "candidate rejected".to_owned(),
            });
        }
        self.candidates.borrow_mut().push(candidate.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.set(true);
    }
}

/// Connection factory that keeps every produced link and its event
/// handler around for inspection and injection.
#[derive(Default)]
pub struct FakeConnector {
    links: RefCell<HashMap<ParticipantId, Rc<FakeLink>>>,
    handlers: RefCell<HashMap<ParticipantId, PeerEventHandler>>,
    connects: Cell<usize>,
    fail: Cell<bool>,
}

impl FakeConnector {
    pub fn fail_connects(&self, fail: bool) {
        self.fail.set(fail);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.get()
    }

    pub fn link(&self, peer: &ParticipantId) -> Option<Rc<FakeLink>> {
        self.links.borrow().get(peer).map(Rc::clone)
    }

    /// Fire a peer event as the platform would.
    pub fn emit(&self, peer: &ParticipantId, event: PeerEvent) {
        let handler = self.handlers.borrow().get(peer).map(Rc::clone);
        if let Some(handler) = handler {
            handler(peer.clone(), event);
        }
    }
}

impl PeerConnector for FakeConnector {
    fn connect(
        &self,
        peer: &ParticipantId,
        _local_track: Rc<dyn LocalTrack>,
        events: PeerEventHandler,
    ) -> Result<Rc<dyn PeerLink>> {
        if self.fail.get() {
            return Err(Error::Platform(anyhow::anyhow!("connector primed to fail")));
        }
        self.connects.set(self.connects.get() + 1);
        let link = Rc::new(FakeLink::new(peer.clone()));
        self.links.borrow_mut().insert(peer.clone(), Rc::clone(&link));
        self.handlers.borrow_mut().insert(peer.clone(), events);
        Ok(link)
    }
}

/// Remote stream with an observable stop flag.
pub struct FakeStream {
    id: String,
    stopped: Cell<bool>,
}

impl FakeStream {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            stopped: Cell::new(false),
        }
    }

    pub fn stopped(&self) -> bool {
        self.stopped.get()
    }
}

impl RemoteStream for FakeStream {
    fn stream_id(&self) -> String {
        self.id.clone()
    }

    fn stop_tracks(&self) {
        self.stopped.set(true);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Playback capability that records bindings.
#[derive(Default)]
pub struct FakeOutput {
    bound: RefCell<HashMap<ParticipantId, String>>,
    binds: Cell<usize>,
}

impl FakeOutput {
    pub fn bound(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<ParticipantId> = self.bound.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn bind_count(&self) -> usize {
        self.binds.get()
    }
}

impl AudioOutput for FakeOutput {
    fn bind(&self, participant: &ParticipantId, stream: &Rc<dyn RemoteStream>) -> Result<()> {
        self.binds.set(self.binds.get() + 1);
        self.bound
            .borrow_mut()
            .insert(participant.clone(), stream.stream_id());
        Ok(())
    }

    fn unbind(&self, participant: &ParticipantId) {
        self.bound.borrow_mut().remove(participant);
    }
}

/// Spawner that queues futures and polls them when the test says so,
/// keeping event handling deterministic.
#[derive(Default)]
pub struct StepSpawner {
    queued: RefCell<Vec<LocalFuture>>,
}

impl StepSpawner {
    /// Poll every queued future once; with the fakes in this module a
    /// single poll always completes them. Unfinished futures stay queued.
    pub fn run(&self) {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let queued = std::mem::take(&mut *self.queued.borrow_mut());
        for mut future in queued {
            if let Poll::Pending = future.as_mut().poll(&mut cx) {
                self.queued.borrow_mut().push(future);
            }
        }
    }
}

impl Spawn for StepSpawner {
    fn spawn_local(&self, future: LocalFuture) {
        self.queued.borrow_mut().push(future);
    }
}
