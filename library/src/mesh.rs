//! Full-mesh peer connection table and negotiation.
//!
//! One record per remote participant, keyed by id. The table is driven
//! from two sides: roster snapshots (create/remove records) and relayed
//! signaling (offer/answer/candidate per record). Negotiation for one
//! peer never touches another peer's record, and a failed step is logged
//! and confined to that peer.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::{debug, info, warn};

use chit_voice_protocol::{ClientEvent, IceCandidate, ParticipantId};

use crate::media::{LocalTrack, PeerConnector, PeerEventHandler, PeerLink};
use crate::signaling::SignalingClient;

struct PeerRecord {
    link: Rc<dyn PeerLink>,
    negotiated: bool,
}

/// The set of peer connections for one voice session.
///
/// Created when the session comes online (the local track exists by
/// then) and dropped on teardown, so every operation here can assume a
/// capture track.
pub struct PeerMesh {
    self_id: ParticipantId,
    connector: Rc<dyn PeerConnector>,
    signaling: Rc<dyn SignalingClient>,
    local_track: Rc<dyn LocalTrack>,
    events: PeerEventHandler,
    records: RefCell<HashMap<ParticipantId, PeerRecord>>,
}

impl PeerMesh {
    /// Assemble a mesh around the captured local track.
    pub fn new(
        self_id: ParticipantId,
        connector: Rc<dyn PeerConnector>,
        signaling: Rc<dyn SignalingClient>,
        local_track: Rc<dyn LocalTrack>,
        events: PeerEventHandler,
    ) -> Self {
        Self {
            self_id,
            connector,
            signaling,
            local_track,
            events,
            records: RefCell::new(HashMap::new()),
        }
    }

    /// Deterministic initiator tie-break: the lexicographically lower id
    /// offers, the higher id waits for the offer.
    fn initiates_toward(&self, peer: &ParticipantId) -> bool {
        self.self_id < *peer
    }

    /// Bring the record set in line with a roster snapshot.
    ///
    /// Safe to call repeatedly with overlapping or reordered rosters;
    /// per-id work is idempotent. Returns the ids whose records were
    /// removed so the caller can release their audio sinks.
    pub async fn reconcile(&self, roster_ids: &[ParticipantId]) -> Vec<ParticipantId> {
        let active: HashSet<&ParticipantId> = roster_ids
            .iter()
            .filter(|id| **id != self.self_id)
            .collect();

        let stale: Vec<ParticipantId> = self
            .records
            .borrow()
            .keys()
            .filter(|id| !active.contains(*id))
            .cloned()
            .collect();
        for id in &stale {
            if let Some(record) = self.records.borrow_mut().remove(id) {
                record.link.close();
                info!("peer {id} left the roster, connection closed");
            }
        }

        for id in roster_ids {
            if *id == self.self_id || self.records.borrow().contains_key(id) {
                continue;
            }
            let link = match self.connector.connect(
                id,
                Rc::clone(&self.local_track),
                Rc::clone(&self.events),
            ) {
                Ok(link) => link,
                Err(error) => {
                    warn!("failed to create peer connection for {id}: {error}");
                    continue;
                }
            };
            // No suspension point between the contains check above and
            // this insert, so a roster update arriving mid-negotiation
            // cannot create a second record for the same peer.
            self.records.borrow_mut().insert(
                id.clone(),
                PeerRecord {
                    link: Rc::clone(&link),
                    negotiated: false,
                },
            );
            if self.initiates_toward(id) {
                self.send_offer(id, link).await;
            } else {
                debug!("awaiting offer from {id}");
            }
        }

        stale
    }

    async fn send_offer(&self, peer: &ParticipantId, link: Rc<dyn PeerLink>) {
        let offer = match link.create_offer().await {
            Ok(offer) => offer,
            Err(error) => {
                warn!("failed to create offer for {peer}: {error}");
                return;
            }
        };
        if !self.records.borrow().contains_key(peer) {
            debug!("peer {peer} removed while creating offer, dropping it");
            return;
        }
        let event = ClientEvent::Offer {
            target_participant_id: peer.clone(),
            sdp: offer,
        };
        if let Err(error) = self.signaling.send(event) {
            warn!("failed to relay offer to {peer}: {error}");
        }
    }

    /// Answer an inbound offer, creating the record when it is the first
    /// contact from that peer.
    pub async fn handle_offer(&self, from: ParticipantId, sdp: String) {
        let existing = self
            .records
            .borrow()
            .get(&from)
            .map(|record| (Rc::clone(&record.link), record.negotiated));
        let link = match existing {
            Some((link, negotiated)) => {
                if !negotiated && self.initiates_toward(&from) {
                    warn!("offer glare with {from}, answering their offer");
                }
                link
            }
            None => {
                let link = match self.connector.connect(
                    &from,
                    Rc::clone(&self.local_track),
                    Rc::clone(&self.events),
                ) {
                    Ok(link) => link,
                    Err(error) => {
                        warn!("failed to create peer connection for {from}: {error}");
                        return;
                    }
                };
                self.records.borrow_mut().insert(
                    from.clone(),
                    PeerRecord {
                        link: Rc::clone(&link),
                        negotiated: false,
                    },
                );
                link
            }
        };

        let answer = match link.create_answer(&sdp).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!("failed to answer offer from {from}: {error}");
                return;
            }
        };
        match self.records.borrow_mut().get_mut(&from) {
            Some(record) => record.negotiated = true,
            None => {
                debug!("peer {from} removed while answering, dropping answer");
                return;
            }
        }
        let event = ClientEvent::Answer {
            target_participant_id: from.clone(),
            sdp: answer,
        };
        if let Err(error) = self.signaling.send(event) {
            warn!("failed to relay answer to {from}: {error}");
        }
    }

    /// Apply an inbound answer. Answers for unknown peers are late or
    /// stale and dropped silently.
    pub async fn handle_answer(&self, from: &ParticipantId, sdp: String) {
        let link = match self.records.borrow().get(from) {
            Some(record) => Rc::clone(&record.link),
            None => {
                debug!("stale answer from {from}, dropping");
                return;
            }
        };
        match link.apply_answer(&sdp).await {
            Ok(()) => {
                if let Some(record) = self.records.borrow_mut().get_mut(from) {
                    record.negotiated = true;
                    debug!("negotiation with {from} complete");
                }
            }
            Err(error) => warn!("failed to apply answer from {from}: {error}"),
        }
    }

    /// Add a relayed candidate to the peer's connection. A failed add is
    /// a lost path proposal, not a broken peer.
    pub async fn handle_candidate(&self, from: &ParticipantId, candidate: IceCandidate) {
        let link = match self.records.borrow().get(from) {
            Some(record) => Rc::clone(&record.link),
            None => {
                debug!("candidate for unknown peer {from}, dropping");
                return;
            }
        };
        if let Err(error) = link.add_ice_candidate(&candidate).await {
            warn!("failed to add candidate from {from}: {error}");
        }
    }

    /// Clean up after an asynchronously observed connection loss.
    /// Returns whether a record was actually removed.
    pub fn handle_connection_lost(&self, peer: &ParticipantId) -> bool {
        match self.records.borrow_mut().remove(peer) {
            Some(record) => {
                record.link.close();
                info!("connection to {peer} lost, record removed");
                true
            }
            None => false,
        }
    }

    /// Close every connection and clear the table; used on teardown.
    pub fn close_all(&self) {
        for (id, record) in self.records.borrow_mut().drain() {
            record.link.close();
            debug!("closed connection to {id}");
        }
    }

    /// Ids of all live records.
    #[must_use]
    pub fn peer_ids(&self) -> Vec<ParticipantId> {
        self.records.borrow().keys().cloned().collect()
    }

    /// Whether a record exists for `peer`.
    #[must_use]
    pub fn contains(&self, peer: &ParticipantId) -> bool {
        self.records.borrow().contains_key(peer)
    }

    /// Whether the record for `peer` finished the offer/answer exchange.
    #[must_use]
    pub fn is_negotiated(&self, peer: &ParticipantId) -> bool {
        self.records
            .borrow()
            .get(peer)
            .is_some_and(|record| record.negotiated)
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Whether the mesh holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}
