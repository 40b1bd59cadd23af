//! `RtcPeerConnection` construction and negotiation primitives.

use std::rc::Rc;

use async_trait::async_trait;
use js_sys::{Array, Object, Reflect};
use log::debug;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    MediaStream, MediaStreamTrack, RtcConfiguration, RtcIceCandidate, RtcIceCandidateInit,
    RtcIceConnectionState, RtcPeerConnection, RtcPeerConnectionIceEvent, RtcSdpType,
    RtcSessionDescriptionInit, RtcTrackEvent,
};

use chit_voice_protocol::{IceCandidate, ParticipantId};

use crate::config::IceConfig;
use crate::error::{Error, Result};
use crate::media::{LocalTrack, PeerConnector, PeerEvent, PeerEventHandler, PeerLink};
use crate::web::js_error;
use crate::web::media::{WebLocalTrack, WebRemoteStream};

/// Builds peer connections configured with the session's STUN hints.
pub struct WebPeerConnector {
    ice: IceConfig,
}

impl WebPeerConnector {
    /// Keep the ICE configuration for every connection built later.
    #[must_use]
    pub fn new(ice: IceConfig) -> Self {
        Self { ice }
    }
}

impl PeerConnector for WebPeerConnector {
    fn connect(
        &self,
        peer: &ParticipantId,
        local_track: Rc<dyn LocalTrack>,
        events: PeerEventHandler,
    ) -> Result<Rc<dyn PeerLink>> {
        let connection = create_peer_connection(&self.ice)?;

        let local = local_track
            .as_any()
            .downcast_ref::<WebLocalTrack>()
            .ok_or_else(|| {
                Error::Platform(anyhow::anyhow!("local track is not a browser capture"))
            })?;
        for track in local.stream().get_audio_tracks().iter() {
            if let Ok(track) = track.dyn_into::<MediaStreamTrack>() {
                connection.add_track(&track, local.stream(), &Array::new());
            }
        }

        set_on_ice_candidate(&connection, peer.clone(), Rc::clone(&events));
        set_on_track(&connection, peer.clone(), Rc::clone(&events));
        set_on_ice_connection_state_change(&connection, peer.clone(), events);

        Ok(Rc::new(WebPeerLink { connection }))
    }
}

fn create_peer_connection(ice: &IceConfig) -> Result<RtcPeerConnection> {
    let ice_servers = Array::new();
    for url in ice.stun_servers() {
        let server_entry = Object::new();
        Reflect::set(&server_entry, &"urls".into(), &JsValue::from_str(url))
            .map_err(|error| js_error("failed to build ICE server entry", &error))?;
        ice_servers.push(&server_entry);
    }

    let configuration = RtcConfiguration::new();
    configuration.set_ice_servers(&ice_servers);

    RtcPeerConnection::new_with_configuration(&configuration)
        .map_err(|error| js_error("failed to create peer connection", &error))
}

fn set_on_ice_candidate(
    connection: &RtcPeerConnection,
    peer: ParticipantId,
    events: PeerEventHandler,
) {
    let on_ice_candidate = Closure::wrap(Box::new(move |ev: RtcPeerConnectionIceEvent| {
        if let Some(candidate) = ev.candidate() {
            let candidate = IceCandidate {
                candidate: candidate.candidate(),
                sdp_mid: candidate.sdp_mid(),
                sdp_m_line_index: candidate.sdp_m_line_index(),
            };
            events(peer.clone(), PeerEvent::IceCandidate(candidate));
        }
    }) as Box<dyn FnMut(RtcPeerConnectionIceEvent)>);
    connection.set_onicecandidate(Some(on_ice_candidate.as_ref().unchecked_ref()));
    on_ice_candidate.forget();
}

fn set_on_track(connection: &RtcPeerConnection, peer: ParticipantId, events: PeerEventHandler) {
    let on_track = Closure::wrap(Box::new(move |ev: RtcTrackEvent| {
        if let Ok(stream) = ev.streams().get(0).dyn_into::<MediaStream>() {
            let stream = Rc::new(WebRemoteStream::new(stream));
            events(peer.clone(), PeerEvent::RemoteStream(stream));
        }
    }) as Box<dyn FnMut(RtcTrackEvent)>);
    connection.set_ontrack(Some(on_track.as_ref().unchecked_ref()));
    on_track.forget();
}

fn set_on_ice_connection_state_change(
    connection: &RtcPeerConnection,
    peer: ParticipantId,
    events: PeerEventHandler,
) {
    let connection_clone = connection.clone();
    let on_state_change = Closure::wrap(Box::new(move || {
        let state = connection_clone.ice_connection_state();
        debug!("ice connection state for {peer}: {state:?}");
        if matches!(
            state,
            RtcIceConnectionState::Failed | RtcIceConnectionState::Disconnected
        ) {
            events(peer.clone(), PeerEvent::ConnectionLost);
        }
    }) as Box<dyn FnMut()>);
    connection.set_oniceconnectionstatechange(Some(on_state_change.as_ref().unchecked_ref()));
    on_state_change.forget();
}

struct WebPeerLink {
    connection: RtcPeerConnection,
}

impl WebPeerLink {
    async fn set_local_description(&self, kind: RtcSdpType, sdp: &str) -> Result<()> {
        let description = RtcSessionDescriptionInit::new(kind);
        description.set_sdp(sdp);
        JsFuture::from(self.connection.set_local_description(&description))
            .await
            .map_err(|error| js_error("failed to set local description", &error))?;
        Ok(())
    }

    async fn set_remote_description(&self, kind: RtcSdpType, sdp: &str) -> Result<()> {
        let description = RtcSessionDescriptionInit::new(kind);
        description.set_sdp(sdp);
        JsFuture::from(self.connection.set_remote_description(&description))
            .await
            .map_err(|error| js_error("failed to set remote description", &error))?;
        Ok(())
    }
}

fn description_sdp(description: &JsValue) -> Result<String> {
    Reflect::get(description, &JsValue::from_str("sdp"))
        .map_err(|error| js_error("description has no sdp field", &error))?
        .as_string()
        .ok_or_else(|| Error::Platform(anyhow::anyhow!("description sdp is not a string")))
}

#[async_trait(?Send)]
impl PeerLink for WebPeerLink {
    async fn create_offer(&self) -> Result<String> {
        let offer = JsFuture::from(self.connection.create_offer())
            .await
            .map_err(|error| js_error("failed to create offer", &error))?;
        let sdp = description_sdp(&offer)?;
        self.set_local_description(RtcSdpType::Offer, &sdp).await?;
        Ok(sdp)
    }

    async fn create_answer(&self, offer: &str) -> Result<String> {
        self.set_remote_description(RtcSdpType::Offer, offer).await?;
        let answer = JsFuture::from(self.connection.create_answer())
            .await
            .map_err(|error| js_error("failed to create answer", &error))?;
        let sdp = description_sdp(&answer)?;
        self.set_local_description(RtcSdpType::Answer, &sdp).await?;
        Ok(sdp)
    }

    async fn apply_answer(&self, answer: &str) -> Result<()> {
        self.set_remote_description(RtcSdpType::Answer, answer).await
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let init = RtcIceCandidateInit::new(&candidate.candidate);
        init.set_sdp_mid(candidate.sdp_mid.as_deref());
        init.set_sdp_m_line_index(candidate.sdp_m_line_index);
        let rtc_candidate = RtcIceCandidate::new(&init)
            .map_err(|error| js_error("failed to build ICE candidate", &error))?;
        JsFuture::from(
            self.connection
                .add_ice_candidate_with_opt_rtc_ice_candidate(Some(&rtc_candidate)),
        )
        .await
        .map_err(|error| js_error("failed to add ICE candidate", &error))?;
        Ok(())
    }

    fn close(&self) {
        self.connection.close();
    }
}
