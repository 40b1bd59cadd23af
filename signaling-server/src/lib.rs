/*!
Room-scoped voice signaling relay.

One WebSocket per participant, scoped to a room
(`GET /rooms/{room_code}/voice`). The server keeps the per-room voice
roster with its mute/push flags, forwards offers, answers and ICE
candidates between participants with sender attribution, and gates
voice on the room's match being active. It never touches media: audio
flows peer to peer.
*/

pub mod router;
pub mod voice;
