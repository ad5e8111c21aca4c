use serde::{Deserialize, Serialize};

pub type PlayerId = u32;
pub type PartyId = u32;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PARTY_SIZE: usize = 4;
pub const INVITE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_PARTIES: usize = 16;
pub const DEFAULT_MEMBER_POOL_SLOTS: usize = DEFAULT_MAX_PARTIES * MAX_PARTY_SIZE;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
        name: String,
        level: u32,
    },
    RequestInvite {
        target: PlayerId,
    },
    RespondToInvite {
        inviter: PlayerId,
        accept: bool,
    },
    LeaveParty,
    Disconnect,

    Connected {
        player_id: PlayerId,
    },
    Disconnected {
        reason: String,
    },
    MembershipChanged {
        party_id: PartyId,
        members: Vec<PlayerId>,
        leader: PlayerId,
    },
    PartyDissolved {
        party_id: PartyId,
    },
    InviteReceived {
        inviter: PlayerId,
        inviter_name: String,
        inviter_level: u32,
    },
    InviteAccepted {
        responder_name: String,
    },
    InviteDeclined {
        responder_name: String,
    },
    InviteError {
        reason: String,
    },
}
