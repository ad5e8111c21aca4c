//! Request-level orchestration of the party subsystem.
//!
//! The coordinator owns the player directory, the membership engine, the
//! invite ledger, and the event dispatcher, and is the single entry point
//! for the three client requests (invite, respond, leave). All handlers run
//! on the authoritative server task; state commits before events go out,
//! and a failed delivery never rolls state back.

use crate::events::{EventDispatcher, PartyEvent};
use crate::invites::{InviteLedger, PendingInvite};
use crate::party::{EngineError, PartyEngine};
use crate::registry::PlayerDirectory;
use log::{info, warn};
use shared::{PlayerId, MAX_PARTY_SIZE};

pub struct PartyCoordinator {
    directory: PlayerDirectory,
    engine: PartyEngine,
    invites: InviteLedger,
    dispatcher: EventDispatcher,
    invite_timeout_ms: u64,
}

impl PartyCoordinator {
    pub fn new(max_parties: usize, invite_timeout_ms: u64) -> Self {
        Self {
            directory: PlayerDirectory::new(),
            engine: PartyEngine::new(max_parties, max_parties * MAX_PARTY_SIZE),
            invites: InviteLedger::new(),
            dispatcher: EventDispatcher::new(),
            invite_timeout_ms,
        }
    }

    pub fn register_player(&mut self, name: &str, level: u32) -> PlayerId {
        self.directory.register(name, level)
    }

    pub fn directory(&self) -> &PlayerDirectory {
        &self.directory
    }

    pub fn engine(&self) -> &PartyEngine {
        &self.engine
    }

    pub fn register_sink<F>(&mut self, id: &str, sink: F)
    where
        F: FnMut(&PartyEvent) + Send + 'static,
    {
        self.dispatcher.register(id, sink);
    }

    pub fn deregister_sink(&mut self, id: &str) -> bool {
        self.dispatcher.deregister(id)
    }

    /// Validates and records an invite. Rejections go back to the inviter
    /// only; nothing else observes a failed request.
    pub fn handle_invite_request(&mut self, inviter: PlayerId, target: PlayerId, now: u64) {
        let Some(inviter_name) = self.directory.display_name(inviter).map(String::from) else {
            warn!("Invite request from unknown player {}", inviter);
            return;
        };

        if inviter == target {
            return self.deny_invite(inviter, "You cannot invite yourself.");
        }
        if !self.directory.contains(target) {
            return self.deny_invite(inviter, "That player is no longer online.");
        }
        if let Some(party_id) = self.directory.cached_party_id(inviter) {
            if !self.engine.is_leader(inviter, party_id) {
                return self.deny_invite(inviter, "Only the party leader can send invites.");
            }
            if self.engine.is_party_full(party_id) {
                return self.deny_invite(inviter, "Your party is full.");
            }
        }
        if self.directory.cached_party_id(target).is_some() {
            return self.deny_invite(inviter, "That player is already in a party.");
        }

        let inviter_level = self.directory.level(inviter).unwrap_or(0);
        let created = self.invites.try_create(PendingInvite {
            inviter,
            target,
            inviter_name: inviter_name.clone(),
            inviter_level,
            created_at: now,
        });
        if !created {
            // Racing invites for one target: first creation wins.
            return self.deny_invite(inviter, "That player already has a pending invite.");
        }

        self.dispatch(PartyEvent::InviteReceived {
            target,
            inviter,
            inviter_name,
            inviter_level,
        });
    }

    /// Resolves a pending invite. A response naming an inviter that is not
    /// on record for this responder is dropped: it is indistinguishable
    /// from a client racing an expiry sweep.
    pub fn handle_invite_response(&mut self, responder: PlayerId, inviter: PlayerId, accept: bool) {
        let Some(invite) = self.invites.try_consume(responder, inviter) else {
            warn!(
                "Ignoring invite response from {} naming {}: no matching pending invite",
                responder, inviter
            );
            return;
        };

        let responder_name = self
            .directory
            .display_name(responder)
            .unwrap_or("")
            .to_string();

        if !accept {
            self.dispatch(PartyEvent::InviteDeclined {
                inviter,
                responder_name,
            });
            return;
        }

        // The world may have moved on since the invite was created: the
        // responder can have formed a party of their own, and the inviter's
        // party can have filled, changed leader, or dissolved. Re-check
        // against current state before mutating.
        if self.directory.cached_party_id(responder).is_some() {
            return self.deny_invite(responder, "You are already in a party.");
        }
        if !self.directory.contains(invite.inviter) {
            return self.deny_invite(responder, "The inviter is no longer online.");
        }

        let result = match self.directory.cached_party_id(invite.inviter) {
            None => self
                .engine
                .create_party(&mut self.directory, invite.inviter, responder)
                .map(|(_, event)| event),
            Some(party_id) => {
                if !self.engine.is_leader(invite.inviter, party_id) {
                    return self.deny_invite(responder, "That party has a new leader.");
                }
                self.engine
                    .add_member(&mut self.directory, party_id, responder)
            }
        };

        match result {
            Ok(event) => {
                self.dispatch(PartyEvent::InviteAccepted {
                    inviter,
                    responder_name,
                });
                self.dispatch(event);
            }
            Err(EngineError::PartyFull(_)) => {
                self.deny_invite(responder, "That party is now full.");
            }
            Err(err @ (EngineError::PartyTableExhausted | EngineError::MemberPoolExhausted)) => {
                // Capacity planning problem, not user error.
                warn!("Party allocation failed on accept: {}", err);
                self.deny_invite(responder, "No party slots are available right now.");
            }
            Err(err) => {
                warn!("Invite acceptance by {} failed: {}", responder, err);
                self.deny_invite(responder, "That party no longer exists.");
            }
        }
    }

    pub fn handle_leave_request(&mut self, player: PlayerId) {
        let Some(party_id) = self.directory.cached_party_id(player) else {
            warn!("Leave request from player {} who is not in a party", player);
            return;
        };
        self.remove_from_party(player, party_id);
    }

    /// Disconnect path: leaves any party, drops invites on both sides, then
    /// forgets the player.
    pub fn handle_disconnect(&mut self, player: PlayerId) {
        if let Some(party_id) = self.directory.cached_party_id(player) {
            self.remove_from_party(player, party_id);
        }
        for invite in self.invites.remove_involving(player) {
            info!(
                "Dropped pending invite from {} to {} on disconnect of {}",
                invite.inviter, invite.target, player
            );
        }
        self.directory.remove(player);
    }

    /// Tick-driven expiry. Expired invites vanish silently; anyone acting
    /// on one afterwards gets a clean rejection from normal validation.
    pub fn sweep_invites(&mut self, now: u64) {
        for invite in self.invites.sweep_expired(now, self.invite_timeout_ms) {
            info!(
                "Invite from {} to {} expired unanswered",
                invite.inviter, invite.target
            );
        }
    }

    fn remove_from_party(&mut self, player: PlayerId, party_id: shared::PartyId) {
        match self.engine.remove_player(&mut self.directory, party_id, player) {
            Ok(events) => {
                for event in events {
                    self.dispatch(event);
                }
            }
            Err(err) => {
                // Engine already logged the invariant breach; state is
                // untouched, nothing to notify.
                warn!("Removal of {} from party {} failed: {}", player, party_id, err);
            }
        }
    }

    fn deny_invite(&mut self, target: PlayerId, reason: &str) {
        self.dispatch(PartyEvent::InviteError {
            target,
            reason: reason.to_string(),
        });
    }

    fn dispatch(&mut self, event: PartyEvent) {
        self.dispatcher.dispatch(&event);
    }
}
