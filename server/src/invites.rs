//! Pending party invites, keyed by target player.
//!
//! The ledger enforces at most one outstanding invite per target and expires
//! unanswered entries on the server tick. Timestamps are supplied by the
//! caller in milliseconds so tests can drive a fake clock.

use shared::PlayerId;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvite {
    pub inviter: PlayerId,
    pub target: PlayerId,
    /// Snapshot taken at creation; not re-fetched if the inviter's state
    /// changes before the invite resolves.
    pub inviter_name: String,
    pub inviter_level: u32,
    pub created_at: u64,
}

pub struct InviteLedger {
    pending: HashMap<PlayerId, PendingInvite>,
}

impl InviteLedger {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Inserts the invite unless its target already has one pending.
    pub fn try_create(&mut self, invite: PendingInvite) -> bool {
        debug_assert_ne!(invite.inviter, invite.target);

        if self.pending.contains_key(&invite.target) {
            return false;
        }
        self.pending.insert(invite.target, invite);
        true
    }

    /// Removes and returns the target's invite only if its inviter matches.
    /// A mismatch mutates nothing, so a stale or forged response cannot
    /// clobber the invite currently on record.
    pub fn try_consume(
        &mut self,
        target: PlayerId,
        expected_inviter: PlayerId,
    ) -> Option<PendingInvite> {
        match self.pending.get(&target) {
            Some(invite) if invite.inviter == expected_inviter => self.pending.remove(&target),
            _ => None,
        }
    }

    pub fn has_pending(&self, target: PlayerId) -> bool {
        self.pending.contains_key(&target)
    }

    pub fn pending_for(&self, target: PlayerId) -> Option<&PendingInvite> {
        self.pending.get(&target)
    }

    /// Drops every invite the player is involved in, either side. Used when
    /// a player disconnects mid-handshake.
    pub fn remove_involving(&mut self, player: PlayerId) -> Vec<PendingInvite> {
        let keys: Vec<PlayerId> = self
            .pending
            .iter()
            .filter(|(_, invite)| invite.target == player || invite.inviter == player)
            .map(|(target, _)| *target)
            .collect();

        keys.iter()
            .filter_map(|target| self.pending.remove(target))
            .collect()
    }

    /// Removes every invite older than `timeout_ms` and returns the removed
    /// entries so the caller can log them. Run once per server tick.
    pub fn sweep_expired(&mut self, now: u64, timeout_ms: u64) -> Vec<PendingInvite> {
        let expired: Vec<PlayerId> = self
            .pending
            .iter()
            .filter(|(_, invite)| now.saturating_sub(invite.created_at) > timeout_ms)
            .map(|(target, _)| *target)
            .collect();

        expired
            .iter()
            .filter_map(|target| self.pending.remove(target))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for InviteLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(inviter: PlayerId, target: PlayerId, created_at: u64) -> PendingInvite {
        PendingInvite {
            inviter,
            target,
            inviter_name: format!("player-{}", inviter),
            inviter_level: 10,
            created_at,
        }
    }

    #[test]
    fn test_single_invite_per_target() {
        let mut ledger = InviteLedger::new();

        assert!(ledger.try_create(invite(1, 2, 0)));
        assert!(!ledger.try_create(invite(3, 2, 0)));
        assert_eq!(ledger.len(), 1);

        // The original entry survives the refused creation.
        let consumed = ledger.try_consume(2, 1).unwrap();
        assert_eq!(consumed.inviter, 1);
    }

    #[test]
    fn test_consume_requires_matching_inviter() {
        let mut ledger = InviteLedger::new();
        ledger.try_create(invite(1, 2, 0));

        assert_eq!(ledger.try_consume(2, 99), None);
        assert!(ledger.has_pending(2));

        assert!(ledger.try_consume(2, 1).is_some());
        assert!(!ledger.has_pending(2));
    }

    #[test]
    fn test_consume_unknown_target() {
        let mut ledger = InviteLedger::new();
        assert_eq!(ledger.try_consume(5, 1), None);
    }

    #[test]
    fn test_consumed_target_can_be_reinvited() {
        let mut ledger = InviteLedger::new();

        ledger.try_create(invite(1, 2, 0));
        ledger.try_consume(2, 1);

        assert!(ledger.try_create(invite(3, 2, 10)));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let mut ledger = InviteLedger::new();

        ledger.try_create(invite(1, 2, 0));
        ledger.try_create(invite(3, 4, 20_000));

        let expired = ledger.sweep_expired(31_000, 30_000);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].target, 2);

        assert!(!ledger.has_pending(2));
        assert!(ledger.has_pending(4));
    }

    #[test]
    fn test_sweep_boundary_is_exclusive() {
        let mut ledger = InviteLedger::new();
        ledger.try_create(invite(1, 2, 0));

        // Exactly at the timeout the invite still stands.
        assert!(ledger.sweep_expired(30_000, 30_000).is_empty());
        assert!(!ledger.sweep_expired(30_001, 30_000).is_empty());
    }

    #[test]
    fn test_expired_target_can_be_reinvited() {
        let mut ledger = InviteLedger::new();

        ledger.try_create(invite(1, 2, 0));
        ledger.sweep_expired(31_000, 30_000);

        assert!(ledger.try_create(invite(7, 2, 31_000)));
    }

    #[test]
    fn test_remove_involving_clears_both_sides() {
        let mut ledger = InviteLedger::new();

        ledger.try_create(invite(1, 2, 0));
        ledger.try_create(invite(2, 3, 0));
        ledger.try_create(invite(4, 5, 0));

        let removed = ledger.remove_involving(2);
        assert_eq!(removed.len(), 2);
        assert!(!ledger.has_pending(2));
        assert!(!ledger.has_pending(3));
        assert!(ledger.has_pending(5));
    }
}
