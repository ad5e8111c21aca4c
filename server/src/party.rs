//! Authoritative party membership state machine.
//!
//! The engine is the only writer of party records and member slots. Every
//! operation either commits completely or leaves the tables untouched, and
//! every committed change keeps the structural invariants: member ranges of
//! active parties are disjoint, the leader occupies their party's range, no
//! active party has fewer than two members, and the registry's cached party
//! id always matches what a range scan derives.

use crate::events::PartyEvent;
use crate::registry::PlayerDirectory;
use crate::slots::{MemberSlot, SlotAllocator};
use log::{error, info};
use shared::{PartyId, PlayerId, MAX_PARTY_SIZE};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    PartyTableExhausted,
    MemberPoolExhausted,
    PartyFull(PartyId),
    UnknownParty(PartyId),
    PlayerNotInParty(PlayerId, PartyId),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::PartyTableExhausted => write!(f, "party table is full"),
            EngineError::MemberPoolExhausted => write!(f, "member pool is full"),
            EngineError::PartyFull(id) => write!(f, "party {} is at capacity", id),
            EngineError::UnknownParty(id) => write!(f, "no active party with id {}", id),
            EngineError::PlayerNotInParty(player, id) => {
                write!(f, "player {} is not a member of party {}", player, id)
            }
        }
    }
}

impl std::error::Error for EngineError {}

pub struct PartyEngine {
    slots: SlotAllocator,
    next_party_id: PartyId,
}

impl PartyEngine {
    pub fn new(max_parties: usize, pool_slots: usize) -> Self {
        Self {
            slots: SlotAllocator::new(max_parties, pool_slots),
            // Ids are monotonic for the whole session so a stale event can
            // never be mistaken for a later party reusing the table slot.
            next_party_id: 1,
        }
    }

    /// Forms a new two-member party with a reserved max-size range.
    pub fn create_party(
        &mut self,
        directory: &mut PlayerDirectory,
        leader: PlayerId,
        member: PlayerId,
    ) -> Result<(PartyId, PartyEvent), EngineError> {
        let table_index = self
            .slots
            .allocate_party_slot()
            .ok_or(EngineError::PartyTableExhausted)?;
        // The table entry stays inactive until the range is secured, so a
        // pool failure here leaves no state to unwind.
        let range_start = self
            .slots
            .allocate_member_range(MAX_PARTY_SIZE)
            .ok_or(EngineError::MemberPoolExhausted)?;

        let party_id = self.next_party_id;
        self.next_party_id += 1;

        self.slots.set_slot(range_start, MemberSlot::Occupied(leader));
        self.slots
            .set_slot(range_start + 1, MemberSlot::Occupied(member));

        let record = self.slots.record_mut(table_index);
        record.party_id = party_id;
        record.leader = leader;
        record.range_start = range_start;
        record.member_count = 2;
        record.active = true;

        directory.set_cached_party_id(leader, Some(party_id));
        directory.set_cached_party_id(member, Some(party_id));

        info!(
            "Created party {} with leader {} and member {}",
            party_id, leader, member
        );

        Ok((
            party_id,
            PartyEvent::MembershipChanged {
                party_id,
                members: vec![leader, member],
                leader,
            },
        ))
    }

    /// Appends a member into the party's reserved range.
    pub fn add_member(
        &mut self,
        directory: &mut PlayerDirectory,
        party_id: PartyId,
        player: PlayerId,
    ) -> Result<PartyEvent, EngineError> {
        let index = self.find_index(party_id)?;

        let (range_start, member_count) = {
            let record = self.slots.record(index);
            (record.range_start, record.member_count)
        };
        if member_count >= MAX_PARTY_SIZE {
            return Err(EngineError::PartyFull(party_id));
        }

        // Occupancy is always a packed prefix of the range, so the next
        // logical offset is the insertion point.
        self.slots
            .set_slot(range_start + member_count, MemberSlot::Occupied(player));
        self.slots.record_mut(index).member_count = member_count + 1;
        directory.set_cached_party_id(player, Some(party_id));

        let members = self.roster_at(index);
        let leader = self.slots.record(index).leader;
        info!("Player {} joined party {}", player, party_id);

        Ok(PartyEvent::MembershipChanged {
            party_id,
            members,
            leader,
        })
    }

    /// Removes a player, dissolving the party when fewer than two members
    /// would remain and promoting a successor when the leader departs.
    pub fn remove_player(
        &mut self,
        directory: &mut PlayerDirectory,
        party_id: PartyId,
        player: PlayerId,
    ) -> Result<Vec<PartyEvent>, EngineError> {
        let index = self.find_index(party_id)?;
        let roster = self.roster_at(index);

        if !roster.contains(&player) {
            // The disjoint-partition invariant is already broken upstream if
            // this fires; surface it loudly instead of patching over it.
            error!(
                "Removal of player {} from party {} they do not occupy",
                player, party_id
            );
            return Err(EngineError::PlayerNotInParty(player, party_id));
        }

        let remaining: Vec<PlayerId> = roster.into_iter().filter(|p| *p != player).collect();
        let (range_start, old_leader) = {
            let record = self.slots.record(index);
            (record.range_start, record.leader)
        };

        directory.set_cached_party_id(player, None);

        if remaining.len() <= 1 {
            self.slots.free_range(range_start, MAX_PARTY_SIZE);
            self.slots.free_party_slot(index);
            for member in &remaining {
                directory.set_cached_party_id(*member, None);
            }
            info!("Party {} dissolved", party_id);
            return Ok(vec![PartyEvent::PartyDissolved { party_id }]);
        }

        // Succession is deterministic: first remaining member in original
        // roster order.
        let leader = if old_leader == player {
            remaining[0]
        } else {
            old_leader
        };

        // Clear the old layout before writing the compacted roster so no
        // stale occupant survives.
        self.slots.clear_range(range_start, MAX_PARTY_SIZE);
        for (offset, member) in remaining.iter().enumerate() {
            self.slots
                .set_slot(range_start + offset, MemberSlot::Occupied(*member));
        }

        let record = self.slots.record_mut(index);
        record.member_count = remaining.len();
        record.leader = leader;

        if leader != old_leader {
            info!(
                "Player {} left party {}; leadership passed to {}",
                player, party_id, leader
            );
        } else {
            info!("Player {} left party {}", player, party_id);
        }

        Ok(vec![PartyEvent::MembershipChanged {
            party_id,
            members: remaining,
            leader,
        }])
    }

    pub fn is_party_full(&self, party_id: PartyId) -> bool {
        self.find_index(party_id)
            .map(|index| self.slots.record(index).member_count >= MAX_PARTY_SIZE)
            .unwrap_or(false)
    }

    pub fn is_leader(&self, player: PlayerId, party_id: PartyId) -> bool {
        self.find_index(party_id)
            .map(|index| self.slots.record(index).leader == player)
            .unwrap_or(false)
    }

    pub fn roster(&self, party_id: PartyId) -> Option<Vec<PlayerId>> {
        self.find_index(party_id).ok().map(|i| self.roster_at(i))
    }

    pub fn leader_of(&self, party_id: PartyId) -> Option<PlayerId> {
        self.find_index(party_id)
            .ok()
            .map(|i| self.slots.record(i).leader)
    }

    /// Derives a player's party from the ranges themselves, bypassing the
    /// registry cache. The two must always agree.
    pub fn party_of(&self, player: PlayerId) -> Option<PartyId> {
        for (_, record) in self.slots.active_parties() {
            for offset in 0..record.member_count {
                if self.slots.slot(record.range_start + offset) == MemberSlot::Occupied(player) {
                    return Some(record.party_id);
                }
            }
        }
        None
    }

    pub fn active_party_ids(&self) -> Vec<PartyId> {
        self.slots
            .active_parties()
            .map(|(_, record)| record.party_id)
            .collect()
    }

    pub fn active_party_count(&self) -> usize {
        self.slots.active_parties().count()
    }

    fn find_index(&self, party_id: PartyId) -> Result<usize, EngineError> {
        self.slots
            .active_parties()
            .find(|(_, record)| record.party_id == party_id)
            .map(|(index, _)| index)
            .ok_or(EngineError::UnknownParty(party_id))
    }

    fn roster_at(&self, index: usize) -> Vec<PlayerId> {
        let record = self.slots.record(index);
        (0..record.member_count)
            .filter_map(|offset| match self.slots.slot(record.range_start + offset) {
                MemberSlot::Occupied(player) => Some(player),
                _ => None,
            })
            .collect()
    }
}
