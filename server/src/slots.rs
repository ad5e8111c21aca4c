//! Fixed-capacity backing storage for party state.
//!
//! Two arenas addressed by integer index: a party table holding one record
//! per concurrent party, and a member pool holding the player ids of every
//! party member. A party's members live in one contiguous pool range
//! addressed by `(range_start, member_count)`, which keeps roster iteration
//! trivial and the whole structure serializable. Tables are small and
//! bounded, so allocation is a linear scan.

use shared::{PartyId, PlayerId};

/// One entry in the member pool.
///
/// `Reserved` marks a slot claimed by an allocated range that has no
/// occupant yet; it keeps later range allocations from landing inside a
/// party's reserved span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberSlot {
    Free,
    Reserved,
    Occupied(PlayerId),
}

#[derive(Debug, Clone)]
pub struct PartyRecord {
    pub party_id: PartyId,
    pub leader: PlayerId,
    pub range_start: usize,
    pub member_count: usize,
    pub active: bool,
}

impl PartyRecord {
    fn inactive() -> Self {
        Self {
            party_id: 0,
            leader: 0,
            range_start: 0,
            member_count: 0,
            active: false,
        }
    }
}

/// Allocator for party-table entries and contiguous member-pool ranges.
///
/// Allocation failure is reported as `None`, never a panic; callers must
/// leave their own state untouched when it happens. Only the membership
/// engine writes through this type.
pub struct SlotAllocator {
    parties: Vec<PartyRecord>,
    pool: Vec<MemberSlot>,
}

impl SlotAllocator {
    pub fn new(max_parties: usize, pool_slots: usize) -> Self {
        Self {
            parties: vec![PartyRecord::inactive(); max_parties],
            pool: vec![MemberSlot::Free; pool_slots],
        }
    }

    /// Index of the first inactive party-table entry, or `None` when the
    /// table is full. The entry is claimed once the caller activates it.
    pub fn allocate_party_slot(&self) -> Option<usize> {
        self.parties.iter().position(|record| !record.active)
    }

    pub fn free_party_slot(&mut self, index: usize) {
        self.parties[index].active = false;
    }

    /// Claims the first run of `n` contiguous free pool slots, marking them
    /// reserved. Returns the start index, or `None` if no such run exists.
    pub fn allocate_member_range(&mut self, n: usize) -> Option<usize> {
        if n == 0 || n > self.pool.len() {
            return None;
        }

        let mut run_start = 0;
        let mut run_len = 0;
        for (i, slot) in self.pool.iter().enumerate() {
            if *slot == MemberSlot::Free {
                if run_len == 0 {
                    run_start = i;
                }
                run_len += 1;
                if run_len == n {
                    for slot in &mut self.pool[run_start..run_start + n] {
                        *slot = MemberSlot::Reserved;
                    }
                    return Some(run_start);
                }
            } else {
                run_len = 0;
            }
        }

        None
    }

    /// Releases a range back to the free pool. Must run on the old layout
    /// before a dissolved party's table slot is reused.
    pub fn free_range(&mut self, start: usize, count: usize) {
        for slot in &mut self.pool[start..start + count] {
            *slot = MemberSlot::Free;
        }
    }

    /// Clears every occupant in a still-reserved range. Compaction rewrites
    /// go through here first so no stale occupant survives the old layout.
    pub fn clear_range(&mut self, start: usize, count: usize) {
        for slot in &mut self.pool[start..start + count] {
            *slot = MemberSlot::Reserved;
        }
    }

    pub fn slot(&self, index: usize) -> MemberSlot {
        self.pool[index]
    }

    pub fn set_slot(&mut self, index: usize, slot: MemberSlot) {
        self.pool[index] = slot;
    }

    pub fn record(&self, index: usize) -> &PartyRecord {
        &self.parties[index]
    }

    pub fn record_mut(&mut self, index: usize) -> &mut PartyRecord {
        &mut self.parties[index]
    }

    pub fn active_parties(&self) -> impl Iterator<Item = (usize, &PartyRecord)> {
        self.parties
            .iter()
            .enumerate()
            .filter(|(_, record)| record.active)
    }

    pub fn party_capacity(&self) -> usize {
        self.parties.len()
    }

    pub fn pool_capacity(&self) -> usize {
        self.pool.len()
    }
}
