use log::info;
use shared::{PartyId, PlayerId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct PlayerProfile {
    pub name: String,
    pub level: u32,
    party_id: Option<PartyId>,
}

/// In-memory roster of connected players.
///
/// Holds the per-player display data the party subsystem snapshots into
/// invites, plus the denormalized "which party am I in" cache. The cache is
/// written only by the membership engine; everything else reads it.
pub struct PlayerDirectory {
    players: HashMap<PlayerId, PlayerProfile>,
    next_player_id: PlayerId,
}

impl PlayerDirectory {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
            next_player_id: 1,
        }
    }

    /// Registers a player and assigns them the next free id.
    pub fn register(&mut self, name: &str, level: u32) -> PlayerId {
        let player_id = self.next_player_id;
        self.next_player_id += 1;

        self.players.insert(
            player_id,
            PlayerProfile {
                name: name.to_string(),
                level,
                party_id: None,
            },
        );
        info!("Registered player {} ({}, level {})", player_id, name, level);

        player_id
    }

    /// Removes a player. Returns false if they were already gone.
    pub fn remove(&mut self, player: PlayerId) -> bool {
        if let Some(profile) = self.players.remove(&player) {
            info!("Removed player {} ({})", player, profile.name);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains_key(&player)
    }

    pub fn display_name(&self, player: PlayerId) -> Option<&str> {
        self.players.get(&player).map(|p| p.name.as_str())
    }

    pub fn level(&self, player: PlayerId) -> Option<u32> {
        self.players.get(&player).map(|p| p.level)
    }

    pub fn cached_party_id(&self, player: PlayerId) -> Option<PartyId> {
        self.players.get(&player).and_then(|p| p.party_id)
    }

    /// Membership engine only. The allocator ranges stay the source of
    /// truth; this cache must always be re-derivable from them.
    pub fn set_cached_party_id(&mut self, player: PlayerId, party_id: Option<PartyId>) {
        if let Some(profile) = self.players.get_mut(&player) {
            profile.party_id = party_id;
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl Default for PlayerDirectory {
    fn default() -> Self {
        Self::new()
    }
}
