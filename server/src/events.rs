//! Party change events and their fan-out to registered sinks.

use shared::{PartyId, PlayerId};

/// Externally observable outcome of a party operation.
///
/// Membership events are broadcast to every client; invite-flow events are
/// directed at the named player only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartyEvent {
    MembershipChanged {
        party_id: PartyId,
        members: Vec<PlayerId>,
        leader: PlayerId,
    },
    PartyDissolved {
        party_id: PartyId,
    },
    InviteReceived {
        target: PlayerId,
        inviter: PlayerId,
        inviter_name: String,
        inviter_level: u32,
    },
    InviteAccepted {
        inviter: PlayerId,
        responder_name: String,
    },
    InviteDeclined {
        inviter: PlayerId,
        responder_name: String,
    },
    InviteError {
        target: PlayerId,
        reason: String,
    },
}

type Sink = Box<dyn FnMut(&PartyEvent) + Send>;

/// Ordered observer list over party events.
///
/// Sinks are keyed by id and delivered to in registration order.
/// Re-registering an id replaces the sink in place, so repeated setup
/// cannot duplicate deliveries, and deregistration cannot leak a stale
/// subscription.
pub struct EventDispatcher {
    sinks: Vec<(String, Sink)>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn register<F>(&mut self, id: &str, sink: F)
    where
        F: FnMut(&PartyEvent) + Send + 'static,
    {
        if let Some(existing) = self.sinks.iter_mut().find(|(sink_id, _)| sink_id == id) {
            existing.1 = Box::new(sink);
        } else {
            self.sinks.push((id.to_string(), Box::new(sink)));
        }
    }

    pub fn deregister(&mut self, id: &str) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|(sink_id, _)| sink_id != id);
        self.sinks.len() != before
    }

    pub fn dispatch(&mut self, event: &PartyEvent) {
        for (_, sink) in &mut self.sinks {
            sink(event);
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
