//! # Party Coordination Server Library
//!
//! This library provides the authoritative server implementation for the
//! party coordination subsystem of a multiplayer session: forming,
//! maintaining, and tearing down small player groups, and the invitation
//! handshake that gates entry into them.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Membership State
//! The server holds the only writable copy of party state. Clients issue
//! requests (invite, respond, leave) and receive notifications; they never
//! mutate shared state directly. All mutations run serially on one task,
//! so the core tables need no locks and no two requests ever interleave.
//!
//! ### Invitation Handshake
//! Invites are recorded in a ledger enforcing one pending invite per
//! target, carry a snapshot of the inviter's display data, and expire on a
//! tick-driven sweep when left unanswered.
//!
//! ### Bounded Storage
//! Party records and member ids live in fixed-capacity arenas addressed by
//! index and contiguous range. Capacity exhaustion is a refused request,
//! never a crash.
//!
//! ## Module Organization
//!
//! - [`registry`]: connected-player directory (display data plus the
//!   cached party id the engine maintains)
//! - [`slots`]: fixed-capacity party table and member pool
//! - [`invites`]: pending-invite ledger with timed expiry
//! - [`party`]: the membership engine, sole mutator of party state
//! - [`events`]: party event types and ordered sink fan-out
//! - [`coordinator`]: request validation and orchestration
//! - [`network`]: UDP transport, tick loop, event-to-packet routing

pub mod coordinator;
pub mod events;
pub mod invites;
pub mod network;
pub mod party;
pub mod registry;
pub mod slots;
