//! Integration tests for the party coordination subsystem
//!
//! These tests validate cross-component interactions and real network behavior.

use bincode::{deserialize, serialize};
use shared::{Packet, PlayerId, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests packet serialization round-trip for network protocol validation
    #[tokio::test]
    async fn packet_serialization_roundtrip() {
        let test_packets = vec![
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                name: "Aria".to_string(),
                level: 12,
            },
            Packet::RequestInvite { target: 7 },
            Packet::RespondToInvite {
                inviter: 3,
                accept: true,
            },
            Packet::LeaveParty,
            Packet::MembershipChanged {
                party_id: 2,
                members: vec![1, 4, 9],
                leader: 4,
            },
            Packet::InviteError {
                reason: "That player is already in a party.".to_string(),
            },
        ];

        for packet in test_packets {
            let serialized = serialize(&packet).unwrap();
            let deserialized: Packet = deserialize(&serialized).unwrap();

            // Verify packet type matches (simplified check)
            match (&packet, &deserialized) {
                (Packet::Connect { .. }, Packet::Connect { .. }) => {}
                (Packet::RequestInvite { .. }, Packet::RequestInvite { .. }) => {}
                (Packet::RespondToInvite { .. }, Packet::RespondToInvite { .. }) => {}
                (Packet::LeaveParty, Packet::LeaveParty) => {}
                (Packet::MembershipChanged { .. }, Packet::MembershipChanged { .. }) => {}
                (Packet::InviteError { .. }, Packet::InviteError { .. }) => {}
                _ => panic!("Packet type mismatch after serialization"),
            }
        }
    }
}

/// LIVE SERVER TESTS
mod live_server_tests {
    use super::*;
    use server::network::PartyServer;

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    /// Starts a party server on an ephemeral port and returns its address.
    async fn start_server() -> SocketAddr {
        let mut party_server = PartyServer::new("127.0.0.1:0", Duration::from_millis(20), 4)
            .await
            .expect("Failed to start server");
        let addr = party_server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = party_server.run().await;
        });
        addr
    }

    struct TestClient {
        socket: UdpSocket,
        server: SocketAddr,
        player_id: PlayerId,
    }

    impl TestClient {
        async fn connect(server: SocketAddr, name: &str, level: u32) -> Self {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let packet = Packet::Connect {
                client_version: PROTOCOL_VERSION,
                name: name.to_string(),
                level,
            };
            socket
                .send_to(&serialize(&packet).unwrap(), server)
                .await
                .unwrap();

            let mut client = Self {
                socket,
                server,
                player_id: 0,
            };
            match client.recv().await {
                Packet::Connected { player_id } => client.player_id = player_id,
                other => panic!("Expected Connected but got {:?}", other),
            }
            client
        }

        async fn send(&self, packet: Packet) {
            self.socket
                .send_to(&serialize(&packet).unwrap(), self.server)
                .await
                .unwrap();
        }

        async fn recv(&self) -> Packet {
            let mut buf = [0u8; 2048];
            let (len, _) = timeout(RECV_TIMEOUT, self.socket.recv_from(&mut buf))
                .await
                .expect("Timed out waiting for packet")
                .unwrap();
            deserialize(&buf[0..len]).unwrap()
        }

        /// Receives until a packet satisfies the predicate, skipping others.
        async fn recv_until<F: Fn(&Packet) -> bool>(&self, pred: F) -> Packet {
            loop {
                let packet = self.recv().await;
                if pred(&packet) {
                    return packet;
                }
            }
        }
    }

    /// Full invite handshake over real UDP: connect, invite, accept,
    /// roster broadcast, dissolution on leave.
    #[tokio::test]
    async fn invite_handshake_over_udp() {
        let server = start_server().await;

        let alice = TestClient::connect(server, "Alice", 10).await;
        let bob = TestClient::connect(server, "Bob", 12).await;

        alice
            .send(Packet::RequestInvite {
                target: bob.player_id,
            })
            .await;

        match bob
            .recv_until(|p| matches!(p, Packet::InviteReceived { .. }))
            .await
        {
            Packet::InviteReceived {
                inviter,
                inviter_name,
                inviter_level,
            } => {
                assert_eq!(inviter, alice.player_id);
                assert_eq!(inviter_name, "Alice");
                assert_eq!(inviter_level, 10);
            }
            _ => unreachable!(),
        }

        bob.send(Packet::RespondToInvite {
            inviter: alice.player_id,
            accept: true,
        })
        .await;

        // The inviter gets the acceptance plus the roster broadcast; UDP
        // gives no ordering promise between the two.
        let mut responder_name = None;
        let mut party_id = None;
        for _ in 0..2 {
            match alice.recv().await {
                Packet::InviteAccepted { responder_name: n } => responder_name = Some(n),
                Packet::MembershipChanged {
                    party_id: id,
                    members,
                    leader,
                } => {
                    assert_eq!(members, vec![alice.player_id, bob.player_id]);
                    assert_eq!(leader, alice.player_id);
                    party_id = Some(id);
                }
                other => panic!("Unexpected packet: {:?}", other),
            }
        }
        assert_eq!(responder_name.as_deref(), Some("Bob"));
        let party_id = party_id.expect("no roster broadcast received");
        bob.recv_until(|p| matches!(p, Packet::MembershipChanged { .. }))
            .await;

        // Leader leaves the two-member party; everyone learns it is gone.
        alice.send(Packet::LeaveParty).await;
        match bob
            .recv_until(|p| matches!(p, Packet::PartyDissolved { .. }))
            .await
        {
            Packet::PartyDissolved { party_id: gone } => assert_eq!(gone, party_id),
            _ => unreachable!(),
        }
    }

    /// A decline reaches the inviter and leaves both players partyless.
    #[tokio::test]
    async fn invite_decline_over_udp() {
        let server = start_server().await;

        let alice = TestClient::connect(server, "Alice", 10).await;
        let bob = TestClient::connect(server, "Bob", 12).await;

        alice
            .send(Packet::RequestInvite {
                target: bob.player_id,
            })
            .await;
        bob.recv_until(|p| matches!(p, Packet::InviteReceived { .. }))
            .await;

        bob.send(Packet::RespondToInvite {
            inviter: alice.player_id,
            accept: false,
        })
        .await;

        match alice
            .recv_until(|p| matches!(p, Packet::InviteDeclined { .. }))
            .await
        {
            Packet::InviteDeclined { responder_name } => assert_eq!(responder_name, "Bob"),
            _ => unreachable!(),
        }

        // Bob is free again: a second invite goes through immediately.
        alice
            .send(Packet::RequestInvite {
                target: bob.player_id,
            })
            .await;
        bob.recv_until(|p| matches!(p, Packet::InviteReceived { .. }))
            .await;
    }

    /// Validation errors are directed at the requester only.
    #[tokio::test]
    async fn self_invite_rejected_over_udp() {
        let server = start_server().await;
        let alice = TestClient::connect(server, "Alice", 10).await;

        alice
            .send(Packet::RequestInvite {
                target: alice.player_id,
            })
            .await;

        match alice
            .recv_until(|p| matches!(p, Packet::InviteError { .. }))
            .await
        {
            Packet::InviteError { reason } => {
                assert_eq!(reason, "You cannot invite yourself.");
            }
            _ => unreachable!(),
        }
    }
}

/// COORDINATION LIFECYCLE TESTS
mod coordination_tests {
    use super::*;
    use server::coordinator::PartyCoordinator;
    use server::events::PartyEvent;
    use shared::INVITE_TIMEOUT_MS;
    use std::sync::{Arc, Mutex};

    fn coordinator_with_recorder() -> (PartyCoordinator, Arc<Mutex<Vec<PartyEvent>>>) {
        let mut coordinator = PartyCoordinator::new(4, INVITE_TIMEOUT_MS);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        coordinator.register_sink("recorder", move |event| {
            sink_events.lock().unwrap().push(event.clone());
        });
        (coordinator, events)
    }

    fn form_party(coordinator: &mut PartyCoordinator, inviter: PlayerId, target: PlayerId) {
        coordinator.handle_invite_request(inviter, target, 0);
        coordinator.handle_invite_response(target, inviter, true);
    }

    /// Two concurrent parties stay disjoint through growth, departures,
    /// and dissolution, and the cached party ids always agree with the
    /// range-derived ones.
    #[test]
    fn concurrent_parties_stay_disjoint() {
        let (mut coordinator, _events) = coordinator_with_recorder();
        let players: Vec<PlayerId> = (0..6)
            .map(|i| coordinator.register_player(&format!("p{}", i), 1))
            .collect();

        form_party(&mut coordinator, players[0], players[1]);
        form_party(&mut coordinator, players[2], players[3]);
        coordinator.handle_invite_request(players[0], players[4], 0);
        coordinator.handle_invite_response(players[4], players[0], true);
        coordinator.handle_invite_request(players[2], players[5], 0);
        coordinator.handle_invite_response(players[5], players[2], true);

        let ids = coordinator.engine().active_party_ids();
        assert_eq!(ids.len(), 2);

        let mut all_members: Vec<PlayerId> = Vec::new();
        for id in &ids {
            all_members.extend(coordinator.engine().roster(*id).unwrap());
        }
        let mut deduped = all_members.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), all_members.len());

        for player in &players {
            assert_eq!(
                coordinator.directory().cached_party_id(*player),
                coordinator.engine().party_of(*player)
            );
        }
    }

    /// Successive leader departures walk leadership down the original
    /// roster order until the party dissolves.
    #[test]
    fn leadership_walks_roster_order() {
        let (mut coordinator, events) = coordinator_with_recorder();
        let players: Vec<PlayerId> = (0..4)
            .map(|i| coordinator.register_player(&format!("p{}", i), 1))
            .collect();

        form_party(&mut coordinator, players[0], players[1]);
        coordinator.handle_invite_request(players[0], players[2], 0);
        coordinator.handle_invite_response(players[2], players[0], true);
        coordinator.handle_invite_request(players[0], players[3], 0);
        coordinator.handle_invite_response(players[3], players[0], true);
        events.lock().unwrap().clear();

        coordinator.handle_leave_request(players[0]);
        coordinator.handle_leave_request(players[1]);

        let recorded = events.lock().unwrap().clone();
        assert!(matches!(
            &recorded[0],
            PartyEvent::MembershipChanged { leader, .. } if *leader == players[1]
        ));
        assert!(matches!(
            &recorded[1],
            PartyEvent::MembershipChanged { leader, .. } if *leader == players[2]
        ));

        // One more departure drops the party below two members.
        coordinator.handle_leave_request(players[2]);
        let recorded = events.lock().unwrap().clone();
        assert!(matches!(
            recorded.last().unwrap(),
            PartyEvent::PartyDissolved { .. }
        ));
        assert_eq!(coordinator.engine().active_party_count(), 0);
    }

    /// A dissolved party's id is never seen again on a new party.
    #[test]
    fn party_ids_stay_unique_across_dissolutions() {
        let (mut coordinator, _events) = coordinator_with_recorder();
        let a = coordinator.register_player("a", 1);
        let b = coordinator.register_player("b", 1);

        let mut seen = Vec::new();
        for _ in 0..5 {
            form_party(&mut coordinator, a, b);
            let id = coordinator.directory().cached_party_id(a).unwrap();
            assert!(!seen.contains(&id));
            seen.push(id);
            coordinator.handle_leave_request(b);
        }
    }
}
