//! Server network layer handling UDP communications and tick loop coordination

use crate::coordinator::PartyCoordinator;
use crate::events::PartyEvent;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PlayerId, INVITE_TIMEOUT_MS, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum OutboundMessage {
    Send {
        packet: Packet,
        addr: SocketAddr,
    },
    Broadcast {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

/// Connection bookkeeping for one client
#[derive(Debug)]
struct ClientConn {
    addr: SocketAddr,
    last_seen: Instant,
}

/// Authoritative party server: owns the coordinator and serializes every
/// mutation onto one select loop, so the core tables need no locks.
pub struct PartyServer {
    socket: Arc<UdpSocket>,
    coordinator: PartyCoordinator,
    clients: HashMap<PlayerId, ClientConn>,
    by_addr: HashMap<SocketAddr, PlayerId>,
    tick_duration: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    out_tx: mpsc::UnboundedSender<OutboundMessage>,
    out_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    event_rx: mpsc::UnboundedReceiver<PartyEvent>,
}

impl PartyServer {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_parties: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Party server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut coordinator = PartyCoordinator::new(max_parties, INVITE_TIMEOUT_MS);
        coordinator.register_sink("network", move |event: &PartyEvent| {
            let _ = event_tx.send(event.clone());
        });

        Ok(PartyServer {
            socket,
            coordinator,
            clients: HashMap::new(),
            by_addr: HashMap::new(),
            tick_duration,
            server_tx,
            server_rx,
            out_tx,
            out_rx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                match message {
                    OutboundMessage::Send { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    OutboundMessage::Broadcast { packet, addrs } => {
                        for addr in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.out_tx.send(OutboundMessage::Send { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_to_player(&self, player: PlayerId, packet: Packet) {
        if let Some(conn) = self.clients.get(&player) {
            self.send_packet(packet, conn.addr);
        } else {
            debug!("Dropping packet for offline player {}", player);
        }
    }

    fn broadcast(&self, packet: Packet) {
        if self.clients.is_empty() {
            return;
        }
        let addrs = self.clients.values().map(|conn| conn.addr).collect();
        if let Err(e) = self.out_tx.send(OutboundMessage::Broadcast { packet, addrs }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes one inbound packet against the coordinator
    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                name,
                level,
            } => {
                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Rejecting client at {} with unsupported version {}",
                        addr, client_version
                    );
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Unsupported client version".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // A reconnect from the same address replaces the old session.
                if let Some(existing) = self.by_addr.get(&addr).copied() {
                    info!("Removing existing player {} at {}", existing, addr);
                    self.disconnect_player(existing);
                }

                let player_id = self.coordinator.register_player(&name, level);
                self.clients.insert(
                    player_id,
                    ClientConn {
                        addr,
                        last_seen: Instant::now(),
                    },
                );
                self.by_addr.insert(addr, player_id);
                info!("Player {} ({}) connected from {}", player_id, name, addr);

                self.send_packet(Packet::Connected { player_id }, addr);
            }

            Packet::RequestInvite { target } => {
                if let Some(player) = self.touch_client(addr) {
                    self.coordinator.handle_invite_request(player, target, now_ms());
                }
            }

            Packet::RespondToInvite { inviter, accept } => {
                if let Some(player) = self.touch_client(addr) {
                    self.coordinator.handle_invite_response(player, inviter, accept);
                }
            }

            Packet::LeaveParty => {
                if let Some(player) = self.touch_client(addr) {
                    self.coordinator.handle_leave_request(player);
                }
            }

            Packet::Disconnect => {
                if let Some(player) = self.by_addr.get(&addr).copied() {
                    self.disconnect_player(player);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Refreshes liveness and resolves the sender. Unknown addresses are
    /// dropped; requests are only accepted from connected clients.
    fn touch_client(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        match self.by_addr.get(&addr).copied() {
            Some(player) => {
                if let Some(conn) = self.clients.get_mut(&player) {
                    conn.last_seen = Instant::now();
                }
                Some(player)
            }
            None => {
                warn!("Request from unconnected address {}", addr);
                None
            }
        }
    }

    fn disconnect_player(&mut self, player: PlayerId) {
        self.coordinator.handle_disconnect(player);
        if let Some(conn) = self.clients.remove(&player) {
            self.by_addr.remove(&conn.addr);
            info!("Player {} disconnected", player);
        }
    }

    /// Maps coordinator events onto the wire. Membership changes go to
    /// everyone (clients filter); invite-flow events go to one player.
    fn flush_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                PartyEvent::MembershipChanged {
                    party_id,
                    members,
                    leader,
                } => self.broadcast(Packet::MembershipChanged {
                    party_id,
                    members,
                    leader,
                }),
                PartyEvent::PartyDissolved { party_id } => {
                    self.broadcast(Packet::PartyDissolved { party_id })
                }
                PartyEvent::InviteReceived {
                    target,
                    inviter,
                    inviter_name,
                    inviter_level,
                } => self.send_to_player(
                    target,
                    Packet::InviteReceived {
                        inviter,
                        inviter_name,
                        inviter_level,
                    },
                ),
                PartyEvent::InviteAccepted {
                    inviter,
                    responder_name,
                } => self.send_to_player(inviter, Packet::InviteAccepted { responder_name }),
                PartyEvent::InviteDeclined {
                    inviter,
                    responder_name,
                } => self.send_to_player(inviter, Packet::InviteDeclined { responder_name }),
                PartyEvent::InviteError { target, reason } => {
                    self.send_to_player(target, Packet::InviteError { reason })
                }
            }
        }
    }

    /// Periodic work: invite expiry sweep and client liveness check
    fn tick(&mut self) {
        self.coordinator.sweep_invites(now_ms());

        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, conn)| conn.last_seen.elapsed() > CLIENT_TIMEOUT)
            .map(|(player, _)| *player)
            .collect();

        for player in timed_out {
            info!("Player {} timed out", player);
            self.disconnect_player(player);
        }

        self.flush_events();
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut tick_interval = interval(self.tick_duration);

        info!("Party server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr);
                            self.flush_events();
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Party server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.tick();
                },
            }
        }

        Ok(())
    }
}

// Current wall-clock time in milliseconds; feeds the invite ledger clock.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
