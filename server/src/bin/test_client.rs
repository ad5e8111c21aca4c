use bincode::{deserialize, serialize};
use clap::Parser;
use shared::{Packet, PlayerId, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Headless client for exercising the party server by hand: connects,
/// optionally fires an invite, and prints everything the server sends back.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address to connect to
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Display name to register with
    #[clap(short, long, default_value = "tester")]
    name: String,
    /// Character level to register with
    #[clap(short, long, default_value = "10")]
    level: u32,
    /// Player id to invite once connected
    #[clap(short, long)]
    invite: Option<PlayerId>,
    /// Automatically accept any invite received
    #[clap(short, long)]
    accept: bool,
    /// Seconds to listen for events before leaving and disconnecting
    #[clap(short = 'w', long, default_value = "30")]
    wait: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = args.server.parse::<SocketAddr>()?;

    let connect_packet = Packet::Connect {
        client_version: PROTOCOL_VERSION,
        name: args.name.clone(),
        level: args.level,
    };
    println!("Connecting to {} as {}", server_addr, args.name);
    socket.send_to(&serialize(&connect_packet)?, server_addr).await?;

    let mut buf = [0u8; 2048];
    let (len, _) = socket.recv_from(&mut buf).await?;

    let player_id = match deserialize::<Packet>(&buf[0..len])? {
        Packet::Connected { player_id } => {
            println!("Connected with player id {}", player_id);
            player_id
        }
        Packet::Disconnected { reason } => {
            println!("Connection refused: {}", reason);
            return Ok(());
        }
        other => {
            println!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    };

    if let Some(target) = args.invite {
        println!("Inviting player {}", target);
        let packet = Packet::RequestInvite { target };
        socket.send_to(&serialize(&packet)?, server_addr).await?;
    }

    let deadline = Duration::from_secs(args.wait);
    let listen = async {
        loop {
            let (len, _) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    println!("Error receiving packet: {}", e);
                    continue;
                }
            };

            match deserialize::<Packet>(&buf[0..len]) {
                Ok(Packet::InviteReceived {
                    inviter,
                    inviter_name,
                    inviter_level,
                }) => {
                    println!(
                        "Invite from {} ({}, level {})",
                        inviter_name, inviter, inviter_level
                    );
                    if args.accept {
                        println!("Accepting invite from {}", inviter);
                        let response = Packet::RespondToInvite {
                            inviter,
                            accept: true,
                        };
                        if let Ok(data) = serialize(&response) {
                            let _ = socket.send_to(&data, server_addr).await;
                        }
                    }
                }
                Ok(Packet::MembershipChanged {
                    party_id,
                    members,
                    leader,
                }) => {
                    println!(
                        "Party {} roster: {:?} (leader {})",
                        party_id, members, leader
                    );
                }
                Ok(Packet::PartyDissolved { party_id }) => {
                    println!("Party {} dissolved", party_id);
                }
                Ok(Packet::InviteAccepted { responder_name }) => {
                    println!("{} accepted the invite", responder_name);
                }
                Ok(Packet::InviteDeclined { responder_name }) => {
                    println!("{} declined the invite", responder_name);
                }
                Ok(Packet::InviteError { reason }) => {
                    println!("Invite error: {}", reason);
                }
                Ok(other) => println!("Unexpected packet: {:?}", other),
                Err(e) => println!("Failed to deserialize packet: {}", e),
            }
        }
    };

    println!("Listening for events for {} seconds (player {})", args.wait, player_id);
    let _ = timeout(deadline, listen).await;

    println!("Leaving party and disconnecting");
    socket
        .send_to(&serialize(&Packet::LeaveParty)?, server_addr)
        .await?;
    socket
        .send_to(&serialize(&Packet::Disconnect)?, server_addr)
        .await?;

    println!("Test client finished");
    Ok(())
}
