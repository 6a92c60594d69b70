//! End-to-end replication over the in-process loopback transport.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use skyward_server::arena::{Arena, ArenaMode};
use skyward_server::client::{Client, ClientMessage};
use skyward_server::config::ServerConfig;
use skyward_server::metrics::Metrics;
use skyward_server::net::{ClientPacket, ClientTelegraph, Delivery, Host, HostEvent};
use skyward_server::server::Server;
use skyward_server::sky::SkyHandle;
use skyward_server::util::{Networked, Pid, Vec2};

const WAIT: Duration = Duration::from_millis(20);

fn server() -> Server {
    let config = ServerConfig {
        rcon_password: Some("secret".into()),
        ..ServerConfig::default()
    };
    Server::new(config, Host::new(), Arc::new(Metrics::new()))
}

fn pump(server: &mut Server, clients: &mut [&mut Client]) {
    for _ in 0..3 {
        server.poll(WAIT);
        for client in clients.iter_mut() {
            client.poll(WAIT);
        }
    }
}

fn join(server: &mut Server, nickname: &str) -> Client {
    let mut client = Client::new();
    client.connect_to(server.host_mut());
    pump(server, &mut [&mut client]);
    client.join(nickname).unwrap();
    pump(server, &mut [&mut client]);
    assert!(client.is_joined());
    client
}

fn admin(server: &mut Server, nickname: &str) -> Client {
    let mut client = join(server, nickname);
    client.rcon("password secret").unwrap();
    pump(server, &mut [&mut client]);
    client.take_messages();
    client
}

fn plane_pos(handle: &SkyHandle, arena: &Arena, pid: Pid) -> Option<Vec2> {
    let player = arena.get_player(pid)?;
    let plane = handle.sky()?.participation(player)?.plane()?;
    Some(plane.state().physical.pos)
}

fn nickname(arena: &Arena, pid: Pid) -> &str {
    arena.get_player(pid).unwrap().nickname()
}

#[test]
fn test_nickname_disambiguation() {
    let mut server = server();
    let first = join(&mut server, "X");
    let mut y = join(&mut server, "Y");
    let mut second_x = join(&mut server, "X");

    assert_eq!(nickname(server.arena(), 0), "X");
    assert_eq!(nickname(server.arena(), 1), "Y");
    assert_eq!(nickname(server.arena(), 2), "X(1)");

    drop(first);
    pump(&mut server, &mut [&mut y, &mut second_x]);
    assert!(server.arena().get_player(0).is_none());

    let again = join(&mut server, "X");
    assert_eq!(again.pid(), Some(0));
    assert_eq!(nickname(server.arena(), 0), "X");

    pump(&mut server, &mut [&mut y, &mut second_x]);
    assert_eq!(nickname(y.arena().unwrap(), 0), "X");
}

#[test]
fn test_duplicate_long_nickname_joins() {
    let mut server = server();
    let long = "a".repeat(24);
    let mut first = join(&mut server, &long);
    let mut second = join(&mut server, &long);
    pump(&mut server, &mut [&mut first, &mut second]);

    assert_eq!(nickname(server.arena(), 1), format!("{}(1)", "a".repeat(21)));
    assert_eq!(first.arena().unwrap().player_count(), 2);
    assert_eq!(second.arena().unwrap().player_count(), 2);

    let third = join(&mut server, "late");
    assert_eq!(third.arena().unwrap().player_count(), 3);
}

#[test]
fn test_clients_follow_arena_changes() {
    let mut server = server();
    let mut a = admin(&mut server, "alpha");
    let mut b = join(&mut server, "bravo");

    a.rcon("motd welcome aboard").unwrap();
    a.rcon("env canyon.json").unwrap();
    b.request_team(2).unwrap();
    b.request_nickname("alpha").unwrap();
    pump(&mut server, &mut [&mut a, &mut b]);

    let expected = server.arena().capture_initializer();
    assert_eq!(expected.motd, "welcome aboard");
    assert_eq!(expected.environment, "canyon.json");
    assert_eq!(expected.players[&1].nickname, "alpha(1)");
    assert_eq!(expected.players[&1].team, 2);
    assert!(expected.players[&0].admin);

    assert_eq!(a.arena().unwrap().capture_initializer(), expected);
    assert_eq!(b.arena().unwrap().capture_initializer(), expected);
}

#[test]
fn test_game_lifecycle() {
    let mut server = server();
    let mut a = admin(&mut server, "alpha");
    let mut b = join(&mut server, "bravo");

    a.rcon("start").unwrap();
    pump(&mut server, &mut [&mut a, &mut b]);
    assert_eq!(b.arena().unwrap().mode(), ArenaMode::Game);
    assert!(b.sky().unwrap().is_active());
    assert!(b
        .take_messages()
        .contains(&ClientMessage::Broadcast("The game has started".into())));

    a.rcon("stop").unwrap();
    pump(&mut server, &mut [&mut a, &mut b]);
    assert_eq!(b.arena().unwrap().mode(), ArenaMode::Lobby);
    assert!(!b.sky().unwrap().is_active());
    assert!(!server.sky().is_active());
}

#[test]
fn test_spawn_replicates_to_observer() {
    let mut server = server();
    let mut a = join(&mut server, "alpha");
    let mut b = join(&mut server, "bravo");
    server.set_mode(ArenaMode::Game);
    pump(&mut server, &mut [&mut a, &mut b]);

    a.request_spawn().unwrap();
    pump(&mut server, &mut [&mut a, &mut b]);
    server.tick(0.01);
    pump(&mut server, &mut [&mut a, &mut b]);

    let on_server = plane_pos(&server.sky(), server.arena(), 0).unwrap();
    let on_owner = plane_pos(&a.sky().unwrap(), a.arena().unwrap(), 0).unwrap();
    let on_observer = plane_pos(&b.sky().unwrap(), b.arena().unwrap(), 0).unwrap();
    assert_eq!(on_owner, on_server);
    assert_eq!(on_observer, on_server);
    assert!(plane_pos(&b.sky().unwrap(), b.arena().unwrap(), 1).is_none());
}

#[test]
fn test_owner_input_reaches_server() {
    let mut server = server();
    let mut a = join(&mut server, "alpha");
    let mut b = join(&mut server, "bravo");
    server.set_mode(ArenaMode::Game);
    a.request_spawn().unwrap();
    pump(&mut server, &mut [&mut a, &mut b]);
    server.tick(0.01);
    pump(&mut server, &mut [&mut a, &mut b]);

    a.tick(0.05).unwrap();
    pump(&mut server, &mut [&mut a, &mut b]);

    let reported = plane_pos(&a.sky().unwrap(), a.arena().unwrap(), 0).unwrap();
    assert_eq!(plane_pos(&server.sky(), server.arena(), 0), Some(reported));
    assert_eq!(server.metrics().input_violations.load(Ordering::Relaxed), 0);

    server.tick(0.01);
    pump(&mut server, &mut [&mut a, &mut b]);
    assert_eq!(
        plane_pos(&b.sky().unwrap(), b.arena().unwrap(), 0),
        plane_pos(&server.sky(), server.arena(), 0)
    );
}

#[test]
fn test_kill_leaves_explosion() {
    let mut server = server();
    let mut a = join(&mut server, "alpha");
    let mut b = join(&mut server, "bravo");
    server.set_mode(ArenaMode::Game);
    a.request_spawn().unwrap();
    pump(&mut server, &mut [&mut a, &mut b]);
    server.tick(0.01);

    a.request_kill().unwrap();
    pump(&mut server, &mut [&mut a, &mut b]);
    server.tick(0.01);
    pump(&mut server, &mut [&mut a, &mut b]);

    let handle = b.sky().unwrap();
    let sky = handle.sky().unwrap();
    assert_eq!(sky.spawned_count(), 0);
    assert_eq!(sky.explosions().len(), 1);
}

#[test]
fn test_late_joiner_gets_snapshot() {
    let mut server = server();
    let mut a = admin(&mut server, "alpha");
    a.rcon("start").unwrap();
    a.rcon("entity 400 300").unwrap();
    a.request_spawn().unwrap();
    pump(&mut server, &mut [&mut a]);
    server.tick(0.01);
    pump(&mut server, &mut [&mut a]);

    let b = join(&mut server, "bravo");
    let expected = server.sky().capture_initializer();
    assert_eq!(expected.entities.components.len(), 1);
    assert_eq!(b.sky().unwrap().capture_initializer(), expected);
}

#[test]
fn test_malformed_join_is_dropped() {
    let mut server = server();
    let mut host = Host::new();
    let (_, server_peer) = Host::connect_loopback(server.host_mut(), &mut host);
    server.poll(WAIT);
    host.poll(WAIT);

    // variant tag of ReqJoin with the nickname missing
    host.transmit(server_peer, &[1, 0, 0, 0], Delivery::Reliable).unwrap();
    server.poll(WAIT);
    assert_eq!(server.arena().player_count(), 0);
    assert_eq!(server.metrics().packets_malformed.load(Ordering::Relaxed), 1);

    let telegraph = ClientTelegraph::new();
    telegraph
        .transmit(&host, server_peer, &ClientPacket::ReqJoin("late".into()), Delivery::Reliable)
        .unwrap();
    server.poll(WAIT);
    assert_eq!(server.arena().player_count(), 1);

    let received = std::iter::from_fn(|| host.poll(Duration::ZERO))
        .filter(|e| matches!(e, HostEvent::Receive { .. }))
        .count();
    assert_eq!(received, 1);
}

#[test]
fn test_oversized_length_prefix_is_dropped() {
    let mut server = server();
    let mut host = Host::new();
    let (_, server_peer) = Host::connect_loopback(server.host_mut(), &mut host);
    server.poll(WAIT);
    host.poll(WAIT);

    // Chat claiming a 2^40 byte message
    let mut data = vec![7, 0, 0, 0];
    data.extend_from_slice(&(1u64 << 40).to_le_bytes());
    data.extend_from_slice(b"abc");
    host.transmit(server_peer, &data, Delivery::Reliable).unwrap();
    server.poll(WAIT);
    assert_eq!(server.metrics().packets_malformed.load(Ordering::Relaxed), 1);

    ClientTelegraph::new()
        .transmit(&host, server_peer, &ClientPacket::ReqJoin("after".into()), Delivery::Reliable)
        .unwrap();
    server.poll(WAIT);
    assert_eq!(server.arena().player_count(), 1);
}

#[test]
fn test_latency_is_reported() {
    let mut server = Server::new(
        ServerConfig {
            ping_interval: 0.01,
            latency_update_interval: 0.015,
            ..ServerConfig::default()
        },
        Host::new(),
        Arc::new(Metrics::new()),
    );
    let mut a = join(&mut server, "alpha");

    server.tick(0.01);
    pump(&mut server, &mut [&mut a]);
    server.tick(0.01);
    pump(&mut server, &mut [&mut a]);

    let latency = a.arena().unwrap().get_player(0).unwrap().latency();
    assert!(latency.is_some());
    assert_eq!(server.arena().get_player(0).unwrap().latency(), latency);
}
