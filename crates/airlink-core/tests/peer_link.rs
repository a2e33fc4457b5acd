//! Two link managers relaying a snapshot to each other over loopback

use std::sync::Arc;
use std::thread;

use airlink_core::config::{LinkConfig, StaticPeer};
use airlink_core::{
    Flight, LinkAdapter, LinkError, LinkState, MemoryDirectory, NewsItem, PeerEvent, PeerEvents,
    PeerLinkManager, Role, Snapshot, SnapshotReader, StaticDirectory,
};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("airlink_core=debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn config() -> LinkConfig {
    LinkConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        discovery_timeout_secs: 5,
        connect_timeout_secs: 5,
        ..Default::default()
    }
}

fn manager(directory: &MemoryDirectory) -> PeerLinkManager {
    PeerLinkManager::new(LinkAdapter::new(Arc::new(directory.clone())), config())
}

fn snapshot(flights: usize) -> Snapshot {
    Snapshot {
        flights: (0..flights)
            .map(|i| Flight {
                flight_number: format!("VY{:04}", i),
                arrive_time: "11:45".to_string(),
                depart_time: "10:30".to_string(),
                from_short: "BCN".to_string(),
                to_short: "MAD".to_string(),
                status: "On Time".to_string(),
                update_time: "2025-05-10".to_string(),
                favorite: false,
            })
            .collect(),
        news: vec![NewsItem {
            id: "n1".to_string(),
            flight_number: "VY0000".to_string(),
            title: "Gate change".to_string(),
            content: "B12".to_string(),
            date: "2025-05-10".to_string(),
        }],
    }
}

/// Read events until a whole snapshot has arrived
fn read_snapshot(events: &mut PeerEvents) -> Snapshot {
    let mut reader = SnapshotReader::new();
    loop {
        match events.blocking_recv().expect("link closed early") {
            PeerEvent::Connected(_) => {}
            PeerEvent::Data(chunk) => {
                if let Some(snapshot) = reader.push(&chunk).unwrap() {
                    return snapshot;
                }
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

fn wait_connected(events: &mut PeerEvents) {
    match events.blocking_recv() {
        Some(PeerEvent::Connected(_)) => {}
        other => panic!("expected Connected, got {other:?}"),
    }
}

#[test]
fn test_server_relays_snapshot_to_client() {
    init_tracing();
    let directory = MemoryDirectory::new();
    let server = manager(&directory);
    let client = manager(&directory);

    let mut server_events = server.start_server("482913").unwrap();
    let mut client_events = client.connect("482913").unwrap();

    wait_connected(&mut server_events);
    assert_eq!(server.state(), LinkState::Connected);

    // Large enough to arrive in many read-buffer sized chunks
    let sent = snapshot(200);
    server.send(&sent.to_frame().unwrap()).unwrap();

    let received = read_snapshot(&mut client_events);
    assert_eq!(received, sent);
    assert_eq!(client.role(), Some(Role::Client));
    assert!(client.peer().is_some());

    client.stop();
    match server_events.blocking_recv() {
        Some(PeerEvent::Disconnected(_)) => {}
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert_eq!(server.state(), LinkState::Idle);
    assert_eq!(client.state(), LinkState::Idle);
}

#[test]
fn test_client_answers_back() {
    let directory = MemoryDirectory::new();
    let server = manager(&directory);
    let client = manager(&directory);

    let mut server_events = server.start_server("1111").unwrap();
    let mut client_events = client.connect("1111").unwrap();
    wait_connected(&mut server_events);
    wait_connected(&mut client_events);

    client.send(&snapshot(1).to_frame().unwrap()).unwrap();
    assert_eq!(read_snapshot(&mut server_events), snapshot(1));
}

#[test]
fn test_concurrent_sends_stay_whole() {
    init_tracing();
    let directory = MemoryDirectory::new();
    let server = Arc::new(manager(&directory));
    let client = manager(&directory);

    let mut server_events = server.start_server("2222").unwrap();
    let mut client_events = client.connect("2222").unwrap();
    wait_connected(&mut server_events);

    let senders: Vec<_> = (1..=4)
        .map(|n| {
            let server = server.clone();
            thread::spawn(move || server.send(&snapshot(n * 20).to_frame().unwrap()).unwrap())
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    let mut reader = SnapshotReader::new();
    let mut sizes = Vec::new();
    while sizes.len() < 4 {
        match client_events.blocking_recv().expect("link closed early") {
            PeerEvent::Connected(_) => {}
            PeerEvent::Data(chunk) => {
                let mut pending = reader.push(&chunk).unwrap();
                while let Some(snapshot) = pending {
                    sizes.push(snapshot.flights.len());
                    pending = reader.push(&[]).unwrap();
                }
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    sizes.sort_unstable();
    assert_eq!(sizes, vec![20, 40, 60, 80]);
}

#[test]
fn test_static_peer_list_reaches_server() {
    let directory = MemoryDirectory::new();
    let server = manager(&directory);
    let mut server_events = server.start_server("3333").unwrap();
    let addr = server.local_addr().unwrap();

    let peers = [StaticPeer {
        name: "gate-3333".to_string(),
        addr: addr.to_string(),
    }];
    let client = PeerLinkManager::new(
        LinkAdapter::new(Arc::new(StaticDirectory::from_config(&peers).unwrap())),
        config(),
    );
    let _client_events = client.connect("3333").unwrap();

    wait_connected(&mut server_events);
}

#[test]
fn test_one_role_per_manager() {
    let directory = MemoryDirectory::new();
    let link = manager(&directory);
    let _events = link.connect("4444").unwrap();

    assert!(matches!(
        link.start_server("4444"),
        Err(LinkError::RoleConflict {
            active: Role::Client
        })
    ));
    assert!(directory.is_empty());
}

#[test]
fn test_connected_session_survives_second_role() {
    let directory = MemoryDirectory::new();
    let server = manager(&directory);
    let client = manager(&directory);

    let mut server_events = server.start_server("5555").unwrap();
    let mut client_events = client.connect("5555").unwrap();
    wait_connected(&mut server_events);
    wait_connected(&mut client_events);
    assert_eq!(client.state(), LinkState::Connected);

    assert!(matches!(
        client.start_server("6666"),
        Err(LinkError::RoleConflict {
            active: Role::Client
        })
    ));
    assert_eq!(client.state(), LinkState::Connected);
    assert_eq!(client.role(), Some(Role::Client));

    client.send(&snapshot(3).to_frame().unwrap()).unwrap();
    assert_eq!(read_snapshot(&mut server_events), snapshot(3));
}
