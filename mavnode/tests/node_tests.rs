//! Node-level integration tests: nodes wired back-to-back over real
//! transports.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use mavnode::error::{ConfigError, Error, FrameError};
use mavnode::prelude::*;
use mavnode::protocol::minimal::{Heartbeat, MavAutopilot, MavState, MavType};
use mavnode::utils::{MpscReader, MpscWriter};

fn free_port() -> u16 {
    portpicker::pick_unused_port().expect("no free ports")
}

fn test_message_1() -> Heartbeat {
    Heartbeat {
        type_: MavType::FixedWing,
        autopilot: MavAutopilot::Slugs,
        base_mode: 3,
        custom_mode: 6,
        system_status: MavState::Active,
        mavlink_version: 5,
    }
}

fn test_message_2() -> Heartbeat {
    Heartbeat {
        type_: MavType::Gcs,
        autopilot: MavAutopilot::GenericWaypointsOnly,
        base_mode: 4,
        custom_mode: 3,
        system_status: MavState::Calibrating,
        mavlink_version: 1,
    }
}

fn test_message_3() -> Heartbeat {
    Heartbeat {
        type_: MavType::Airship,
        autopilot: MavAutopilot::GenericWaypointsOnly,
        base_mode: 4,
        custom_mode: 3,
        system_status: MavState::Calibrating,
        mavlink_version: 1,
    }
}

fn test_message_4() -> Heartbeat {
    Heartbeat {
        type_: MavType::Airship,
        autopilot: MavAutopilot::GenericWaypointsAndSimpleNavigationOnly,
        base_mode: 4,
        custom_mode: 3,
        system_status: MavState::Calibrating,
        mavlink_version: 1,
    }
}

fn conf(system_id: u8) -> NodeConf {
    NodeConf::new(Dialect::minimal(), system_id, 1).no_heartbeat()
}

/// Two nodes exchange four heartbeats in a ping-pong pattern; each side must
/// observe the remote identity exactly as sent.
fn ping_pong(node1: Node, node2: Node) {
    thread::scope(|scope| {
        scope.spawn(|| {
            let mut step = 0;
            for event in node1.events() {
                if let Event::Frame(frame, _) = event {
                    assert_eq!(frame.system_id(), 11);
                    assert_eq!(frame.component_id(), 1);
                    match step {
                        0 => {
                            assert_eq!(frame.message_as::<Heartbeat>(), Some(&test_message_1()));
                            node1.write_message_all(&test_message_2()).unwrap();
                            step += 1;
                        }
                        _ => {
                            assert_eq!(frame.message_as::<Heartbeat>(), Some(&test_message_3()));
                            node1.write_message_all(&test_message_4()).unwrap();
                            break;
                        }
                    }
                }
            }
        });

        scope.spawn(|| {
            // Wait for the connection to the server.
            thread::sleep(Duration::from_millis(500));
            node2.write_message_all(&test_message_1()).unwrap();

            let mut step = 0;
            for event in node2.events() {
                if let Event::Frame(frame, _) = event {
                    assert_eq!(frame.system_id(), 10);
                    assert_eq!(frame.component_id(), 1);
                    match step {
                        0 => {
                            assert_eq!(frame.message_as::<Heartbeat>(), Some(&test_message_2()));
                            node2.write_message_all(&test_message_3()).unwrap();
                            step += 1;
                        }
                        _ => {
                            assert_eq!(frame.message_as::<Heartbeat>(), Some(&test_message_4()));
                            break;
                        }
                    }
                }
            }

            node2.close();
            node1.close();
        });
    });
}

#[test]
fn tcp_server_and_client_ping_pong() {
    let addr = format!("127.0.0.1:{}", free_port());

    let node1 = Node::new(conf(10).endpoint(TcpServer::new(&addr).unwrap())).unwrap();
    let node2 = Node::new(conf(11).endpoint(TcpClient::new(&addr).unwrap())).unwrap();

    ping_pong(node1, node2);
}

#[test]
fn udp_server_and_client_ping_pong() {
    let addr = format!("127.0.0.1:{}", free_port());

    let node1 = Node::new(conf(10).endpoint(UdpServer::new(&addr).unwrap())).unwrap();
    let node2 = Node::new(conf(11).endpoint(UdpClient::new(&addr).unwrap())).unwrap();

    ping_pong(node1, node2);
}

#[test]
fn udp_broadcast_ping_pong() {
    let port1 = free_port();
    let port2 = free_port();

    let node1 = Node::new(
        conf(10).endpoint(
            UdpBroadcast::new(
                &format!("127.255.255.255:{port2}"),
                &format!("0.0.0.0:{port1}"),
            )
            .unwrap(),
        ),
    )
    .unwrap();
    let node2 = Node::new(
        conf(11).endpoint(
            UdpBroadcast::new(
                &format!("127.255.255.255:{port1}"),
                &format!("0.0.0.0:{port2}"),
            )
            .unwrap(),
        ),
    )
    .unwrap();

    ping_pong(node1, node2);
}

/// The reference frame from a custom endpoint: sequence 0, system 11,
/// component 1, MAVLink 2.
#[test]
fn custom_endpoint_emits_reference_bytes() {
    let expected = [
        253u8, 9, 0, 0, 0, 11, 1, 0, 0, 0, 3, 0, 0, 0, 7, 5, 4, 2, 1, 159, 218,
    ];

    // The reader never yields data; the node only writes.
    let (_in_tx, in_rx) = mpsc::channel::<Vec<u8>>();
    let (out_tx, out_rx) = mpsc::channel();

    let node = Node::new(conf(11).endpoint(CustomEndpoint::new(
        "capture",
        MpscReader::new(in_rx),
        MpscWriter::new(out_tx),
    )))
    .unwrap();

    node.write_message_all(&test_message_3()).unwrap();

    let written = out_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(written, expected);

    node.close();
}

#[test]
fn router_preserves_the_source_identity() {
    let addr_a = format!("127.0.0.1:{}", free_port());
    let addr_b = format!("127.0.0.1:{}", free_port());

    let node1 = Node::new(conf(10).endpoint(UdpClient::new(&addr_a).unwrap())).unwrap();
    let router = Node::new(
        conf(11)
            .endpoint(UdpServer::new(&addr_a).unwrap())
            .endpoint(UdpClient::new(&addr_b).unwrap()),
    )
    .unwrap();
    let node3 = Node::new(conf(12).endpoint(UdpServer::new(&addr_b).unwrap())).unwrap();

    thread::sleep(Duration::from_millis(500));
    node1.write_message_all(&test_message_3()).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            for event in router.events() {
                if let Event::Frame(frame, channel) = event {
                    router.write_frame_except(&channel, &frame).unwrap();
                    break;
                }
            }
        });

        scope.spawn(|| {
            for event in node3.events() {
                if let Event::Frame(frame, _) = event {
                    // The relayed frame carries the original sender, not the
                    // router.
                    assert_eq!(frame.system_id(), 10);
                    assert_eq!(frame.component_id(), 1);
                    assert_eq!(frame.message_as::<Heartbeat>(), Some(&test_message_3()));
                    break;
                }
            }

            node3.close();
            router.close();
            node1.close();
        });
    });
}

#[test]
fn signed_exchange_between_two_nodes() {
    let key1 = SecretKey::new([0x4F; 32]);
    let key2 = SecretKey::new([0xA8; 32]);
    let addr = format!("127.0.0.1:{}", free_port());

    let node1 = Node::new(
        conf(10)
            .endpoint(UdpServer::new(&addr).unwrap())
            .incoming_key(key2.clone())
            .outgoing_key(key1.clone()),
    )
    .unwrap();
    let node2 = Node::new(
        conf(11)
            .endpoint(UdpClient::new(&addr).unwrap())
            .incoming_key(key1)
            .outgoing_key(key2),
    )
    .unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            for event in node1.events() {
                if let Event::Frame(frame, _) = event {
                    assert!(frame.is_signed());
                    assert_eq!(frame.system_id(), 11);
                    node1.write_message_all(&test_message_3()).unwrap();
                    break;
                }
            }
        });

        scope.spawn(|| {
            thread::sleep(Duration::from_millis(500));
            node2.write_message_all(&test_message_3()).unwrap();

            for event in node2.events() {
                if let Event::Frame(frame, _) = event {
                    assert!(frame.is_signed());
                    assert_eq!(frame.system_id(), 10);
                    break;
                }
            }

            node2.close();
            node1.close();
        });
    });
}

/// A replay of the identical wire bytes is rejected by the receiver.
#[test]
fn replayed_signed_frames_are_rejected() {
    let key = SecretKey::new([0x4F; 32]);

    // Capture one signed frame from a signing node.
    let (_sender_in_tx, sender_in_rx) = mpsc::channel::<Vec<u8>>();
    let (sender_out_tx, sender_out_rx) = mpsc::channel();
    let sender = Node::new(
        conf(10)
            .endpoint(CustomEndpoint::new(
                "capture",
                MpscReader::new(sender_in_rx),
                MpscWriter::new(sender_out_tx),
            ))
            .outgoing_key(key.clone()),
    )
    .unwrap();
    sender.write_message_all(&test_message_1()).unwrap();
    let signed = sender_out_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    sender.close();

    // Feed the same bytes twice into a verifying node.
    let (receiver_in_tx, receiver_in_rx) = mpsc::channel();
    let (receiver_out_tx, receiver_out_rx) = mpsc::channel::<Vec<u8>>();
    let receiver = Node::new(
        conf(11)
            .endpoint(CustomEndpoint::new(
                "replay",
                MpscReader::new(receiver_in_rx),
                MpscWriter::new(receiver_out_tx),
            ))
            .incoming_key(key),
    )
    .unwrap();

    receiver_in_tx.send(signed.clone()).unwrap();
    receiver_in_tx.send(signed).unwrap();

    let mut saw_frame = false;
    for event in receiver.events() {
        match event {
            Event::Frame(frame, _) => {
                assert!(!saw_frame, "the replay must not produce a frame");
                assert!(frame.is_signed());
                saw_frame = true;
            }
            Event::ParseError { error, .. } => {
                assert!(saw_frame);
                assert!(matches!(error, FrameError::Replay { .. }));
                break;
            }
            _ => {}
        }
    }

    receiver.close();
    drop(receiver_out_rx);
}

#[test]
fn duplicate_udp_server_binds_fail_at_new() {
    let addr = format!("127.0.0.1:{}", free_port());

    let result = Node::new(
        conf(11)
            .endpoint(UdpServer::new(&addr).unwrap())
            .endpoint(UdpServer::new(&addr).unwrap()),
    );

    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn invalid_configurations_fail_at_new() {
    let addr = format!("127.0.0.1:{}", free_port());

    assert!(matches!(
        Node::new(conf(0).endpoint(TcpServer::new(&addr).unwrap())),
        Err(Error::Config(ConfigError::InvalidSystemId(0)))
    ));

    assert!(matches!(
        Node::new(conf(11)),
        Err(Error::Config(ConfigError::NoEndpoints))
    ));

    // Heartbeats require the dialect to declare HEARTBEAT.
    let no_heartbeat_dialect =
        Dialect::new(&[mavnode::test_utils::Ahrs::message_spec()]).unwrap();
    assert!(matches!(
        Node::new(
            NodeConf::new(no_heartbeat_dialect, 11, 1)
                .endpoint(TcpServer::new(&addr).unwrap())
        ),
        Err(Error::Config(ConfigError::HeartbeatNotInDialect))
    ));
}

/// A node with heartbeats enabled is heard by its peer without any explicit
/// write.
#[test]
fn heartbeats_are_emitted_periodically() {
    let addr = format!("127.0.0.1:{}", free_port());

    let node1 = Node::new(conf(10).endpoint(UdpServer::new(&addr).unwrap())).unwrap();
    let node2 = Node::new(
        NodeConf::new(Dialect::minimal(), 11, 1)
            .endpoint(UdpClient::new(&addr).unwrap())
            .heartbeat_period(Duration::from_millis(200)),
    )
    .unwrap();

    let mut heartbeats = 0;
    for event in node1.events() {
        if let Event::Frame(frame, _) = event {
            assert_eq!(frame.system_id(), 11);
            assert!(frame.message_as::<Heartbeat>().is_some());
            heartbeats += 1;
            if heartbeats == 2 {
                break;
            }
        }
    }

    node2.close();
    node1.close();
}

/// UDP server peers that stay silent are torn down by idle eviction.
#[test]
fn udp_peers_are_evicted_when_idle() {
    let addr = format!("127.0.0.1:{}", free_port());

    let node1 = Node::new(
        conf(10).endpoint(
            UdpServer::new(&addr)
                .unwrap()
                .idle_timeout(Duration::from_millis(200)),
        ),
    )
    .unwrap();
    let node2 = Node::new(conf(11).endpoint(UdpClient::new(&addr).unwrap())).unwrap();

    thread::sleep(Duration::from_millis(200));
    node2.write_message_all(&test_message_1()).unwrap();

    let mut opened = false;
    for event in node1.events() {
        match event {
            Event::ChannelOpen(_) => opened = true,
            Event::ChannelClose(_) => {
                assert!(opened);
                break;
            }
            _ => {}
        }
    }

    node2.close();
    node1.close();
}
