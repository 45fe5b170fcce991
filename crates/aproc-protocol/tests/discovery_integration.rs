//! Integration tests: service discovery end to end.
//!
//! Ten devices on a circle small enough that everyone hears everyone,
//! rooted at device 0. Providers answer a flooded request, the requester
//! picks the best offer and the chosen provider streams its file back.
use aproc_protocol::{
    Device, DeviceId, Message, MessageKind, Network, NetworkConfig, Phase, Position,
    Program, ProtocolConfig, ServiceProfile, ServiceRequest, ServiceType, SubtreeMode,
    Transition,
};

const DEVICES: u32 = 10;

fn circle(config: &ProtocolConfig, profiles: &[(u32, ServiceProfile)]) -> Network<Device> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();

    let mut net = Network::new(NetworkConfig::default()).unwrap();
    let center = Position::new(200.0, 200.0);
    for i in 0..DEVICES {
        let profile = profiles
            .iter()
            .find(|(id, _)| *id == i)
            .map(|(_, p)| p.clone())
            .unwrap_or_default();
        let device = Device::new(DeviceId(i), config.clone(), profile).unwrap();
        let position = Position::on_circle(center, 40.0, i as usize, DEVICES as usize);
        net.add(device, position).unwrap();
    }
    net
}

/// Run `rounds` rounds, collecting every phase change.
fn run(net: &mut Network<Device>, rounds: u64) -> Vec<(DeviceId, Transition)> {
    let mut log = Vec::new();
    for _ in 0..rounds {
        net.round();
        for device in net.programs() {
            for t in device.automaton().transitions() {
                log.push((device.id(), *t));
            }
        }
    }
    log
}

fn phases_of(log: &[(DeviceId, Transition)], id: u32) -> Vec<(u64, Phase, Phase)> {
    log.iter()
        .filter(|(d, _)| *d == DeviceId(id))
        .map(|(_, t)| (t.round, t.from, t.to))
        .collect()
}

fn entered(log: &[(DeviceId, Transition)], id: u32, from: Phase, to: Phase) -> Option<&Transition> {
    log.iter()
        .find(|(d, t)| *d == DeviceId(id) && t.from == from && t.to == to)
        .map(|(_, t)| t)
}

fn all_quiet(net: &Network<Device>) -> bool {
    net.programs()
        .all(|d| d.phase() == Phase::Idle && d.automaton().active_processes() == 0)
}

/// Single provider, single requester: the full handshake and transfer.
#[test]
fn single_request_is_served() {
    let config = ProtocolConfig::default();
    let mut net = circle(
        &config,
        &[
            (0, ServiceProfile::offering(ServiceType(5), 0.8)),
            (9, ServiceProfile::requesting(ServiceType(5), 10)),
        ],
    );
    let log = run(&mut net, 60);

    assert_eq!(
        phases_of(&log, 9),
        vec![
            (11, Phase::Idle, Phase::Disco),
            (25, Phase::Disco, Phase::Served),
            (38, Phase::Served, Phase::Idle),
        ]
    );
    assert_eq!(
        phases_of(&log, 0),
        vec![
            (12, Phase::Idle, Phase::Offer),
            (26, Phase::Offer, Phase::Serving),
            (37, Phase::Serving, Phase::Idle),
        ]
    );

    // The offer answers the request it was built from.
    let offer = entered(&log, 0, Phase::Offer, Phase::Serving)
        .and_then(|t| t.message)
        .unwrap();
    assert_eq!(offer.kind(), MessageKind::Offer);
    assert_eq!(offer.from(), DeviceId(0));
    assert_eq!(offer.to(), DeviceId(9));
    assert_eq!(offer.service(), ServiceType(5));

    // Bystanders never leave IDLE.
    for id in 1..9 {
        assert!(phases_of(&log, id).is_empty(), "device {id} changed phase");
    }

    let requester = net.program(DeviceId(9)).unwrap();
    assert_eq!(requester.automaton().satisfied_requests(), 1);
    assert_eq!(requester.automaton().sent_count(), 1);
    assert!(all_quiet(&net));
}

/// Repeated outputs of the same chunk count as one delivery.
#[test]
fn every_chunk_is_delivered_once() {
    let config = ProtocolConfig::default();
    let mut net = circle(
        &config,
        &[
            (0, ServiceProfile::offering(ServiceType(5), 0.8)),
            (9, ServiceProfile::requesting(ServiceType(5), 10)),
        ],
    );
    run(&mut net, 60);

    let stats = net.program(DeviceId(9)).unwrap().automaton().data_stats();
    assert_eq!(stats.delivery_count.get(), u64::from(config.file_size) + 1);
    // One hop away: every chunk arrives the round after it is sent.
    assert_eq!(stats.average_delay(), Some(1.0));

    // Nobody else is the destination of a chunk.
    for id in 0..9 {
        let d = net.program(DeviceId(id)).unwrap();
        assert_eq!(d.automaton().data_stats().delivery_count.get(), 0);
    }
}

/// Two providers of the same service: the higher rank wins, the other
/// gives up its offer without serving.
#[test]
fn best_offer_wins() {
    let config = ProtocolConfig::default();
    let mut net = circle(
        &config,
        &[
            (0, ServiceProfile::offering(ServiceType(5), 0.8)),
            (3, ServiceProfile::offering(ServiceType(5), 0.5)),
            (9, ServiceProfile::requesting(ServiceType(5), 10)),
        ],
    );
    let log = run(&mut net, 70);

    assert!(entered(&log, 0, Phase::Offer, Phase::Serving).is_some());
    assert!(entered(&log, 3, Phase::Idle, Phase::Offer).is_some());
    assert!(entered(&log, 3, Phase::Offer, Phase::Serving).is_none());
    let gave_up = entered(&log, 3, Phase::Offer, Phase::Idle).unwrap();
    let served = entered(&log, 9, Phase::Disco, Phase::Served).unwrap();
    assert!(gave_up.round > served.round);
    assert_eq!(
        net.program(DeviceId(9)).unwrap().automaton().satisfied_requests(),
        1
    );
    assert!(all_quiet(&net));
}

/// Two requesters asking for different services at the same time.
#[test]
fn concurrent_requests_for_different_services() {
    let config = ProtocolConfig::default();
    let mut net = circle(
        &config,
        &[
            (0, ServiceProfile::offering(ServiceType(5), 0.8)),
            (1, ServiceProfile::offering(ServiceType(6), 0.6)),
            (8, ServiceProfile::requesting(ServiceType(5), 10)),
            (9, ServiceProfile::requesting(ServiceType(6), 10)),
        ],
    );
    let log = run(&mut net, 80);

    let to = |provider: u32| -> DeviceId {
        entered(&log, provider, Phase::Offer, Phase::Serving)
            .and_then(|t| t.message)
            .map(|m: Message| m.to())
            .unwrap()
    };
    assert_eq!(to(0), DeviceId(8));
    assert_eq!(to(1), DeviceId(9));
    for requester in [8, 9] {
        let d = net.program(DeviceId(requester)).unwrap();
        assert_eq!(d.automaton().satisfied_requests(), 1, "requester {requester}");
        assert!(entered(&log, requester, Phase::Served, Phase::Idle).is_some());
    }
    assert!(all_quiet(&net));
}

/// Nobody offers the service: the requester times out and stays idle.
#[test]
fn unanswered_request_times_out() {
    let config = ProtocolConfig::default();
    let mut net = circle(
        &config,
        &[
            (0, ServiceProfile::offering(ServiceType(6), 0.8)),
            (9, ServiceProfile::requesting(ServiceType(5), 10)),
        ],
    );
    let log = run(&mut net, 60);

    let timeout = config.rounds(config.timeout_coeff) as u64;
    assert_eq!(
        phases_of(&log, 9),
        vec![
            (11, Phase::Idle, Phase::Disco),
            (11 + timeout + 1, Phase::Disco, Phase::Idle),
        ]
    );
    assert!(phases_of(&log, 0).is_empty());
    assert_eq!(
        net.program(DeviceId(9)).unwrap().automaton().satisfied_requests(),
        0
    );
}

/// Bloom-approximated subtrees only widen the routing paths.
#[test]
fn bloom_subtrees_still_serve() {
    let config = ProtocolConfig {
        subtree: SubtreeMode::Bloom {
            hashes: 3,
            bits: 256,
        },
        ..ProtocolConfig::default()
    };
    let mut net = circle(
        &config,
        &[
            (0, ServiceProfile::offering(ServiceType(5), 0.8)),
            (9, ServiceProfile::requesting(ServiceType(5), 10)),
        ],
    );
    let log = run(&mut net, 60);
    assert!(entered(&log, 9, Phase::Served, Phase::Idle).is_some());
    assert_eq!(
        net.program(DeviceId(9)).unwrap().automaton().satisfied_requests(),
        1
    );
}

/// A provider whose own request comes due the round an asker's DISCO
/// reaches it answers first and sends its request once it is idle again.
#[test]
fn offer_takes_priority_over_own_request() {
    let config = ProtocolConfig::default();
    let mut net = circle(
        &config,
        &[
            (
                0,
                ServiceProfile::offering(ServiceType(5), 0.8).with_request(ServiceRequest {
                    at: 10,
                    service: ServiceType(6),
                    retries: 0,
                }),
            ),
            (1, ServiceProfile::requesting(ServiceType(5), 9)),
        ],
    );
    let log = run(&mut net, 100);

    assert_eq!(entered(&log, 1, Phase::Idle, Phase::Disco).unwrap().round, 10);
    let offered = entered(&log, 0, Phase::Idle, Phase::Offer).unwrap();
    assert_eq!(offered.round, 11);
    assert_eq!(offered.message.unwrap().from(), DeviceId(1));

    let served = entered(&log, 1, Phase::Disco, Phase::Served).unwrap();
    let asked = entered(&log, 0, Phase::Idle, Phase::Disco).unwrap();
    assert!(asked.round > served.round);
    assert_eq!(asked.message.unwrap().service(), ServiceType(6));

    assert_eq!(
        net.program(DeviceId(1)).unwrap().automaton().satisfied_requests(),
        1
    );
    // The deferred attempt and the real one both flooded a DISCO.
    let provider = net.program(DeviceId(0)).unwrap();
    assert_eq!(provider.automaton().sent_count(), 2);
    assert_eq!(provider.phase(), Phase::Idle);
}
