//! Integration tests: every termination policy delivers and cleans up.
//!
//! A 5x5 grid with 60 units between rows and columns, radius 100, so each
//! device hears its eight surrounding cells. One message crosses the grid
//! and runs as a flood and as a tree-routed process under each policy.
use aproc_protocol::{
    BenchConfig, BenchDevice, BenchMessage, DeviceId, Network, NetworkConfig, Position,
    ProcessKind, ProtocolConfig, SubtreeMode, TerminationPolicy,
};

const SIDE: usize = 5;

fn grid(protocol: ProtocolConfig, bench: &BenchConfig) -> Network<BenchDevice> {
    let mut net = Network::new(NetworkConfig::default()).unwrap();
    for i in 0..SIDE * SIDE {
        let id = DeviceId(i as u32);
        let device = BenchDevice::new(id, protocol.clone(), bench).unwrap();
        net.add(device, Position::on_grid(i, SIDE, 60.0)).unwrap();
    }
    net
}

fn message(from: u32, to: u32) -> BenchConfig {
    BenchConfig {
        messages: vec![BenchMessage {
            from: DeviceId(from),
            to: DeviceId(to),
            at: 10,
            payload: 0.3,
        }],
        ..BenchConfig::default()
    }
}

fn deliveries(net: &Network<BenchDevice>, kind: ProcessKind, policy: TerminationPolicy) -> u64 {
    net.programs()
        .map(|d| d.stats(kind, policy).unwrap().delivery_count.get())
        .sum()
}

fn active(net: &Network<BenchDevice>, kind: ProcessKind, policy: TerminationPolicy) -> usize {
    net.programs().map(|d| d.active(kind, policy)).sum()
}

fn check_all_policies(net: &mut Network<BenchDevice>, dest: u32) {
    net.run(80);
    for kind in ProcessKind::ALL {
        for policy in TerminationPolicy::ALL {
            let label = format!("{kind}/{}", policy.name());
            assert_eq!(deliveries(net, kind, policy), 1, "{label}: deliveries");
            let at_dest = net.program(DeviceId(dest)).unwrap().stats(kind, policy).unwrap();
            assert_eq!(at_dest.delivery_count.get(), 1, "{label}: destination");
            assert_eq!(active(net, kind, policy), 0, "{label}: still running");
        }
    }
}

/// Corner to corner: the tree path runs straight toward the root.
#[test]
fn corner_to_root_corner() {
    let mut net = grid(ProtocolConfig::default(), &message(24, 0));
    check_all_policies(&mut net, 0);
}

/// The tree path goes up to the root and back down another branch.
#[test]
fn across_branches() {
    let mut net = grid(ProtocolConfig::default(), &message(24, 4));
    check_all_policies(&mut net, 4);
}

#[test]
fn across_branches_with_bloom_subtrees() {
    let protocol = ProtocolConfig {
        subtree: SubtreeMode::Bloom {
            hashes: 2,
            bits: 64,
        },
        ..ProtocolConfig::default()
    };
    let mut net = grid(protocol, &message(24, 4));
    check_all_policies(&mut net, 4);
}

/// A flood with nobody at its destination dies out under the wave policy
/// but keeps running under share.
#[test]
fn wave_flood_dies_without_destination() {
    let mut net = grid(ProtocolConfig::default(), &message(24, 99));
    net.run(80);
    assert_eq!(active(&net, ProcessKind::Flood, TerminationPolicy::Wispp), 0);
    assert_eq!(deliveries(&net, ProcessKind::Flood, TerminationPolicy::Wispp), 0);
    assert!(active(&net, ProcessKind::Flood, TerminationPolicy::Share) > 0);
}
