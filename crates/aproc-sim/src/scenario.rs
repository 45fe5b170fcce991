use std::str::FromStr;
use std::time::Instant;

use anyhow::{bail, Context};
use aproc_protocol::{
    BenchConfig, BenchDevice, BenchMessage, Device, DeviceId, Network, NetworkConfig, Position,
    ProcessKind, ProcessStats, Program, ProtocolConfig, ServiceProfile, ServiceRequest,
    ServiceType, TerminationPolicy,
};
use clap::ValueEnum;
use rand::prelude::*;
use tracing::info;

use crate::events::{
    emit, EventBenchRound, EventFinished, EventManagerStats, EventPhases, EventRequests,
    EventStarted, EventTransition,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Layout {
    /// Evenly spaced on a circle whose radius is the spacing.
    Circle,
    /// Row-major square grid.
    Grid,
    /// Uniform in the network square.
    Random,
}

pub fn positions(layout: Layout, count: usize, spacing: f64, side: f64, seed: u64) -> Vec<Position> {
    match layout {
        Layout::Circle => {
            let center = Position::new(side / 2.0, side / 2.0);
            (0..count)
                .map(|i| Position::on_circle(center, spacing, i, count))
                .collect()
        }
        Layout::Grid => {
            let columns = (count as f64).sqrt().ceil() as usize;
            (0..count).map(|i| Position::on_grid(i, columns, spacing)).collect()
        }
        Layout::Random => {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..count)
                .map(|_| Position::new(rng.random_range(0.0..=side), rng.random_range(0.0..=side)))
                .collect()
        }
    }
}

/// `device:service:rank`, e.g. `0:5:0.8`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderSpec {
    pub device: DeviceId,
    pub service: ServiceType,
    pub rank: f64,
}

impl FromStr for ProviderSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let [device, service, rank] = split3(s)?;
        Ok(Self {
            device: DeviceId(device.parse().context("provider device")?),
            service: ServiceType(service.parse().context("provider service")?),
            rank: rank.parse().context("provider rank")?,
        })
    }
}

/// `device:service:at`, e.g. `9:5:10`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestSpec {
    pub device: DeviceId,
    pub request: ServiceRequest,
}

impl FromStr for RequestSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let [device, service, at] = split3(s)?;
        Ok(Self {
            device: DeviceId(device.parse().context("request device")?),
            request: ServiceRequest {
                at: at.parse().context("request round")?,
                service: ServiceType(service.parse().context("request service")?),
                retries: 0,
            },
        })
    }
}

/// `from:to:at`, e.g. `24:0:10`.
pub fn parse_bench_message(s: &str) -> anyhow::Result<BenchMessage> {
    let [from, to, at] = split3(s)?;
    Ok(BenchMessage {
        from: DeviceId(from.parse().context("message sender")?),
        to: DeviceId(to.parse().context("message destination")?),
        at: at.parse().context("message round")?,
        payload: 0.0,
    })
}

fn split3(s: &str) -> anyhow::Result<[&str; 3]> {
    let parts: Vec<&str> = s.split(':').map(str::trim).collect();
    match parts.as_slice() {
        [a, b, c] => Ok([a, b, c]),
        _ => bail!("expected three ':'-separated fields, got {s:?}"),
    }
}

pub struct DiscoveryRun {
    pub protocol: ProtocolConfig,
    pub network: NetworkConfig,
    pub positions: Vec<Position>,
    pub providers: Vec<ProviderSpec>,
    pub requests: Vec<RequestSpec>,
    pub rounds: u64,
    /// Emit a phase count every this many rounds; zero disables it.
    pub report_every: u64,
}

fn profile_of(id: DeviceId, providers: &[ProviderSpec], requests: &[RequestSpec]) -> ServiceProfile {
    let mut profile = providers
        .iter()
        .find(|p| p.device == id)
        .map(|p| ServiceProfile::offering(p.service, p.rank))
        .unwrap_or_default();
    for r in requests.iter().filter(|r| r.device == id) {
        profile = profile.with_request(r.request);
    }
    profile
}

pub fn run_discovery(run: DiscoveryRun) -> anyhow::Result<()> {
    let start = Instant::now();
    for device in run.providers.iter().map(|p| p.device).chain(run.requests.iter().map(|r| r.device)) {
        if device.get() as usize >= run.positions.len() {
            bail!("device {device} does not exist");
        }
    }

    let mut net = Network::new(run.network)?;
    for (i, position) in run.positions.iter().enumerate() {
        let id = DeviceId(i as u32);
        let profile = profile_of(id, &run.providers, &run.requests);
        net.add(Device::new(id, run.protocol.clone(), profile)?, *position)?;
    }
    emit(&EventStarted::new("discovery", net.len(), run.rounds, run.network.seed));
    info!(devices = net.len(), rounds = run.rounds, "discovery run started");

    for _ in 0..run.rounds {
        net.round();
        let now = net.now();
        let mut phases = EventPhases::new(now);
        for device in net.programs() {
            for t in device.automaton().transitions() {
                emit(&EventTransition::new(device.id().get(), t));
            }
            phases.count(device.phase(), device.automaton().active_processes());
        }
        if run.report_every > 0 && now % run.report_every == 0 {
            emit(&phases);
        }
    }

    let managers = [
        ("discovery", run.protocol.discovery.policy),
        ("confirm", run.protocol.confirm.policy),
        ("data", run.protocol.data.policy),
    ];
    for (name, policy) in managers {
        let mut total = ProcessStats::new();
        for device in net.programs() {
            let automaton = device.automaton();
            total.absorb(match name {
                "discovery" => automaton.discovery_stats(),
                "confirm" => automaton.confirm_stats(),
                _ => automaton.data_stats(),
            });
        }
        emit(&EventManagerStats::new(name, policy.name(), total));
    }

    let requesters: Vec<_> = net.programs().filter(|d| d.automaton().is_requester()).collect();
    emit(&EventRequests {
        event: "requests",
        requesters: requesters.len(),
        satisfied: requesters.iter().map(|d| d.automaton().satisfied_requests()).sum(),
        sent: requesters.iter().map(|d| d.automaton().sent_count()).sum(),
    });
    emit(&EventFinished {
        event: "finished",
        rounds: net.now(),
        elapsed_ms: start.elapsed().as_millis(),
    });
    Ok(())
}

pub struct BenchRun {
    pub protocol: ProtocolConfig,
    pub network: NetworkConfig,
    pub positions: Vec<Position>,
    pub bench: BenchConfig,
    pub rounds: u64,
    pub report_every: u64,
}

pub fn run_bench(run: BenchRun) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut net = Network::new(run.network)?;
    for (i, position) in run.positions.iter().enumerate() {
        let id = DeviceId(i as u32);
        net.add(BenchDevice::new(id, run.protocol.clone(), &run.bench)?, *position)?;
    }
    emit(&EventStarted::new("bench", net.len(), run.rounds, run.network.seed));
    info!(devices = net.len(), messages = run.bench.messages.len(), "bench run started");

    for _ in 0..run.rounds {
        net.round();
        let now = net.now();
        if run.report_every > 0 && now % run.report_every == 0 {
            let active = ProcessKind::ALL
                .into_iter()
                .flat_map(|kind| TerminationPolicy::ALL.into_iter().map(move |p| (kind, p)))
                .map(|(kind, policy)| {
                    let live = net.programs().map(|d| d.active(kind, policy)).sum();
                    (format!("{kind}/{}", policy.name()), live)
                })
                .collect();
            emit(&EventBenchRound {
                event: "bench_round",
                round: now,
                active,
            });
        }
    }

    for kind in ProcessKind::ALL {
        for policy in TerminationPolicy::ALL {
            let mut total = ProcessStats::new();
            for device in net.programs() {
                if let Some(stats) = device.stats(kind, policy) {
                    total.absorb(stats);
                }
            }
            emit(&EventManagerStats::new(kind.name(), policy.name(), total));
        }
    }
    emit(&EventFinished {
        event: "finished",
        rounds: net.now(),
        elapsed_ms: start.elapsed().as_millis(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_specs() {
        let p: ProviderSpec = "0:5:0.8".parse().unwrap();
        assert_eq!(p.device, DeviceId(0));
        assert_eq!(p.service, ServiceType(5));
        assert_eq!(p.rank, 0.8);

        let r: RequestSpec = " 9 : 5 : 10 ".parse().unwrap();
        assert_eq!(r.device, DeviceId(9));
        assert_eq!(r.request.at, 10);

        let m = parse_bench_message("24:0:10").unwrap();
        assert_eq!((m.from, m.to, m.at), (DeviceId(24), DeviceId(0), 10));

        assert!("0:5".parse::<ProviderSpec>().is_err());
        assert!("a:5:1".parse::<RequestSpec>().is_err());
    }

    #[test]
    fn profiles_merge_offers_and_requests() {
        let providers = ["0:5:0.8".parse().unwrap()];
        let requests = ["0:6:3".parse().unwrap(), "0:7:9".parse().unwrap()];
        let profile = profile_of(DeviceId(0), &providers, &requests);
        assert_eq!(profile.offered, Some(ServiceType(5)));
        assert_eq!(profile.requests.len(), 2);
        assert_eq!(profile_of(DeviceId(1), &providers, &requests), ServiceProfile::default());
    }

    #[test]
    fn layouts_place_every_device() {
        for layout in [Layout::Circle, Layout::Grid, Layout::Random] {
            let ps = positions(layout, 9, 40.0, 300.0, 7);
            assert_eq!(ps.len(), 9);
        }
        let grid = positions(Layout::Grid, 9, 60.0, 300.0, 0);
        assert_eq!(grid[4], Position::new(60.0, 60.0));
        assert_eq!(positions(Layout::Random, 5, 0.0, 300.0, 7), positions(Layout::Random, 5, 0.0, 300.0, 7));
    }
}
