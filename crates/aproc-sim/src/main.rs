mod events;
mod output;
mod scenario;

use std::path::PathBuf;

use anyhow::Context;
use aproc_protocol::{
    BenchConfig, BenchMessage, DeviceId, NetworkConfig, ProtocolConfig, ServiceRequest,
    TerminationPolicy,
};
use clap::{Parser, Subcommand};
use scenario::{Layout, ProviderSpec, RequestSpec};

#[derive(Parser)]
#[command(name = "aproc-sim", about = "Round-based simulator for aggregate processes")]
struct Cli {
    /// Protocol parameters as a JSON file; missing fields take defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write every event to a JSONL file in this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Seed for random layouts, movement and link noise.
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Rounds to simulate.
    #[arg(long, default_value = "100")]
    rounds: u64,

    /// Emit a progress event every N rounds (0 = never).
    #[arg(long, default_value = "10")]
    report_every: u64,

    /// Side of the square devices live and move in.
    #[arg(long, default_value = "500")]
    side: f64,

    /// Distance a device moves per round.
    #[arg(long, default_value = "0")]
    movement_speed: f64,

    /// Relative error applied to measured link lengths.
    #[arg(long, default_value = "0")]
    distance_noise: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Service discovery: DISCO floods, offers, confirmation and transfer.
    Discovery {
        /// Number of devices.
        #[arg(long, default_value = "10")]
        devices: usize,
        #[arg(long, value_enum, default_value = "circle")]
        layout: Layout,
        /// Circle radius or grid spacing.
        #[arg(long, default_value = "40")]
        spacing: f64,
        /// Providers as `device:service:rank`.
        #[arg(long = "provider", default_value = "0:5:0.8")]
        providers: Vec<ProviderSpec>,
        /// Requests as `device:service:at`.
        #[arg(long = "request", default_value = "9:5:10")]
        requests: Vec<RequestSpec>,
        /// Extra attempts after an unanswered request.
        #[arg(long, default_value = "0")]
        retries: u32,
        /// Overrides the configured hop estimate.
        #[arg(long)]
        hops: Option<u32>,
    },

    /// Flood and tree processes side by side under every policy.
    Bench {
        /// Devices per grid row.
        #[arg(long, default_value = "5")]
        width: usize,
        #[arg(long, default_value = "60")]
        spacing: f64,
        /// Messages as `from:to:at`; defaults to the far corner sending to the root.
        #[arg(long = "message", value_parser = scenario::parse_bench_message)]
        messages: Vec<BenchMessage>,
        /// Policy the rendering shows.
        #[arg(long, default_value = "wispp", value_parser = parse_policy)]
        rendered: TerminationPolicy,
    },
}

fn parse_policy(s: &str) -> anyhow::Result<TerminationPolicy> {
    TerminationPolicy::ALL
        .into_iter()
        .find(|p| p.name() == s)
        .with_context(|| format!("unknown policy {s:?}, expected legacy, share, ispp or wispp"))
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ProtocolConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ProtocolConfig::from_json(&json).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(ProtocolConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut protocol = load_config(cli.config.as_ref())?;
    let network = NetworkConfig {
        radius: protocol.radius,
        period: protocol.period,
        side: cli.side,
        movement_speed: cli.movement_speed,
        distance_noise: cli.distance_noise,
        seed: cli.seed,
    };

    eprintln!("aproc-sim v{}", env!("CARGO_PKG_VERSION"));

    let mode = match cli.command {
        Command::Discovery { .. } => "discovery",
        Command::Bench { .. } => "bench",
    };
    if let Some(dir) = &cli.output_dir {
        let path = output::run_log_path(dir, mode, cli.seed)?;
        output::open_run_log(&path)?;
        eprintln!("Run log: {}", path.display());
    }
    eprintln!();

    match cli.command {
        Command::Discovery {
            devices,
            layout,
            spacing,
            providers,
            requests,
            retries,
            hops,
        } => {
            if let Some(hops) = hops {
                protocol.hops = hops;
                protocol.validate()?;
            }
            let requests = requests
                .into_iter()
                .map(|r| RequestSpec {
                    request: ServiceRequest { retries, ..r.request },
                    ..r
                })
                .collect();
            scenario::run_discovery(scenario::DiscoveryRun {
                protocol,
                network,
                positions: scenario::positions(layout, devices, spacing, cli.side, cli.seed),
                providers,
                requests,
                rounds: cli.rounds,
                report_every: cli.report_every,
            })?;
        }

        Command::Bench {
            width,
            spacing,
            messages,
            rendered,
        } => {
            let count = width * width;
            let messages = if messages.is_empty() && count > 1 {
                vec![BenchMessage {
                    from: DeviceId(count as u32 - 1),
                    to: protocol.root,
                    at: 10,
                    payload: 0.0,
                }]
            } else {
                messages
            };
            let bench = BenchConfig {
                messages,
                rendered,
                ..BenchConfig::default()
            };
            scenario::run_bench(scenario::BenchRun {
                protocol,
                network,
                positions: scenario::positions(Layout::Grid, count, spacing, cli.side, cli.seed),
                bench,
                rounds: cli.rounds,
                report_every: cli.report_every,
            })?;
        }
    }

    output::flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_discovery_lists() {
        let cli = Cli::try_parse_from([
            "aproc-sim",
            "--rounds",
            "50",
            "discovery",
            "--provider",
            "0:5:0.8",
            "--provider",
            "3:5:0.5",
            "--request",
            "9:5:10",
        ])
        .unwrap();
        assert_eq!(cli.rounds, 50);
        match cli.command {
            Command::Discovery {
                providers,
                requests,
                layout,
                ..
            } => {
                assert_eq!(providers.len(), 2);
                assert_eq!(requests.len(), 1);
                assert_eq!(layout, Layout::Circle);
            }
            Command::Bench { .. } => panic!("expected discovery"),
        }
    }

    #[test]
    fn cli_parses_bench_policy() {
        let cli = Cli::try_parse_from(["aproc-sim", "bench", "--rendered", "share"]).unwrap();
        match cli.command {
            Command::Bench { rendered, messages, .. } => {
                assert_eq!(rendered, TerminationPolicy::Share);
                assert!(messages.is_empty());
            }
            Command::Discovery { .. } => panic!("expected bench"),
        }
        assert!(Cli::try_parse_from(["aproc-sim", "bench", "--rendered", "eager"]).is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let path = PathBuf::from("/nonexistent/aproc.json");
        assert!(load_config(Some(&path)).is_err());
        assert_eq!(load_config(None).unwrap(), ProtocolConfig::default());
    }
}
