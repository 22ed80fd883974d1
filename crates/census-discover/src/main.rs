//! CLI entry point for the census-discover scanner.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgGroup, Args, Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{fmt, EnvFilter};

use census_core::events::{EventPayload, ScanEvent};

use census_discover::aggregate::{DiscoveryReport, OutputPolicy, ProbeReport, RunSummary};
use census_discover::classify::DeviceClassifier;
use census_discover::config::{load_discover_config, DiscoverConfig};
use census_discover::error::DiscoverError;
use census_discover::pipeline::{Liveness, Pipeline, Probing};
use census_discover::prober::DeviceProber;
use census_discover::snmp::SnmpClient;
use census_discover::targets::{read_target_column, read_target_file, TargetSpec};
use census_discover::{liveness, output, tables};

const PASSPHRASE_ENV: &str = "CENSUS_VAULT_PASSPHRASE";

#[derive(Parser, Debug)]
#[command(name = "census-discover")]
#[command(about = "Network host discovery and SNMP device fingerprinting")]
struct Cli {
    /// Config file prefix (default: census).
    #[arg(short, long, default_value = "census", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Liveness sweep; writes an IP/STATUS table.
    Discover {
        #[command(flatten)]
        run: RunArgs,

        /// List only hosts that answered.
        #[arg(long)]
        up_only: bool,
    },
    /// Liveness, SNMP probe, and classification; writes a JSON device document.
    Probe {
        #[command(flatten)]
        run: RunArgs,

        /// Seal the document with the passphrase in CENSUS_VAULT_PASSPHRASE.
        #[arg(long)]
        encrypt: bool,
    },
    /// Read a sealed or plain device document and write its plaintext.
    Open {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    targets: TargetArgs,

    /// Maximum concurrent host jobs.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Output file (stdout when absent).
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("target_source")
        .required(true)
        .args(["target", "targets", "target_file", "target_csv", "hosts"])
))]
struct TargetArgs {
    /// Single CIDR block, e.g. 10.0.1.0/24.
    #[arg(short, long)]
    target: Option<String>,

    /// Comma-separated CIDR blocks and addresses.
    #[arg(long, value_delimiter = ',')]
    targets: Vec<String>,

    /// Flat file of CIDR blocks and addresses.
    #[arg(long)]
    target_file: Option<PathBuf>,

    /// Tabular file with a header row; read with --column.
    #[arg(long, requires = "column")]
    target_csv: Option<PathBuf>,

    /// Column of --target-csv holding the targets.
    #[arg(long, requires = "target_csv")]
    column: Option<String>,

    /// Field delimiter of --target-csv.
    #[arg(long, default_value_t = ';')]
    csv_delimiter: char,

    /// Comma-separated host addresses, probed as given without expansion.
    #[arg(long, value_delimiter = ',')]
    hosts: Vec<String>,
}

impl TargetArgs {
    fn spec(&self) -> anyhow::Result<TargetSpec> {
        if let Some(cidr) = &self.target {
            return Ok(TargetSpec::Cidr(cidr.clone()));
        }
        if !self.targets.is_empty() {
            return Ok(TargetSpec::List(self.targets.clone()));
        }
        if let Some(path) = &self.target_file {
            return Ok(TargetSpec::List(read_target_file(path)?));
        }
        if let (Some(path), Some(column)) = (&self.target_csv, &self.column) {
            let delimiter = u8::try_from(self.csv_delimiter)
                .ok()
                .filter(u8::is_ascii)
                .ok_or_else(|| anyhow::anyhow!("--csv-delimiter must be an ASCII character"))?;
            return Ok(TargetSpec::List(read_target_column(path, column, delimiter)?));
        }
        if !self.hosts.is_empty() {
            return Ok(TargetSpec::Addresses(self.hosts.clone()));
        }
        anyhow::bail!("Specify a target: --target, --targets, --target-file, --target-csv, or --hosts")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Discover { run, up_only } => {
            let config = load_discover_config(&cli.config)?;
            let policy = if up_only {
                OutputPolicy::UpOnly
            } else {
                OutputPolicy::AllHosts
            };
            discover(&config, &run, policy).await
        }
        Command::Probe { run, encrypt } => {
            let config = load_discover_config(&cli.config)?;
            probe(&config, &run, encrypt).await
        }
        Command::Open { input, output: out } => {
            let passphrase = std::env::var(PASSPHRASE_ENV).ok();
            let plain = census_vault::open_file(&input, passphrase.as_deref())
                .map_err(DiscoverError::from)?;
            output::emit(out.as_deref(), &plain)?;
            Ok(())
        }
    }
}

async fn discover(config: &DiscoverConfig, run: &RunArgs, policy: OutputPolicy) -> anyhow::Result<()> {
    let delimiter = config.output_delimiter_byte()?;
    let hosts = run.targets.spec()?.resolve()?;
    let pipeline = build_pipeline(config, run).await?;

    let scan = pipeline.discover(&hosts).await;
    let summary = RunSummary::new(&scan);
    summary.log();

    let report = DiscoveryReport::from_outcomes(&scan.outcomes, policy);
    let table = output::render_discovery_table(&report, delimiter)?;
    output::emit(run.output.as_deref(), &table)?;
    exit_status(&summary)
}

async fn probe(config: &DiscoverConfig, run: &RunArgs, encrypt: bool) -> anyhow::Result<()> {
    // Fail before any probing when sealing is asked for but impossible.
    let passphrase = if encrypt {
        Some(std::env::var(PASSPHRASE_ENV).map_err(|_| {
            anyhow::anyhow!("--encrypt needs a passphrase in {PASSPHRASE_ENV}")
        })?)
    } else {
        None
    };

    let (credentials, profiles) = tables::load_profiles(Path::new(&config.profiles_path))?;
    let known = tables::load_known_devices(
        Path::new(&config.known_devices_path),
        config.known_devices_delimiter_byte()?,
    )?;
    let hosts = run.targets.spec()?.resolve()?;
    let pipeline = build_pipeline(config, run).await?;

    let prober = DeviceProber::new(
        Arc::new(SnmpClient::new(&config.snmp)),
        Arc::new(credentials),
        Arc::new(profiles),
        &config.snmp.canary_oid,
    );
    let probing = Arc::new(Probing {
        prober,
        classifier: DeviceClassifier::new(Arc::new(known)),
        require_liveness: config.require_liveness,
    });

    let scan = pipeline.probe(&hosts, probing).await;
    let summary = RunSummary::new(&scan);
    summary.log();

    let report = ProbeReport::from_outcomes(&scan.outcomes);
    let document = output::render_device_document(&report)?;
    match (&passphrase, run.output.as_deref()) {
        (Some(passphrase), Some(path)) => {
            census_vault::seal_to_file(path, &document, passphrase).map_err(DiscoverError::from)?
        }
        (Some(passphrase), None) => {
            let sealed = census_vault::seal(&document, passphrase).map_err(DiscoverError::from)?;
            output::emit(None, &sealed)?;
        }
        (None, path) => output::emit(path, &document)?,
    }

    exit_status(&summary)
}

fn exit_status(summary: &RunSummary) -> anyhow::Result<()> {
    if summary.nothing_succeeded() {
        return Err(DiscoverError::NothingSucceeded {
            total: summary.total as usize,
        }
        .into());
    }
    Ok(())
}

/// Liveness backend, progress logging, and Ctrl-C handling for one run.
async fn build_pipeline(config: &DiscoverConfig, run: &RunArgs) -> anyhow::Result<Pipeline> {
    let probe = liveness::from_config(&config.liveness).await?;
    let concurrency = run
        .concurrency
        .filter(|&n| n > 0)
        .unwrap_or_else(|| config.effective_concurrency());

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(log_progress(events_rx));

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, no further hosts will be dispatched");
            let _ = stop_tx.send(true);
        }
    });

    Ok(
        Pipeline::new(concurrency, Liveness::from_config(probe, &config.liveness))
            .with_events(events_tx)
            .with_shutdown(stop_rx),
    )
}

async fn log_progress(mut events: mpsc::UnboundedReceiver<ScanEvent>) {
    while let Some(event) = events.recv().await {
        if let EventPayload::HostCompleted {
            host,
            error_kind,
            completed,
            total,
        } = event.payload
        {
            let step = (total / 10).max(1);
            tracing::debug!(host = %host, error_kind = ?error_kind, completed, total, "Host done");
            if completed % step == 0 || completed == total {
                tracing::info!(scan_id = %event.scan_id, completed, total, "Progress");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Discover { run, .. } | Command::Probe { run, .. } => run,
            Command::Open { .. } => panic!("not a scan command"),
        }
    }

    #[test]
    fn test_target_list_becomes_list_spec() {
        let run = run_args(&["census-discover", "discover", "--targets", "10.0.0.0/30,10.0.1.5"]);
        assert_eq!(
            run.targets.spec().unwrap(),
            TargetSpec::List(vec!["10.0.0.0/30".into(), "10.0.1.5".into()])
        );
    }

    #[test]
    fn test_hosts_become_direct_addresses() {
        let run = run_args(&["census-discover", "probe", "--hosts", "10.0.0.1,10.0.0.2"]);
        assert_eq!(
            run.targets.spec().unwrap(),
            TargetSpec::Addresses(vec!["10.0.0.1".into(), "10.0.0.2".into()])
        );
    }

    #[test]
    fn test_network_target_excludes_direct_hosts() {
        let err = Cli::try_parse_from([
            "census-discover",
            "probe",
            "--target",
            "10.0.0.0/24",
            "--hosts",
            "10.0.0.1",
        ])
        .err()
        .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_target_csv_needs_column() {
        let err = Cli::try_parse_from(["census-discover", "discover", "--target-csv", "inv.csv"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_some_target_is_required() {
        assert!(Cli::try_parse_from(["census-discover", "discover"]).is_err());
    }
}
