use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "trl")]
#[command(about = "Tranche reward ledger CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a YAML scenario against a fresh ledger and print the JSON report
    Simulate {
        /// Scenario file (start time, schedules, timed actions)
        #[arg(long)]
        scenario: PathBuf,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<PathBuf>,

        /// What to do with config keys nothing reads
        #[arg(long, value_enum, default_value_t = UnusedKeys::Warn)]
        unused_keys: UnusedKeys,

        /// Exit non-zero when an invariant check fired during the run
        #[arg(long, default_value_t = false)]
        fail_on_violation: bool,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> overrides...)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum UnusedKeys {
    Warn,
    Fail,
}

impl From<UnusedKeys> for trl_config::UnusedKeyPolicy {
    fn from(v: UnusedKeys) -> Self {
        match v {
            UnusedKeys::Warn => trl_config::UnusedKeyPolicy::Warn,
            UnusedKeys::Fail => trl_config::UnusedKeyPolicy::Fail,
        }
    }
}

fn init_tracing() {
    // stdout carries the JSON report; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Simulate {
            scenario,
            config_paths,
            unused_keys,
            fail_on_violation,
        } => {
            let out = commands::simulate(&scenario, &config_paths, unused_keys.into())?;
            println!("{}", serde_json::to_string_pretty(&out)?);
            if fail_on_violation {
                commands::ensure_no_violations(&out.report)?;
            }
        }

        Commands::ConfigHash { paths } => {
            let loaded = trl_config::load_layered_yaml(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}
