#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ranging_mds::evaluation::{run_simulation, SimulationSettings};
use ranging_mds::swarm::{Behavior, Method};
use ranging_mds::{Config, EntryTable, NodeId, Pipeline};

#[derive(Parser)]
#[command(name = "ranging", version, about = "Distance resolution by graph drawing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one caller's distances from an entry table (JSON)
    Resolve {
        #[arg(long)]
        table: PathBuf,
        #[arg(long)]
        caller: NodeId,
        /// unweighted | weighted | drop-neighbor | drop-link
        #[arg(long, default_value = "weighted")]
        method: Pipeline,
        /// Engine configuration (JSON); missing fields take defaults
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the result here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run the synthetic swarm harness and write per-method summaries as JSONL
    Simulate {
        #[arg(long, default_value_t = 30)]
        agents: usize,
        #[arg(long, default_value_t = 5)]
        rounds: usize,
        /// Side of the square agents are placed in
        #[arg(long, default_value_t = 30.0)]
        bounds: f64,
        #[arg(long, default_value_t = 12.0)]
        range: f64,
        /// Maximum relative error of honest guesses (0.1 = 10%)
        #[arg(long, default_value_t = 0.1)]
        noise: f64,
        #[arg(long, default_value_t = 0.0)]
        drop_rate: f64,
        /// Drop and connect links one-way instead of in pairs
        #[arg(long)]
        asymmetric: bool,
        /// Number of adversarial agents
        #[arg(long, default_value_t = 0)]
        malicious: usize,
        /// close | far | threshold-break
        #[arg(long, default_value = "close")]
        strategy: Behavior,
        /// Restrict to these methods (repeatable); all by default
        #[arg(long = "method")]
        methods: Vec<Method>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            table,
            caller,
            method,
            config,
            out,
        } => {
            let cfg = load_config(config.as_ref())?;
            let table: EntryTable = read_json(&table)?;
            let resolution = method.run(caller, &table, &cfg)?;
            let json = serde_json::to_string_pretty(&resolution)?;
            match out {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Commands::Simulate {
            agents,
            rounds,
            bounds,
            range,
            noise,
            drop_rate,
            asymmetric,
            malicious,
            strategy,
            methods,
            seed,
            out,
            config,
        } => {
            let cfg = load_config(config.as_ref())?;
            let settings = SimulationSettings {
                agents,
                rounds,
                bounds,
                range,
                noise,
                drop_rate,
                symmetric: !asymmetric,
                adversaries: malicious,
                strategy,
                methods: if methods.is_empty() {
                    Method::ALL.to_vec()
                } else {
                    methods
                },
                seed,
            };
            let report = run_simulation(&settings, &cfg)?;

            let mut file = BufWriter::new(File::create(&out)?);
            for summary in &report.summaries {
                let line = serde_json::to_string(summary)?;
                writeln!(file, "{line}")?;
            }
            file.flush()?;
            println!(
                "wrote {} method summaries to {}",
                report.summaries.len(),
                out.display()
            );
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    let cfg = match path {
        Some(p) => read_json(p)?,
        None => Config::default(),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
