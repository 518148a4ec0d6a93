//! varlens: a cost-aware debug adapter over recorded debug sessions.

use clap::{Parser as ClapParser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tracing_subscriber::EnvFilter;
use varlens_cli::config::{VarlensConfig, CONFIG_FILE};
use varlens_cli::dap;
use varlens_core::snapshot::SnapshotEngine;
use varlens_core::NativeEngine;
use varlens_rt::{InspectionSession, Window};

fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}

#[derive(ClapParser)]
#[command(name = "varlens", version, about = "Cost-aware variable inspection for debug adapters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the Debug Adapter Protocol on stdio for a recorded snapshot
    Dap {
        /// Path to the snapshot JSON file
        #[arg()]
        snapshot: PathBuf,

        /// Config file (default: nearest varlens.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the local variable descriptors of one frame as JSON
    Inspect {
        /// Path to the snapshot JSON file
        #[arg()]
        snapshot: PathBuf,

        /// Config file (default: nearest varlens.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Frame index, most recent first
        #[arg(long, default_value_t = 0)]
        frame: usize,

        /// Recorded stop to inspect
        #[arg(long, default_value_t = 0)]
        stop: usize,
    },
    /// Write a commented varlens.toml into the current directory
    Init,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Dap { snapshot, config } => {
            let config = load_config(config.as_deref());
            init_logging(&config);
            let session = open_session(&snapshot, &config, 0);
            dap::run_dap_server(session);
        }
        Commands::Inspect {
            snapshot,
            config,
            frame,
            stop,
        } => {
            let config = load_config(config.as_deref());
            init_logging(&config);
            cmd_inspect(&snapshot, &config, frame, stop);
        }
        Commands::Init => cmd_init(),
    }
}

/// Logs go to stderr; stdout carries protocol traffic.
fn init_logging(config: &VarlensConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> VarlensConfig {
    VarlensConfig::load(path).unwrap_or_else(|e| {
        eprintln!("{} {}", red("config error:"), e);
        std::process::exit(2);
    })
}

fn cmd_init() {
    let path = PathBuf::from(CONFIG_FILE);
    if path.exists() {
        eprintln!("{} {} already exists, not overwriting", red("error:"), CONFIG_FILE);
        std::process::exit(1);
    }
    std::fs::write(&path, VarlensConfig::default_template()).unwrap_or_else(|e| {
        eprintln!("{} writing {}: {}", red("error:"), CONFIG_FILE, e);
        std::process::exit(1);
    });
    println!("created {}", CONFIG_FILE);
}

fn open_session(snapshot: &Path, config: &VarlensConfig, stop: usize) -> InspectionSession {
    let engine = SnapshotEngine::load(snapshot)
        .and_then(|engine| engine.seek(stop).map(|_| engine))
        .unwrap_or_else(|e| {
            eprintln!("{} cannot load '{}': {}", red("error:"), snapshot.display(), e);
            std::process::exit(1);
        });
    let registry = config.build_registry().unwrap_or_else(|e| {
        eprintln!("{} {}", red("config error:"), e);
        std::process::exit(2);
    });
    let engine: Arc<dyn NativeEngine> = Arc::new(engine);
    InspectionSession::new(engine, registry, config.session_options())
}

fn cmd_inspect(snapshot: &Path, config: &VarlensConfig, frame: usize, stop: usize) {
    let mut session = open_session(snapshot, config, stop);
    let locals = match session.scopes(frame) {
        Ok(scopes) => scopes.first().map_or(0, |s| s.variables_reference),
        Err(e) => {
            eprintln!("{} {}", red("error:"), e);
            std::process::exit(1);
        }
    };
    let outcome = session.variables(locals, Window::all());
    if let Some(diagnostic) = &outcome.diagnostic {
        eprintln!("{}", diagnostic);
    }

    let counters: serde_json::Map<String, serde_json::Value> = session
        .diagnostics()
        .iter()
        .map(|(name, counts)| (name.to_string(), json!(counts)))
        .collect();
    let report = json!({
        "stop": stop,
        "frame": frame,
        "variables": outcome.variables,
        "counters": counters,
        "sizeCalls": session.diagnostics().size_log(),
    });
    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("{} {}", red("error:"), e);
            std::process::exit(1);
        }
    }
}
