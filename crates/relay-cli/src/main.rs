//! relay - streams a scripted tool-using agent over JSON lines

mod config;
mod serve;

use anyhow::Context;
use clap::Parser;
use relay_agent::{ClientChannel, SessionRegistry, StaticTools};
use relay_ai::{Script, ScriptedBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// relay - JSON-lines front end for agent sessions
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: $RELAY_CONFIG_PATH or ~/.config/relay/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend script to replay (JSON)
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

fn init_tracing(verbose: bool, default_filter: &str) {
    let filter = if verbose {
        EnvFilter::new("relay=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
    };
    // stdout carries the event stream
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_script(path: Option<&PathBuf>) -> anyhow::Result<Script> {
    let Some(path) = path else {
        return Ok(Script::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    Script::from_json(&json).with_context(|| format!("failed to parse script {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(config::Config::config_path);

    // Initialize config and exit
    if args.init_config {
        config::Config::init(&config_path)?;
        println!("Config file created at: {}", config_path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let loaded = config::Config::load_from(&config_path);
    let config = loaded.as_ref().cloned().unwrap_or_default();
    init_tracing(args.verbose, &config.log_filter);
    if let Err(e) = &loaded {
        tracing::warn!(error = %format!("{:#}", e), "using default config");
    }

    let script = load_script(args.script.as_ref())?;
    tracing::debug!(
        turns = script.turns.len(),
        tools = script.tools.len(),
        "loaded backend script"
    );

    let backend = Arc::new(ScriptedBackend::from_script(&script));
    let tools = Arc::new(StaticTools::new(script.tools.clone()));
    let registry = Arc::new(SessionRegistry::new(config.session.clone(), backend, tools));

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(serve::write_events(rx, tokio::io::stdout()));
    let channel: Arc<dyn ClientChannel> = Arc::new(tx);

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = serve::serve(registry.clone(), channel, stdin) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::debug!("interrupted, tearing down session");
            registry.remove(serve::CONNECTION_ID);
        }
    }
    drop(registry);

    writer.await??;
    Ok(())
}
