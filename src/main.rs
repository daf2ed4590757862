//! zPod Engine - 组件部署流水线
//!
//! Usage:
//! - Run the HTTP service: `zpod-engine serve --port 8100`
//! - Add one component and wait: `zpod-engine add-component --instance-id 1 --component-uid esxi-8.0 --data last_octet=12`

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use zpod_engine::config::EnvConfig;
use zpod_engine::infra::Snapshot;
use zpod_engine::state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about = "zPod engine - component provisioning pipeline")]
struct Cli {
    /// Record snapshot (instances, components, settings, network)
    #[arg(long, global = true, env = "ZPOD_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Override the listening port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one add-component pipeline to completion
    AddComponent {
        #[arg(long)]
        instance_id: i64,

        #[arg(long)]
        component_uid: String,

        #[arg(long)]
        extra_id: Option<String>,

        /// Component data as key=value; values that parse as JSON keep their type
        #[arg(long = "data", value_parser = parse_key_val)]
        data: Vec<(String, Value)>,
    },
}

fn parse_key_val(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() {
    if let Err(e) = tracing_subscriber::fmt()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
    {
        eprintln!("Failed to initialize tracing: {}", e);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "zPod engine failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = EnvConfig::from_env();
    if let Some(path) = cli.snapshot {
        config.snapshot_path = path;
    }

    let snapshot = Snapshot::load(&config.snapshot_path).await?;

    match cli.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(config.port);
            let state = Arc::new(AppState::build(&config, snapshot).await?);
            info!(version = zpod_engine::config::env::constants::VERSION, "Starting zPod engine");
            zpod_engine::serve(state, port).await
        }
        Command::AddComponent {
            instance_id,
            component_uid,
            extra_id,
            data,
        } => {
            let state = AppState::build(&config, snapshot).await?;
            let data: Map<String, Value> = data.into_iter().collect();

            let handle = state
                .coordinator
                .add_component(instance_id, &component_uid, extra_id.as_deref(), data)
                .await?;
            let pipeline_id = handle.id.clone();
            let result = handle.wait().await;

            if let Some(record) = state.pipelines.get_any(&pipeline_id).await {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }

            result?;
            Ok(())
        }
    }
}
