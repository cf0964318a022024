//! Server Warden - game server daemon supervision.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use server_warden::catalog::Catalog;
use server_warden::config::{ConfigLoader, WardenConfig};
use server_warden::console::{LineFramer, RuleSet};
use server_warden::display;
use server_warden::supervisor::{Supervisor, SupervisorEvent};

#[derive(Parser)]
#[command(
    name = "server-warden",
    about = "Game server daemon supervision with lifecycle and roster tracking",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Servers root directory (overrides config file)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List launchable instances in the servers root.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run an instance, streaming its console and forwarding typed commands.
    Run {
        /// Instance id (subdirectory name under the servers root).
        instance: String,
        /// Seconds to wait for voluntary exit before forced termination.
        #[arg(long)]
        stop_timeout: Option<u64>,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn build_supervisor(config: &WardenConfig) -> Supervisor {
    let encoding = LineFramer::encoding_for_label(&config.console.encoding).unwrap_or_else(|| {
        tracing::warn!(
            label = %config.console.encoding,
            "Unknown encoding label, falling back to utf-8"
        );
        encoding_rs::UTF_8
    });
    Supervisor::new(RuleSet::minecraft())
        .with_encoding(encoding)
        .with_stop_command(config.stop.command.clone())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match ConfigLoader::new().load() {
        Ok(config) => config,
        Err(e) => {
            display::print_error(&e.to_string());
            std::process::exit(1);
        }
    };
    let root = cli.root.unwrap_or_else(|| config.servers_root());
    let catalog = Catalog::new(root);

    match cli.command {
        Commands::List { json } => list_instances(&catalog, &config, json),
        Commands::Run {
            instance,
            stop_timeout,
        } => {
            let timeout = stop_timeout.map_or_else(|| config.stop.timeout(), Duration::from_secs);
            run_instance(&catalog, &config, &instance, timeout).await;
        }
    }
}

fn list_instances(catalog: &Catalog, config: &WardenConfig, json: bool) {
    let supervisor = build_supervisor(config);
    let instances = match catalog.instances() {
        Ok(instances) => instances,
        Err(e) => {
            display::print_error(&e.to_string());
            std::process::exit(1);
        }
    };

    if json {
        let entries: Vec<serde_json::Value> = instances
            .iter()
            .map(|instance| {
                serde_json::json!({
                    "id": instance.id(),
                    "dir": instance.dir(),
                    "status": supervisor.status(instance.id()),
                })
            })
            .collect();
        match serde_json::to_string_pretty(&entries) {
            Ok(out) => println!("{out}"),
            Err(e) => display::print_error(&e.to_string()),
        }
    } else if instances.is_empty() {
        println!("No instances found under {}", catalog.root().display());
    } else {
        for instance in instances {
            println!(
                "{:<24} {} ({})",
                instance.id(),
                supervisor.status(instance.id()),
                instance.dir().display()
            );
        }
    }
}

async fn run_instance(
    catalog: &Catalog,
    config: &WardenConfig,
    instance_id: &str,
    stop_timeout: Duration,
) {
    let instance = match catalog.find(instance_id) {
        Ok(Some(instance)) => instance,
        Ok(None) => {
            display::print_error(&format!(
                "Instance '{instance_id}' not found under {}",
                catalog.root().display()
            ));
            std::process::exit(1);
        }
        Err(e) => {
            display::print_error(&e.to_string());
            std::process::exit(1);
        }
    };

    let supervisor = build_supervisor(config);
    let mut events = BroadcastStream::new(supervisor.subscribe());

    let info = match supervisor.start(&instance).await {
        Ok(info) => info,
        Err(e) => {
            display::print_error(&e.to_string());
            std::process::exit(1);
        }
    };
    tracing::info!(
        instance = %info.instance_id,
        pid = ?info.pid,
        started_at = %info.started_at,
        "Run started"
    );

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;
    let stop_command = config.stop.command.clone();

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(SupervisorEvent::LineProduced { instance, channel, text }))
                    if instance == instance_id =>
                {
                    display::print_line(channel, &text);
                }
                Some(Ok(SupervisorEvent::StatusChanged { instance, old, new }))
                    if instance == instance_id =>
                {
                    display::print_status(&instance, old, new);
                    if !new.is_live() {
                        return;
                    }
                }
                Some(Ok(SupervisorEvent::RosterChanged { instance, joined, left }))
                    if instance == instance_id =>
                {
                    display::print_roster(&instance, joined.as_deref(), left.as_deref());
                }
                Some(Ok(_)) => {}
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "Display lagged behind console output");
                }
                None => return,
            },
            line = input.next_line(), if input_open => {
                match line {
                    Ok(Some(line)) => {
                        let command = line.trim();
                        if command.is_empty() {
                            continue;
                        }
                        if command == stop_command {
                            supervisor.stop(instance_id, stop_timeout).await;
                            return;
                        }
                        if let Err(e) = supervisor.send_command(instance_id, command).await {
                            display::print_error(&e.to_string());
                        }
                    }
                    // Terminal stdin closed; keep streaming the console.
                    Ok(None) => input_open = false,
                    Err(e) => {
                        tracing::debug!(error = %e, "Failed reading terminal input");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, stopping all runs");
                supervisor.shutdown(stop_timeout).await;
                return;
            }
        }
    }
}
