use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustypush_core::args::CommonArgs;
use rustypush_core::broadcast::{BroadcastConfig, Broadcaster, SendOptions};
use rustypush_core::channels::{ChannelConfig, ChannelKind, ChannelSender, ChannelSet};
use rustypush_core::logging::{self, LogConfig};
use rustypush_core::protocol::NotifyServer;
use rustypush_core::transport;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "rustypush",
    version,
    about = "RustyPush: broadcast agent notifications to every configured channel"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the tool protocol on stdin/stdout (default when no subcommand is given)
    Serve,
    /// Serve the tool protocol on a Unix domain socket
    Socket {
        /// Socket path (default: $TMPDIR/rustypush-<pid>.sock)
        #[arg(long, value_name = "PATH", env = "RUSTYPUSH_SOCKET")]
        path: Option<PathBuf>,
    },
    /// Broadcast one notification and print the report
    Send {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// Deliver only to the --webhook channels given here
        #[arg(long)]
        ignore_default_config: bool,
        /// Extra webhook channel for this call (repeatable)
        #[arg(long = "webhook", value_name = "NAME=URL", value_parser = parse_webhook)]
        webhooks: Vec<(String, String)>,
    },
    /// Send a lifecycle event
    Event {
        #[arg(long)]
        run_id: String,
        /// start, update, end or error
        #[arg(long)]
        event: String,
        #[arg(long)]
        message: String,
        /// Extra data as a JSON object
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
        /// RFC 3339 timestamp (default: now)
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// List the active notification channels
    Channels {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_webhook(raw: &str) -> Result<(String, String), String> {
    let (name, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=URL, got '{}'", raw))?;
    if name.trim().is_empty() || url.trim().is_empty() {
        return Err(format!("expected NAME=URL, got '{}'", raw));
    }
    Ok((name.trim().to_string(), url.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.common.verbose {
        LogConfig::from_env().debug()
    } else {
        LogConfig::from_env()
    };
    logging::init(log_config);

    let config = cli.common.load_config()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let server = Arc::new(NotifyServer::from_config(&config));
            let cancel = shutdown_token();
            spawn_reload(Arc::clone(&server), cli.common.clone());
            transport::serve_stdio(server, cancel)
                .await
                .context("stdio transport failed")?;
        }
        Commands::Socket { path } => {
            let path = path
                .or_else(|| config.server.socket_path.clone())
                .unwrap_or_else(transport::default_socket_path);
            let server = Arc::new(NotifyServer::from_config(&config));
            let cancel = shutdown_token();
            spawn_reload(Arc::clone(&server), cli.common.clone());

            let (listener, _guard) = transport::bind_socket(&path)
                .with_context(|| format!("failed to bind {}", path.display()))?;
            transport::serve_socket(server, listener, cancel).await;
        }
        Commands::Send {
            title,
            content,
            ignore_default_config,
            webhooks,
        } => {
            let overrides = if webhooks.is_empty() {
                None
            } else {
                let configs: Vec<ChannelConfig> = webhooks
                    .into_iter()
                    .map(|(name, url)| {
                        ChannelConfig::named(
                            name,
                            ChannelKind::Webhook {
                                url,
                                headers: Default::default(),
                            },
                        )
                    })
                    .collect();
                Some(ChannelSet::from_configs(&configs)?)
            };

            let broadcaster = Broadcaster::from_config(&config);
            let options = SendOptions {
                ignore_default_config,
                overrides,
            };
            let result = broadcaster.send(&title, &content, &options).await?;
            let status = result.status();
            let report = json!({
                "status": status,
                "channels_count": result.channels,
                "errors": result.errors,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            if status == rustypush_core::DeliveryStatus::Error {
                std::process::exit(1);
            }
        }
        Commands::Event {
            run_id,
            event,
            message,
            data,
            timestamp,
        } => {
            let mut arguments = json!({
                "run_id": run_id,
                "event": event,
                "message": message,
            });
            if let Some(raw) = data {
                let data: Value = serde_json::from_str(&raw).context("--data is not valid JSON")?;
                arguments["data"] = data;
            }
            if let Some(ts) = timestamp {
                arguments["timestamp"] = Value::String(ts);
            }

            let server = NotifyServer::from_config(&config);
            let result = server.tools().call("notify_event", &arguments).await;
            println!("{}", result.first_text());
            if result.is_error {
                std::process::exit(1);
            }
        }
        Commands::Channels { json } => {
            let snapshot: Arc<BroadcastConfig> = Broadcaster::from_config(&config).current().await?;
            let channels: Vec<(String, &'static str)> = snapshot
                .channels
                .iter()
                .map(|(name, sender)| (name.clone(), sender.kind()))
                .collect();

            if json {
                let list: Vec<Value> = channels
                    .iter()
                    .map(|(name, kind)| json!({ "name": name, "type": kind }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if channels.is_empty() {
                println!("No notification channels configured.");
            } else {
                for (name, kind) in channels {
                    println!("{:<20} {}", name, kind);
                }
            }
        }
    }

    Ok(())
}

// ── Signals ─────────────────────────────────────────────────────────────────

/// A token cancelled on Ctrl-C or (on Unix) SIGTERM.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();

    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Interrupted, shutting down");
        cancel_for_signal.cancel();
    });

    #[cfg(unix)]
    {
        let cancel_for_term = cancel.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            if let Ok(mut sig) = signal(SignalKind::terminate()) {
                sig.recv().await;
                info!("SIGTERM received, shutting down");
                cancel_for_term.cancel();
            }
        });
    }

    cancel
}

/// Re-read configuration on SIGHUP and swap the broadcaster's snapshot.
fn spawn_reload(server: Arc<NotifyServer>, common: CommonArgs) {
    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        let Ok(mut sig) = signal(SignalKind::hangup()) else {
            warn!("Cannot install SIGHUP handler; config reload disabled");
            return;
        };
        while sig.recv().await.is_some() {
            info!("SIGHUP received, reloading configuration");
            match common.load_config() {
                Ok(config) => {
                    if let Err(e) = server.broadcaster().reload(&config).await {
                        warn!(error = %e, "Reloaded configuration has unusable channels");
                    }
                }
                Err(e) => warn!(error = %e, "Config reload failed, keeping current channels"),
            }
        }
    });

    #[cfg(not(unix))]
    let _ = (server, common);
}
