//! RelayGate CLI — runs the gateway daemon and inspects its state.

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{AdaptersCommand, Cli, Command};
use relaygate_gateway::{load_config, AdapterRegistry, RelayManager};
use std::io::Read;
use std::time::Duration;
use tracing::info;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Command::Run => {
            let registry = AdapterRegistry::new();
            registry
                .load_dir(&config.adapters_dir)
                .with_context(|| format!("loading adapters from {}", config.adapters_dir.display()))?;

            let idle_ttl = Duration::from_secs(config.idle_ttl_secs);
            let manager = RelayManager::new(registry, config);

            // Reap idle adapter processes in the background.
            let ipc = manager.ipc().clone();
            let reaper = tokio::spawn(async move {
                let mut tick = tokio::time::interval(idle_ttl.max(Duration::from_secs(2)) / 2);
                loop {
                    tick.tick().await;
                    let reaped = ipc.reap_idle(idle_ttl).await;
                    if reaped > 0 {
                        info!(reaped, "Reaped idle adapter processes");
                    }
                }
            });

            info!("Gateway running, press Ctrl+C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("waiting for shutdown signal")?;
            info!("Shutting down");
            reaper.abort();
            manager.shutdown().await;
        }
        Command::Adapters {
            command: AdaptersCommand::List,
        } => {
            let registry = AdapterRegistry::new();
            registry
                .load_dir(&config.adapters_dir)
                .with_context(|| format!("loading adapters from {}", config.adapters_dir.display()))?;
            let adapters = registry.list();
            if adapters.is_empty() {
                println!("no adapters installed in {}", config.adapters_dir.display());
            }
            for manifest in adapters {
                println!(
                    "{:<16} shortcode='{}' service={} protocol={} command={}",
                    manifest.name,
                    manifest.shortcode,
                    manifest.service,
                    manifest.protocol,
                    manifest.launch.command
                );
            }
        }
        Command::Decode { file } => {
            let mut payload = Vec::new();
            if file.as_os_str() == "-" {
                std::io::stdin()
                    .read_to_end(&mut payload)
                    .context("reading envelope from stdin")?;
            } else {
                payload = std::fs::read(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
            }
            let envelope =
                relaygate_codec::decode_envelope_with(&payload, &config.codec_options())?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "version": format!("{:?}", envelope.version),
                    "platform_shortcode": envelope.platform_shortcode as char,
                    "ciphertext_len": envelope.ciphertext.len(),
                    "device_id_len": envelope.device_id.len(),
                    "language": envelope.language,
                }))?
            );
        }
    }
    Ok(())
}
