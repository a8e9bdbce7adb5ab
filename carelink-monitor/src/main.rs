/**
 * CARELINK MONITOR - Point d'entrée du moniteur de flotte
 *
 * RÔLE : Suit la présence des nœuds (heartbeats, last will, timeout), journalise
 * les alertes chute / appel à l'aide, et pousse des messages vers les écrans.
 *
 * UTILISATION :
 *   carelink-monitor                      # équivalent à `run`
 *   carelink-monitor display --zone bedside --class comm --msg "Take meds" --color red
 */

mod config;
mod fleet;
mod models;
mod mqtt;
mod state;

use crate::config::load_config;
use crate::state::Fleet;
use anyhow::{bail, Context, Result};
use carelink_node::messages::DisplayCommand;
use carelink_node::topics::Topics;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "carelink-monitor")]
#[command(about = "Fleet monitor for CareLink nodes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Track unit liveness and log alerts (default)
    Run,
    /// Push a message to a unit's display
    Display {
        #[arg(long)]
        zone: String,
        #[arg(long)]
        class: String,
        #[arg(long)]
        msg: String,
        /// "red", "green", anything else renders in the default color
        #[arg(long)]
        color: Option<String>,
        /// Seconds before the unit clears the message
        #[arg(long)]
        duration: Option<u64>,
    },
}

fn check_segment(name: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(['/', '+', '#']) {
        bail!("--{} must be a single topic segment, got {:?}", name, value);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config().await;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let fleet = Fleet::new();
            info!(
                "Monitoring domain '{}' on {}:{} (offline after {}s)",
                cfg.domain, cfg.mqtt.host, cfg.mqtt.port, cfg.offline_timeout_secs
            );
            let listener = mqtt::spawn_mqtt_listener(fleet.clone(), cfg.clone());
            let sweeper = fleet::spawn_sweeper(fleet.clone(), cfg.offline_timeout(), cfg.sweep_interval());

            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            listener.abort();
            sweeper.abort();
            info!("Shutting down, {} of {} units online", fleet.online_count(), fleet.len());
            Ok(())
        }
        Command::Display {
            zone,
            class,
            msg,
            color,
            duration,
        } => {
            check_segment("zone", &zone)?;
            check_segment("class", &class)?;
            let topic = Topics::new(&cfg.domain, &zone, &class).display;
            let payload = DisplayCommand { msg, color, duration }
                .encode()
                .context("encoding display command")?;
            mqtt::publish_once(&cfg, &topic, payload, Duration::from_secs(5)).await?;
            info!("Display message sent to {}", topic);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_arguments() {
        let cli = Cli::try_parse_from([
            "carelink-monitor", "display", "--zone", "bedside", "--class", "comm", "--msg", "Take meds", "--color", "red",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Display { zone, color, duration, .. }) => {
                assert_eq!(zone, "bedside");
                assert_eq!(color.as_deref(), Some("red"));
                assert_eq!(duration, None);
            }
            _ => panic!("expected display subcommand"),
        }
    }

    #[test]
    fn test_segments_are_validated() {
        assert!(check_segment("zone", "bedside").is_ok());
        assert!(check_segment("zone", "a/b").is_err());
        assert!(check_segment("class", "+").is_err());
        assert!(check_segment("class", "").is_err());
    }
}
