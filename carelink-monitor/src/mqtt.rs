use crate::config::MonitorConfig;
use crate::fleet::{handle_publish, subscriptions};
use crate::state::Fleet;
use anyhow::{bail, Context, Result};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

fn options(cfg: &MonitorConfig, client_id: &str) -> MqttOptions {
    let mut opts = MqttOptions::new(client_id, &cfg.mqtt.host, cfg.mqtt.port);
    opts.set_keep_alive(Duration::from_secs(cfg.mqtt.keep_alive_secs));
    opts
}

/// Listen to every node topic of the domain; subscriptions are renewed on each CONNACK
pub fn spawn_mqtt_listener(fleet: Fleet, cfg: MonitorConfig) -> JoinHandle<()> {
    task::spawn(async move {
        let (client, mut eventloop) = AsyncClient::new(options(&cfg, &cfg.mqtt.client_id), 10);
        let filters = subscriptions(&cfg.domain);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("Connected to {}:{}, subscribing", cfg.mqtt.host, cfg.mqtt.port);
                    for filter in &filters {
                        if let Err(e) = client.subscribe(filter.as_str(), QoS::AtLeastOnce).await {
                            error!("Subscribe to {} failed: {:?}", filter, e);
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    match handle_publish(&fleet, &cfg.domain, &p.topic, &p.payload, OffsetDateTime::now_utc()) {
                        Ok(event) => debug!("{} -> {:?}", p.topic, event),
                        Err(e) => warn!("Dropped message: {}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT error: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}

/// One-shot publish (QoS 1) waiting for the broker's PUBACK
pub async fn publish_once(cfg: &MonitorConfig, topic: &str, payload: Vec<u8>, wait: Duration) -> Result<()> {
    let client_id = format!("{}-cli-{}", cfg.mqtt.client_id, std::process::id());
    let (client, mut eventloop) = AsyncClient::new(options(cfg, &client_id), 10);
    client
        .publish(topic, QoS::AtLeastOnce, false, payload)
        .await
        .context("queueing publish")?;

    let acked = tokio::time::timeout(wait, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::PubAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
    })
    .await;

    match acked {
        Ok(Ok(())) => {
            let _ = client.disconnect().await;
            // Flush the DISCONNECT packet
            let _ = tokio::time::timeout(Duration::from_millis(200), eventloop.poll()).await;
            Ok(())
        }
        Ok(Err(e)) => Err(e).with_context(|| format!("publishing to {}:{}", cfg.mqtt.host, cfg.mqtt.port)),
        Err(_) => bail!("no PUBACK from {}:{} within {:?}", cfg.mqtt.host, cfg.mqtt.port, wait),
    }
}
