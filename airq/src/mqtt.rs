use crate::errors::Result;
use crate::model::EdgeEvent;
use crate::poller::Publisher;
use chrono::Utc;
use rumqttc::{AsyncClient, LastWill, MqttOptions, QoS};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

#[derive(Debug, Serialize)]
struct EventMessage {
    event: &'static str,
    at: chrono::DateTime<Utc>,
}

pub fn availability_topic(prefix: &str) -> String {
    format!("{}/availability", prefix)
}

pub fn state_topic(prefix: &str) -> String {
    format!("{}/state", prefix)
}

pub fn event_topic(prefix: &str, event: EdgeEvent) -> String {
    format!("{}/event/{}", prefix, event.name())
}

/// Mirrors device state (retained) and edge events onto an MQTT broker
/// until the publisher goes away.
pub async fn run_mqtt(
    broker: String,
    port: u16,
    client_id: String,
    prefix: String,
    publisher: Arc<Publisher>,
) -> Result<()> {
    info!("Connecting to MQTT broker at {}:{}", broker, port);

    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);
    mqtt_options.set_last_will(LastWill::new(
        availability_topic(&prefix),
        "offline",
        QoS::AtLeastOnce,
        true,
    ));

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                error!("MQTT eventloop error: {}", e);
                // rumqttc reconnects on the next poll
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    client
        .publish(availability_topic(&prefix), QoS::AtLeastOnce, true, "online")
        .await?;

    let mut state_rx = publisher.subscribe_state();
    let mut events_rx = publisher.subscribe_events();

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                publish_json(&client, state_topic(&prefix), true, &state).await;
            }

            event = events_rx.recv() => {
                match event {
                    Ok(event) => {
                        let message = EventMessage { event: event.name(), at: Utc::now() };
                        publish_json(&client, event_topic(&prefix, event), false, &message).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("MQTT publisher lagged, {} events dropped", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!("MQTT publisher stopped");
    Ok(())
}

async fn publish_json<T: Serialize>(client: &AsyncClient, topic: String, retain: bool, payload: &T) {
    let payload = match serde_json::to_vec(payload) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to serialize payload for {}: {}", topic, e);
            return;
        }
    };

    debug!("Publishing {} bytes to {}", payload.len(), topic);
    if let Err(e) = client.publish(&topic, QoS::AtLeastOnce, retain, payload).await {
        warn!("Failed to publish to {}: {}", topic, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(availability_topic("airq/living"), "airq/living/availability");
        assert_eq!(state_topic("airq/living"), "airq/living/state");
        assert_eq!(
            event_topic("airq/living", EdgeEvent::StatusOkFalse),
            "airq/living/event/status_ok_false"
        );
    }

    #[test]
    fn test_event_message_shape() {
        let message = EventMessage {
            event: EdgeEvent::DoorEvent.name(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["event"], "door_event");
        assert!(json["at"].is_string());
    }
}
