//! Routing of domain events onto broker topics.

use geowatch_core::alert::AlertTransition;
use geowatch_events::protocol::{AlertEvent, LiveDataEvent, PredictionEvent, ServerMessage};
use geowatch_events::{Topic, TopicBroker};

/// Publish a live reading on `live_data:{siteId}`.
pub async fn publish_live(broker: &TopicBroker, event: LiveDataEvent) -> usize {
    let topic = Topic::live_data(event.site_id.clone());
    broker.publish(&topic, ServerMessage::LiveData(event)).await
}

/// Publish an alert lifecycle change on `alerts`.
pub async fn publish_alert(broker: &TopicBroker, transition: AlertTransition) -> usize {
    tracing::info!(
        alert_id = %transition.alert.id,
        sensor_id = %transition.alert.sensor_id,
        action = ?transition.action,
        severity = transition.alert.severity.as_str(),
        "Alert transition",
    );
    let event = AlertEvent::from(transition);
    broker.publish(&Topic::Alerts, ServerMessage::alert(event)).await
}

pub async fn publish_transitions(broker: &TopicBroker, transitions: &[AlertTransition]) {
    for transition in transitions {
        publish_alert(broker, transition.clone()).await;
    }
}

/// Publish a model prediction on `predictions:{siteId}`.
pub async fn publish_prediction(broker: &TopicBroker, event: PredictionEvent) -> usize {
    let topic = Topic::predictions(event.site_id.clone());
    broker.publish(&topic, ServerMessage::Prediction(event)).await
}
