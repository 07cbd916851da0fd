use crate::model::{
    AlarmThresholds, Capability, CapabilitySnapshot, CapabilityValue, EdgeEvent, TelemetrySample,
};

const GAS_ALARM_HEALTH: f64 = -200.0;
const FIRE_ALARM_HEALTH: f64 = -800.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub snapshot: CapabilitySnapshot,
    pub events: Vec<EdgeEvent>,
    pub status_ok: bool,
}

/// Turns one telemetry sample into capability values, and diffs it against
/// the immediately preceding sample for edge events.
///
/// Capabilities whose sensor is missing or still warming up are left out of
/// the snapshot rather than reported as zero.
pub fn project(
    previous: Option<&TelemetrySample>,
    current: &TelemetrySample,
    thresholds: &AlarmThresholds,
) -> Projection {
    let health = index(current.health);
    let performance = current.performance.map(index);

    let mut snapshot = CapabilitySnapshot::new();
    for capability in Capability::ALL {
        if let Some(value) = capability_value(capability, current, health, performance, thresholds) {
            snapshot.insert(capability, value);
        }
    }

    let status_ok = current.status.is_ok();
    let mut events = Vec::new();

    if let Some(previous) = previous {
        if previous.uptime > current.uptime {
            events.push(EdgeEvent::Restarted);
        }
        let was_ok = previous.status.is_ok();
        if status_ok && !was_ok {
            events.push(EdgeEvent::StatusOkTrue);
        }
        if !status_ok && was_ok {
            events.push(EdgeEvent::StatusOkFalse);
        }
    }

    if current.reading("door_event").is_some_and(|r| r.is_truthy()) {
        events.push(EdgeEvent::DoorEvent);
    }

    Projection {
        snapshot,
        events,
        status_ok,
    }
}

fn capability_value(
    capability: Capability,
    current: &TelemetrySample,
    health: f64,
    performance: Option<f64>,
    thresholds: &AlarmThresholds,
) -> Option<CapabilityValue> {
    let flag = |value: bool| Some(CapabilityValue::Flag(value));

    match capability {
        Capability::AlarmGas => flag(current.health == GAS_ALARM_HEALTH),
        Capability::AlarmFire => flag(current.health == FIRE_ALARM_HEALTH),
        Capability::AlarmHealth => flag(health <= thresholds.health),
        Capability::AlarmPerf => performance.and_then(|p| flag(p <= thresholds.performance)),
        Capability::AlarmVirus => current
            .reading("virus")
            .and_then(|r| r.value())
            .and_then(|v| flag(v <= thresholds.virus)),
        measured => {
            let sensor = measured.sensor()?;
            if current.status.suppresses(sensor) {
                return None;
            }
            let value = match measured {
                Capability::Health => Some(health),
                Capability::Performance => performance,
                _ => current.reading(sensor).and_then(|r| r.value()),
            };
            value.map(CapabilityValue::Number)
        }
    }
}

/// The appliance reports indices ×10; rounds half toward +∞.
fn index(raw: f64) -> f64 {
    (raw / 10.0 + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Reading, SensorStatus};
    use std::collections::BTreeMap;

    fn sample(uptime: u64, health: f64) -> TelemetrySample {
        TelemetrySample {
            uptime,
            timestamp: 1_722_424_332_000,
            status: SensorStatus::default(),
            health,
            performance: Some(637.528),
            device_id: None,
            readings: BTreeMap::new(),
        }
    }

    fn warming(sensors: &[&str]) -> SensorStatus {
        SensorStatus::WarmingUp(
            sensors
                .iter()
                .map(|s| (s.to_string(), format!("{} sensor still in warm up phase", s)))
                .collect(),
        )
    }

    fn flag(projection: &Projection, capability: Capability) -> Option<bool> {
        projection.snapshot.get(&capability).and_then(|v| v.as_bool())
    }

    fn number(projection: &Projection, capability: Capability) -> Option<f64> {
        projection.snapshot.get(&capability).and_then(|v| v.as_f64())
    }

    #[test]
    fn test_restart_detected_when_uptime_drops() {
        let thresholds = AlarmThresholds::default();
        let first = sample(100, 900.0);
        let second = sample(50, 900.0);
        let projection = project(Some(&first), &second, &thresholds);
        assert!(projection.events.contains(&EdgeEvent::Restarted));
    }

    #[test]
    fn test_no_restart_when_uptime_grows() {
        let thresholds = AlarmThresholds::default();
        let first = sample(100, 900.0);
        let second = sample(150, 900.0);
        let projection = project(Some(&first), &second, &thresholds);
        assert!(!projection.events.contains(&EdgeEvent::Restarted));
    }

    #[test]
    fn test_first_sample_has_no_transition_edges() {
        let mut current = sample(10, 900.0);
        current.status = warming(&["co"]);
        let projection = project(None, &current, &AlarmThresholds::default());
        assert!(projection.events.is_empty());
        assert!(!projection.status_ok);
    }

    #[test]
    fn test_status_ok_false_fires_once() {
        let thresholds = AlarmThresholds::default();
        let ok = sample(100, 900.0);
        let mut warm = sample(110, 900.0);
        warm.status = warming(&["co"]);
        let still_warm = TelemetrySample {
            uptime: 120,
            ..warm.clone()
        };

        let second = project(Some(&ok), &warm, &thresholds);
        assert_eq!(second.events, vec![EdgeEvent::StatusOkFalse]);

        let third = project(Some(&warm), &still_warm, &thresholds);
        assert!(third.events.is_empty());
    }

    #[test]
    fn test_status_ok_true_after_warm_up() {
        let thresholds = AlarmThresholds::default();
        let mut warm = sample(100, 900.0);
        warm.status = warming(&["co"]);
        let ok = sample(110, 900.0);

        let projection = project(Some(&warm), &ok, &thresholds);
        assert_eq!(projection.events, vec![EdgeEvent::StatusOkTrue]);
        assert!(projection.status_ok);
    }

    #[test]
    fn test_door_event() {
        let thresholds = AlarmThresholds::default();
        let mut current = sample(100, 900.0);
        current
            .readings
            .insert("door_event".to_string(), Reading::Scalar(0.0));
        assert!(!project(None, &current, &thresholds)
            .events
            .contains(&EdgeEvent::DoorEvent));

        current
            .readings
            .insert("door_event".to_string(), Reading::Scalar(1.0));
        assert!(project(None, &current, &thresholds)
            .events
            .contains(&EdgeEvent::DoorEvent));
    }

    #[test]
    fn test_warm_up_suppresses_sensor() {
        let thresholds = AlarmThresholds::default();
        let mut current = sample(100, 900.0);
        current
            .readings
            .insert("co".to_string(), Reading::Pair(1.4, 0.1));
        current
            .readings
            .insert("co2".to_string(), Reading::Pair(694.0, 70.8));
        current.status = warming(&["co"]);

        let warm = project(None, &current, &thresholds);
        assert_eq!(number(&warm, Capability::Co), None);
        assert_eq!(number(&warm, Capability::Co2), Some(694.0));

        current.status = SensorStatus::default();
        let ready = project(None, &current, &thresholds);
        assert_eq!(number(&ready, Capability::Co), Some(1.4));
    }

    #[test]
    fn test_missing_sensor_is_absent() {
        let projection = project(None, &sample(100, 900.0), &AlarmThresholds::default());
        assert!(!projection.snapshot.contains_key(&Capability::Temperature));
        assert!(!projection.snapshot.contains_key(&Capability::AlarmVirus));
    }

    #[test]
    fn test_scalar_reading_passes_through() {
        let mut current = sample(100, 900.0);
        current
            .readings
            .insert("sound".to_string(), Reading::Scalar(41.5));
        let projection = project(None, &current, &AlarmThresholds::default());
        assert_eq!(number(&projection, Capability::Noise), Some(41.5));
    }

    #[test]
    fn test_health_and_performance_are_rounded() {
        let projection = project(None, &sample(100, 934.0), &AlarmThresholds::default());
        assert_eq!(number(&projection, Capability::Health), Some(93.0));
        assert_eq!(number(&projection, Capability::Performance), Some(64.0));
    }

    #[test]
    fn test_rounding_half_goes_up() {
        assert_eq!(index(-25.0), -2.0);
        assert_eq!(index(25.0), 3.0);
        assert_eq!(index(-800.0), -80.0);
    }

    #[test]
    fn test_gas_alarm() {
        let projection = project(None, &sample(100, -200.0), &AlarmThresholds::default());
        assert_eq!(flag(&projection, Capability::AlarmGas), Some(true));
        assert_eq!(flag(&projection, Capability::AlarmFire), Some(false));
    }

    #[test]
    fn test_fire_alarm() {
        let projection = project(None, &sample(100, -800.0), &AlarmThresholds::default());
        assert_eq!(flag(&projection, Capability::AlarmFire), Some(true));
        assert_eq!(flag(&projection, Capability::AlarmGas), Some(false));
    }

    #[test]
    fn test_health_threshold() {
        // Raw 600 and 250 become indices 60 and 25.
        let thresholds = AlarmThresholds {
            health: 30.0,
            ..AlarmThresholds::default()
        };
        let healthy = project(None, &sample(100, 600.0), &thresholds);
        assert_eq!(flag(&healthy, Capability::AlarmHealth), Some(false));

        let unhealthy = project(None, &sample(100, 250.0), &thresholds);
        assert_eq!(flag(&unhealthy, Capability::AlarmHealth), Some(true));
    }

    #[test]
    fn test_perf_alarm_needs_performance() {
        let thresholds = AlarmThresholds::default();
        let mut current = sample(100, 900.0);
        current.performance = Some(200.0);
        let low = project(None, &current, &thresholds);
        assert_eq!(flag(&low, Capability::AlarmPerf), Some(true));

        current.performance = None;
        let missing = project(None, &current, &thresholds);
        assert_eq!(flag(&missing, Capability::AlarmPerf), None);
        assert_eq!(number(&missing, Capability::Performance), None);
    }

    #[test]
    fn test_virus_alarm() {
        let thresholds = AlarmThresholds::default();
        let mut current = sample(100, 900.0);
        current
            .readings
            .insert("virus".to_string(), Reading::Pair(78.4, 20.0));
        let projection = project(None, &current, &thresholds);
        assert_eq!(number(&projection, Capability::Virus), Some(78.4));
        assert_eq!(flag(&projection, Capability::AlarmVirus), Some(false));

        current
            .readings
            .insert("virus".to_string(), Reading::Pair(12.0, 20.0));
        let projection = project(None, &current, &thresholds);
        assert_eq!(flag(&projection, Capability::AlarmVirus), Some(true));
    }
}
