use rand::Rng;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Sensors that report `{name} sensor still in warm up phase` after boot.
pub const WARM_UP_SENSORS: [&str; 5] = ["co", "tvoc", "so2", "no2", "o3"];

/// Inputs that vary per sample; everything else is random.
pub struct SampleContext<'a> {
    pub device_id: &'a str,
    pub uptime: u64,
    pub warm_up_remaining: u64,
    pub door_rate: f64,
}

pub fn generate_sample(rng: &mut impl Rng, ctx: &SampleContext<'_>) -> Value {
    let health = if rng.gen_bool(0.005) {
        -800.0 // fire alarm
    } else if rng.gen_bool(0.01) {
        -200.0 // gas alarm
    } else {
        rng.gen_range(400.0..1000.0_f64).round()
    };

    let mut sample = Map::new();
    sample.insert("DeviceID".into(), json!(ctx.device_id));
    sample.insert("uptime".into(), json!(ctx.uptime));
    sample.insert("timestamp".into(), json!(chrono::Utc::now().timestamp_millis()));
    sample.insert("measuretime".into(), json!(rng.gen_range(1800..2400)));
    sample.insert("health".into(), json!(health));
    sample.insert("performance".into(), json!(round3(rng.gen_range(300.0..800.0))));
    sample.insert("Status".into(), status(ctx.warm_up_remaining));
    sample.insert(
        "door_event".into(),
        json!(if rng.gen_bool(ctx.door_rate) { 1 } else { 0 }),
    );

    for (sensor, low, high, uncertainty) in [
        ("temperature", 15.0, 28.0, 0.5),
        ("humidity", 30.0, 80.0, 4.3),
        ("humidity_abs", 5.0, 15.0, 0.6),
        ("dewpt", 5.0, 18.0, 0.8),
        ("pressure", 990.0, 1030.0, 1.0),
        ("sound", 30.0, 70.0, 2.5),
        ("sound_max", 60.0, 90.0, 1.9),
        ("tvoc", 100.0, 4000.0, 60.0),
        ("so2", 0.0, 150.0, 16.4),
        ("co", 0.2, 2.0, 0.1),
        ("no2", 0.0, 40.0, 2.3),
        ("o3", 0.0, 30.0, 1.5),
        ("oxygen", 20.2, 20.9, 0.9),
        ("co2", 400.0, 1400.0, 70.0),
        ("pm1", 0.0, 15.0, 10.0),
        ("pm2_5", 0.0, 25.0, 10.0),
        ("pm10", 0.0, 40.0, 11.0),
        ("virus", 20.0, 100.0, 20.0),
    ] {
        let value = round3(rng.gen_range(low..high));
        sample.insert(sensor.into(), json!([value, uncertainty]));
    }

    Value::Object(sample)
}

fn status(warm_up_remaining: u64) -> Value {
    if warm_up_remaining == 0 {
        return json!("OK");
    }

    let reasons: BTreeMap<&str, String> = WARM_UP_SENSORS
        .iter()
        .map(|sensor| {
            (
                *sensor,
                format!(
                    "{} sensor still in warm up phase; waiting time = {} s",
                    sensor, warm_up_remaining
                ),
            )
        })
        .collect();
    json!(reasons)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use airq::model::TelemetrySample;

    fn ctx(warm_up_remaining: u64) -> SampleContext<'static> {
        SampleContext {
            device_id: "sim-0001",
            uptime: 44,
            warm_up_remaining,
            door_rate: 0.0,
        }
    }

    #[test]
    fn test_sample_parses_as_telemetry() {
        let mut rng = rand::thread_rng();
        let sample: TelemetrySample = serde_json::from_value(generate_sample(&mut rng, &ctx(0))).unwrap();
        assert_eq!(sample.uptime, 44);
        assert!(sample.status.is_ok());
        assert!(sample.health >= -800.0 && sample.health <= 1000.0);
        assert!(sample.reading("co2").is_some());
    }

    #[test]
    fn test_warm_up_lists_gas_sensors() {
        let mut rng = rand::thread_rng();
        let sample: TelemetrySample = serde_json::from_value(generate_sample(&mut rng, &ctx(146))).unwrap();
        for sensor in WARM_UP_SENSORS {
            assert!(sample.status.suppresses(sensor));
        }
        assert!(!sample.status.suppresses("co2"));
    }

    #[test]
    fn test_no_door_events_at_zero_rate() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let sample = generate_sample(&mut rng, &ctx(0));
            assert_eq!(sample["door_event"], 0);
        }
    }
}
