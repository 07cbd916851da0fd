use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// One sensor entry of a telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    /// `[value, uncertainty]`
    Pair(f64, f64),
    Scalar(f64),
    Other(serde_json::Value),
}

impl Reading {
    pub fn value(&self) -> Option<f64> {
        match self {
            Reading::Pair(value, _) => Some(*value),
            Reading::Scalar(value) => Some(*value),
            Reading::Other(serde_json::Value::Array(items)) => items.first().and_then(|v| v.as_f64()),
            Reading::Other(_) => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Reading::Pair(value, _) | Reading::Scalar(value) => *value != 0.0 && !value.is_nan(),
            Reading::Other(serde_json::Value::Bool(flag)) => *flag,
            Reading::Other(serde_json::Value::String(text)) => !text.is_empty(),
            Reading::Other(serde_json::Value::Null) => false,
            Reading::Other(_) => true,
        }
    }
}

/// The `Status` field: `"OK"`, or a map from sensor name to a warm-up reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorStatus {
    Message(String),
    WarmingUp(BTreeMap<String, String>),
}

impl SensorStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, SensorStatus::Message(msg) if msg == "OK")
    }

    /// A sensor is held back while a non-OK status map names it.
    pub fn suppresses(&self, sensor: &str) -> bool {
        match self {
            SensorStatus::WarmingUp(sensors) => sensors.contains_key(sensor),
            SensorStatus::Message(_) => false,
        }
    }
}

impl Default for SensorStatus {
    fn default() -> Self {
        SensorStatus::Message("OK".to_string())
    }
}

/// Decrypted `/data` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Seconds since boot.
    pub uptime: u64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(rename = "Status")]
    pub status: SensorStatus,
    pub health: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<f64>,
    #[serde(rename = "DeviceID", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(flatten)]
    pub readings: BTreeMap<String, Reading>,
}

impl TelemetrySample {
    pub fn reading(&self, sensor: &str) -> Option<&Reading> {
        self.readings.get(sensor)
    }

    pub fn measured_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Every capability the projector can emit. The order here is the order of
/// the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Health,
    Performance,
    Virus,
    Temperature,
    Humidity,
    HumidityAbs,
    DewPoint,
    Pressure,
    Noise,
    NoiseMax,
    Voc,
    So2,
    Co,
    No2,
    O3,
    Oxygen,
    Co2,
    Pm1,
    Pm25,
    Pm10,
    AlarmFire,
    AlarmGas,
    AlarmVirus,
    AlarmHealth,
    AlarmPerf,
}

impl Capability {
    pub const ALL: [Capability; 25] = [
        Capability::Health,
        Capability::Performance,
        Capability::Virus,
        Capability::Temperature,
        Capability::Humidity,
        Capability::HumidityAbs,
        Capability::DewPoint,
        Capability::Pressure,
        Capability::Noise,
        Capability::NoiseMax,
        Capability::Voc,
        Capability::So2,
        Capability::Co,
        Capability::No2,
        Capability::O3,
        Capability::Oxygen,
        Capability::Co2,
        Capability::Pm1,
        Capability::Pm25,
        Capability::Pm10,
        Capability::AlarmFire,
        Capability::AlarmGas,
        Capability::AlarmVirus,
        Capability::AlarmHealth,
        Capability::AlarmPerf,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Capability::Health => "measure_health",
            Capability::Performance => "measure_perf",
            Capability::Virus => "measure_virus",
            Capability::Temperature => "measure_temperature",
            Capability::Humidity => "measure_humidity",
            Capability::HumidityAbs => "measure_humidity_abs",
            Capability::DewPoint => "measure_dewpt",
            Capability::Pressure => "measure_pressure",
            Capability::Noise => "measure_noise",
            Capability::NoiseMax => "measure_noise.max",
            Capability::Voc => "measure_voc",
            Capability::So2 => "measure_so2",
            Capability::Co => "measure_co",
            Capability::No2 => "measure_no2",
            Capability::O3 => "measure_o3",
            Capability::Oxygen => "measure_o2",
            Capability::Co2 => "measure_co2",
            Capability::Pm1 => "measure_pm1",
            Capability::Pm25 => "measure_pm25",
            Capability::Pm10 => "measure_pm10",
            Capability::AlarmFire => "alarm_fire",
            Capability::AlarmGas => "alarm_gas",
            Capability::AlarmVirus => "alarm_virus",
            Capability::AlarmHealth => "alarm_health",
            Capability::AlarmPerf => "alarm_perf",
        }
    }

    /// Telemetry key a measurement is read from; `None` for derived alarms.
    pub fn sensor(self) -> Option<&'static str> {
        match self {
            Capability::Health => Some("health"),
            Capability::Performance => Some("performance"),
            Capability::Virus => Some("virus"),
            Capability::Temperature => Some("temperature"),
            Capability::Humidity => Some("humidity"),
            Capability::HumidityAbs => Some("humidity_abs"),
            Capability::DewPoint => Some("dewpt"),
            Capability::Pressure => Some("pressure"),
            Capability::Noise => Some("sound"),
            Capability::NoiseMax => Some("sound_max"),
            Capability::Voc => Some("tvoc"),
            Capability::So2 => Some("so2"),
            Capability::Co => Some("co"),
            Capability::No2 => Some("no2"),
            Capability::O3 => Some("o3"),
            Capability::Oxygen => Some("oxygen"),
            Capability::Co2 => Some("co2"),
            Capability::Pm1 => Some("pm1"),
            Capability::Pm25 => Some("pm2_5"),
            Capability::Pm10 => Some("pm10"),
            Capability::AlarmFire
            | Capability::AlarmGas
            | Capability::AlarmVirus
            | Capability::AlarmHealth
            | Capability::AlarmPerf => None,
        }
    }
}

impl Serialize for Capability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Number(f64),
    Flag(bool),
}

impl CapabilityValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CapabilityValue::Number(v) => Some(*v),
            CapabilityValue::Flag(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CapabilityValue::Flag(v) => Some(*v),
            CapabilityValue::Number(_) => None,
        }
    }
}

pub type CapabilitySnapshot = BTreeMap<Capability, CapabilityValue>;

/// Order-dependent transitions detected between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeEvent {
    Restarted,
    StatusOkTrue,
    StatusOkFalse,
    DoorEvent,
}

impl EdgeEvent {
    pub fn name(self) -> &'static str {
        match self {
            EdgeEvent::Restarted => "restarted",
            EdgeEvent::StatusOkTrue => "status_ok_true",
            EdgeEvent::StatusOkFalse => "status_ok_false",
            EdgeEvent::DoorEvent => "door_event",
        }
    }
}

/// Alarm thresholds, compared against the rounded health/performance index
/// and the raw virus index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlarmThresholds {
    pub health: f64,
    pub performance: f64,
    pub virus: f64,
}

impl Default for AlarmThresholds {
    fn default() -> Self {
        Self {
            health: 30.0,
            performance: 30.0,
            virus: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Reachability {
    Unknown,
    Reachable,
    Unreachable(String),
}

/// What the poller publishes to observers after every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub reachability: Reachability,
    pub status_ok: bool,
    pub snapshot: Option<CapabilitySnapshot>,
    pub last_update: Option<DateTime<Utc>>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            reachability: Reachability::Unknown,
            status_ok: true,
            snapshot: None,
            last_update: None,
        }
    }
}
