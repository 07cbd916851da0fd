use crate::crypto::{self, Key};
use crate::errors::{Error, Result};
use crate::model::TelemetrySample;
use crate::transport::{HttpTransport, Method, Transport};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PASSWORD: &str = "airqsetup";
pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Appliance password. Empty input falls back to the factory default.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    password: String,
}

impl Credentials {
    pub fn new(password: impl Into<String>) -> Self {
        let password = password.into();
        if password.is_empty() {
            return Self::default();
        }
        Self { password }
    }

    pub fn is_default(&self) -> bool {
        self.password == DEFAULT_PASSWORD
    }

    pub fn key(&self) -> Key {
        crypto::derive_key(&self.password)
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("default", &self.is_default())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub credentials: Credentials,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            credentials,
        }
    }
}

/// Merged result of `/standardpass`, `/version` and `/ping`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub standardpass: bool,
    pub version: Value,
    pub id: String,
}

/// Missing fields fall back to 900 Hz, full volume, one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sound {
    pub freq: u32,
    pub vol: u32,
    /// Milliseconds.
    pub length: u32,
}

impl Default for Sound {
    fn default() -> Self {
        Self {
            freq: 900,
            vol: 100,
            length: 1000,
        }
    }
}

#[derive(Serialize)]
struct PlaySoundRequest {
    sound: Sound,
}

#[derive(Serialize)]
struct ResetRequest {
    reset: bool,
}

#[derive(Deserialize)]
struct Envelope {
    content: Option<String>,
    id: Option<String>,
}

#[derive(Deserialize)]
struct BlinkResponse {
    id: String,
}

/// The appliance's operation set over one transport and one key.
///
/// Immutable once built: a new address or password means a new session.
#[derive(Debug)]
pub struct DeviceSession<T = HttpTransport> {
    host: String,
    timeout: Duration,
    key: Key,
    transport: T,
}

impl DeviceSession<HttpTransport> {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.host, config.port)?;
        debug!("New session for {}", transport.base_url());
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> DeviceSession<T> {
    pub fn with_transport(config: SessionConfig, transport: T) -> Self {
        Self {
            key: config.credentials.key(),
            host: config.host,
            timeout: config.timeout,
            transport,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn get_info(&self) -> Result<DeviceInfo> {
        let standardpass = match self.get("/standardpass").await?.trim().trim_matches('"') {
            "true" => true,
            "false" => false,
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected /standardpass response: {}",
                    other
                )))
            }
        };

        let version: Value = serde_json::from_str(&self.get("/version").await?)?;
        let id = self.ping_id(&self.get("/ping").await?)?;

        Ok(DeviceInfo {
            standardpass,
            version,
            id,
        })
    }

    pub async fn get_config(&self) -> Result<Value> {
        self.get_document("/config").await
    }

    pub async fn ping(&self) -> Result<Value> {
        self.get_document("/ping").await
    }

    pub async fn get_data(&self) -> Result<TelemetrySample> {
        self.get_document("/data").await
    }

    /// Writes configuration keys. The acknowledgement is free text per key
    /// and may describe a rejected value; see [`is_rejection`].
    pub async fn set_config(&self, patch: &Value) -> Result<Value> {
        let body = self.post("/config", patch).await?;
        self.open_envelope(&body).map(acknowledgement)
    }

    pub async fn play_sound(&self, sound: Sound) -> Result<String> {
        let body = self.post("/playsound", &PlaySoundRequest { sound }).await?;
        // Answered with a bare ciphertext, not an envelope.
        crypto::decrypt(body.trim().trim_matches('"'), &self.key)
    }

    /// Blinks the LEDs once; returns the device id.
    pub async fn blink(&self) -> Result<String> {
        let response: BlinkResponse = serde_json::from_str(&self.get("/blink").await?)?;
        Ok(response.id)
    }

    pub async fn reboot(&self) -> Result<Value> {
        let body = self.post("/config", &ResetRequest { reset: true }).await?;
        self.open_envelope(&body).map(acknowledgement)
    }

    async fn get(&self, path: &str) -> Result<String> {
        let response = self
            .transport
            .request(Method::Get, path, None, self.timeout)
            .await?;
        Ok(response.body)
    }

    async fn post<P: Serialize + ?Sized>(&self, path: &str, payload: &P) -> Result<String> {
        let plaintext = serde_json::to_string(payload)?;
        let body = serde_urlencoded::to_string(&[("request", crypto::encrypt(&plaintext, &self.key))])
            .map_err(|e| Error::Protocol(format!("failed to encode request: {}", e)))?;

        debug!("POST {} ({} bytes)", path, body.len());
        let response = self
            .transport
            .request(Method::Post, path, Some(body), self.timeout)
            .await?;
        Ok(response.body)
    }

    async fn get_document<D: DeserializeOwned>(&self, path: &str) -> Result<D> {
        let body = self.get(path).await?;
        let plaintext = self.open_envelope(&body)?;
        Ok(serde_json::from_str(&plaintext)?)
    }

    fn open_envelope(&self, body: &str) -> Result<String> {
        let envelope: Envelope = serde_json::from_str(body)?;
        let content = envelope
            .content
            .filter(|c| !c.is_empty())
            .ok_or_else(Error::invalid_response)?;
        crypto::decrypt(&content, &self.key)
    }

    /// `/ping` carries the id in clear on current firmware; older firmware only
    /// has it inside the encrypted document.
    fn ping_id(&self, body: &str) -> Result<String> {
        let envelope: Envelope = serde_json::from_str(body)?;
        if let Some(id) = envelope.id {
            return Ok(id);
        }

        let document: Value = serde_json::from_str(&self.open_envelope(body)?)?;
        document
            .get("id")
            .or_else(|| document.pointer("/data/DeviceID"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(Error::invalid_response)
    }
}

fn acknowledgement(plaintext: String) -> Value {
    serde_json::from_str(&plaintext).unwrap_or(Value::String(plaintext))
}

/// Whether a `/config` acknowledgement reports a rejected value.
///
/// The appliance answers in prose (`Error: key 'RoomArea' must be in format
/// of 'float' ...`), so this only recognises the failure prefix and treats
/// anything else as accepted.
pub fn is_rejection(ack: &Value) -> bool {
    match ack {
        Value::String(text) => text.trim_start().starts_with("Error"),
        Value::Object(fields) => fields.values().any(is_rejection),
        Value::Array(items) => items.iter().any(is_rejection),
        _ => false,
    }
}
