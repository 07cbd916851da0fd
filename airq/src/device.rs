use crate::config::DeviceSettings;
use crate::errors::{Error, Result};
use crate::poller::{PollTimer, Poller, Publisher};
use crate::session::{DeviceInfo, DeviceSession, Sound};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const RESTART_DELAY: Duration = Duration::from_secs(2);

struct Running {
    poller: Arc<Poller>,
    timer: PollTimer,
}

/// Owns one appliance: its settings, the current session and poll timer,
/// and the publisher observers subscribe to.
pub struct Device {
    settings: Mutex<DeviceSettings>,
    running: Mutex<Option<Running>>,
    publisher: Arc<Publisher>,
    generation: AtomicU64,
    restarting: AtomicBool,
    restart_delay: Duration,
}

impl Device {
    pub fn new(settings: DeviceSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            running: Mutex::new(None),
            publisher: Arc::new(Publisher::new()),
            generation: AtomicU64::new(0),
            restarting: AtomicBool::new(false),
            restart_delay: RESTART_DELAY,
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub async fn settings(&self) -> DeviceSettings {
        self.settings.lock().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| running.timer.is_running())
    }

    /// Builds a fresh session and starts polling. Any previous timer is
    /// stopped first so two loops never run for the same device.
    pub async fn start(&self) -> Result<()> {
        let settings = self.settings().await;
        self.stop().await;

        let session = match DeviceSession::new(settings.session_config()) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                self.publisher.mark_unreachable(e.to_string());
                return Err(e);
            }
        };

        // The first successful poll clears an unreachable mark set here.
        match session.get_config().await {
            Ok(config) => debug!("{}: appliance config {}", settings.name, config),
            Err(e) => {
                warn!("{}: could not read appliance config: {}", settings.name, e);
                self.publisher.mark_unreachable(e.to_string());
            }
        }

        let poller = Arc::new(Poller::new(
            settings.name.clone(),
            session,
            settings.thresholds,
            Arc::clone(&self.publisher),
        ));
        info!(
            "{}: session for {} (timeout {:?})",
            settings.name,
            poller.session().host(),
            poller.session().timeout()
        );
        let timer = poller.start(settings.poll_period());
        *self.running.lock().await = Some(Running { poller, timer });

        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(running) = self.running.lock().await.take() {
            running.timer.stop();
            info!("Stopped polling {}", running.poller.session().host());
        }
    }

    /// Re-initialises with new (or the current) settings after a short delay.
    ///
    /// Returns `false` when another restart is already under way; that one
    /// applies the settings stored here before it returns.
    pub async fn restart(&self, settings: Option<DeviceSettings>) -> Result<bool> {
        if let Some(settings) = settings {
            *self.settings.lock().await = settings;
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        if self.restarting.swap(true, Ordering::SeqCst) {
            debug!("Restart already in progress");
            return Ok(false);
        }

        loop {
            let applied = {
                let _guard = RestartGuard(&self.restarting);

                self.stop().await;
                info!("Device will restart in {:?}", self.restart_delay);
                tokio::time::sleep(self.restart_delay).await;
                self.start_latest().await?
            };

            // Settings stored after the last check but before the flag
            // dropped belong to a caller that already got `false`.
            if self.generation.load(Ordering::SeqCst) == applied
                || self.restarting.swap(true, Ordering::SeqCst)
            {
                return Ok(true);
            }
            debug!("Settings changed while restarting, restarting again");
        }
    }

    /// Starts until the settings generation is stable across a whole
    /// `start`; returns the generation that is running.
    async fn start_latest(&self) -> Result<u64> {
        loop {
            let generation = self.generation.load(Ordering::SeqCst);
            self.start().await?;
            if self.generation.load(Ordering::SeqCst) == generation {
                return Ok(generation);
            }
            debug!("Settings changed during start, starting again");
        }
    }

    pub async fn get_info(&self) -> Result<DeviceInfo> {
        self.session().await?.get_info().await
    }

    pub async fn set_config(&self, patch: &Value) -> Result<Value> {
        self.session().await?.set_config(patch).await
    }

    pub async fn reboot(&self, source: &str) -> Result<Value> {
        let session = self.session().await?;
        info!("Rebooting {} via {}", session.host(), source);
        session.reboot().await
    }

    pub async fn blink(&self, source: &str) -> Result<String> {
        let session = self.session().await?;
        info!("Blinking {} via {}", session.host(), source);
        session.blink().await
    }

    pub async fn play_sound(&self, source: &str, sound: Sound) -> Result<String> {
        let session = self.session().await?;
        info!("Beep {} via {}", session.host(), source);
        session.play_sound(sound).await
    }

    async fn session(&self) -> Result<Arc<DeviceSession>> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|running| Arc::clone(running.poller.session()))
            .ok_or(Error::NotStarted)
    }
}

struct RestartGuard<'a>(&'a AtomicBool);

impl Drop for RestartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
