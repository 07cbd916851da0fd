use crate::errors::Error;
use crate::metrics::{
    DECRYPT_FAILURES_TOTAL, EDGE_EVENTS_TOTAL, POLLS_TOTAL, POLL_FAILURES_TOTAL,
    POLL_LATENCY_SECONDS, REACHABLE, SKIPPED_POLLS_TOTAL,
};
use crate::model::{
    AlarmThresholds, DeviceState, EdgeEvent, Reachability, TelemetrySample,
};
use crate::projector::{project, Projection};
use crate::session::DeviceSession;
use crate::transport::{HttpTransport, Transport};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Per-session poll bookkeeping. `busy` is only ever flipped under the lock.
#[derive(Debug, Default)]
pub struct PollState {
    pub busy: bool,
    pub last_sample: Option<TelemetrySample>,
}

#[derive(Debug)]
pub enum PollOutcome {
    Updated(Projection),
    /// A previous fetch was still in flight; this tick was dropped.
    Skipped,
    Failed(Error),
}

/// Fan-out of device state and edge events to whoever is watching.
///
/// Outlives individual pollers so subscribers survive a session restart.
#[derive(Debug)]
pub struct Publisher {
    state: watch::Sender<DeviceState>,
    events: broadcast::Sender<EdgeEvent>,
}

impl Publisher {
    pub fn new() -> Self {
        let (state, _) = watch::channel(DeviceState::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { state, events }
    }

    pub fn current(&self) -> DeviceState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DeviceState> {
        self.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EdgeEvent> {
        self.events.subscribe()
    }

    pub fn mark_unreachable(&self, reason: impl Into<String>) {
        REACHABLE.set(0.0);
        let reason = reason.into();
        self.state.send_modify(|state| {
            state.reachability = Reachability::Unreachable(reason);
        });
    }

    fn publish(&self, projection: &Projection) {
        REACHABLE.set(1.0);
        self.state.send_modify(|state| {
            state.reachability = Reachability::Reachable;
            state.status_ok = projection.status_ok;
            state.snapshot = Some(projection.snapshot.clone());
            state.last_update = Some(Utc::now());
        });

        for event in &projection.events {
            EDGE_EVENTS_TOTAL.inc();
            // No subscribers is fine.
            let _ = self.events.send(*event);
        }
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives `getData` for one session and projects each sample.
pub struct Poller<T = HttpTransport> {
    name: String,
    session: Arc<DeviceSession<T>>,
    thresholds: AlarmThresholds,
    state: Mutex<PollState>,
    publisher: Arc<Publisher>,
}

impl<T: Transport + 'static> Poller<T> {
    pub fn new(
        name: impl Into<String>,
        session: Arc<DeviceSession<T>>,
        thresholds: AlarmThresholds,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            name: name.into(),
            session,
            thresholds,
            state: Mutex::new(PollState::default()),
            publisher,
        }
    }

    pub fn session(&self) -> &Arc<DeviceSession<T>> {
        &self.session
    }

    /// One tick. Never queues: if a fetch is already running this returns
    /// [`PollOutcome::Skipped`] without touching the transport.
    pub async fn poll_once(&self) -> PollOutcome {
        {
            let mut state = self.state.lock().await;
            if state.busy {
                debug!("{}: previous poll still running, skipping", self.name);
                SKIPPED_POLLS_TOTAL.inc();
                return PollOutcome::Skipped;
            }
            state.busy = true;
        }

        POLLS_TOTAL.inc();
        let start = Instant::now();
        let result = self.session.get_data().await;
        POLL_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());

        let mut state = self.state.lock().await;
        state.busy = false;

        match result {
            Ok(sample) => {
                let projection = project(state.last_sample.as_ref(), &sample, &self.thresholds);
                state.last_sample = Some(sample);
                drop(state);

                for event in &projection.events {
                    info!("{}: {}", self.name, event.name());
                }
                self.publisher.publish(&projection);
                PollOutcome::Updated(projection)
            }
            Err(e) => {
                drop(state);

                POLL_FAILURES_TOTAL.inc();
                if matches!(e, Error::Decrypt { .. }) {
                    DECRYPT_FAILURES_TOTAL.inc();
                }
                if e.is_transient() {
                    warn!("{}: poll failed: {}", self.name, e);
                } else {
                    error!("{}: poll failed, check the password: {}", self.name, e);
                }
                self.publisher.mark_unreachable(e.to_string());
                PollOutcome::Failed(e)
            }
        }
    }

    /// Polls immediately, then every `period`. Each tick runs on its own task
    /// so a slow fetch makes later ticks skip instead of piling up.
    pub fn start(self: &Arc<Self>, period: Duration) -> PollTimer {
        info!("{}: polling every {:?}", self.name, period);
        let poller = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let poller = Arc::clone(&poller);
                tokio::spawn(async move {
                    poller.poll_once().await;
                });
            }
        });

        PollTimer { handle }
    }
}

/// Running poll timer; dropping it stops the timer. A fetch that already
/// started is left to finish or time out.
#[derive(Debug)]
pub struct PollTimer {
    handle: JoinHandle<()>,
}

impl PollTimer {
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
