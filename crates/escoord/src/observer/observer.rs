//! 🔭 One observer, one cluster, one loop that refuses to quit until it is told to.
//!
//! Every tick it asks the cluster three questions at once (state, health, license), waits
//! at most `request_timeout` for the answers, and writes down whatever came back. A question
//! that goes unanswered leaves a `None` behind, and the loop shrugs and tries again next tick.
//!
//! ```text
//!   new ──▶ start ──▶ tick ─▶ observe_now ─▶ publish ─┐
//!                      ▲                              │
//!                      └──────────────────────────────┘   until stop 🛑 (forever)
//! ```
//!
//! ⚠️ Stopped is terminal. There is no restart, only a new observer from the manager.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use super::{ClusterId, OnObservation};
use crate::client::model::{ClusterState, Health, HealthStatus, License};
use crate::client::{ClusterApi, EsResult};

pub const DEFAULT_OBSERVATION_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_OBSERVER_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// ⏱️ How often to look, and how long each look may take.
///
/// A zero `observation_interval` turns the background worker off: observations then only
/// happen through [`Observer::observe_now`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverSettings {
    pub observation_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            observation_interval: DEFAULT_OBSERVATION_INTERVAL,
            request_timeout: DEFAULT_OBSERVER_REQUEST_TIMEOUT,
        }
    }
}

impl ObserverSettings {
    pub fn is_synchronous(&self) -> bool {
        self.observation_interval.is_zero()
    }
}

/// 📸 The last thing we saw. Each field is `None` when its probe failed or timed out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub cluster_state: Option<ClusterState>,
    pub health: Option<Health>,
    pub license: Option<License>,
}

impl State {
    /// Health colour, `Unknown` when the health probe came back empty-handed.
    pub fn health_status(&self) -> HealthStatus {
        self.health
            .as_ref()
            .map(|health| health.status)
            .unwrap_or(HealthStatus::Unknown)
    }
}

/// 🔭 Watches one cluster.
///
/// Lifecycle is `new` → `start` → `stop`, and stopped is forever. `stop` can be called as
/// many times as anyone likes; only the first one does anything.
pub struct Observer {
    cluster: ClusterId,
    client: Arc<dyn ClusterApi>,
    settings: ObserverSettings,
    creation_time: Instant,
    on_observation: Option<OnObservation>,
    last_state: RwLock<State>,
    // -- one observation at a time, worker or caller
    observing: tokio::sync::Mutex<()>,
    stopped: AtomicBool,
    stop_signal: watch::Sender<bool>,
    observations: watch::Sender<u64>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("cluster", &self.cluster)
            .field("settings", &self.settings)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl Observer {
    pub fn new(
        cluster: ClusterId,
        client: Arc<dyn ClusterApi>,
        settings: ObserverSettings,
        on_observation: Option<OnObservation>,
    ) -> Arc<Self> {
        let (stop_signal, _) = watch::channel(false);
        let (observations, _) = watch::channel(0);
        Arc::new(Self {
            cluster,
            client,
            settings,
            creation_time: Instant::now(),
            on_observation,
            last_state: RwLock::new(State::default()),
            observing: tokio::sync::Mutex::new(()),
            stopped: AtomicBool::new(false),
            stop_signal,
            observations,
            worker: Mutex::new(None),
        })
    }

    pub fn cluster(&self) -> &ClusterId {
        &self.cluster
    }

    pub fn client(&self) -> &Arc<dyn ClusterApi> {
        &self.client
    }

    pub fn settings(&self) -> &ObserverSettings {
        &self.settings
    }

    pub fn creation_time(&self) -> Instant {
        self.creation_time
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// How many observations were published so far.
    pub fn observation_count(&self) -> u64 {
        *self.observations.borrow()
    }

    /// 🚀 Spawn the background worker: one observation right away, then one per interval.
    /// Does nothing in synchronous mode, when already started, or once stopped.
    pub fn start(self: &Arc<Self>) {
        if self.settings.is_synchronous() {
            debug!(cluster = %self.cluster, "🔭 synchronous observer, no background worker");
            return;
        }
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() || self.is_stopped() {
            return;
        }
        let span = info_span!("observer", cluster = %self.cluster);
        *worker = Some(tokio::spawn(Arc::clone(self).run().instrument(span)));
    }

    async fn run(self: Arc<Self>) {
        info!(
            "🔭 observing every {:?} (request timeout {:?})",
            self.settings.observation_interval, self.settings.request_timeout
        );
        let mut stop = self.stop_signal.subscribe();
        let mut ticker = tokio::time::interval(self.settings.observation_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // -- the first tick fires right away, so the first observation does too
        loop {
            tokio::select! {
                biased;
                _ = stop.wait_for(|stopped| *stopped) => break,
                _ = ticker.tick() => {}
            }
            // -- an observation in flight is abandoned on stop, never finished
            tokio::select! {
                biased;
                _ = stop.wait_for(|stopped| *stopped) => break,
                _ = self.observe_now() => {}
            }
        }
        debug!("🛑 observer loop done");
    }

    /// 📸 Take one observation now, publish it, and return it.
    ///
    /// The three probes run concurrently against one shared deadline of
    /// `now + request_timeout`. A probe that fails or runs out of time leaves its field `None`.
    pub async fn observe_now(&self) -> State {
        let _one_at_a_time = self.observing.lock().await;
        let deadline = tokio::time::Instant::now() + self.settings.request_timeout;
        let (cluster_state, health, license) = tokio::join!(
            self.probe("cluster state", deadline, self.client.get_cluster_state()),
            self.probe("cluster health", deadline, self.client.get_cluster_health()),
            self.probe("license", deadline, self.client.get_license()),
        );
        let state = State {
            cluster_state,
            health,
            license,
        };
        trace!(cluster = %self.cluster, health = %state.health_status(), "📸 observation taken");
        self.publish(state.clone()).await;
        state
    }

    async fn probe<T>(
        &self,
        what: &'static str,
        deadline: tokio::time::Instant,
        call: impl Future<Output = EsResult<T>>,
    ) -> Option<T> {
        match tokio::time::timeout_at(deadline, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                warn!(cluster = %self.cluster, probe = what, "⚠️ unable to retrieve {what}: {err}");
                None
            }
            Err(_) => {
                warn!(
                    cluster = %self.cluster,
                    probe = what,
                    "⏳ {what} did not answer within {:?}", self.settings.request_timeout
                );
                None
            }
        }
    }

    // -- callback first, so listeners get to compare against what is still the last state
    async fn publish(&self, new: State) {
        if self.is_stopped() {
            return;
        }
        if let Some(on_observation) = &self.on_observation {
            on_observation(self.cluster.clone(), self.last_state(), new.clone()).await;
        }
        {
            let mut last = self.last_state.write().unwrap_or_else(PoisonError::into_inner);
            // -- stop() may have won the race while the callback ran
            if self.is_stopped() {
                return;
            }
            *last = new;
        }
        self.observations.send_modify(|count| *count += 1);
    }

    /// A copy of the last published state. The default state until the first observation.
    pub fn last_state(&self) -> State {
        self.last_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolve once at least one observation was published, or once the observer stopped.
    pub async fn wait_for_observation(&self) {
        let mut observations = self.observations.subscribe();
        let mut stop = self.stop_signal.subscribe();
        tokio::select! {
            _ = observations.wait_for(|count| *count > 0) => {}
            _ = stop.wait_for(|stopped| *stopped) => {}
        }
    }

    /// 🛑 Stop observing. Once this returns nothing new gets published, ever.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_signal.send_replace(true);
        if let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            worker.abort();
        }
        // -- wait out a publication that is already holding the lock
        drop(self.last_state.write().unwrap_or_else(PoisonError::into_inner));
        info!(cluster = %self.cluster, "🛑 observer stopped");
    }
}
