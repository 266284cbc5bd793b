//! 🗂️ The observer registry: at most one observer per cluster, for the life of the process.
//!
//! Reads (is there already an observer with this client?) vastly outnumber writes (new
//! cluster, new credentials, deleted cluster), hence the read-write lock. The lock is a
//! plain `std::sync::RwLock` and is never held across an `.await`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{ClusterId, ObservationListener, Observer, ObserverSettings, OnObservation, State};
use crate::client::ClusterApi;
use crate::client::model::HealthStatus;

/// A listener never gets less than this to deal with an observation.
const MIN_LISTENER_BUDGET: Duration = Duration::from_secs(1);

/// 🗂️ Owns every observer. Tear observers down through here, never directly.
pub struct Manager {
    settings: ObserverSettings,
    observers: RwLock<HashMap<ClusterId, Arc<Observer>>>,
    listeners: Arc<RwLock<Vec<ObservationListener>>>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("settings", &self.settings)
            .field("observed", &self.list())
            .finish_non_exhaustive()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(ObserverSettings::default())
    }
}

// -- observers hold their own Arc'ed state, so nobody else would ever stop them
impl Drop for Manager {
    fn drop(&mut self) {
        let observers = self.observers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (cluster, observer) in observers.drain() {
            debug!(cluster = %cluster, "🧹 manager dropped, stopping observer");
            observer.stop();
        }
    }
}

impl Manager {
    pub fn new(settings: ObserverSettings) -> Self {
        Self {
            settings,
            observers: RwLock::new(HashMap::new()),
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn settings(&self) -> &ObserverSettings {
        &self.settings
    }

    /// 🔭 The observer for `cluster`, created and started if there is none yet.
    ///
    /// An existing observer is kept as long as its client is the same as `client` (same
    /// endpoint, credentials, CAs and major version). Otherwise it is stopped and replaced,
    /// both under the write lock, so two observers never watch the same cluster.
    ///
    /// # Panics
    ///
    /// Outside a tokio runtime, when a new observer has to be started: its worker is a
    /// `tokio::spawn`ed task. Synchronous-mode managers never spawn and are fine anywhere.
    pub fn observe(&self, cluster: ClusterId, client: Arc<dyn ClusterApi>) -> Arc<Observer> {
        {
            let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = observers.get(&cluster) {
                if existing.client().same_as(client.as_ref()) {
                    return Arc::clone(existing);
                }
            }
        }

        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = observers.get(&cluster) {
            if existing.client().same_as(client.as_ref()) {
                // -- someone beat us to it between the two locks
                return Arc::clone(existing);
            }
            info!(cluster = %cluster, "🔁 client changed, replacing observer");
            if let Some(previous) = observers.remove(&cluster) {
                previous.stop();
            }
        }

        debug!(cluster = %cluster, "🔭 creating observer");
        let observer = Observer::new(
            cluster.clone(),
            client,
            self.settings,
            Some(self.notify_listeners()),
        );
        observer.start();
        observers.insert(cluster, Arc::clone(&observer));
        observer
    }

    /// 🛑 Stop and forget the observer for `cluster`. A no-op if there is none.
    pub fn stop_observing(&self, cluster: &ClusterId) {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(observer) = observers.remove(cluster) {
            observer.stop();
        }
    }

    /// Every observed cluster, in no particular order.
    pub fn list(&self) -> Vec<ClusterId> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// The current observer for `cluster`, if any.
    pub fn get(&self, cluster: &ClusterId) -> Option<Arc<Observer>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cluster)
            .cloned()
    }

    /// 📣 Register a listener, called for every observation of every cluster.
    ///
    /// ⚠️ Observers wait for their listeners before moving on. Each listener gets
    /// `max(observation_interval, 1s)` per observation; past that its delivery is dropped
    /// and the observer carries on. A slow listener slows observations down, a stuck one
    /// only loses its own notifications.
    pub fn add_observation_listener(&self, listener: ObservationListener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// The last observed state of `cluster`, observing it first if needed.
    ///
    /// A freshly created observer is waited on until its first observation lands. In
    /// synchronous mode (zero interval) every call takes a new observation.
    pub async fn observed_state_resolver(&self, cluster: ClusterId, client: Arc<dyn ClusterApi>) -> State {
        let observer = self.observe(cluster, client);
        if self.settings.is_synchronous() {
            return observer.observe_now().await;
        }
        observer.wait_for_observation().await;
        observer.last_state()
    }

    // -- captures the listener list only, never the manager
    fn notify_listeners(&self) -> OnObservation {
        let listeners = Arc::clone(&self.listeners);
        let budget = self.settings.observation_interval.max(MIN_LISTENER_BUDGET);
        Arc::new(move |cluster: ClusterId, previous: State, new: State| {
            let listeners = listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            async move {
                // -- dropping the set aborts stragglers, e.g. when the observer is stopped
                let mut deliveries = JoinSet::new();
                for listener in listeners {
                    let delivery = listener(cluster.clone(), previous.clone(), new.clone());
                    let cluster = cluster.clone();
                    deliveries.spawn(async move {
                        if tokio::time::timeout(budget, delivery).await.is_err() {
                            warn!(cluster = %cluster, "⏳ listener took longer than {budget:?}, delivery dropped");
                        }
                    });
                }
                while let Some(joined) = deliveries.join_next().await {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            warn!(cluster = %cluster, "💀 observation listener panicked");
                        }
                    }
                }
            }
            .boxed()
        })
    }
}

/// 🚦 Wrap `f` so it only fires when the health colour changed between two observations.
pub fn health_change_listener<F, Fut>(f: F) -> ObservationListener
where
    F: Fn(ClusterId, HealthStatus, HealthStatus) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |cluster: ClusterId, previous: State, new: State| {
        let (before, after) = (previous.health_status(), new.health_status());
        if before == after {
            return futures::future::ready(()).boxed();
        }
        f(cluster, before, after).boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fixtures;
    use crate::client::{ClientSettings, Credentials, new_elasticsearch_client};
    use crate::observer::observation_listener;
    use semver::Version;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn healthy_cluster() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixtures::HEALTH_SAMPLE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_cluster/state/version,master_node,nodes,routing_table"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixtures::CLUSTER_STATE_SAMPLE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_license"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixtures::LICENSE_SAMPLE))
            .mount(&server)
            .await;
        server
    }

    fn client(endpoint: &str, username: &str) -> Arc<dyn ClusterApi> {
        let settings = ClientSettings::new(endpoint, Version::new(7, 0, 0))
            .with_credentials(Credentials::new(username, "changeme"));
        new_elasticsearch_client(settings).expect("💀 plain http clients always build")
    }

    fn cluster(name: &str) -> ClusterId {
        ClusterId::new("ns", name)
    }

    fn slow_settings() -> ObserverSettings {
        ObserverSettings {
            observation_interval: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn fast_settings() -> ObserverSettings {
        ObserverSettings {
            observation_interval: Duration::from_millis(50),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn the_one_where_list_shows_who_is_watched() {
        let manager = Manager::new(slow_settings());
        assert!(manager.list().is_empty());

        manager.observe(cluster("a"), client("http://127.0.0.1:1", "elastic"));
        manager.observe(cluster("b"), client("http://127.0.0.1:1", "elastic"));
        let mut listed = manager.list();
        listed.sort();
        assert_eq!(listed, vec![cluster("a"), cluster("b")]);

        manager.stop_observing(&cluster("a"));
        manager.stop_observing(&cluster("b"));
    }

    #[tokio::test]
    async fn the_one_where_dropping_the_manager_stops_its_observers() {
        let server = healthy_cluster().await;
        let manager = Manager::new(fast_settings());
        let observer = manager.observe(cluster("es"), client(&server.uri(), "elastic"));
        tokio::time::timeout(Duration::from_secs(5), observer.wait_for_observation())
            .await
            .expect("💀 first observation never landed");

        drop(manager);

        assert!(observer.is_stopped());
        let published = observer.observation_count();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(observer.observation_count(), published, "an orphaned observer kept going");
    }

    #[test]
    fn the_one_where_synchronous_managers_need_no_runtime() {
        let manager = Manager::new(ObserverSettings {
            observation_interval: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        });
        let observer = manager.observe(cluster("es"), client("http://127.0.0.1:1", "elastic"));
        assert_eq!(manager.list(), vec![cluster("es")]);

        drop(manager);
        assert!(observer.is_stopped());
    }

    #[tokio::test]
    async fn the_one_where_the_same_client_keeps_the_same_observer() {
        let manager = Manager::new(slow_settings());
        let first = manager.observe(cluster("es"), client("http://127.0.0.1:1", "elastic"));
        // -- a different handle, but the same identity
        let second = manager.observe(cluster("es"), client("http://127.0.0.1:1", "elastic"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.creation_time(), second.creation_time());
        assert!(!first.is_stopped());
        manager.stop_observing(&cluster("es"));
    }

    #[tokio::test]
    async fn the_one_where_a_new_client_means_a_new_observer() {
        let manager = Manager::new(slow_settings());
        let first = manager.observe(cluster("es"), client("http://127.0.0.1:1", "elastic"));
        let second = manager.observe(cluster("es"), client("http://127.0.0.1:1", "another-user"));

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(first.is_stopped(), "the replaced observer must be stopped");
        assert!(!second.is_stopped());
        let registered = manager
            .get(&cluster("es"))
            .expect("💀 the replacement should be registered");
        assert!(Arc::ptr_eq(&registered, &second));
        assert_eq!(manager.list(), vec![cluster("es")]);
        manager.stop_observing(&cluster("es"));
    }

    #[tokio::test]
    async fn the_one_where_stop_observing_is_boring_and_repeatable() {
        let manager = Manager::new(slow_settings());
        // -- nothing to stop, nothing happens
        manager.stop_observing(&cluster("ghost"));

        let observer = manager.observe(cluster("es"), client("http://127.0.0.1:1", "elastic"));
        manager.observe(cluster("other"), client("http://127.0.0.1:1", "elastic"));
        manager.stop_observing(&cluster("es"));
        manager.stop_observing(&cluster("es"));

        assert!(observer.is_stopped());
        assert_eq!(manager.list(), vec![cluster("other")]);
        manager.stop_observing(&cluster("other"));
        assert!(manager.list().is_empty());
    }

    #[tokio::test]
    async fn the_one_where_every_listener_hears_every_cluster() {
        let server = healthy_cluster().await;
        let manager = Manager::new(fast_settings());
        let heard: Arc<Mutex<Vec<(usize, ClusterId)>>> = Arc::default();
        for listener_id in 0..2 {
            let heard = Arc::clone(&heard);
            manager.add_observation_listener(observation_listener(move |cluster, _, _| {
                heard.lock().unwrap().push((listener_id, cluster));
                async {}
            }));
        }

        manager.observe(cluster("a"), client(&server.uri(), "elastic"));
        manager.observe(cluster("b"), client(&server.uri(), "elastic"));

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                {
                    let heard = heard.lock().unwrap();
                    let all_heard = (0..2).all(|listener| {
                        ["a", "b"]
                            .iter()
                            .all(|name| heard.contains(&(listener, cluster(name))))
                    });
                    if all_heard {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("💀 not every listener heard about every cluster");

        manager.stop_observing(&cluster("a"));
        manager.stop_observing(&cluster("b"));
    }

    #[tokio::test]
    async fn the_one_where_a_stuck_listener_does_not_stall_the_observer() {
        let server = healthy_cluster().await;
        let manager = Manager::new(fast_settings());
        let healthy_deliveries = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&healthy_deliveries);
        manager.add_observation_listener(observation_listener(|_, _, _| futures::future::pending::<()>()));
        manager.add_observation_listener(observation_listener(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {}
        }));

        let observer = manager.observe(cluster("es"), client(&server.uri(), "elastic"));
        // -- each observation waits out the stuck listener for 1s, two of them fit in 5s
        tokio::time::timeout(Duration::from_secs(5), async {
            while observer.observation_count() < 2 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("💀 the stuck listener stalled the observer for good");

        assert!(healthy_deliveries.load(Ordering::SeqCst) >= 2);
        manager.stop_observing(&cluster("es"));
    }

    #[tokio::test]
    async fn the_one_where_async_resolution_waits_once_then_serves_the_cache() {
        let server = MockServer::start().await;
        // -- first health call is green, every call after that is a 503
        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixtures::HEALTH_SAMPLE))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(ResponseTemplate::new(503))
            .with_priority(2)
            .mount(&server)
            .await;

        let manager = Manager::new(slow_settings());
        let es = client(&server.uri(), "elastic");
        let first = manager.observed_state_resolver(cluster("es"), Arc::clone(&es)).await;
        let second = manager.observed_state_resolver(cluster("es"), es).await;

        assert_eq!(first.health_status(), HealthStatus::Green);
        // -- the hourly observer has not looked again, so the cached green stands
        assert_eq!(second.health_status(), HealthStatus::Green);
        manager.stop_observing(&cluster("es"));
    }

    #[tokio::test]
    async fn the_one_where_sync_resolution_looks_every_time() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixtures::HEALTH_SAMPLE))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(ResponseTemplate::new(503))
            .with_priority(2)
            .mount(&server)
            .await;

        let manager = Manager::new(ObserverSettings {
            observation_interval: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        });
        let es = client(&server.uri(), "elastic");
        let first = manager.observed_state_resolver(cluster("es"), Arc::clone(&es)).await;
        let second = manager.observed_state_resolver(cluster("es"), es).await;

        assert_eq!(first.health_status(), HealthStatus::Green);
        assert_eq!(second.health_status(), HealthStatus::Unknown);
        manager.stop_observing(&cluster("es"));
    }

    #[tokio::test]
    async fn the_one_where_only_colour_changes_are_news() {
        let changes: Arc<Mutex<Vec<(HealthStatus, HealthStatus)>>> = Arc::default();
        let sink = Arc::clone(&changes);
        let listener = health_change_listener(move |_, before, after| {
            sink.lock().unwrap().push((before, after));
            async {}
        });

        let green: State = State {
            health: Some(serde_json::from_str(fixtures::HEALTH_SAMPLE).expect("💀 health fixture went bad")),
            ..State::default()
        };
        let unknown = State::default();

        listener(cluster("es"), unknown.clone(), green.clone()).await;
        listener(cluster("es"), green.clone(), green.clone()).await;
        listener(cluster("es"), green, unknown).await;

        assert_eq!(
            *changes.lock().unwrap(),
            vec![
                (HealthStatus::Unknown, HealthStatus::Green),
                (HealthStatus::Green, HealthStatus::Unknown)
            ]
        );
    }
}
