//! 🔭 Observers: one background sampler per cluster, and the manager that keeps them in line.
//!
//! An [`Observer`] polls one cluster every `observation_interval`, gathers cluster state,
//! health and license in parallel, and keeps the latest [`State`] around for whoever asks.
//! The [`Manager`] owns every observer, replaces them when a cluster's client changes, and
//! fans each fresh observation out to the registered listeners.
//!
//! ⚠️ A `None` inside a [`State`] means "the probe failed this time", never "the cluster has
//! no such thing". Treat it as weather, not as climate.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

mod manager;
#[allow(clippy::module_inception)]
mod observer;

pub use manager::{Manager, health_change_listener};
pub use observer::{
    DEFAULT_OBSERVATION_INTERVAL, DEFAULT_OBSERVER_REQUEST_TIMEOUT, Observer, ObserverSettings,
    State,
};

/// 🏷️ Which cluster: a namespace and a name. Displays as `namespace/name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId {
    pub namespace: String,
    pub name: String,
}

impl ClusterId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Called with `(cluster, previous, new)` for every observation, before `new` becomes the
/// observer's last state. The observer waits for the returned future.
pub type OnObservation = Arc<dyn Fn(ClusterId, State, State) -> BoxFuture<'static, ()> + Send + Sync>;

/// Listeners registered on the [`Manager`] share the callback shape.
pub type ObservationListener = OnObservation;

/// Box up an async closure as an [`ObservationListener`].
pub fn observation_listener<F, Fut>(f: F) -> ObservationListener
where
    F: Fn(ClusterId, State, State) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |cluster, previous, new| f(cluster, previous, new).boxed())
}
