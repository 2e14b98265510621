use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{DispatchError, DispatchSearchController, SearchConfig, SearchSnapshot, SearchState, SearchTimings};
use crate::services::BookingService;

/// How long a finished or idle search stays queryable by default
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

/// One search controller per booking id
///
/// An entry is created only once a search has actually started. Entries whose
/// session has been settled (idle, found, cancelled or failed) for longer than
/// the retention period are dropped by [`SearchRegistry::evict_settled`].
/// Removing a controller resets its session so no loop outlives the entry.
pub struct SearchRegistry {
    controllers: RwLock<HashMap<String, Arc<DispatchSearchController>>>,
    service: Arc<dyn BookingService>,
    timings: SearchTimings,
    retention: Duration,
}

impl SearchRegistry {
    pub fn new(service: Arc<dyn BookingService>, timings: SearchTimings) -> Self {
        Self {
            controllers: RwLock::new(HashMap::new()),
            service,
            timings,
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Start a search for `booking_id`, registering its controller on success
    ///
    /// A rejected start leaves no entry behind.
    pub async fn start(&self, booking_id: &str, config: SearchConfig) -> Result<SearchSnapshot, DispatchError> {
        let booking_id = booking_id.trim();
        let controller = match self.get(booking_id).await {
            Some(controller) => controller,
            None => Arc::new(DispatchSearchController::new(Arc::clone(&self.service), self.timings)),
        };

        let snapshot = controller.start_search(booking_id, config).await?;

        let registered = match self.controllers.write().await.entry(booking_id.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&controller));
                true
            }
            Entry::Occupied(entry) => Arc::ptr_eq(entry.get(), &controller),
        };
        if !registered {
            // Another request registered this booking first; ours would be unreachable
            tracing::warn!(booking_id, "Concurrent search start for booking, cancelling duplicate");
            controller.cancel_search().await;
            return Err(DispatchError::InvalidState {
                operation: "start search",
                state: SearchState::Searching,
            });
        }

        Ok(snapshot)
    }

    pub async fn get(&self, booking_id: &str) -> Option<Arc<DispatchSearchController>> {
        self.controllers.read().await.get(booking_id).cloned()
    }

    /// Drop the controller for `booking_id` after resetting it locally
    pub async fn remove(&self, booking_id: &str) -> bool {
        let removed = self.controllers.write().await.remove(booking_id);
        match removed {
            Some(controller) => {
                controller.reset_search().await;
                tracing::debug!(booking_id, "Search controller removed");
                true
            }
            None => false,
        }
    }

    /// Drop controllers settled for at least the retention period
    pub async fn evict_settled(&self) -> usize {
        let mut controllers = self.controllers.write().await;
        let before = controllers.len();
        controllers.retain(|booking_id, controller| {
            let expired = controller
                .settled_for()
                .is_some_and(|settled| settled >= self.retention);
            if expired {
                tracing::debug!(booking_id = %booking_id, "Evicting settled search");
            }
            !expired
        });
        before - controllers.len()
    }

    /// Run [`SearchRegistry::evict_settled`] every `period` until `shutdown` fires
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let evicted = registry.evict_settled().await;
                if evicted > 0 {
                    let remaining = registry.len().await;
                    tracing::info!(evicted, remaining, "Evicted settled searches");
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.controllers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.controllers.read().await.is_empty()
    }
}
