use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::session::{SearchConfig, SearchSession, SearchSnapshot, SearchState, TickOutcome};
use super::{DispatchError, SearchTimings};
use crate::services::BookingService;

/// Session plus the bookkeeping needed to fence off stale loops
struct SessionSlot {
    session: Option<SearchSession>,
    /// Bumped whenever the session is replaced, reset or its start is aborted
    generation: u64,
    /// Cancels both loops of the running session
    token: Option<CancellationToken>,
    starting: bool,
    /// An accept or decline is waiting on the booking service
    deciding: bool,
}

struct Shared {
    slot: Mutex<SessionSlot>,
    updates: watch::Sender<SearchSnapshot>,
    service: Arc<dyn BookingService>,
    timings: SearchTimings,
    shutdown: CancellationToken,
    /// When the published state last stopped being active
    settled_at: std::sync::Mutex<Option<Instant>>,
}

impl Shared {
    fn publish(&self, snapshot: SearchSnapshot) {
        {
            let mut settled_at = self.settled_at.lock().unwrap_or_else(PoisonError::into_inner);
            if snapshot.state.is_active() {
                *settled_at = None;
            } else if settled_at.is_none() {
                *settled_at = Some(Instant::now());
            }
        }
        self.updates.send_replace(snapshot);
    }
}

enum CountdownEnd {
    Retry,
    Exhausted,
    Stop,
}

/// Drives one booking's provider search
///
/// Two loops run per attempt: a countdown ticking every `timings.tick` and a
/// poll of the booking service every `timings.poll_interval`. Both mutate the
/// session only while holding the same mutex, and both stop on the session's
/// cancellation token, so whichever of "found" and "timed out" lands first
/// wins and the other becomes a no-op.
///
/// Dropping the controller tears down any running loops.
pub struct DispatchSearchController {
    shared: Arc<Shared>,
}

impl DispatchSearchController {
    pub fn new(service: Arc<dyn BookingService>, timings: SearchTimings) -> Self {
        let (updates, _) = watch::channel(SearchSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(SessionSlot {
                    session: None,
                    generation: 0,
                    token: None,
                    starting: false,
                    deciding: false,
                }),
                updates,
                service,
                timings,
                shutdown: CancellationToken::new(),
                settled_at: std::sync::Mutex::new(Some(Instant::now())),
            }),
        }
    }

    /// Start searching for a provider for `booking_id`
    ///
    /// Fails without entering `searching` when the input is invalid, a search
    /// is already running, or the booking service refuses to start.
    pub async fn start_search(
        &self,
        booking_id: &str,
        config: SearchConfig,
    ) -> Result<SearchSnapshot, DispatchError> {
        let booking_id = booking_id.trim();
        if booking_id.is_empty() {
            return Err(DispatchError::InvalidInput("bookingId is required".to_string()));
        }
        config.validate()?;

        let generation = {
            let mut slot = self.shared.slot.lock().await;
            if slot.starting {
                return Err(DispatchError::InvalidState {
                    operation: "start search",
                    state: SearchState::Searching,
                });
            }
            if slot.deciding {
                return Err(DispatchError::InvalidState {
                    operation: "start search",
                    state: SearchState::Found,
                });
            }
            if let Some(state) = slot.session.as_ref().map(SearchSession::state).filter(|s| s.is_active()) {
                return Err(DispatchError::InvalidState {
                    operation: "start search",
                    state,
                });
            }
            slot.starting = true;
            slot.generation
        };

        let started = self.shared.service.start_search(booking_id, &config).await;

        let mut slot = self.shared.slot.lock().await;
        slot.starting = false;
        let search_id = match started {
            Ok(search_id) => search_id,
            Err(e) => {
                tracing::warn!(booking_id, error = %e, "Failed to start provider search");
                return Err(e.into());
            }
        };

        if slot.generation != generation {
            drop(slot);
            tracing::info!(booking_id, search_id = %search_id, "Search start superseded by cancel or reset, abandoning");
            abandon(&self.shared, booking_id, &search_id).await;
            return Err(DispatchError::Aborted);
        }

        let mut session = SearchSession::new(booking_id, config);
        let attempt = session.begin_attempt(search_id.clone())?;
        let snapshot = session.snapshot();

        slot.generation += 1;
        let generation = slot.generation;
        let token = self.shared.shutdown.child_token();
        slot.token = Some(token.clone());
        slot.session = Some(session);
        self.shared.publish(snapshot.clone());
        drop(slot);

        tracing::info!(
            booking_id,
            search_id = %search_id,
            attempt,
            max_search_time = config.max_search_time_seconds,
            retry_attempts = config.retry_attempts,
            "Provider search started"
        );

        tokio::spawn(supervise(
            Arc::clone(&self.shared),
            generation,
            token,
            booking_id.to_string(),
            search_id,
            attempt,
        ));

        Ok(snapshot)
    }

    /// Stop an active search and tell the booking service to abandon it
    ///
    /// Calling this when nothing is running is a no-op.
    pub async fn cancel_search(&self) -> SearchSnapshot {
        let mut slot = self.shared.slot.lock().await;
        if slot.starting {
            // The pending start sees the new generation and abandons itself
            slot.generation += 1;
        }

        let Some(session) = slot.session.as_mut() else {
            return SearchSnapshot::default();
        };
        // A timed-out search was already abandoned when its attempt ended
        let open_search = (session.state() == SearchState::Searching)
            .then(|| session.search_id().map(str::to_string))
            .flatten();
        if !session.cancel() {
            return session.snapshot();
        }

        let snapshot = session.snapshot();
        if let Some(token) = slot.token.take() {
            token.cancel();
        }
        self.shared.publish(snapshot.clone());
        drop(slot);

        tracing::info!(booking_id = %snapshot.booking_id, "Provider search cancelled");
        if let Some(search_id) = open_search {
            abandon(&self.shared, &snapshot.booking_id, &search_id).await;
        }

        snapshot
    }

    /// Discard the session locally without contacting the booking service
    pub async fn reset_search(&self) -> SearchSnapshot {
        let mut slot = self.shared.slot.lock().await;
        if let Some(token) = slot.token.take() {
            token.cancel();
        }
        slot.session = None;
        slot.generation += 1;

        let snapshot = SearchSnapshot::default();
        self.shared.publish(snapshot.clone());
        snapshot
    }

    /// Commit the booking to the provider the search found
    pub async fn accept_provider(&self, provider_id: &str) -> Result<SearchSnapshot, DispatchError> {
        let (booking_id, generation) = self.claim_decision(provider_id, "accept provider").await?;

        let accepted = self.shared.service.accept_booking(&booking_id, provider_id).await;

        let mut slot = self.shared.slot.lock().await;
        slot.deciding = false;
        accepted?;
        if slot.generation != generation {
            return Err(DispatchError::Aborted);
        }
        let session = slot.session.as_mut().ok_or(DispatchError::Aborted)?;
        session.mark_dispatched(provider_id)?;
        let snapshot = session.snapshot();
        self.shared.publish(snapshot.clone());

        tracing::info!(booking_id = %booking_id, provider_id, "Provider accepted, booking dispatched");
        Ok(snapshot)
    }

    /// Turn down the found provider and return the session to `idle`
    pub async fn decline_provider(&self, provider_id: &str) -> Result<SearchSnapshot, DispatchError> {
        let (booking_id, generation) = self.claim_decision(provider_id, "decline provider").await?;

        let declined = self.shared.service.decline_booking(&booking_id, provider_id).await;

        let mut slot = self.shared.slot.lock().await;
        slot.deciding = false;
        declined?;
        if slot.generation != generation {
            return Err(DispatchError::Aborted);
        }
        slot.generation += 1;
        let session = slot.session.as_mut().ok_or(DispatchError::Aborted)?;
        session.reset();
        let snapshot = session.snapshot();
        self.shared.publish(snapshot.clone());

        tracing::info!(booking_id = %booking_id, provider_id, "Provider declined");
        Ok(snapshot)
    }

    /// Reserve the found provider for one accept or decline at a time
    async fn claim_decision(
        &self,
        provider_id: &str,
        operation: &'static str,
    ) -> Result<(String, u64), DispatchError> {
        let mut slot = self.shared.slot.lock().await;
        if slot.deciding {
            return Err(DispatchError::InvalidState {
                operation,
                state: SearchState::Found,
            });
        }
        let session = slot.session.as_ref().ok_or(DispatchError::InvalidState {
            operation,
            state: SearchState::Idle,
        })?;
        session.ensure_found_provider(provider_id)?;
        if session.dispatched_provider_id().is_some() {
            return Err(DispatchError::InvalidState {
                operation,
                state: session.state(),
            });
        }
        let claimed = (session.booking_id().to_string(), slot.generation);
        slot.deciding = true;
        Ok(claimed)
    }

    pub async fn snapshot(&self) -> SearchSnapshot {
        let slot = self.shared.slot.lock().await;
        slot.session.as_ref().map(SearchSession::snapshot).unwrap_or_default()
    }

    /// States entered by the current session, oldest first
    pub async fn history(&self) -> Vec<SearchState> {
        let slot = self.shared.slot.lock().await;
        slot.session
            .as_ref()
            .map(|session| session.history().to_vec())
            .unwrap_or_default()
    }

    /// How long the session has been idle or finished
    ///
    /// `None` while a search is active, or while a start, accept or decline
    /// is still waiting on the booking service.
    pub fn settled_for(&self) -> Option<Duration> {
        let slot = self.shared.slot.try_lock().ok()?;
        if slot.starting || slot.deciding {
            return None;
        }
        let settled_at = *self.shared.settled_at.lock().unwrap_or_else(PoisonError::into_inner);
        settled_at.map(|at| at.elapsed())
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.shared.updates.subscribe()
    }

    /// Wait until the session reaches `found`, `cancelled` or `failed`
    pub async fn wait_for_terminal(&self) -> Option<SearchSnapshot> {
        let mut updates = self.subscribe();
        let snapshot = updates
            .wait_for(|snapshot| snapshot.state.is_terminal())
            .await
            .ok()
            .map(|snapshot| snapshot.clone());
        snapshot
    }
}

impl Drop for DispatchSearchController {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

/// Runs attempts back to back until the session stops or the retry budget is spent
async fn supervise(
    shared: Arc<Shared>,
    generation: u64,
    token: CancellationToken,
    booking_id: String,
    mut search_id: String,
    mut attempt: u32,
) {
    loop {
        let attempt_token = token.child_token();
        tokio::spawn(run_poll(
            Arc::clone(&shared),
            generation,
            token.clone(),
            attempt_token.clone(),
            booking_id.clone(),
            search_id.clone(),
            attempt,
        ));

        let end = run_countdown(&shared, generation, &token, &attempt_token).await;
        attempt_token.cancel();

        match end {
            CountdownEnd::Stop => return,
            CountdownEnd::Exhausted => {
                abandon(&shared, &booking_id, &search_id).await;
                return;
            }
            CountdownEnd::Retry => abandon(&shared, &booking_id, &search_id).await,
        }

        match retry(&shared, generation, &token, &booking_id).await {
            Some((next_search_id, next_attempt)) => {
                search_id = next_search_id;
                attempt = next_attempt;
            }
            None => return,
        }
    }
}

async fn run_countdown(
    shared: &Shared,
    generation: u64,
    token: &CancellationToken,
    attempt_token: &CancellationToken,
) -> CountdownEnd {
    let period = shared.timings.tick;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = attempt_token.cancelled() => return CountdownEnd::Stop,
            _ = ticker.tick() => {}
        }

        let mut slot = shared.slot.lock().await;
        if attempt_token.is_cancelled() || slot.generation != generation {
            return CountdownEnd::Stop;
        }
        let Some(session) = slot.session.as_mut() else {
            return CountdownEnd::Stop;
        };

        match session.tick() {
            TickOutcome::Ignored => return CountdownEnd::Stop,
            TickOutcome::Running(_) => shared.publish(session.snapshot()),
            TickOutcome::Retry => {
                tracing::info!(
                    booking_id = session.booking_id(),
                    attempt = session.attempt(),
                    "Search attempt timed out, retrying"
                );
                shared.publish(session.snapshot());
                return CountdownEnd::Retry;
            }
            TickOutcome::Exhausted => {
                tracing::warn!(
                    booking_id = session.booking_id(),
                    attempts = session.attempt(),
                    "No provider found after all search attempts"
                );
                token.cancel();
                shared.publish(session.snapshot());
                return CountdownEnd::Exhausted;
            }
        }
    }
}

/// Wait the fixed retry delay, then start the next attempt
async fn retry(
    shared: &Shared,
    generation: u64,
    token: &CancellationToken,
    booking_id: &str,
) -> Option<(String, u32)> {
    tokio::select! {
        biased;
        _ = token.cancelled() => return None,
        _ = sleep(shared.timings.retry_delay) => {}
    }

    let config = {
        let slot = shared.slot.lock().await;
        let session = slot.session.as_ref().filter(|_| slot.generation == generation)?;
        if session.state() != SearchState::TimedOut {
            return None;
        }
        session.config()
    };

    // Not raced against the token: a search created after a cancel must be
    // known here so it can be abandoned
    let started = shared.service.start_search(booking_id, &config).await;

    let mut slot = shared.slot.lock().await;
    if token.is_cancelled() || slot.generation != generation {
        drop(slot);
        if let Ok(search_id) = started {
            tracing::info!(booking_id, search_id = %search_id, "Search retry superseded by cancel or reset, abandoning");
            abandon(shared, booking_id, &search_id).await;
        }
        return None;
    }
    let session = slot.session.as_mut()?;

    match started {
        Ok(search_id) => {
            let attempt = session.begin_attempt(search_id.clone()).ok()?;
            shared.publish(session.snapshot());
            tracing::info!(booking_id, search_id = %search_id, attempt, "Search retry started");
            Some((search_id, attempt))
        }
        Err(e) => {
            tracing::warn!(booking_id, error = %e, "Failed to restart provider search");
            session.fail(format!("Search could not be restarted: {}", e));
            token.cancel();
            shared.publish(session.snapshot());
            None
        }
    }
}

/// Tell the booking service to drop a search this session no longer follows
async fn abandon(shared: &Shared, booking_id: &str, search_id: &str) {
    match shared.service.cancel_active_search(booking_id, search_id).await {
        Ok(()) => tracing::debug!(booking_id, search_id, "Search abandoned"),
        Err(e) => tracing::warn!(booking_id, search_id, error = %e, "Failed to abandon search"),
    }
}

/// Poll the search status until a provider is found or the attempt ends
///
/// Poll failures are logged and retried on the next interval.
async fn run_poll(
    shared: Arc<Shared>,
    generation: u64,
    token: CancellationToken,
    attempt_token: CancellationToken,
    booking_id: String,
    search_id: String,
    attempt: u32,
) {
    let period = shared.timings.poll_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = attempt_token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let polled = tokio::select! {
            biased;
            _ = attempt_token.cancelled() => return,
            polled = shared.service.check_search_status(&search_id, &booking_id) => polled,
        };

        let provider = match polled {
            Ok(status) if status.success => match status.provider {
                Some(provider) => provider,
                None => {
                    tracing::warn!(booking_id = %booking_id, search_id = %search_id, "Search reported success without a provider");
                    continue;
                }
            },
            Ok(status) => {
                if let Some(error) = status.error {
                    tracing::debug!(booking_id = %booking_id, search_id = %search_id, error = %error, "Search still pending");
                }
                continue;
            }
            Err(e) => {
                tracing::warn!(booking_id = %booking_id, search_id = %search_id, error = %e, "Search status poll failed, will retry");
                continue;
            }
        };

        let mut slot = shared.slot.lock().await;
        if attempt_token.is_cancelled() || slot.generation != generation {
            return;
        }
        let Some(session) = slot.session.as_mut() else {
            return;
        };
        if session.attempt() != attempt {
            return;
        }

        let provider_id = provider.provider_id.clone();
        if session.mark_found(provider) {
            token.cancel();
            shared.publish(session.snapshot());
            tracing::info!(booking_id = %booking_id, provider_id = %provider_id, attempt, "Provider found");
        }
        return;
    }
}
