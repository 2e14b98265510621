//! Search session state machine.
//!
//! Pure, synchronous transitions for one booking's provider search. The async
//! driver in [`super::controller`] owns a session behind a mutex and applies
//! these transitions from its countdown and polling loops; every method here
//! is a no-op once the session has left the state it expects, which is what
//! makes the first writer win.

use serde::{Deserialize, Serialize};

use super::DispatchError;
use crate::models::FoundProvider;

/// Message surfaced when every attempt timed out
pub const NO_PROVIDERS_MESSAGE: &str = "No providers are available right now. Please try again later.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchState {
    #[default]
    Idle,
    Searching,
    Found,
    TimedOut,
    Cancelled,
    Failed,
}

impl SearchState {
    /// No further timer or poll may change a session in this state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Found | Self::Cancelled | Self::Failed)
    }

    /// A search is running or waiting to retry
    pub fn is_active(self) -> bool {
        matches!(self, Self::Searching | Self::TimedOut)
    }
}

/// Per-booking search limits supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    pub max_search_time_seconds: u32,
    pub retry_attempts: u32,
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.max_search_time_seconds == 0 {
            return Err(DispatchError::InvalidInput(
                "maxSearchTimeSeconds must be greater than zero".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(DispatchError::InvalidInput(
                "retryAttempts must be at least one".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of one countdown tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session is not searching; the tick changed nothing
    Ignored,
    /// Countdown still running with this many seconds left
    Running(u32),
    /// Attempt expired and another attempt is allowed
    Retry,
    /// Attempt expired and the retry budget is spent
    Exhausted,
}

/// Read-only view of a session for observers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSnapshot {
    pub booking_id: String,
    pub search_id: Option<String>,
    pub attempt: u32,
    pub countdown_seconds: u32,
    pub state: SearchState,
    pub provider: Option<FoundProvider>,
    pub dispatched: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchSession {
    booking_id: String,
    config: SearchConfig,
    search_id: Option<String>,
    attempt: u32,
    countdown_seconds: u32,
    state: SearchState,
    provider: Option<FoundProvider>,
    dispatched_provider_id: Option<String>,
    message: Option<String>,
    history: Vec<SearchState>,
}

impl SearchSession {
    pub fn new(booking_id: impl Into<String>, config: SearchConfig) -> Self {
        Self {
            booking_id: booking_id.into(),
            config,
            search_id: None,
            attempt: 0,
            countdown_seconds: 0,
            state: SearchState::Idle,
            provider: None,
            dispatched_provider_id: None,
            message: None,
            history: Vec::new(),
        }
    }

    pub fn booking_id(&self) -> &str {
        &self.booking_id
    }

    pub fn config(&self) -> SearchConfig {
        self.config
    }

    pub fn search_id(&self) -> Option<&str> {
        self.search_id.as_deref()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn countdown_seconds(&self) -> u32 {
        self.countdown_seconds
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn provider(&self) -> Option<&FoundProvider> {
        self.provider.as_ref()
    }

    pub fn dispatched_provider_id(&self) -> Option<&str> {
        self.dispatched_provider_id.as_deref()
    }

    /// States entered since the session was created, oldest first
    pub fn history(&self) -> &[SearchState] {
        &self.history
    }

    fn transition(&mut self, next: SearchState) {
        self.state = next;
        self.history.push(next);
    }

    /// Enter `searching` for the next attempt with a fresh countdown
    ///
    /// Legal from `idle` (first attempt) or `timedOut` (retry).
    pub fn begin_attempt(&mut self, search_id: impl Into<String>) -> Result<u32, DispatchError> {
        match self.state {
            SearchState::Idle | SearchState::TimedOut => {}
            other => {
                return Err(DispatchError::InvalidState {
                    operation: "start search",
                    state: other,
                })
            }
        }
        if self.attempt >= self.config.retry_attempts {
            return Err(DispatchError::InvalidState {
                operation: "retry search",
                state: self.state,
            });
        }

        self.attempt += 1;
        self.countdown_seconds = self.config.max_search_time_seconds;
        self.search_id = Some(search_id.into());
        self.message = None;
        self.transition(SearchState::Searching);
        Ok(self.attempt)
    }

    /// Advance the countdown by one second
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != SearchState::Searching {
            return TickOutcome::Ignored;
        }

        self.countdown_seconds = self.countdown_seconds.saturating_sub(1);
        if self.countdown_seconds > 0 {
            return TickOutcome::Running(self.countdown_seconds);
        }

        self.transition(SearchState::TimedOut);
        if self.attempt < self.config.retry_attempts {
            TickOutcome::Retry
        } else {
            self.fail(NO_PROVIDERS_MESSAGE);
            TickOutcome::Exhausted
        }
    }

    /// Record the provider reported by the status poll
    ///
    /// Only a `searching` session accepts it; returns whether it was applied.
    pub fn mark_found(&mut self, provider: FoundProvider) -> bool {
        if self.state != SearchState::Searching {
            return false;
        }
        self.provider = Some(provider);
        self.message = None;
        self.transition(SearchState::Found);
        true
    }

    /// Move an active session to terminal `failed`
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.state.is_active() {
            return false;
        }
        self.message = Some(message.into());
        self.transition(SearchState::Failed);
        true
    }

    /// Caller-initiated stop; returns `false` when there was nothing to cancel
    pub fn cancel(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }
        self.message = None;
        self.transition(SearchState::Cancelled);
        true
    }

    /// Local clear back to `idle`, keeping the booking id and config
    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.booking_id), self.config);
    }

    /// Check that `provider_id` is the provider this session found
    pub fn ensure_found_provider(&self, provider_id: &str) -> Result<(), DispatchError> {
        if self.state != SearchState::Found {
            return Err(DispatchError::InvalidState {
                operation: "respond to provider",
                state: self.state,
            });
        }
        match &self.provider {
            Some(found) if found.provider_id == provider_id => Ok(()),
            _ => Err(DispatchError::ProviderMismatch(provider_id.to_string())),
        }
    }

    /// Mark the found provider as committed after the booking service accepted it
    pub fn mark_dispatched(&mut self, provider_id: &str) -> Result<(), DispatchError> {
        self.ensure_found_provider(provider_id)?;
        self.dispatched_provider_id = Some(provider_id.to_string());
        Ok(())
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            booking_id: self.booking_id.clone(),
            search_id: self.search_id.clone(),
            attempt: self.attempt,
            countdown_seconds: self.countdown_seconds,
            state: self.state,
            provider: self.provider.clone(),
            dispatched: self.dispatched_provider_id.is_some(),
            message: self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: u32, retries: u32) -> SearchConfig {
        SearchConfig {
            max_search_time_seconds: max,
            retry_attempts: retries,
        }
    }

    fn provider(id: &str) -> FoundProvider {
        FoundProvider {
            provider_id: id.to_string(),
            name: "Ayu".to_string(),
            distance_km: Some(1.2),
        }
    }

    fn expire(session: &mut SearchSession) -> TickOutcome {
        loop {
            match session.tick() {
                TickOutcome::Running(_) => continue,
                other => return other,
            }
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(config(60, 3).validate().is_ok());
        assert!(matches!(config(0, 3).validate(), Err(DispatchError::InvalidInput(_))));
        assert!(matches!(config(60, 0).validate(), Err(DispatchError::InvalidInput(_))));
    }

    #[test]
    fn test_begin_attempt_resets_countdown() {
        let mut session = SearchSession::new("b1", config(5, 2));
        assert_eq!(session.begin_attempt("s1").unwrap(), 1);
        assert_eq!(session.state(), SearchState::Searching);
        assert_eq!(session.countdown_seconds(), 5);
        assert_eq!(session.tick(), TickOutcome::Running(4));
    }

    #[test]
    fn test_retry_budget_terminates() {
        let mut session = SearchSession::new("b1", config(2, 3));

        for attempt in 1..=3 {
            session.begin_attempt(format!("s{}", attempt)).unwrap();
            let outcome = expire(&mut session);
            if attempt < 3 {
                assert_eq!(outcome, TickOutcome::Retry);
            } else {
                assert_eq!(outcome, TickOutcome::Exhausted);
            }
        }

        assert_eq!(
            session.history(),
            &[
                SearchState::Searching,
                SearchState::TimedOut,
                SearchState::Searching,
                SearchState::TimedOut,
                SearchState::Searching,
                SearchState::TimedOut,
                SearchState::Failed,
            ]
        );
        assert_eq!(session.snapshot().message.as_deref(), Some(NO_PROVIDERS_MESSAGE));
        assert!(session.begin_attempt("s4").is_err());
    }

    #[test]
    fn test_found_locks_out_timeout() {
        let mut session = SearchSession::new("b1", config(1, 1));
        session.begin_attempt("s1").unwrap();

        assert!(session.mark_found(provider("p1")));
        assert_eq!(session.tick(), TickOutcome::Ignored);
        assert_eq!(session.state(), SearchState::Found);
        assert!(!session.cancel());
    }

    #[test]
    fn test_timeout_locks_out_found() {
        let mut session = SearchSession::new("b1", config(1, 2));
        session.begin_attempt("s1").unwrap();

        assert_eq!(session.tick(), TickOutcome::Retry);
        assert!(!session.mark_found(provider("p1")));
        assert_eq!(session.state(), SearchState::TimedOut);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut session = SearchSession::new("b1", config(10, 1));
        assert!(!session.cancel());
        assert_eq!(session.state(), SearchState::Idle);

        session.begin_attempt("s1").unwrap();
        assert!(session.cancel());
        assert!(!session.cancel());
        assert_eq!(session.state(), SearchState::Cancelled);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut session = SearchSession::new("b1", config(10, 1));
        session.begin_attempt("s1").unwrap();
        session.reset();

        assert_eq!(session.state(), SearchState::Idle);
        assert_eq!(session.attempt(), 0);
        assert_eq!(session.booking_id(), "b1");
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_dispatch_requires_found_provider() {
        let mut session = SearchSession::new("b1", config(10, 1));
        session.begin_attempt("s1").unwrap();
        assert!(session.mark_dispatched("p1").is_err());

        session.mark_found(provider("p1"));
        assert!(!session.snapshot().dispatched);
        assert!(matches!(
            session.mark_dispatched("p2"),
            Err(DispatchError::ProviderMismatch(_))
        ));
        session.mark_dispatched("p1").unwrap();
        assert!(session.snapshot().dispatched);
    }
}
