//! Booking dispatch search lifecycle.
//!
//! [`SearchSession`] is the pure state machine, [`DispatchSearchController`]
//! drives it with a countdown loop and a status-polling loop, and
//! [`SearchRegistry`] keeps one controller per booking for the HTTP layer.
//!
//! Finding a provider never dispatches it: the caller must accept the found
//! provider through the controller, which confirms with the booking service.

pub mod controller;
pub mod registry;
pub mod session;

use std::time::Duration;

use thiserror::Error;

use crate::services::BackendError;

pub use controller::DispatchSearchController;
pub use registry::SearchRegistry;
pub use session::{SearchConfig, SearchSession, SearchSnapshot, SearchState, TickOutcome, NO_PROVIDERS_MESSAGE};

/// Errors surfaced synchronously by dispatch operations
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cannot {operation} while search is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SearchState,
    },

    #[error("Provider {0} is not the provider found for this booking")]
    ProviderMismatch(String),

    #[error("Search was cancelled or reset before it started")]
    Aborted,

    #[error("Booking service error: {0}")]
    Backend(#[from] BackendError),
}

/// Clock settings for the countdown, polling and retry loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTimings {
    pub tick: Duration,
    pub poll_interval: Duration,
    pub retry_delay: Duration,
}

impl Default for SearchTimings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
            retry_delay: Duration::from_secs(2),
        }
    }
}
