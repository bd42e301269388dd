//! Per-request deadline handle.
//!
//! Transports create one [`Deadline`] per request and run the whole operation
//! through it. Expiry drops the in-flight future at its current await point and
//! surfaces `AuthError::DeadlineExceeded`; effects already committed (e.g. an
//! access session written before the refresh session) are kept, which is safe
//! because sign-in overwrites on retry.

use std::{future::Future, time::Duration};
use tokio::time::{timeout_at, Instant};

use super::AuthError;

#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    /// Keep whichever deadline fires first.
    #[must_use]
    pub fn min(self, other: Option<Duration>) -> Self {
        match other {
            Some(timeout) => {
                let at = Instant::now() + timeout;
                Self {
                    at: self.at.min(at),
                }
            }
            None => self,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Run `fut` until it completes or the deadline fires.
    ///
    /// # Errors
    /// Returns the operation's own error, or `DeadlineExceeded` on expiry.
    pub async fn run<T, F>(self, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        timeout_at(self.at, fut)
            .await
            .map_err(|_| AuthError::DeadlineExceeded)?
    }
}
