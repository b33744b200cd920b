//! Correlation of caller deadlines with late device updates
//!
//! A presentation layer typically races each read against a short deadline.
//! When the deadline wins, the read keeps running; the [`RaceHandle`] tells
//! it that nobody is waiting anymore, so the value can be pushed to observers
//! instead.

use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use rand::Rng;
use tracing::warn;

use crate::error::{Result, RobovacError};

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ID_LENGTH: usize = 2;

/// Token shared between one read and the deadline racing it
#[derive(Debug)]
pub struct RaceHandle {
    id: String,
    active: AtomicBool,
}

impl RaceHandle {
    /// Create an active handle with a short random id
    #[must_use]
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..ID_LENGTH)
            .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
            .collect();

        Self {
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Short id for log correlation
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// False once the caller stopped waiting
    #[must_use]
    pub fn still_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Mark the caller as gone
    pub fn expire(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

impl Default for RaceHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Run a read on its own task and give up waiting after `timeout`
///
/// On expiry the handle is expired and [`RobovacError::Timeout`] is returned,
/// but the task is left running so the read can still complete.
///
/// # Errors
///
/// Returns [`RobovacError::Timeout`] when the deadline passes first, the
/// read's own error otherwise.
pub async fn with_deadline<T, F>(handle: Arc<RaceHandle>, timeout: Duration, read: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let task = tokio::spawn(read);

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(RobovacError::Other(format!(
            "[{handle}] read task failed: {join_error}"
        ))),
        Err(_) => {
            handle.expire();
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!("[{}] Read timed out after {}ms", handle, timeout_ms);
            Err(RobovacError::Timeout { timeout_ms })
        }
    }
}
