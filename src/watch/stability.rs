// src/watch/stability.rs

//! Gate that holds back a newly observed file until its size stops changing.

use std::path::Path;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::errors::{ArrivalReason, NanocasError, Result};
use crate::fs::FileSystem;

/// Poll the size of `path` every `interval` until two consecutive samples
/// agree, and return that size.
///
/// Fails with [`ArrivalReason::Disappeared`] when the file vanishes between
/// samples and with [`ArrivalReason::TimedOut`] when no two consecutive
/// samples agree within `timeout`.
pub async fn wait_for_stability(
    fs: &dyn FileSystem,
    path: &Path,
    interval: Duration,
    timeout: Duration,
) -> Result<u64> {
    let arrival_error = |reason| NanocasError::Arrival {
        path: path.to_path_buf(),
        reason,
    };
    let sample = || match fs.file_size(path) {
        Ok(Some(size)) => Ok(size),
        Ok(None) => Err(arrival_error(ArrivalReason::Disappeared)),
        Err(e) => Err(arrival_error(ArrivalReason::Stat(e.to_string()))),
    };

    let deadline = Instant::now() + timeout;
    let mut previous = sample()?;

    loop {
        if Instant::now() + interval > deadline {
            return Err(arrival_error(ArrivalReason::TimedOut {
                waited_secs: timeout.as_secs(),
            }));
        }
        sleep(interval).await;

        let current = sample()?;
        if current == previous {
            debug!(?path, size = current, "file size stable");
            return Ok(current);
        }
        debug!(?path, previous, current, "file still growing");
        previous = current;
    }
}
