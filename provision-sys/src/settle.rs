// SPDX-License-Identifier: GPL-3.0-only

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Result, SysError};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Poll `ready` until it reports true or `timeout` elapses.
///
/// The condition is checked once before the first sleep, so an already
/// satisfied condition returns without waiting.
pub fn wait_until(what: &str, timeout: Duration, mut ready: impl FnMut() -> bool) -> Result<()> {
    let started = Instant::now();

    loop {
        if ready() {
            tracing::debug!(what, elapsed = ?started.elapsed(), "condition satisfied");
            return Ok(());
        }

        if started.elapsed() >= timeout {
            return Err(SysError::Timeout {
                what: what.to_string(),
                waited: timeout,
            });
        }

        thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(started.elapsed())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfied_condition_returns_immediately() {
        let started = Instant::now();
        wait_until("nothing", Duration::from_secs(30), || true).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn polls_until_ready() {
        let mut calls = 0;
        wait_until("third poll", Duration::from_secs(5), || {
            calls += 1;
            calls == 3
        })
        .unwrap();
        assert_eq!(calls, 3);
    }

    #[test]
    fn times_out() {
        let error = wait_until("never", Duration::from_millis(50), || false).unwrap_err();
        assert!(matches!(error, SysError::Timeout { .. }));
        assert!(error.to_string().contains("never"));
    }
}
