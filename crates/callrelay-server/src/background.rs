//! Background tasks for the callrelay server.
//!
//! Includes:
//! - Pruning call sessions older than the configured TTL.

use callrelay_session::SessionStore;
use tokio::time::{sleep, Duration};

/// Removes sessions older than `ttl_seconds` and returns their call SIDs.
///
/// A TTL too large to represent as a time span never expires anything.
pub fn prune_expired_sessions(sessions: &SessionStore, ttl_seconds: u64) -> Vec<String> {
    let Some(ttl) = i64::try_from(ttl_seconds)
        .ok()
        .and_then(chrono::TimeDelta::try_seconds)
    else {
        tracing::debug!(ttl_seconds, "session ttl out of range, nothing to prune");
        return Vec::new();
    };
    let pruned = sessions.prune_older_than(ttl);
    if !pruned.is_empty() {
        tracing::info!(count = pruned.len(), "pruned expired call sessions");
        for call_sid in &pruned {
            tracing::debug!(call_sid = %call_sid, "session expired");
        }
    }
    pruned
}

/// Starts the session pruning task.
///
/// This task runs indefinitely, periodically dropping sessions that started
/// more than `ttl_seconds` ago.
pub async fn start_session_pruning_task(sessions: SessionStore, ttl_seconds: u64) {
    if ttl_seconds == 0 {
        tracing::info!("session pruning disabled (ttl=0)");
        return;
    }

    // Run check every 60 seconds or ttl/2, whichever is smaller (but min 1s)
    let interval_seconds = (ttl_seconds / 2).clamp(1, 60);
    let interval = Duration::from_secs(interval_seconds);

    tracing::info!(ttl_seconds, interval_seconds, "starting session pruning task");

    loop {
        sleep(interval).await;
        prune_expired_sessions(&sessions, ttl_seconds);
    }
}
