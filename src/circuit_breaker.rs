use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Breaker guarding the best-effort state snapshot pushes.
pub type SnapshotBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Consecutive failed pushes before snapshots are skipped.
pub const SNAPSHOT_FAILURE_THRESHOLD: u32 = 5;
const SNAPSHOT_BACKOFF_START: Duration = Duration::from_secs(10);
const SNAPSHOT_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// While open, snapshot pushes are rejected locally; the first call after the
/// back-off (10s doubling up to 60s) probes the webhook again. Blocking calls
/// (deep questions, finish audit) never go through this breaker.
pub fn create_snapshot_circuit_breaker() -> SnapshotBreaker {
    snapshot_breaker_with(
        SNAPSHOT_FAILURE_THRESHOLD,
        SNAPSHOT_BACKOFF_START,
        SNAPSHOT_BACKOFF_MAX,
    )
}

fn snapshot_breaker_with(threshold: u32, start: Duration, max: Duration) -> SnapshotBreaker {
    let policy = failure_policy::consecutive_failures(threshold, backoff::exponential(start, max));
    Config::new().failure_policy(policy).build()
}
