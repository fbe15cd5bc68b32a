//! Session lane serialization
//!
//! Turns of the same chat session run one at a time so the pre-clear and the
//! inspection of a session's artifact slot never interleave with another
//! turn's runner. Turns of different sessions proceed in parallel.
//!
//! Session ids come from clients, so the lane map is bounded: past the cap
//! the least recently used idle lanes are evicted, and a periodic sweep
//! drops lanes idle for longer than the timeout.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Holding a lane longer than this is logged
const LANE_HOLD_WARNING_SECS: u64 = 120;

/// Upper bound on tracked lanes before the oldest idle ones are evicted
const MAX_SESSION_LANES: usize = 10000;

/// Time after which an idle lane can be pruned
const LANE_IDLE_TIMEOUT_SECS: u64 = 3600;

struct LaneMetadata {
    last_used: Instant,
}

/// Guard that releases the session lane when dropped
pub struct SessionLaneGuard {
    session_id: String,
    _permit: OwnedSemaphorePermit,
    acquired_at: Instant,
    manager: Arc<SessionLaneManager>,
}

impl Drop for SessionLaneGuard {
    fn drop(&mut self) {
        let held = self.acquired_at.elapsed();
        if held.as_secs() > LANE_HOLD_WARNING_SECS {
            log::warn!(
                "[LANES] Session {} lane held for {} seconds (unusually long)",
                self.session_id,
                held.as_secs()
            );
        }

        if let Some(mut entry) = self.manager.metadata.get_mut(&self.session_id) {
            entry.last_used = Instant::now();
        }
    }
}

/// One single-permit semaphore per session
pub struct SessionLaneManager {
    lanes: DashMap<String, Arc<Semaphore>>,
    metadata: DashMap<String, LaneMetadata>,
    max_lanes: usize,
    /// Turns admitted over the manager's lifetime, evicted lanes included
    turns_processed: AtomicU64,
}

impl SessionLaneManager {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(MAX_SESSION_LANES)
    }

    /// A manager tracking at most about `max_lanes` idle lanes.
    pub fn with_capacity(max_lanes: usize) -> Arc<Self> {
        Arc::new(Self {
            lanes: DashMap::new(),
            metadata: DashMap::new(),
            max_lanes: max_lanes.max(1),
            turns_processed: AtomicU64::new(0),
        })
    }

    /// Wait for exclusive access to a session.
    ///
    /// Returns `None` only if the lane was closed, which never happens while
    /// the manager is alive.
    pub async fn acquire(self: &Arc<Self>, session_id: &str) -> Option<SessionLaneGuard> {
        let semaphore = self.get_or_create_lane(session_id);
        let permit = semaphore.acquire_owned().await.ok()?;
        Some(self.guard(session_id, permit))
    }

    /// Try to acquire a session lane without waiting.
    #[cfg(test)]
    pub fn try_acquire(self: &Arc<Self>, session_id: &str) -> Option<SessionLaneGuard> {
        let semaphore = self.get_or_create_lane(session_id);
        let permit = semaphore.try_acquire_owned().ok()?;
        Some(self.guard(session_id, permit))
    }

    fn guard(self: &Arc<Self>, session_id: &str, permit: OwnedSemaphorePermit) -> SessionLaneGuard {
        self.turns_processed.fetch_add(1, Ordering::Relaxed);
        self.metadata
            .entry(session_id.to_string())
            .and_modify(|m| m.last_used = Instant::now())
            .or_insert_with(|| LaneMetadata {
                last_used: Instant::now(),
            });

        SessionLaneGuard {
            session_id: session_id.to_string(),
            _permit: permit,
            acquired_at: Instant::now(),
            manager: Arc::clone(self),
        }
    }

    /// Check if a session currently has a turn in flight
    #[cfg(test)]
    pub fn is_session_busy(&self, session_id: &str) -> bool {
        self.lanes
            .get(session_id)
            .map(|s| s.available_permits() == 0)
            .unwrap_or(false)
    }

    pub fn stats(&self) -> SessionLaneStats {
        let active = self.lanes.iter().filter(|e| e.available_permits() == 0).count();

        SessionLaneStats {
            total_lanes: self.lanes.len(),
            active_lanes: active,
            total_turns_processed: self.turns_processed.load(Ordering::Relaxed),
        }
    }

    /// Drop lanes that have been idle for a while, and the oldest idle ones
    /// when too many are tracked. Busy lanes are never removed.
    pub fn prune_idle_lanes(&self) -> usize {
        self.prune_older_than(Duration::from_secs(LANE_IDLE_TIMEOUT_SECS))
    }

    fn prune_older_than(&self, idle_threshold: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .metadata
            .iter()
            .filter(|e| now.duration_since(e.last_used) > idle_threshold)
            .map(|e| e.key().clone())
            .collect();
        let expired: Vec<String> = expired.into_iter().filter(|k| self.is_idle(k)).collect();

        let removed = self.remove_lanes(expired) + self.evict_excess();
        if removed > 0 {
            log::debug!("[LANES] Pruned {} idle session lane(s)", removed);
        }
        removed
    }

    /// Past the cap, evict least recently used idle lanes down to 90% of it,
    /// so a stream of new sessions does not evict on every turn.
    fn evict_excess(&self) -> usize {
        if self.lanes.len() <= self.max_lanes {
            return 0;
        }
        let target = self.max_lanes - self.max_lanes / 10;
        let excess = self.lanes.len().saturating_sub(target);

        let mut by_age: Vec<(String, Instant)> = self
            .metadata
            .iter()
            .map(|e| (e.key().clone(), e.last_used))
            .collect();
        by_age.sort_by(|a, b| a.1.cmp(&b.1));

        let victims: Vec<String> = by_age
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| self.is_idle(key))
            .take(excess)
            .collect();
        let evicted = self.remove_lanes(victims);
        if evicted > 0 {
            log::info!(
                "[LANES] Evicted {} least recently used lane(s), {} tracked",
                evicted,
                self.lanes.len()
            );
        }
        evicted
    }

    fn is_idle(&self, key: &str) -> bool {
        self.lanes
            .get(key)
            .map(|lane| lane.available_permits() > 0)
            .unwrap_or(true)
    }

    fn remove_lanes(&self, keys: Vec<String>) -> usize {
        let count = keys.len();
        for key in keys {
            self.lanes.remove(&key);
            self.metadata.remove(&key);
        }
        count
    }

    fn get_or_create_lane(&self, session_id: &str) -> Arc<Semaphore> {
        let lane = self
            .lanes
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();
        // The new lane has no metadata yet, so it is never its own victim
        if self.lanes.len() > self.max_lanes {
            self.evict_excess();
        }
        lane
    }
}

#[derive(Debug, Clone)]
pub struct SessionLaneStats {
    pub total_lanes: usize,
    pub active_lanes: usize,
    pub total_turns_processed: u64,
}
