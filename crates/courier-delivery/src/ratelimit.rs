//! Workspace-scoped rate limiting for outbound sends.
//!
//! Fixed-window counters keyed by (workspace, message type, window).
//! Ceilings come from the workspace's subscription tier. This is a pure
//! admission gate consulted before a send is attempted: it does not queue
//! or delay, and denied callers must reschedule or drop.

use std::{collections::HashMap, sync::Arc, time::Duration};

use courier_core::models::{MessageChannel, WorkspaceId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

/// Workspace subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceTier {
    /// Free tier, lowest ceiling.
    #[default]
    Free,
    /// Basic paid tier.
    Basic,
    /// Premium tier.
    Premium,
    /// Enterprise tier, highest ceiling.
    Enterprise,
}

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Length of one counting window.
    pub window: Duration,
    /// Ceiling per window for free workspaces.
    pub free_limit: u32,
    /// Ceiling per window for basic workspaces.
    pub basic_limit: u32,
    /// Ceiling per window for premium workspaces.
    pub premium_limit: u32,
    /// Ceiling per window for enterprise workspaces.
    pub enterprise_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            free_limit: 10,
            basic_limit: 100,
            premium_limit: 500,
            enterprise_limit: 2000,
        }
    }
}

impl RateLimitConfig {
    /// Ceiling for a tier under this configuration.
    pub fn limit_for(&self, tier: WorkspaceTier) -> u32 {
        match tier {
            WorkspaceTier::Free => self.free_limit,
            WorkspaceTier::Basic => self.basic_limit,
            WorkspaceTier::Premium => self.premium_limit,
            WorkspaceTier::Enterprise => self.enterprise_limit,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the send may proceed.
    pub allowed: bool,
    /// The ceiling applied.
    pub limit: u32,
    /// Sends remaining in the current window after this check.
    pub remaining: u32,
    /// Time until the window resets, set when denied.
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CounterKey {
    workspace_id: WorkspaceId,
    channel: MessageChannel,
    window_index: i64,
}

/// Thread-safe fixed-window rate limiter for all workspaces.
///
/// Counters live behind one async mutex keyed by workspace, channel, and
/// window index; entries from expired windows are pruned opportunistically
/// on access, which bounds the map to live windows only (the TTL).
pub struct RateLimiter {
    config: RateLimitConfig,
    tiers: Arc<Mutex<HashMap<WorkspaceId, WorkspaceTier>>>,
    counters: Arc<Mutex<HashMap<CounterKey, u32>>>,
}

impl RateLimiter {
    /// Creates a rate limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            tiers: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers the tier for a workspace. Unregistered workspaces count
    /// as free tier.
    pub async fn set_tier(&self, workspace_id: WorkspaceId, tier: WorkspaceTier) {
        self.tiers.lock().await.insert(workspace_id, tier);
    }

    /// Atomically checks the ceiling and consumes one slot when allowed.
    ///
    /// Returns `allowed: false` without incrementing once the window's
    /// count is exhausted; the counter never passes the ceiling.
    pub async fn check_and_increment(
        &self,
        workspace_id: WorkspaceId,
        channel: MessageChannel,
    ) -> RateLimitDecision {
        let tier = self.tiers.lock().await.get(&workspace_id).copied().unwrap_or_default();
        let limit = self.config.limit_for(tier);

        let window_ms = self.config.window.as_millis().max(1) as i64;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let window_index = now_ms.div_euclid(window_ms);
        let key = CounterKey { workspace_id, channel, window_index };

        let mut counters = self.counters.lock().await;
        counters.retain(|k, _| k.window_index >= window_index);

        let count = counters.entry(key).or_insert(0);
        if *count >= limit {
            let window_end_ms = (window_index + 1) * window_ms;
            let retry_after = Duration::from_millis((window_end_ms - now_ms).max(0) as u64);

            debug!(
                workspace_id = %workspace_id,
                channel = %channel,
                limit,
                "rate limit exhausted for window"
            );

            return RateLimitDecision { allowed: false, limit, remaining: 0, retry_after: Some(retry_after) };
        }

        *count += 1;
        RateLimitDecision { allowed: true, limit, remaining: limit - *count, retry_after: None }
    }
}
