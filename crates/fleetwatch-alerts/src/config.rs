//! Alerting pipeline configuration.

use fleetwatch_core::message::{DEFAULT_ENTRY_TEMPLATE, DEFAULT_EXIT_TEMPLATE};
use fleetwatch_core::models::recipient::Channel;

/// What enqueueing does when the dispatch queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// Wait for a free slot.
    #[default]
    Block,
    /// Refuse the job; the delivery stays pending until the event is
    /// reprocessed after `pending_timeout_secs`.
    RejectNew,
}

/// Configuration for ingestion, matching and dispatch.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Clock granularity, in seconds, used to truncate `occurred_at` for
    /// the dedupe key (default: 60).
    pub dedupe_window_secs: u64,
    /// Dispatch workers (default: 4).
    pub worker_count: usize,
    /// Bounded dispatch queue length (default: 256).
    pub queue_capacity: usize,
    pub queue_policy: QueuePolicy,
    /// A send exceeding this is recorded failed (default: 30).
    pub send_timeout_secs: u64,
    /// A pending delivery older than this may be re-sent (default: 600).
    pub pending_timeout_secs: u64,
    /// Claimed events never completed after this are released
    /// (default: 300).
    pub stale_claim_secs: u64,
    /// Channels whose deliveries are recorded skipped.
    pub disabled_channels: Vec<Channel>,
    pub default_entry_message: String,
    pub default_exit_message: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            dedupe_window_secs: 60,
            worker_count: 4,
            queue_capacity: 256,
            queue_policy: QueuePolicy::Block,
            send_timeout_secs: 30,
            pending_timeout_secs: 600,
            stale_claim_secs: 300,
            disabled_channels: Vec::new(),
            default_entry_message: DEFAULT_ENTRY_TEMPLATE.into(),
            default_exit_message: DEFAULT_EXIT_TEMPLATE.into(),
        }
    }
}

impl AlertConfig {
    pub fn is_disabled(&self, channel: Channel) -> bool {
        self.disabled_channels.contains(&channel)
    }

    pub fn send_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.send_timeout_secs)
    }

    pub fn pending_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pending_timeout_secs as i64)
    }

    pub fn stale_claim_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_claim_secs as i64)
    }
}
