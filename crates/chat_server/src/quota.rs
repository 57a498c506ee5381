//! Per-identity fixed-window request quotas.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use agent_provider::{ToolQuotaCheck, ToolQuotaDecision};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Source of "now" for quota windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Hand-driven clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock_unpoisoned(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *lock_unpoisoned(&self.now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl QuotaPolicy {
    pub const CHAT_LIMIT: u32 = 20;
    pub const CHAT_WINDOW: Duration = Duration::from_secs(60);
    pub const TOOL_LIMIT: u32 = 2;
    pub const TOOL_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

    #[must_use]
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Coarse quota for the chat endpoint itself.
    #[must_use]
    pub const fn chat() -> Self {
        Self::new(Self::CHAT_LIMIT, Self::CHAT_WINDOW)
    }

    /// Stricter quota for generation-class tools.
    #[must_use]
    pub const fn tool() -> Self {
        Self::new(Self::TOOL_LIMIT, Self::TOOL_WINDOW)
    }
}

/// Result of a quota check. `reset_at` is the end of the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: OffsetDateTime,
}

impl QuotaDecision {
    /// Whole seconds until the window resets, rounded up and never below one.
    #[must_use]
    pub fn retry_after_secs(&self, now: OffsetDateTime) -> u64 {
        let millis = (self.reset_at - now).whole_milliseconds().max(0);
        let secs = (millis + 999) / 1000;
        u64::try_from(secs).unwrap_or(u64::MAX).max(1)
    }
}

/// Shared counter store. `hit` must read and increment under one critical section.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Counts one request against `key` and reports whether it was admitted.
    async fn hit(&self, key: &str, policy: QuotaPolicy, now: OffsetDateTime) -> QuotaDecision;

    /// Reports the current window without counting a request.
    async fn peek(&self, key: &str, policy: QuotaPolicy, now: OffsetDateTime) -> QuotaDecision;

    /// Drops windows that ended at or before `now`. Returns how many were removed.
    async fn purge_expired(&self, now: OffsetDateTime) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: OffsetDateTime,
    length: Duration,
    count: u32,
}

impl Window {
    fn end(&self) -> OffsetDateTime {
        self.start + self.length
    }

    fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.end()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryQuotaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        lock_unpoisoned(&self.windows).len()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn hit(&self, key: &str, policy: QuotaPolicy, now: OffsetDateTime) -> QuotaDecision {
        let mut windows = lock_unpoisoned(&self.windows);
        let window = windows.entry(key.to_string()).or_insert(Window {
            start: now,
            length: policy.window,
            count: 0,
        });

        if window.is_expired(now) {
            *window = Window {
                start: now,
                length: policy.window,
                count: 0,
            };
        }

        if window.count >= policy.limit {
            return QuotaDecision {
                allowed: false,
                limit: policy.limit,
                remaining: 0,
                reset_at: window.end(),
            };
        }

        window.count += 1;
        QuotaDecision {
            allowed: true,
            limit: policy.limit,
            remaining: policy.limit - window.count,
            reset_at: window.end(),
        }
    }

    async fn peek(&self, key: &str, policy: QuotaPolicy, now: OffsetDateTime) -> QuotaDecision {
        let windows = lock_unpoisoned(&self.windows);
        match windows.get(key).filter(|window| !window.is_expired(now)) {
            Some(window) => QuotaDecision {
                allowed: window.count < policy.limit,
                limit: policy.limit,
                remaining: policy.limit.saturating_sub(window.count),
                reset_at: window.end(),
            },
            None => QuotaDecision {
                allowed: policy.limit > 0,
                limit: policy.limit,
                remaining: policy.limit,
                reset_at: now + policy.window,
            },
        }
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let mut windows = lock_unpoisoned(&self.windows);
        let before = windows.len();
        windows.retain(|_, window| !window.is_expired(now));
        before - windows.len()
    }
}

#[must_use]
pub fn chat_key(identity: &str) -> String {
    format!("chat:{identity}")
}

#[must_use]
pub fn tool_key(tool_name: &str, identity: &str) -> String {
    format!("tool:{tool_name}:{identity}")
}

/// Tool sub-quota bound to one caller identity, handed to the model provider.
pub struct IdentityToolQuota {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    identity: String,
    policies: Arc<HashMap<String, QuotaPolicy>>,
}

impl IdentityToolQuota {
    #[must_use]
    pub fn new(
        store: Arc<dyn QuotaStore>,
        clock: Arc<dyn Clock>,
        identity: impl Into<String>,
        policies: Arc<HashMap<String, QuotaPolicy>>,
    ) -> Self {
        Self {
            store,
            clock,
            identity: identity.into(),
            policies,
        }
    }
}

#[async_trait]
impl ToolQuotaCheck for IdentityToolQuota {
    async fn consume(&self, tool_name: &str) -> ToolQuotaDecision {
        let Some(policy) = self.policies.get(tool_name).copied() else {
            return ToolQuotaDecision {
                allowed: true,
                remaining: u32::MAX,
                reset_at_unix: i64::MAX,
            };
        };

        let decision = self
            .store
            .hit(&tool_key(tool_name, &self.identity), policy, self.clock.now())
            .await;
        if !decision.allowed {
            tracing::info!(
                identity = %self.identity,
                tool = tool_name,
                reset_at = %decision.reset_at,
                "tool quota exhausted"
            );
        }

        ToolQuotaDecision {
            allowed: decision.allowed,
            remaining: decision.remaining,
            reset_at_unix: decision.reset_at.unix_timestamp(),
        }
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
