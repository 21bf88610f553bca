// Bearer session owned by the publisher, and the policy that decides
// when it must be renewed.

use std::time::{Duration, Instant};

/// When to fetch a fresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Renew once more than this many rows were published on one token.
    pub every: Option<usize>,
    /// Renew once the token is at least this old.
    pub max_age: Option<Duration>,
    /// Renew and retry once when a create call answers 401.
    pub on_unauthorized: bool,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        RefreshPolicy {
            every: Some(20),
            max_age: None,
            on_unauthorized: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    issued_at: Instant,
    issue_count: u32,
    since_auth: usize,
}

impl Session {
    pub fn new(token: String, now: Instant) -> Self {
        Session {
            token,
            issued_at: now,
            issue_count: 1,
            since_auth: 0,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// How many tokens this session has held so far.
    pub fn issue_count(&self) -> u32 {
        self.issue_count
    }

    /// Rows published since the last renewal.
    pub fn since_auth(&self) -> usize {
        self.since_auth
    }

    pub fn renew(&mut self, token: String, now: Instant) {
        self.token = token;
        self.issued_at = now;
        self.issue_count += 1;
        self.since_auth = 0;
    }

    pub fn record_publish(&mut self) {
        self.since_auth += 1;
    }

    pub fn is_stale(&self, policy: &RefreshPolicy, now: Instant) -> bool {
        let by_count = policy.every.is_some_and(|n| self.since_auth > n);
        let by_age = policy
            .max_age
            .is_some_and(|age| now.saturating_duration_since(self.issued_at) >= age);
        by_count || by_age
    }
}
