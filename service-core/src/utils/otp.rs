//! Per-key one-time codes with expiry and single use.
//!
//! Each key (phone number, email, request id) owns at most one live code.
//! Issuing again replaces the previous code for that key only.

use dashmap::DashMap;
use rand::Rng;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

/// Wrong guesses allowed before a code is burned.
const MAX_ATTEMPTS: u32 = 5;

struct OtpEntry {
    code: String,
    expires_at: Instant,
    consumed: bool,
    failed_attempts: u32,
}

/// Outcome of checking a submitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpVerification {
    Verified,
    Mismatch,
    Expired,
    Consumed,
    Missing,
}

#[derive(Default)]
pub struct OtpStore {
    entries: DashMap<String, OtpEntry>,
}

impl OtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh six digit code for `key`, valid for `ttl`.
    pub fn issue(&self, key: &str, ttl: Duration) -> String {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));

        self.entries.insert(
            key.to_string(),
            OtpEntry {
                code: code.clone(),
                expires_at: Instant::now() + ttl,
                consumed: false,
                failed_attempts: 0,
            },
        );

        tracing::debug!(key = key, ttl_secs = ttl.as_secs(), "One-time code issued");

        code
    }

    /// Check `code` against the live code for `key`, consuming it on success.
    pub fn verify(&self, key: &str, code: &str) -> OtpVerification {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return OtpVerification::Missing;
        };

        if entry.consumed {
            return OtpVerification::Consumed;
        }

        if Instant::now() >= entry.expires_at {
            return OtpVerification::Expired;
        }

        if bool::from(entry.code.as_bytes().ct_eq(code.as_bytes())) {
            entry.consumed = true;
            return OtpVerification::Verified;
        }

        entry.failed_attempts += 1;
        if entry.failed_attempts >= MAX_ATTEMPTS {
            entry.consumed = true;
            tracing::warn!(key = key, "One-time code burned after repeated mismatches");
        }

        OtpVerification::Mismatch
    }

    /// Drop expired and consumed entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.consumed && entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
