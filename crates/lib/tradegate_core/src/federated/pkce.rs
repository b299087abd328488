//! PKCE helpers and the pending-handshake store.
//!
//! A handshake lives between the redirect to the provider and the callback.
//! Entries are keyed by the `state` parameter, taken at most once and expire
//! after ten minutes.

use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// TTL for pending handshakes (10 minutes).
const STATE_TTL: Duration = Duration::from_secs(600);

/// Default ceiling on live pending handshakes.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Generate a cryptographic PKCE code verifier (43 chars, URL-safe).
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute S256 code challenge from a code verifier.
pub fn compute_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Generate a cryptographic state parameter (CSRF token).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Handshake data kept between initiate and callback.
#[derive(Debug, Clone)]
pub struct PendingHandshake {
    pub code_verifier: String,
    pub created_at: Instant,
}

impl PendingHandshake {
    pub fn new(code_verifier: String) -> Self {
        Self {
            code_verifier,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > STATE_TTL
    }
}

/// In-memory store of pending handshakes, keyed by state parameter.
///
/// Read-mostly: one insert per initiate, one remove per callback. Holds at
/// most `max_pending` entries; at the ceiling the oldest handshake is dropped.
#[derive(Debug)]
pub struct HandshakeStore {
    states: DashMap<String, PendingHandshake>,
    max_pending: usize,
}

impl Default for HandshakeStore {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_PENDING)
    }
}

impl HandshakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            states: DashMap::new(),
            max_pending: max_pending.max(1),
        }
    }

    /// Insert a pending handshake, evicting expired ones first and the
    /// oldest ones while the store is full.
    pub fn insert(&self, state: String, pending: PendingHandshake) {
        self.cleanup();
        while self.states.len() >= self.max_pending {
            let oldest = self
                .states
                .iter()
                .min_by_key(|entry| entry.value().created_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.states.remove(&key);
                }
                None => break,
            }
        }
        self.states.insert(state, pending);
    }

    /// Take (remove and return) a pending handshake.
    /// Returns `None` if not found or expired.
    pub fn take(&self, state: &str) -> Option<PendingHandshake> {
        let (_, pending) = self.states.remove(state)?;
        if pending.is_expired() {
            return None;
        }
        Some(pending)
    }

    /// Evict expired entries.
    pub fn cleanup(&self) {
        self.states.retain(|_, v| !v.is_expired());
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
