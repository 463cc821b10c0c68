#![forbid(unsafe_code)]

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use reportr_kernel_contracts::identity::VerifiedIdentity;
use reportr_kernel_contracts::UnixTimeSec;
use sha2::{Digest, Sha256};

pub const DEFAULT_SESSION_TTL_SECS: i64 = 14 * 24 * 60 * 60;
/// Lifetime of a pre-login slot, which only carries the pending OAuth state.
pub const LOGIN_WINDOW_SECS: i64 = 10 * 60;
pub const DEFAULT_MAX_PENDING_LOGINS: usize = 10_000;

const TOKEN_BYTES: usize = 32;

/// Opaque per-client session token, as carried by the transport cookie.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    fn generate() -> Self {
        let mut buf = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut buf);
        Self(URL_SAFE_NO_PAD.encode(buf))
    }

    pub fn from_cookie(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn registry_key(&self) -> String {
        Sha256::digest(self.0.as_bytes())
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// The identity slot of one transport session, resolved once per request and
/// handed to every authenticated operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    identity: Option<VerifiedIdentity>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(identity: VerifiedIdentity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn get(&self) -> Option<&VerifiedIdentity> {
        self.identity.as_ref()
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    identity: Option<VerifiedIdentity>,
    oauth_state: Option<String>,
    expires_at: UnixTimeSec,
}

impl SessionEntry {
    fn is_live(&self, now: UnixTimeSec) -> bool {
        now < self.expires_at
    }
}

/// Server-side session slots keyed by the SHA-256 of the client token.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    entries: HashMap<String, SessionEntry>,
    ttl_secs: i64,
    max_pending: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL_SECS)
    }
}

impl SessionRegistry {
    pub fn new(ttl_secs: i64) -> Self {
        Self::with_pending_limit(ttl_secs, DEFAULT_MAX_PENDING_LOGINS)
    }

    /// Caps how many anonymous pre-login slots may exist at once; the oldest
    /// is evicted when a new login starts at the cap.
    pub fn with_pending_limit(ttl_secs: i64, max_pending: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_secs: ttl_secs.max(1),
            max_pending: max_pending.max(1),
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Starts a login round-trip: keeps the caller's live session (or opens a
    /// short-lived anonymous one) and stamps it with a fresh OAuth `state`.
    pub fn begin_login(
        &mut self,
        token: Option<&SessionToken>,
        now: UnixTimeSec,
    ) -> (SessionToken, String) {
        self.prune_expired(now);
        let login_deadline = UnixTimeSec(now.0.saturating_add(LOGIN_WINDOW_SECS));
        let state = SessionToken::generate().0;
        if let Some(t) = token {
            if let Some(entry) = self.entries.get_mut(&t.registry_key()) {
                if entry.identity.is_none() {
                    entry.expires_at = login_deadline;
                }
                entry.oauth_state = Some(state.clone());
                return (t.clone(), state);
            }
        }
        self.evict_pending_over_limit();
        let t = SessionToken::generate();
        self.entries.insert(
            t.registry_key(),
            SessionEntry {
                identity: None,
                oauth_state: Some(state.clone()),
                expires_at: login_deadline,
            },
        );
        (t, state)
    }

    /// Consumes the pending OAuth `state` of a live session.
    pub fn take_oauth_state(&mut self, token: &SessionToken, now: UnixTimeSec) -> Option<String> {
        let entry = self.live_entry_mut(token, now)?;
        entry.oauth_state.take()
    }

    /// Stores a verified identity and rotates the session token.
    ///
    /// Returns `None` when the session is unknown or expired.
    pub fn set_identity(
        &mut self,
        token: &SessionToken,
        identity: VerifiedIdentity,
        now: UnixTimeSec,
    ) -> Option<SessionToken> {
        self.live_entry_mut(token, now)?;
        self.entries.remove(&token.registry_key());
        let rotated = SessionToken::generate();
        let expires_at = self.expiry_from(now);
        self.entries.insert(
            rotated.registry_key(),
            SessionEntry {
                identity: Some(identity),
                oauth_state: None,
                expires_at,
            },
        );
        Some(rotated)
    }

    pub fn context(&mut self, token: Option<&SessionToken>, now: UnixTimeSec) -> SessionContext {
        let Some(token) = token else {
            return SessionContext::anonymous();
        };
        let identity = self
            .live_entry_mut(token, now)
            .and_then(|entry| entry.identity.clone());
        SessionContext { identity }
    }

    pub fn clear(&mut self, token: &SessionToken) {
        self.entries.remove(&token.registry_key());
    }

    fn live_entry_mut(
        &mut self,
        token: &SessionToken,
        now: UnixTimeSec,
    ) -> Option<&mut SessionEntry> {
        let key = token.registry_key();
        let live = self.entries.get(&key).map(|e| e.is_live(now))?;
        if !live {
            self.entries.remove(&key);
            return None;
        }
        self.entries.get_mut(&key)
    }

    fn prune_expired(&mut self, now: UnixTimeSec) {
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    fn evict_pending_over_limit(&mut self) {
        let pending_count = self
            .entries
            .values()
            .filter(|entry| entry.identity.is_none())
            .count();
        if pending_count < self.max_pending {
            return;
        }
        let mut pending: Vec<(UnixTimeSec, String)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.identity.is_none())
            .map(|(key, entry)| (entry.expires_at, key.clone()))
            .collect();
        pending.sort();
        let excess = pending.len() + 1 - self.max_pending;
        for (_, key) in pending.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }

    fn expiry_from(&self, now: UnixTimeSec) -> UnixTimeSec {
        UnixTimeSec(now.0.saturating_add(self.ttl_secs))
    }
}
