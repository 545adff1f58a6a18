//! Durable pairing / authentication / rate-limit store. Grounded on the
//! teacher's `pairing/mod.rs`: confusable-free code alphabet, constant-time
//! code comparison, `fs2` advisory cross-process file lock, atomic
//! replace-on-write persistence. Generalized from the teacher's separate
//! "approving client" model (pairing approved by an external admin) to
//! spec's self-service flow: the sender supplies the code back over the
//! same channel it arrived on.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::errors::{GatewayError, Result};
use crate::utils::atomic_write;

/// Alphabet for human-typable pairing codes: no 0/O/1/I, to avoid
/// transcription confusion.
const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const CODE_LENGTH: usize = 8;
const MAX_FAILED_ATTEMPTS: usize = 10;
const FAILED_ATTEMPT_WINDOW_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Pending,
    Approved,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderRecord {
    pub sender_id: String,
    pub channel: String,
    pub channel_name: String,
    pub status: AuthStatus,
    pub label: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub message_count: u64,
}

impl SenderRecord {
    fn new(sender_id: &str, channel: &str, channel_name: &str, label: Option<String>) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            channel: channel.to_string(),
            channel_name: channel_name.to_string(),
            status: AuthStatus::Pending,
            label,
            approved_at: None,
            last_seen: None,
            message_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PairingCode {
    sender_id: String,
    channel: String,
    code: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Key = `"{channel}:{sender_id}"`, matching `InboundMessage::sender_key`.
fn key(channel: &str, sender_id: &str) -> String {
    format!("{channel}:{sender_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PairingDocument {
    #[serde(default)]
    senders: HashMap<String, SenderRecord>,
    #[serde(default)]
    codes: HashMap<String, PairingCode>,
}

struct RateWindow {
    /// Unix-ms timestamps of messages counted in the current rolling window.
    hits: Vec<i64>,
}

pub struct PairingStore {
    path: PathBuf,
    code_ttl_seconds: i64,
    max_messages_per_minute: u32,
    document: RwLock<PairingDocument>,
    rate_windows: RwLock<HashMap<String, RateWindow>>,
    failed_attempts: RwLock<HashMap<String, Vec<i64>>>,
}

impl PairingStore {
    pub fn new(path: PathBuf, code_ttl_seconds: i64, max_messages_per_minute: u32) -> Result<Self> {
        let document = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| GatewayError::PersistenceFailure(e.to_string()))?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            PairingDocument::default()
        };
        Ok(Self {
            path,
            code_ttl_seconds,
            max_messages_per_minute,
            document: RwLock::new(document),
            rate_windows: RwLock::new(HashMap::new()),
            failed_attempts: RwLock::new(HashMap::new()),
        })
    }

    fn lock_file(&self) -> Result<std::fs::File> {
        use fs2::FileExt;
        let lock_path = self.path.with_extension("lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| GatewayError::PersistenceFailure(e.to_string()))?;
        file.lock_exclusive()
            .map_err(|e| GatewayError::PersistenceFailure(e.to_string()))?;
        Ok(file)
    }

    /// Persists the document, rolling back `mutate`'s in-memory effect on
    /// failure per spec §7's "mutation rolled back, exception raised".
    fn persist(&self, snapshot: PairingDocument) -> Result<()> {
        let _lock = self.lock_file()?;
        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| GatewayError::PersistenceFailure(e.to_string()))?;
        atomic_write(&self.path, &content).map_err(|e| GatewayError::PersistenceFailure(e.to_string()))?;
        Ok(())
    }

    fn generate_code() -> String {
        let mut code = String::with_capacity(CODE_LENGTH);
        for _ in 0..CODE_LENGTH {
            let idx = fastrand::usize(0..CODE_ALPHABET.len());
            code.push(CODE_ALPHABET[idx] as char);
        }
        code
    }

    /// Creates (or overwrites) a pairing code for `(channel, sender_id)` and
    /// ensures a `SenderRecord` exists with status `pending`. Returns the
    /// fresh human-typable code.
    pub fn request_pairing(
        &self,
        sender_id: &str,
        channel: &str,
        channel_name: &str,
        label: Option<String>,
    ) -> Result<String> {
        let k = key(channel, sender_id);
        let code = Self::generate_code();
        let now = Utc::now();

        let mut doc = self.document.write().unwrap_or_else(|e| e.into_inner());
        let mut snapshot = doc.clone();

        snapshot
            .senders
            .entry(k.clone())
            .or_insert_with(|| SenderRecord::new(sender_id, channel, channel_name, label));
        snapshot.codes.insert(
            k,
            PairingCode {
                sender_id: sender_id.to_string(),
                channel: channel.to_string(),
                code: code.clone(),
                issued_at: now,
                expires_at: now + chrono::Duration::seconds(self.code_ttl_seconds),
            },
        );

        self.persist(snapshot.clone())?;
        *doc = snapshot;
        Ok(code)
    }

    /// Verifies `code` against the outstanding pairing code for
    /// `(channel, sender_id)`. Single-use: a matching, non-expired code is
    /// always consumed (deleted) win or lose, so each issued code can only
    /// ever verify true once.
    pub fn verify_pairing(&self, sender_id: &str, channel: &str, code: &str) -> Result<bool> {
        let k = key(channel, sender_id);
        let now = Utc::now();

        if self.is_locked_out(&k, now) {
            return Ok(false);
        }

        let mut doc = self.document.write().unwrap_or_else(|e| e.into_inner());
        let mut snapshot = doc.clone();

        let Some(pending) = snapshot.codes.get(&k).cloned() else {
            return Ok(false);
        };

        let matches = pending.code.as_bytes().ct_eq(code.as_bytes()).into();
        let not_expired = now < pending.expires_at;

        if matches && not_expired {
            snapshot.codes.remove(&k);
            if let Some(record) = snapshot.senders.get_mut(&k) {
                record.status = AuthStatus::Approved;
                record.approved_at = Some(now);
            }
            self.persist(snapshot.clone())?;
            *doc = snapshot;
            return Ok(true);
        }

        // Wrong or expired code: consume the attempt against the lockout
        // counter but leave the outstanding code in place so a mistyped
        // code doesn't lock the sender out of their own pairing flow.
        drop(doc);
        self.record_failed_attempt(&k, now);
        Ok(false)
    }

    fn is_locked_out(&self, k: &str, now: DateTime<Utc>) -> bool {
        let attempts = self.failed_attempts.read().unwrap_or_else(|e| e.into_inner());
        let Some(timestamps) = attempts.get(k) else {
            return false;
        };
        let now_ms = now.timestamp();
        let recent = timestamps
            .iter()
            .filter(|&&t| now_ms - t < FAILED_ATTEMPT_WINDOW_SECS)
            .count();
        recent >= MAX_FAILED_ATTEMPTS
    }

    fn record_failed_attempt(&self, k: &str, now: DateTime<Utc>) {
        let mut attempts = self.failed_attempts.write().unwrap_or_else(|e| e.into_inner());
        let now_ms = now.timestamp();
        let entry = attempts.entry(k.to_string()).or_default();
        entry.retain(|&t| now_ms - t < FAILED_ATTEMPT_WINDOW_SECS);
        entry.push(now_ms);
    }

    pub fn is_approved(&self, sender_id: &str, channel: &str) -> bool {
        let doc = self.document.read().unwrap_or_else(|e| e.into_inner());
        doc.senders
            .get(&key(channel, sender_id))
            .is_some_and(|r| r.status == AuthStatus::Approved)
    }

    pub fn block_sender(&self, sender_id: &str, channel: &str) -> Result<()> {
        self.set_status(sender_id, channel, AuthStatus::Blocked)
    }

    /// Unblocks a sender. A no-op (not an error) if the sender isn't
    /// currently blocked, per spec §4.3.
    pub fn unblock_sender(&self, sender_id: &str, channel: &str) -> Result<()> {
        let k = key(channel, sender_id);
        let mut doc = self.document.write().unwrap_or_else(|e| e.into_inner());
        let mut snapshot = doc.clone();
        let Some(record) = snapshot.senders.get_mut(&k) else {
            return Ok(());
        };
        if record.status != AuthStatus::Blocked {
            return Ok(());
        }
        record.status = AuthStatus::Approved;
        self.persist(snapshot.clone())?;
        *doc = snapshot;
        Ok(())
    }

    fn set_status(&self, sender_id: &str, channel: &str, status: AuthStatus) -> Result<()> {
        let k = key(channel, sender_id);
        let mut doc = self.document.write().unwrap_or_else(|e| e.into_inner());
        let mut snapshot = doc.clone();
        let record = snapshot
            .senders
            .entry(k)
            .or_insert_with(|| SenderRecord::new(sender_id, channel, "unknown", None));
        record.status = status;
        self.persist(snapshot.clone())?;
        *doc = snapshot;
        Ok(())
    }

    pub fn sender_status(&self, sender_id: &str, channel: &str) -> Option<AuthStatus> {
        let doc = self.document.read().unwrap_or_else(|e| e.into_inner());
        doc.senders.get(&key(channel, sender_id)).map(|r| r.status)
    }

    pub fn get_all_senders(&self, channel: Option<&str>) -> Vec<SenderRecord> {
        let doc = self.document.read().unwrap_or_else(|e| e.into_inner());
        doc.senders
            .values()
            .filter(|r| channel.is_none_or(|c| r.channel == c))
            .cloned()
            .collect()
    }

    pub fn get_all_approved(&self, channel: Option<&str>) -> Vec<SenderRecord> {
        self.get_all_senders(channel)
            .into_iter()
            .filter(|r| r.status == AuthStatus::Approved)
            .collect()
    }

    /// Returns `true` (allowed) iff the sender's message count within a
    /// rolling 60-second window is below `max_messages_per_minute`. Also
    /// increments total `message_count` and updates `last_seen`,
    /// regardless of the rate-limit verdict, per spec §4.3.
    pub fn check_rate_limit(&self, sender_id: &str, channel: &str) -> bool {
        let k = key(channel, sender_id);
        let now = Utc::now();
        let now_ms = now.timestamp_millis();

        let allowed = {
            let mut windows = self.rate_windows.write().unwrap_or_else(|e| e.into_inner());
            let window = windows.entry(k.clone()).or_insert_with(|| RateWindow { hits: Vec::new() });
            window.hits.retain(|&t| now_ms - t < 60_000);
            let allowed = (window.hits.len() as u32) < self.max_messages_per_minute;
            window.hits.push(now_ms);
            allowed
        };

        if let Ok(mut doc) = self.document.write() {
            let record = doc
                .senders
                .entry(k)
                .or_insert_with(|| SenderRecord::new(sender_id, channel, "unknown", None));
            record.message_count += 1;
            record.last_seen = Some(now);
            // Best-effort persistence: counters are advisory and a failed
            // write here must not block the rate-limit verdict itself.
            let snapshot = doc.clone();
            drop(doc);
            if let Err(e) = self.persist(snapshot) {
                warn!(error = %e, "failed to persist rate-limit counters");
            }
        }

        allowed
    }
}

#[cfg(test)]
impl PairingStore {
    pub(crate) fn expire_code_for_test(&self, sender_id: &str, channel: &str) {
        let k = key(channel, sender_id);
        let mut doc = self.document.write().unwrap();
        if let Some(code) = doc.codes.get_mut(&k) {
            code.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }
}
