use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use courier_core::types::{CorrespondentProfile, Turn};

use crate::kv::KvStore;

/// Cap on the delivered-media ledger, oldest entries evicted first. Keeps
/// dedup memory bounded for long-lived correspondents.
const MAX_SENT_MEDIA: usize = 128;

/// The JSON value stored under `conv:{id}`: the ordered turn log plus the
/// delivered-media ledger. Both live in one value so the ledger can never
/// drift from the log and expires together with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(default)]
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub sent_media: Vec<u32>,
}

/// Tiered per-correspondent state store.
///
/// Healthy path: read-modify-write of the full record against the
/// [`KvStore`] with the configured expiry. Any store failure flips that
/// correspondent into sticky in-memory mode for the rest of the process
/// lifetime, so a store outage degrades durability instead of failing the
/// flush.
pub struct ConversationStore {
    kv: Arc<dyn KvStore>,
    max_turns: usize,
    log_ttl: Duration,
    profile_ttl: Duration,
    fallback: Mutex<HashMap<String, ConversationRecord>>,
    fallback_profiles: Mutex<HashMap<String, CorrespondentProfile>>,
    degraded: Mutex<HashSet<String>>,
}

impl ConversationStore {
    pub fn new(
        kv: Arc<dyn KvStore>,
        max_turns: usize,
        log_ttl_days: u64,
        profile_ttl_days: u64,
    ) -> Self {
        Self {
            kv,
            max_turns,
            log_ttl: Duration::from_secs(log_ttl_days * 24 * 60 * 60),
            profile_ttl: Duration::from_secs(profile_ttl_days * 24 * 60 * 60),
            fallback: Mutex::new(HashMap::new()),
            fallback_profiles: Mutex::new(HashMap::new()),
            degraded: Mutex::new(HashSet::new()),
        }
    }

    fn conv_key(correspondent_id: &str) -> String {
        format!("conv:{correspondent_id}")
    }

    fn profile_key(correspondent_id: &str) -> String {
        format!("profile:{correspondent_id}")
    }

    fn is_degraded(&self, correspondent_id: &str) -> bool {
        self.degraded.lock().unwrap().contains(correspondent_id)
    }

    fn mark_degraded(&self, correspondent_id: &str, reason: &str) {
        let mut degraded = self.degraded.lock().unwrap();
        if degraded.insert(correspondent_id.to_string()) {
            warn!(
                correspondent = %correspondent_id,
                reason,
                "state store failed, switching this correspondent to in-memory state"
            );
        }
    }

    /// Ordered log plus delivered-media ledger for one correspondent.
    /// Store failures degrade to the in-memory fallback, never to an error.
    pub fn record(&self, correspondent_id: &str) -> ConversationRecord {
        if self.is_degraded(correspondent_id) {
            return self.fallback_record(correspondent_id);
        }
        match self.read_kv(correspondent_id) {
            Ok(Some(record)) => record,
            Ok(None) => ConversationRecord::default(),
            Err(e) => {
                self.mark_degraded(correspondent_id, &e.to_string());
                self.fallback_record(correspondent_id)
            }
        }
    }

    /// Append one turn (read-modify-write, FIFO truncation, TTL write).
    pub fn append_turn(&self, correspondent_id: &str, turn: Turn) {
        self.mutate(correspondent_id, |record| record.turns.push(turn));
    }

    /// Append the agent turn and extend the delivered-media ledger in the
    /// same write. Called before any physical dispatch is attempted.
    pub fn append_agent_turn(&self, correspondent_id: &str, turn: Turn, media_ids: &[u32]) {
        let media_ids = media_ids.to_vec();
        self.mutate(correspondent_id, move |record| {
            record.turns.push(turn);
            for id in media_ids {
                if !record.sent_media.contains(&id) {
                    record.sent_media.push(id);
                }
            }
            if record.sent_media.len() > MAX_SENT_MEDIA {
                let excess = record.sent_media.len() - MAX_SENT_MEDIA;
                record.sent_media.drain(0..excess);
            }
        });
    }

    /// Best-effort profile read; store errors mean "profile absent".
    pub fn profile(&self, correspondent_id: &str) -> Option<CorrespondentProfile> {
        match self.kv.get(&Self::profile_key(correspondent_id)) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(correspondent = %correspondent_id, error = %e, "dropping unreadable profile");
                    None
                }
            },
            Ok(None) => self
                .fallback_profiles
                .lock()
                .unwrap()
                .get(correspondent_id)
                .cloned(),
            Err(e) => {
                debug!(correspondent = %correspondent_id, error = %e, "profile read failed");
                self.fallback_profiles
                    .lock()
                    .unwrap()
                    .get(correspondent_id)
                    .cloned()
            }
        }
    }

    /// Best-effort profile write with the long TTL; never fails the caller.
    pub fn save_profile(&self, correspondent_id: &str, profile: &CorrespondentProfile) {
        let raw = match serde_json::to_string(profile) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(correspondent = %correspondent_id, error = %e, "profile serialize failed");
                return;
            }
        };
        if let Err(e) =
            self.kv
                .set_with_expiry(&Self::profile_key(correspondent_id), &raw, self.profile_ttl)
        {
            warn!(correspondent = %correspondent_id, error = %e, "profile write failed, keeping in memory");
            self.fallback_profiles
                .lock()
                .unwrap()
                .insert(correspondent_id.to_string(), profile.clone());
        }
    }

    /// Explicit reset, used by opt-out and test flows.
    pub fn clear_log(&self, correspondent_id: &str) {
        self.fallback.lock().unwrap().remove(correspondent_id);
        if let Err(e) = self.kv.delete(&Self::conv_key(correspondent_id)) {
            warn!(correspondent = %correspondent_id, error = %e, "log delete failed");
        }
    }

    fn read_kv(&self, correspondent_id: &str) -> Result<Option<ConversationRecord>, crate::StoreError> {
        let Some(raw) = self.kv.get(&Self::conv_key(correspondent_id))? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn fallback_record(&self, correspondent_id: &str) -> ConversationRecord {
        self.fallback
            .lock()
            .unwrap()
            .get(correspondent_id)
            .cloned()
            .unwrap_or_default()
    }

    fn mutate(&self, correspondent_id: &str, apply: impl FnOnce(&mut ConversationRecord)) {
        if self.is_degraded(correspondent_id) {
            let mut fallback = self.fallback.lock().unwrap();
            let record = fallback.entry(correspondent_id.to_string()).or_default();
            apply(record);
            truncate(record, self.max_turns);
            return;
        }

        let mut record = match self.read_kv(correspondent_id) {
            Ok(Some(record)) => record,
            Ok(None) => ConversationRecord::default(),
            Err(e) => {
                self.mark_degraded(correspondent_id, &e.to_string());
                let mut fallback = self.fallback.lock().unwrap();
                let record = fallback.entry(correspondent_id.to_string()).or_default();
                apply(record);
                truncate(record, self.max_turns);
                return;
            }
        };
        apply(&mut record);
        truncate(&mut record, self.max_turns);

        let write = serde_json::to_string(&record)
            .map_err(crate::StoreError::from)
            .and_then(|raw| {
                self.kv
                    .set_with_expiry(&Self::conv_key(correspondent_id), &raw, self.log_ttl)
            });
        if let Err(e) = write {
            // Keep the updated copy in memory so the flush can proceed.
            self.mark_degraded(correspondent_id, &e.to_string());
            self.fallback
                .lock()
                .unwrap()
                .insert(correspondent_id.to_string(), record);
        }
    }
}

/// FIFO truncation: evict oldest turns past the cap, never reorder.
fn truncate(record: &mut ConversationRecord, max_turns: usize) {
    if record.turns.len() > max_turns {
        let excess = record.turns.len() - max_turns;
        record.turns.drain(0..excess);
    }
}
