//! Persistent per-user trust scoring.
//!
//! Each user carries a score in [0, 100] that grows through meaningful
//! interaction and decays with long inactivity. Deltas are scaled by a
//! trust-dependent multiplier so early trust is earned slowly and high trust
//! is hard to move.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::config::RelationshipConfig;
use crate::store::{load_json, save_json};

/// One persisted relationship record. Created on first contact, never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub name: String,
    pub score: f64,
    pub last_updated: DateTime<Utc>,
}

/// JSON-file-backed trust tracker. The full record set is rewritten on every
/// mutation: single writer, last-writer-wins, one active conversation per
/// process.
pub struct RelationshipTracker {
    path: PathBuf,
    records: HashMap<String, RelationshipRecord>,
    policy: RelationshipConfig,
}

impl RelationshipTracker {
    pub fn open(path: PathBuf, policy: RelationshipConfig) -> anyhow::Result<Self> {
        let records = load_json(&path)?;
        Ok(Self {
            path,
            records,
            policy,
        })
    }

    /// Create or refresh a record for this user.
    pub fn register_user(&mut self, user_id: &str, name: &str) -> anyhow::Result<()> {
        let record = self
            .records
            .entry(user_id.to_string())
            .or_insert_with(|| RelationshipRecord {
                name: name.to_string(),
                score: 0.0,
                last_updated: Utc::now(),
            });
        record.name = name.to_string();
        self.persist()
    }

    pub fn get_score(&self, user_id: &str) -> f64 {
        self.records.get(user_id).map(|r| r.score).unwrap_or(0.0)
    }

    pub fn get_user_relationship(&self, user_id: &str) -> Option<&RelationshipRecord> {
        self.records.get(user_id)
    }

    pub fn user_count(&self) -> usize {
        self.records.len()
    }

    /// Apply a trust-scaled delta: decay for inactivity first, then scale
    /// `base_delta` by the multiplier for the current score, clamp to
    /// [0, 100], and persist. Returns the new score.
    pub fn update(&mut self, user_id: &str, base_delta: f64) -> anyhow::Result<f64> {
        self.update_at(user_id, base_delta, Utc::now())
    }

    /// `update` with an injectable clock, so decay behavior is testable.
    pub fn update_at(
        &mut self,
        user_id: &str,
        base_delta: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<f64> {
        let policy = self.policy.clone();
        let record = self
            .records
            .entry(user_id.to_string())
            .or_insert_with(|| RelationshipRecord {
                name: user_id.to_string(),
                score: 0.0,
                last_updated: now,
            });

        let idle = now.signed_duration_since(record.last_updated);
        if idle > Duration::days(policy.decay_after_days) {
            record.score *= policy.decay_factor;
            debug!(user_id, score = record.score, "applied inactivity decay");
        }

        let multiplier = trust_multiplier(record.score, &policy);
        record.score = (record.score + base_delta * multiplier).clamp(0.0, 100.0);
        record.last_updated = now;

        let score = record.score;
        self.persist()?;
        Ok(score)
    }

    /// Apply a raw delta, skipping decay and the trust multiplier. Used by
    /// the personality roll-up's fragment-driven corrections.
    pub fn apply_score_delta(&mut self, user_id: &str, raw_delta: f64) -> anyhow::Result<f64> {
        let now = Utc::now();
        let record = self
            .records
            .entry(user_id.to_string())
            .or_insert_with(|| RelationshipRecord {
                name: user_id.to_string(),
                score: 0.0,
                last_updated: now,
            });

        record.score = (record.score + raw_delta).clamp(0.0, 100.0);
        record.last_updated = now;

        let score = record.score;
        self.persist()?;
        Ok(score)
    }

    fn persist(&self) -> anyhow::Result<()> {
        save_json(&self.path, &self.records)
    }
}

/// Trust-dependent scaling for score deltas. The band table is ordered by
/// its `below` edges; scores past the last band use `top_multiplier`.
pub fn trust_multiplier(score: f64, policy: &RelationshipConfig) -> f64 {
    for band in &policy.bands {
        if score < band.below {
            return band.multiplier;
        }
    }
    policy.top_multiplier
}
