// progress/mod.rs - Persisted challenge progress
//
// One JSON record per (challenge, user) under `challenge_{challengeId}_{userId}`,
// always read and written whole. There is no format versioning: a record that
// no longer parses is replaced by a fresh one.

pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};

use crate::validator::{FIRST_STEP, LAST_STEP};

/// `current_step` value once every step is done
pub const COMPLETED_STEP: u8 = LAST_STEP + 1;

/// Accepted submission for a single step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    pub submission: Value,
    pub submitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub current_step: u8,
    pub completed_steps: Vec<u8>,
    #[serde(default)]
    pub step1_data: Option<StepData>,
    #[serde(default)]
    pub step2_data: Option<StepData>,
    #[serde(default)]
    pub step3_data: Option<StepData>,
    #[serde(default)]
    pub step4_data: Option<StepData>,
    #[serde(default)]
    pub step5_data: Option<StepData>,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            current_step: FIRST_STEP,
            completed_steps: Vec::new(),
            step1_data: None,
            step2_data: None,
            step3_data: None,
            step4_data: None,
            step5_data: None,
        }
    }
}

impl ProgressRecord {
    pub fn is_step_completed(&self, step: u8) -> bool {
        self.completed_steps.contains(&step)
    }

    pub fn is_finished(&self) -> bool {
        self.current_step >= COMPLETED_STEP
    }

    /// True when every step before `step` is completed
    pub fn prerequisites_met(&self, step: u8) -> bool {
        (FIRST_STEP..step).all(|s| self.is_step_completed(s))
    }

    pub fn step_data(&self, step: u8) -> Option<&StepData> {
        match step {
            1 => self.step1_data.as_ref(),
            2 => self.step2_data.as_ref(),
            3 => self.step3_data.as_ref(),
            4 => self.step4_data.as_ref(),
            5 => self.step5_data.as_ref(),
            _ => None,
        }
    }

    fn step_data_slot(&mut self, step: u8) -> Option<&mut Option<StepData>> {
        match step {
            1 => Some(&mut self.step1_data),
            2 => Some(&mut self.step2_data),
            3 => Some(&mut self.step3_data),
            4 => Some(&mut self.step4_data),
            5 => Some(&mut self.step5_data),
            _ => None,
        }
    }

    /// Mark `step` complete with its accepted submission.
    ///
    /// Returns false (and changes nothing) when the step is out of range or
    /// already complete. `completed_steps` never shrinks or repeats and
    /// `current_step` never decreases.
    pub fn record_completion(&mut self, step: u8, submission: Value) -> bool {
        if !(FIRST_STEP..=LAST_STEP).contains(&step) || self.is_step_completed(step) {
            return false;
        }

        if let Some(slot) = self.step_data_slot(step) {
            *slot = Some(StepData {
                submission,
                submitted: true,
                submitted_at: Some(Utc::now()),
            });
        }

        self.completed_steps.push(step);
        self.completed_steps.sort_unstable();
        self.current_step = self.first_open_step();
        true
    }

    /// Lowest step not yet completed, or [`COMPLETED_STEP`]
    fn first_open_step(&self) -> u8 {
        (FIRST_STEP..=LAST_STEP)
            .find(|s| !self.is_step_completed(*s))
            .unwrap_or(COMPLETED_STEP)
    }

    /// Repair a record loaded from storage: drop out-of-range and duplicate
    /// steps and point `current_step` at the first step still open.
    pub fn normalize(mut self) -> Self {
        self.completed_steps.retain(|s| (FIRST_STEP..=LAST_STEP).contains(s));
        self.completed_steps.sort_unstable();
        self.completed_steps.dedup();
        self.current_step = self.first_open_step();
        self
    }
}

/// Storage key for a (challenge, user) pair
pub fn progress_key(challenge_id: &str, user_id: &str) -> String {
    format!("challenge_{}_{}", challenge_id, user_id)
}

/// Whole-record persistence of [`ProgressRecord`]s over a [`KeyValueStore`]
#[derive(Clone)]
pub struct ProgressStore {
    store: Arc<dyn KeyValueStore>,
}

impl ProgressStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Load the record, falling back to a fresh one when absent or unreadable
    pub fn load(&self, challenge_id: &str, user_id: &str) -> Result<ProgressRecord, StoreError> {
        let key = progress_key(challenge_id, user_id);
        let raw = match self.store.get(&key)? {
            Some(raw) => raw,
            None => return Ok(ProgressRecord::default()),
        };

        match serde_json::from_str::<ProgressRecord>(&raw) {
            Ok(record) => Ok(record.normalize()),
            Err(e) => {
                tracing::warn!(key = %key, "discarding unreadable progress record: {}", e);
                Ok(ProgressRecord::default())
            }
        }
    }

    pub fn save(
        &self,
        challenge_id: &str,
        user_id: &str,
        record: &ProgressRecord,
    ) -> Result<(), StoreError> {
        let key = progress_key(challenge_id, user_id);
        let raw = serde_json::to_string(record)?;
        self.store.set(&key, &raw)?;
        tracing::debug!(key = %key, current_step = record.current_step, "saved progress");
        Ok(())
    }

    pub fn clear(&self, challenge_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.store.remove(&progress_key(challenge_id, user_id))
    }
}
