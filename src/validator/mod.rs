// validator/mod.rs - Step validation
//
// Five pure predicates, one per step. Every outcome is a value: malformed
// submissions (bad JSON, wrong segment count) fail validation, they never error.

pub mod jwt;
pub mod steps;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::auth::UserIdentity;
use crate::puzzle::PuzzleBundle;

pub use steps::{validate_step1, validate_step2, validate_step3, validate_step4, validate_step5};

pub const FIRST_STEP: u8 = 1;
pub const LAST_STEP: u8 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step1Submission {
    /// The decoded JWT payload pasted back as JSON
    pub decoded_payload: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step2Submission {
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step3Submission {
    pub hidden_element: String,
    pub network_clue: String,
    pub console_secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step4Submission {
    pub endpoint: String,
    pub auth_header: String,
    pub response_body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Step5Submission {
    pub decrypted_message: String,
    pub xor_key: String,
    pub message_hash: String,
    pub verification_output: String,
    pub signed_by: String,
}

/// Free-form evidence for one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Step1(Step1Submission),
    Step2(Step2Submission),
    Step3(Step3Submission),
    Step4(Step4Submission),
    Step5(Step5Submission),
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("unknown step {0}, steps run from 1 to 5")]
    UnknownStep(u8),

    #[error("submission fields must be a JSON object of strings: {0}")]
    InvalidFields(#[from] serde_json::Error),
}

impl Submission {
    pub fn step(&self) -> u8 {
        match self {
            Submission::Step1(_) => 1,
            Submission::Step2(_) => 2,
            Submission::Step3(_) => 3,
            Submission::Step4(_) => 4,
            Submission::Step5(_) => 5,
        }
    }

    /// Build a submission from loose JSON fields; absent fields are empty
    pub fn from_fields(step: u8, fields: Value) -> Result<Self, SubmissionError> {
        let submission = match step {
            1 => Submission::Step1(serde_json::from_value(fields)?),
            2 => Submission::Step2(serde_json::from_value(fields)?),
            3 => Submission::Step3(serde_json::from_value(fields)?),
            4 => Submission::Step4(serde_json::from_value(fields)?),
            5 => Submission::Step5(serde_json::from_value(fields)?),
            other => return Err(SubmissionError::UnknownStep(other)),
        };
        Ok(submission)
    }

    /// Fields as stored in the progress record
    pub fn fields(&self) -> Value {
        let fields = match self {
            Submission::Step1(s) => serde_json::to_value(s),
            Submission::Step2(s) => serde_json::to_value(s),
            Submission::Step3(s) => serde_json::to_value(s),
            Submission::Step4(s) => serde_json::to_value(s),
            Submission::Step5(s) => serde_json::to_value(s),
        };
        fields.unwrap_or(Value::Null)
    }
}

/// One itemized sub-check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub field: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    pub fn new(field: &str, passed: bool, ok: &str, failed: &str) -> Self {
        Self {
            field: field.to_string(),
            passed,
            detail: if passed { ok.to_string() } else { failed.to_string() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub step: u8,
    pub passed: bool,
    pub message: String,
    /// Per-field feedback; empty for steps that report a single message
    pub checks: Vec<CheckResult>,
}

impl ValidationOutcome {
    pub fn pass(step: u8, message: impl Into<String>) -> Self {
        Self {
            step,
            passed: true,
            message: message.into(),
            checks: Vec::new(),
        }
    }

    pub fn fail(step: u8, message: impl Into<String>) -> Self {
        Self {
            step,
            passed: false,
            message: message.into(),
            checks: Vec::new(),
        }
    }

    /// Passes only when every check passes; the message lists the failures
    pub fn itemized(step: u8, checks: Vec<CheckResult>) -> Self {
        let failed: Vec<&str> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.field.as_str())
            .collect();

        let (passed, message) = if failed.is_empty() {
            (true, format!("Step {} complete: all {} checks passed", step, checks.len()))
        } else {
            (
                false,
                format!(
                    "{} of {} checks failed: {}",
                    failed.len(),
                    checks.len(),
                    failed.join(", ")
                ),
            )
        };

        Self {
            step,
            passed,
            message,
            checks,
        }
    }
}

/// Run the predicate for the submission's step
pub fn validate(
    submission: &Submission,
    bundle: &PuzzleBundle,
    identity: &UserIdentity,
) -> ValidationOutcome {
    let outcome = match submission {
        Submission::Step1(s) => validate_step1(s, bundle),
        Submission::Step2(s) => validate_step2(s, &identity.id),
        Submission::Step3(s) => validate_step3(s, bundle),
        Submission::Step4(s) => validate_step4(s, bundle),
        Submission::Step5(s) => validate_step5(s, bundle, identity),
    };

    tracing::debug!(
        step = outcome.step,
        passed = outcome.passed,
        user_hash = %bundle.user_hash,
        "validated submission"
    );
    outcome
}
