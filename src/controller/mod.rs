// controller/mod.rs - Challenge step sequencing
//
// Step1 -> Step2 -> ... -> Step5 -> Completed. A step advances only when its
// submission validates; there is no way back and no way to skip ahead.
// Every successful transition writes the whole progress record.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::auth::UserIdentity;
use crate::clues::ClueInjector;
use crate::config::ChallengeSettings;
use crate::progress::{ProgressRecord, ProgressStore, StoreError, COMPLETED_STEP};
use crate::puzzle::{self, PuzzleBundle, PuzzleError};
use crate::validator::{self, Submission, ValidationOutcome, FIRST_STEP, LAST_STEP};

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("sign in required")]
    SignInRequired,

    #[error("step {step} is locked until step {current} is complete")]
    StepLocked { step: u8, current: u8 },

    #[error("progress storage failed: {0}")]
    Storage(#[from] StoreError),
}

impl From<PuzzleError> for ChallengeError {
    fn from(err: PuzzleError) -> Self {
        match err {
            PuzzleError::MissingUser => ChallengeError::SignInRequired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum ChallengeState {
    Step(u8),
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Locked,
    Active,
    Completed,
}

/// Navigation scheduled once the last step is solved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub to: String,
    #[serde(rename = "after_ms")]
    #[serde(serialize_with = "serialize_millis")]
    pub after: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Validation passed and progress moved on
    Advanced {
        outcome: ValidationOutcome,
        state: ChallengeState,
        redirect: Option<Redirect>,
    },
    /// Validation failed; the step stays active
    Rejected { outcome: ValidationOutcome },
    /// The step was already complete; nothing changed
    AlreadyCompleted { step: u8 },
}

pub struct ChallengeController {
    challenge_id: String,
    identity: UserIdentity,
    bundle: PuzzleBundle,
    progress: ProgressStore,
    record: ProgressRecord,
    injector: ClueInjector,
    settings: ChallengeSettings,
}

impl ChallengeController {
    /// Load progress for the signed-in user and inject the current step's clues.
    /// Without an identity the whole challenge is blocked.
    pub fn open(
        challenge_id: impl Into<String>,
        identity: Option<UserIdentity>,
        progress: ProgressStore,
        injector: ClueInjector,
        settings: ChallengeSettings,
    ) -> Result<Self, ChallengeError> {
        let identity = identity.ok_or(ChallengeError::SignInRequired)?;
        let bundle = puzzle::derive(&identity.id)?;
        let challenge_id = challenge_id.into();
        let record = progress.load(&challenge_id, &identity.id)?;

        tracing::info!(
            challenge = %challenge_id,
            user_hash = %bundle.user_hash,
            current_step = record.current_step,
            "challenge opened"
        );

        let mut controller = Self {
            challenge_id,
            identity,
            bundle,
            progress,
            record,
            injector,
            settings,
        };
        controller.activate_current();
        Ok(controller)
    }

    pub fn challenge_id(&self) -> &str {
        &self.challenge_id
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub fn bundle(&self) -> &PuzzleBundle {
        &self.bundle
    }

    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    pub fn injector(&self) -> &ClueInjector {
        &self.injector
    }

    pub fn state(&self) -> ChallengeState {
        if self.record.is_finished() {
            ChallengeState::Completed
        } else {
            ChallengeState::Step(self.record.current_step)
        }
    }

    /// Display status of a step: reachable only once its predecessors are done
    pub fn step_status(&self, step: u8) -> StepStatus {
        if self.record.is_step_completed(step) {
            StepStatus::Completed
        } else if self.state() == ChallengeState::Step(step) && self.record.prerequisites_met(step) {
            StepStatus::Active
        } else {
            StepStatus::Locked
        }
    }

    pub fn step_statuses(&self) -> Vec<(u8, StepStatus)> {
        (FIRST_STEP..=LAST_STEP).map(|s| (s, self.step_status(s))).collect()
    }

    /// Validate a submission for the current step and advance on success
    pub fn submit(&mut self, submission: Submission) -> Result<SubmitOutcome, ChallengeError> {
        let step = submission.step();

        if self.record.is_step_completed(step) {
            tracing::debug!(step, "ignoring resubmission of completed step");
            return Ok(SubmitOutcome::AlreadyCompleted { step });
        }

        if self.step_status(step) != StepStatus::Active {
            return Err(ChallengeError::StepLocked {
                step,
                current: self.record.current_step.min(LAST_STEP),
            });
        }

        let outcome = validator::validate(&submission, &self.bundle, &self.identity);
        if !outcome.passed {
            tracing::info!(step, user_hash = %self.bundle.user_hash, "submission rejected");
            return Ok(SubmitOutcome::Rejected { outcome });
        }

        let mut next = self.record.clone();
        next.record_completion(step, submission.fields());
        self.progress.save(&self.challenge_id, &self.identity.id, &next)?;
        self.record = next;

        tracing::info!(
            step,
            user_hash = %self.bundle.user_hash,
            current_step = self.record.current_step,
            "step completed"
        );

        self.activate_current();

        let redirect = (self.record.current_step == COMPLETED_STEP).then(|| Redirect {
            to: self.settings.completion_redirect_path.clone(),
            after: self.settings.completion_redirect_delay(),
        });

        Ok(SubmitOutcome::Advanced {
            outcome,
            state: self.state(),
            redirect,
        })
    }

    /// Forget all progress, as if the user cleared their storage
    pub fn reset(&mut self) -> Result<(), ChallengeError> {
        self.progress.clear(&self.challenge_id, &self.identity.id)?;
        self.record = ProgressRecord::default();
        self.injector.deactivate();
        self.activate_current();
        tracing::info!(challenge = %self.challenge_id, user_hash = %self.bundle.user_hash, "progress reset");
        Ok(())
    }

    fn activate_current(&mut self) {
        match self.state() {
            ChallengeState::Step(step) => self.injector.activate(step, &self.bundle),
            ChallengeState::Completed => self.injector.deactivate(),
        }
    }
}

impl Drop for ChallengeController {
    fn drop(&mut self) {
        self.injector.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clues::{ClueTiming, HeadlessPage, NullBeacon};
    use crate::config::AppConfig;
    use crate::progress::{KeyValueStore, MemoryStore};
    use crate::puzzle::{cipher, sha256_hex};
    use crate::validator::{
        Step1Submission, Step2Submission, Step3Submission, Step4Submission, Step5Submission,
    };
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::sync::Arc;

    struct Harness {
        backend: Arc<MemoryStore>,
        page: Arc<HeadlessPage>,
    }

    impl Harness {
        fn new() -> Self {
            let backend = Arc::new(MemoryStore::new());
            let page = Arc::new(HeadlessPage::new(backend.clone()));
            Self { backend, page }
        }

        fn open(&self, identity: Option<UserIdentity>) -> Result<ChallengeController, ChallengeError> {
            let injector = ClueInjector::new(self.page.clone(), Arc::new(NullBeacon), ClueTiming::immediate());
            ChallengeController::open(
                "intro",
                identity,
                ProgressStore::new(self.backend.clone()),
                injector,
                AppConfig::development().challenge,
            )
        }
    }

    fn user() -> UserIdentity {
        UserIdentity::new("abc-123").with_display_name("Ada")
    }

    fn step1(bundle: &PuzzleBundle) -> Submission {
        Submission::Step1(Step1Submission {
            decoded_payload: bundle.jwt_payload().unwrap().to_string(),
        })
    }

    fn solutions(bundle: &PuzzleBundle) -> Vec<Submission> {
        let token = encode(
            &Header::default(),
            &json!({ "challenge": "step2-complete", "completion_status": "step2-complete" }),
            &EncodingKey::from_secret(bundle.jwt_signing_key.as_bytes()),
        )
        .unwrap();
        let c = &bundle.cipher;
        let plaintext = cipher::xor_decrypt_hex(&c.xor_ciphertext_hex, &c.xor_key).unwrap();

        vec![
            step1(bundle),
            Submission::Step2(Step2Submission { token }),
            Submission::Step3(Step3Submission {
                hidden_element: bundle.dom_secret.clone(),
                network_clue: bundle.dev_tools_clue.clone(),
                console_secret: bundle.console_secret.clone(),
            }),
            Submission::Step4(Step4Submission {
                endpoint: bundle.api_endpoint_path.clone(),
                auth_header: format!("Bearer {}", bundle.bearer_auth_token),
                response_body: "ACCESS_GRANTED".to_string(),
            }),
            Submission::Step5(Step5Submission {
                message_hash: sha256_hex(&plaintext),
                decrypted_message: plaintext,
                xor_key: c.xor_key.clone(),
                verification_output: c.verify_sentinel.clone(),
                signed_by: "Ada".to_string(),
            }),
        ]
    }

    #[test]
    fn test_open_without_identity_is_blocked() {
        let harness = Harness::new();
        assert!(matches!(harness.open(None), Err(ChallengeError::SignInRequired)));
        assert!(matches!(
            harness.open(Some(UserIdentity::new(""))),
            Err(ChallengeError::SignInRequired)
        ));
    }

    #[test]
    fn test_step1_advances_and_persists() {
        let harness = Harness::new();
        let mut controller = harness.open(Some(user())).unwrap();
        assert_eq!(controller.bundle().user_hash, "YWJjLTEy");
        assert_eq!(controller.state(), ChallengeState::Step(1));

        let submission = step1(controller.bundle());
        let result = controller.submit(submission.clone()).unwrap();
        assert!(matches!(result, SubmitOutcome::Advanced { state: ChallengeState::Step(2), redirect: None, .. }));
        assert_eq!(controller.record().completed_steps, vec![1]);

        let stored = harness.backend.get("challenge_intro_abc-123").unwrap().unwrap();
        let stored: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored["currentStep"], 2);

        // Resubmitting a completed step changes nothing
        let again = controller.submit(submission).unwrap();
        assert_eq!(again, SubmitOutcome::AlreadyCompleted { step: 1 });
        assert_eq!(controller.record().completed_steps, vec![1]);
        assert_eq!(controller.step_status(1), StepStatus::Completed);
    }

    #[test]
    fn test_rejected_submission_keeps_step_active() {
        let harness = Harness::new();
        let mut controller = harness.open(Some(user())).unwrap();

        let result = controller
            .submit(Submission::Step1(Step1Submission { decoded_payload: "{}".into() }))
            .unwrap();
        assert!(matches!(result, SubmitOutcome::Rejected { .. }));
        assert_eq!(controller.state(), ChallengeState::Step(1));
        assert!(harness.backend.is_empty());
    }

    #[test]
    fn test_out_of_order_submission_is_locked() {
        let harness = Harness::new();
        let mut controller = harness.open(Some(user())).unwrap();
        let later = solutions(controller.bundle()).remove(2);

        let err = controller.submit(later).unwrap_err();
        assert!(matches!(err, ChallengeError::StepLocked { step: 3, current: 1 }));
        assert_eq!(controller.step_status(3), StepStatus::Locked);
    }

    #[test]
    fn test_full_run_completes_with_redirect_and_monotonic_progress() {
        let harness = Harness::new();
        let mut controller = harness.open(Some(user())).unwrap();
        let mut last_step = controller.record().current_step;

        for submission in solutions(&controller.bundle().clone()) {
            let result = controller.submit(submission).unwrap();
            assert!(matches!(result, SubmitOutcome::Advanced { .. }), "{:?}", result);

            let record = controller.record();
            assert!(record.current_step > last_step);
            let mut unique = record.completed_steps.clone();
            unique.dedup();
            assert_eq!(unique, record.completed_steps);
            last_step = record.current_step;

            if let SubmitOutcome::Advanced { redirect: Some(redirect), state, .. } = result {
                assert_eq!(state, ChallengeState::Completed);
                assert_eq!(redirect.to, "/dashboard");
                assert_eq!(redirect.after, Duration::from_millis(3000));
            }
        }

        assert_eq!(controller.state(), ChallengeState::Completed);
        assert_eq!(controller.record().completed_steps, vec![1, 2, 3, 4, 5]);
        assert_eq!(controller.injector().active_step(), None);
    }

    #[test]
    fn test_progress_survives_reopen_and_reset() {
        let harness = Harness::new();
        {
            let mut controller = harness.open(Some(user())).unwrap();
            let submission = step1(controller.bundle());
            controller.submit(submission).unwrap();
        }

        let mut reopened = harness.open(Some(user())).unwrap();
        assert_eq!(reopened.state(), ChallengeState::Step(2));

        reopened.reset().unwrap();
        assert_eq!(reopened.state(), ChallengeState::Step(1));
        assert!(harness.open(Some(user())).unwrap().record().completed_steps.is_empty());
    }

    #[test]
    fn test_step3_clues_appear_when_step3_is_current() {
        let harness = Harness::new();
        let mut controller = harness.open(Some(user())).unwrap();
        let bundle = controller.bundle().clone();

        for submission in solutions(&bundle).into_iter().take(2) {
            controller.submit(submission).unwrap();
        }

        assert_eq!(controller.injector().active_step(), Some(3));
        assert!(harness.page.node(&bundle.hidden_node_id()).is_some());
    }
}
