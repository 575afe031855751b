// validator/steps.rs - The five step predicates

use serde_json::Value;
use url::Url;

use super::jwt::verify_student_token;
use super::{
    CheckResult, Step1Submission, Step2Submission, Step3Submission, Step4Submission,
    Step5Submission, ValidationOutcome,
};
use crate::auth::UserIdentity;
use crate::puzzle::{PuzzleBundle, STEP4_COMPLETION_MARKER};

/// Fields of the step 1 payload that must come back unchanged
const STEP1_FIELDS: [&str; 3] = ["message", "user_id", "step"];

/// Step 1: the decoded payload of the issued token, pasted back as JSON
pub fn validate_step1(input: &Step1Submission, bundle: &PuzzleBundle) -> ValidationOutcome {
    let expected = match bundle.jwt_payload() {
        Some(payload) => payload,
        None => {
            tracing::error!(user_hash = %bundle.user_hash, "issued step 1 token does not decode");
            return ValidationOutcome::fail(1, "The challenge token could not be decoded, reload the page");
        }
    };

    let submitted = match serde_json::from_str::<Value>(input.decoded_payload.trim()) {
        Ok(Value::Object(map)) => map,
        _ => {
            return ValidationOutcome::fail(
                1,
                "Paste the decoded payload as a JSON object, e.g. {\"message\": ..., \"user_id\": ..., \"step\": ...}",
            )
        }
    };

    let mismatched: Vec<&str> = STEP1_FIELDS
        .iter()
        .copied()
        .filter(|field| submitted.get(*field) != expected.get(*field))
        .collect();

    if mismatched.is_empty() {
        ValidationOutcome::pass(1, "Token decoded correctly. On to signing your own.")
    } else {
        ValidationOutcome::fail(
            1,
            format!(
                "The payload does not match the token, check: {}",
                mismatched.join(", ")
            ),
        )
    }
}

/// Step 2: a student-built HS256 token signed with their user id
pub fn validate_step2(input: &Step2Submission, user_id: &str) -> ValidationOutcome {
    match verify_student_token(&input.token, user_id) {
        Ok(_) => ValidationOutcome::pass(2, "Signature verified. Your token is genuine."),
        Err(rejection) => ValidationOutcome::fail(2, format!("Token rejected: {}", rejection)),
    }
}

/// Step 3: three artifacts found with the browser developer tools
pub fn validate_step3(input: &Step3Submission, bundle: &PuzzleBundle) -> ValidationOutcome {
    let checks = vec![
        CheckResult::new(
            "hidden_element",
            input.hidden_element.contains(&bundle.dom_secret),
            "Hidden element found",
            "That is not the hidden element's secret, inspect the page markup",
        ),
        CheckResult::new(
            "network_clue",
            input.network_clue.contains(&bundle.dev_tools_clue),
            "Network clue found",
            "That is not the request header clue, watch the network panel",
        ),
        CheckResult::new(
            "console_secret",
            input.console_secret.contains(&bundle.console_secret),
            "Console secret found",
            "That is not the console secret, read the console output",
        ),
    ];

    ValidationOutcome::itemized(3, checks)
}

/// Step 4: the pieces of an authenticated call to the per-user endpoint
pub fn validate_step4(input: &Step4Submission, bundle: &PuzzleBundle) -> ValidationOutcome {
    let checks = vec![
        CheckResult::new(
            "endpoint",
            endpoint_matches(&input.endpoint, &bundle.api_endpoint_path),
            "Endpoint correct",
            "That endpoint is not yours, it must end in your user hash",
        ),
        CheckResult::new(
            "auth_header",
            input.auth_header.contains(&bundle.bearer_auth_token),
            "Authorization header correct",
            "Send your bearer token in the Authorization header",
        ),
        CheckResult::new(
            "response_body",
            input.response_body.contains(STEP4_COMPLETION_MARKER),
            "Response confirms access",
            "Paste the body the endpoint returned after a successful call",
        ),
    ];

    ValidationOutcome::itemized(4, checks)
}

/// Accepts anything containing the expected path, such as a request line or a
/// curl command, or a URL whose path is the expected one
fn endpoint_matches(submitted: &str, expected_path: &str) -> bool {
    let submitted = submitted.trim();
    if submitted.contains(expected_path) {
        return true;
    }

    let base = match Url::parse("http://challenge.local/") {
        Ok(base) => base,
        Err(_) => return false,
    };

    match base.join(submitted) {
        // Hashes may end in '/', so compare with trailing slashes dropped on both sides
        Ok(url) => url.path().trim_end_matches('/') == expected_path.trim_end_matches('/'),
        Err(_) => false,
    }
}

/// Step 5: decrypted message, key, digest, verify() output and signature
pub fn validate_step5(
    input: &Step5Submission,
    bundle: &PuzzleBundle,
    identity: &UserIdentity,
) -> ValidationOutcome {
    let cipher = &bundle.cipher;
    let name = identity.signature_name().to_lowercase();

    let checks = vec![
        CheckResult::new(
            "decrypted_message",
            normalize(&input.decrypted_message) == cipher.plaintext,
            "Message decrypted",
            "The decrypted message is wrong, try the Caesar or the XOR ciphertext",
        ),
        CheckResult::new(
            "xor_key",
            normalize(&input.xor_key) == cipher.xor_key,
            "XOR key found",
            "That is not the key, look in the page's local storage",
        ),
        CheckResult::new(
            "message_hash",
            normalize(&input.message_hash).to_lowercase() == cipher.plaintext_sha256,
            "SHA-256 matches",
            "The hash must be the hex SHA-256 of the decrypted message",
        ),
        CheckResult::new(
            "verification_output",
            input.verification_output.contains(&cipher.verify_sentinel),
            "Verification routine output accepted",
            "Call the verify() function the page exposes and paste its result",
        ),
        CheckResult::new(
            "signed_by",
            !name.is_empty() && input.signed_by.to_lowercase().contains(&name),
            "Signed",
            "Sign your submission with your name",
        ),
    ];

    ValidationOutcome::itemized(5, checks)
}

/// Trim whitespace and one layer of quotes copied from a console
fn normalize(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(trimmed)
}
