// puzzle/mod.rs - Per-user puzzle derivation
//
// Everything a student sees or must reproduce is a pure function of the user id.
// Nothing here is persisted; the bundle is rebuilt on every page load.

pub mod cipher;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of the user hash prefix
pub const USER_HASH_LEN: usize = 8;

/// Fixed marker the simulated step 4 endpoint answers with
pub const STEP4_COMPLETION_MARKER: &str = "ACCESS_GRANTED";

/// Marker both step 2 payload fields must carry
pub const STEP2_COMPLETION_MARKER: &str = "step2-complete";

/// Line the injected `verify()` routine logs
pub const VERIFY_LOG_LINE: &str = "Verification routine executed";

/// Namespaced global exposing `verify()` in step 5
pub const VERIFY_GLOBAL_NAME: &str = "__securityChallenge";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PuzzleError {
    #[error("sign in required: no user id available")]
    MissingUser,
}

/// Step 5 cipher material, derived arithmetically from the user hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherPuzzle {
    pub caesar_shift: u8,
    pub xor_key: String,
    pub plaintext: String,
    pub caesar_ciphertext: String,
    pub xor_ciphertext_hex: String,
    pub plaintext_sha256: String,
    pub verify_sentinel: String,
}

/// Per-user values each step displays and validates against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleBundle {
    pub user_id: String,
    pub user_hash: String,
    pub jwt_token: String,
    pub jwt_signing_key: String,
    pub dev_tools_clue: String,
    pub dom_secret: String,
    pub console_secret: String,
    pub api_endpoint_path: String,
    pub bearer_auth_token: String,
    pub cipher: CipherPuzzle,
}

impl PuzzleBundle {
    pub fn hidden_node_id(&self) -> String {
        format!("challenge-marker-{}", self.user_hash)
    }

    pub fn xor_storage_key(&self) -> String {
        format!("challenge_xor_key_{}", self.user_hash)
    }

    pub fn step5_discovery_path(&self) -> String {
        format!("/api/challenge/devtools/{}", self.user_hash)
    }

    /// Decoded payload of the step 1 token
    pub fn jwt_payload(&self) -> Option<Value> {
        let segment = self.jwt_token.split('.').nth(1)?;
        let bytes = cipher::decode_segment(segment)?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Values a page may show before the student has solved anything
    pub fn public_view(&self) -> Value {
        json!({
            "user_hash": self.user_hash,
            "jwt_token": self.jwt_token,
            "api_endpoint_path": self.api_endpoint_path,
            "bearer_auth_token": self.bearer_auth_token,
            "caesar_ciphertext": self.cipher.caesar_ciphertext,
            "xor_ciphertext_hex": self.cipher.xor_ciphertext_hex,
        })
    }
}

/// `btoa(user_id)` truncated to [`USER_HASH_LEN`] characters
pub fn user_hash(user_id: &str) -> String {
    cipher::base64_standard(user_id)
        .chars()
        .take(USER_HASH_LEN)
        .collect()
}

/// Build the puzzle bundle for a user. Deterministic: equal ids give equal bundles.
pub fn derive(user_id: &str) -> Result<PuzzleBundle, PuzzleError> {
    if user_id.trim().is_empty() {
        return Err(PuzzleError::MissingUser);
    }

    let hash = user_hash(user_id);

    Ok(PuzzleBundle {
        user_id: user_id.to_string(),
        jwt_token: step1_token(user_id, &hash),
        jwt_signing_key: user_id.to_string(),
        dev_tools_clue: format!("NETWORK_CLUE_{}", hash),
        dom_secret: format!("DOM_SECRET_{}", hash),
        console_secret: format!("CONSOLE_SECRET_{}", hash),
        api_endpoint_path: format!("/api/challenge/secret/{}", hash),
        bearer_auth_token: format!("sk_challenge_{}", hash),
        cipher: cipher_puzzle(&hash),
        user_hash: hash,
    })
}

fn step1_token(user_id: &str, hash: &str) -> String {
    let header = json!({ "alg": "HS256", "typ": "JWT" });
    let payload = json!({
        "message": format!("Great job decoding! Your secret code is {}", hash),
        "user_id": user_id,
        "step": 1,
        "next": "Sign your own HS256 token with your user id",
    });

    // The signature segment is decoration; step 1 only asks for decoding
    format!(
        "{}.{}.{}",
        cipher::base64_url(header.to_string().as_bytes()),
        cipher::base64_url(payload.to_string().as_bytes()),
        cipher::base64_url(format!("placeholder-signature-{}", hash).as_bytes()),
    )
}

fn cipher_puzzle(hash: &str) -> CipherPuzzle {
    let hash_sum: u32 = hash.bytes().map(u32::from).sum();
    let caesar_shift = (hash_sum % 25 + 1) as u8;
    let xor_key = format!("KEY{:03}", hash_sum % 1000);
    let plaintext = format!("MASTER_KEY_{}_VERIFIED", hash);

    CipherPuzzle {
        caesar_shift,
        caesar_ciphertext: cipher::caesar_encrypt(&plaintext, caesar_shift),
        xor_ciphertext_hex: cipher::xor_encrypt_hex(&plaintext, &xor_key),
        plaintext_sha256: sha256_hex(&plaintext),
        verify_sentinel: format!("VERIFIED_{}", hash),
        xor_key,
        plaintext,
    }
}

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
