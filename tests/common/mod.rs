#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use security_challenge::config::{AppConfig, StorageBackend};
use security_challenge::puzzle::{self, cipher, sha256_hex, PuzzleBundle};
use security_challenge::server::{app, AppState};

pub const CHALLENGE: &str = "intro";

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Serve the router on a free port inside the current test runtime
    pub async fn start() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut config = AppConfig::development();
        config.storage.backend = StorageBackend::Memory;
        config.api.port = port;
        config.api.discovery_base_url = Some(base_url.clone());
        config.api.enable_request_logging = false;
        config.challenge.discovery_delay_ms = 20;
        config.challenge.console_batch_delay_ms = 30;

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test port")?;
        let router = app(Arc::new(AppState::from_config(config)));
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        // Loopback only; keep proxy env vars out of the way
        let client = reqwest::Client::builder().no_proxy().build()?;
        let server = Self { port, base_url, client };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = self.client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Request builder carrying the identity headers of a signed-in user
    pub fn as_user(&self, method: reqwest::Method, path: &str, user: &TestUser) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header("X-User-Id", &user.id);
        if let Some(name) = &user.name {
            request = request.header("X-User-Name", name);
        }
        request
    }

    /// Number of open sessions, as reported by /health
    pub async fn open_sessions(&self) -> Result<u64> {
        let body = self.client.get(self.url("/health")).send().await?.json::<Value>().await?;
        body["data"]["sessions"]
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("health has no session count: {}", body))
    }

    pub async fn view(&self, user: &TestUser) -> Result<Value> {
        let res = self
            .as_user(reqwest::Method::GET, &format!("/api/challenges/{}", CHALLENGE), user)
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "view failed: {}", res.status());
        Ok(res.json::<Value>().await?)
    }

    pub async fn submit(&self, user: &TestUser, step: u8, fields: Value) -> Result<(StatusCode, Value)> {
        let res = self
            .as_user(
                reqwest::Method::POST,
                &format!("/api/challenges/{}/steps/{}", CHALLENGE, step),
                user,
            )
            .json(&fields)
            .send()
            .await?;
        let status = res.status();
        Ok((status, res.json::<Value>().await?))
    }

    pub async fn devtools(&self, user: &TestUser) -> Result<Value> {
        let res = self
            .as_user(reqwest::Method::GET, &format!("/api/challenges/{}/devtools", CHALLENGE), user)
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "devtools failed: {}", res.status());
        Ok(res.json::<Value>().await?)
    }
}

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub name: Option<String>,
}

impl TestUser {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
        }
    }

    pub fn named(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: Some(name.to_string()),
        }
    }

    pub fn bundle(&self) -> PuzzleBundle {
        puzzle::derive(&self.id).expect("test users have ids")
    }

    pub fn signature(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.clone())
    }
}

/// Poll until `check` holds or the timeout passes
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check().await? {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    anyhow::bail!("condition not met within {:?}", timeout)
}

pub fn step1_fields(bundle: &PuzzleBundle) -> Value {
    let payload = bundle.jwt_payload().expect("step 1 token decodes");
    json!({ "decoded_payload": payload.to_string() })
}

pub fn step2_fields(bundle: &PuzzleBundle) -> Value {
    let token = encode(
        &Header::default(),
        &json!({ "challenge": "step2-complete", "completion_status": "step2-complete" }),
        &EncodingKey::from_secret(bundle.jwt_signing_key.as_bytes()),
    )
    .expect("HS256 signing");
    json!({ "token": token })
}

pub fn step3_fields(bundle: &PuzzleBundle) -> Value {
    json!({
        "hidden_element": bundle.dom_secret,
        "network_clue": bundle.dev_tools_clue,
        "console_secret": bundle.console_secret,
    })
}

pub fn step4_fields(bundle: &PuzzleBundle, response_body: &str) -> Value {
    json!({
        "endpoint": bundle.api_endpoint_path,
        "auth_header": format!("Bearer {}", bundle.bearer_auth_token),
        "response_body": response_body,
    })
}

pub fn step5_fields(bundle: &PuzzleBundle, xor_key: &str, verification: &str, signed_by: &str) -> Value {
    let plaintext = cipher::xor_decrypt_hex(&bundle.cipher.xor_ciphertext_hex, xor_key)
        .expect("XOR ciphertext decodes");
    json!({
        "message_hash": sha256_hex(&plaintext),
        "decrypted_message": plaintext,
        "xor_key": xor_key,
        "verification_output": verification,
        "signed_by": signed_by,
    })
}
