// clues/mod.rs - Discoverable artifacts for steps 3 and 5
//
// Every effect is claimed in a registry keyed by (user hash, effect kind)
// before it fires, so activating the same step twice never duplicates a
// node, a request or a console batch. Deactivation aborts pending timers,
// removes the node and global, and releases the claims.

pub mod beacon;
pub mod page;

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;

pub use beacon::{Beacon, BeaconError, DiscoveryMethod, DiscoveryRequest, HttpBeacon, NullBeacon};
pub use page::{HeadlessPage, HiddenNode, Page, PageSnapshot, VerifyHook};

use crate::config::ChallengeSettings;
use crate::puzzle::{PuzzleBundle, VERIFY_GLOBAL_NAME, VERIFY_LOG_LINE};

/// Header carrying the step 3 network clue
pub const CLUE_HEADER: &str = "X-Challenge-Clue";

pub const STEP3_DISCOVERY_PATH: &str = "/api/challenge/step3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    HiddenNode,
    NetworkClue,
    ConsoleSecret,
    VerifyGlobal,
    XorKeyStorage,
    DevtoolsRequest,
    ConsoleBatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EffectKey {
    user_hash: String,
    kind: EffectKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClueTiming {
    pub discovery_delay: Duration,
    pub console_batch_delay: Duration,
}

impl ClueTiming {
    pub fn immediate() -> Self {
        Self {
            discovery_delay: Duration::ZERO,
            console_batch_delay: Duration::ZERO,
        }
    }
}

impl From<&ChallengeSettings> for ClueTiming {
    fn from(settings: &ChallengeSettings) -> Self {
        Self {
            discovery_delay: settings.discovery_delay(),
            console_batch_delay: settings.console_batch_delay(),
        }
    }
}

#[derive(Debug, Clone)]
struct ActiveClues {
    step: u8,
    user_hash: String,
    node_id: Option<String>,
    global: Option<&'static str>,
}

pub struct ClueInjector {
    page: Arc<dyn Page>,
    beacon: Arc<dyn Beacon>,
    timing: ClueTiming,
    fired: HashSet<EffectKey>,
    pending: Vec<JoinHandle<()>>,
    active: Option<ActiveClues>,
}

impl ClueInjector {
    pub fn new(page: Arc<dyn Page>, beacon: Arc<dyn Beacon>, timing: ClueTiming) -> Self {
        Self {
            page,
            beacon,
            timing,
            fired: HashSet::new(),
            pending: Vec::new(),
            active: None,
        }
    }

    pub fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    pub fn active_step(&self) -> Option<u8> {
        self.active.as_ref().map(|a| a.step)
    }

    pub fn has_fired(&self, user_hash: &str, kind: EffectKind) -> bool {
        self.fired.contains(&EffectKey {
            user_hash: user_hash.to_string(),
            kind,
        })
    }

    /// Inject the artifacts for `step`. Steps without artifacts are a no-op
    /// apart from retiring whatever another step left behind.
    pub fn activate(&mut self, step: u8, bundle: &PuzzleBundle) {
        let switching = self
            .active
            .as_ref()
            .map(|a| a.step != step || a.user_hash != bundle.user_hash)
            .unwrap_or(false);
        if switching {
            self.deactivate();
        }

        self.pending.retain(|handle| !handle.is_finished());

        let active = self.active.get_or_insert_with(|| ActiveClues {
            step,
            user_hash: bundle.user_hash.clone(),
            node_id: None,
            global: None,
        });
        let mut active = active.clone();

        match step {
            3 => self.activate_step3(bundle, &mut active),
            5 => self.activate_step5(bundle, &mut active),
            _ => {}
        }

        self.active = Some(active);
    }

    /// Reverse the active step's effects. Safe to call repeatedly.
    pub fn deactivate(&mut self) {
        for handle in self.pending.drain(..) {
            handle.abort();
        }

        let Some(active) = self.active.take() else {
            return;
        };

        if let Some(node_id) = &active.node_id {
            self.page.remove_node(node_id);
        }
        if let Some(global) = active.global {
            self.page.remove_global(global);
        }
        self.fired.retain(|key| key.user_hash != active.user_hash);

        tracing::debug!(step = active.step, user_hash = %active.user_hash, "clues deactivated");
    }

    fn claim(&mut self, user_hash: &str, kind: EffectKind) -> bool {
        self.fired.insert(EffectKey {
            user_hash: user_hash.to_string(),
            kind,
        })
    }

    fn activate_step3(&mut self, bundle: &PuzzleBundle, active: &mut ActiveClues) {
        let hash = &bundle.user_hash;

        if self.claim(hash, EffectKind::HiddenNode) {
            let node_id = bundle.hidden_node_id();
            let mut attributes = BTreeMap::new();
            attributes.insert("data-secret".to_string(), bundle.dom_secret.clone());
            attributes.insert("style".to_string(), "display:none".to_string());
            self.page.insert_node(HiddenNode {
                id: node_id.clone(),
                attributes,
                text: bundle.dom_secret.clone(),
            });
            active.node_id = Some(node_id);
        }

        if self.claim(hash, EffectKind::NetworkClue) {
            let request = DiscoveryRequest::post(STEP3_DISCOVERY_PATH, json!({ "user_hash": hash }))
                .header(CLUE_HEADER, bundle.dev_tools_clue.clone());
            let beacon = self.beacon.clone();
            self.schedule(self.timing.discovery_delay, async move {
                send_quietly(beacon, request).await;
            });
        }

        if self.claim(hash, EffectKind::ConsoleSecret) {
            let page = self.page.clone();
            let line = format!("[challenge] debug token for {}: {}", hash, bundle.console_secret);
            self.schedule(self.timing.discovery_delay, async move {
                page.console_log(line);
            });
        }

        tracing::debug!(user_hash = %hash, "step 3 clues active");
    }

    fn activate_step5(&mut self, bundle: &PuzzleBundle, active: &mut ActiveClues) {
        let hash = &bundle.user_hash;
        let cipher = &bundle.cipher;

        if self.claim(hash, EffectKind::VerifyGlobal) {
            self.page.register_global(
                VERIFY_GLOBAL_NAME,
                VerifyHook {
                    log_line: VERIFY_LOG_LINE.to_string(),
                    sentinel: cipher.verify_sentinel.clone(),
                },
            );
            active.global = Some(VERIFY_GLOBAL_NAME);
        }

        if self.claim(hash, EffectKind::XorKeyStorage) {
            self.page.storage_set(&bundle.xor_storage_key(), &cipher.xor_key);
        }

        if self.claim(hash, EffectKind::DevtoolsRequest) {
            let request = DiscoveryRequest::get(bundle.step5_discovery_path())
                .header(CLUE_HEADER, format!("Try {}.verify()", VERIFY_GLOBAL_NAME));
            let beacon = self.beacon.clone();
            self.schedule(Duration::ZERO, async move {
                send_quietly(beacon, request).await;
            });
        }

        if self.claim(hash, EffectKind::ConsoleBatch) {
            let page = self.page.clone();
            let lines = vec![
                format!("[challenge] intercepted (Caesar): {}", cipher.caesar_ciphertext),
                format!("[challenge] intercepted (XOR, hex): {}", cipher.xor_ciphertext_hex),
                "[challenge] the XOR key was left in local storage".to_string(),
                format!("[challenge] {} exposes a verify() routine", VERIFY_GLOBAL_NAME),
            ];
            self.schedule(self.timing.console_batch_delay, async move {
                for line in lines {
                    page.console_log(line);
                }
            });
        }

        tracing::debug!(user_hash = %hash, "step 5 clues active");
    }

    /// Run `effect` after `delay` unless deactivated first
    fn schedule<F>(&mut self, delay: Duration, effect: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("no async runtime; deferred clue effect skipped");
                return;
            }
        };

        self.pending.push(handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            effect.await;
        }));
    }
}

impl Drop for ClueInjector {
    fn drop(&mut self) {
        for handle in self.pending.drain(..) {
            handle.abort();
        }
    }
}

async fn send_quietly(beacon: Arc<dyn Beacon>, request: DiscoveryRequest) {
    let path = request.path.clone();
    if let Err(e) = beacon.send(request).await {
        tracing::debug!(path = %path, "ignored discovery failure: {}", e);
    }
}
