// clues/page.rs - The page clues are injected into
//
// `Page` is the slice of a browser page the injector touches: hidden DOM
// nodes, the console, namespaced globals and durable local storage.
// `HeadlessPage` records all of it in memory so a host can show the student
// what their developer tools would.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::progress::KeyValueStore;

/// Console lines kept per page; older lines scroll off
pub const CONSOLE_HISTORY_LIMIT: usize = 200;

/// A DOM node that is present but not rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HiddenNode {
    pub id: String,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
}

/// A global object exposing a `verify()` callable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyHook {
    /// Written to the console on every call
    pub log_line: String,
    /// Returned from every call
    pub sentinel: String,
}

pub trait Page: Send + Sync {
    /// Insert a node, replacing any node with the same id
    fn insert_node(&self, node: HiddenNode);
    fn remove_node(&self, id: &str) -> bool;
    fn console_log(&self, line: String);
    fn register_global(&self, name: &str, hook: VerifyHook);
    fn remove_global(&self, name: &str) -> bool;
    fn storage_set(&self, key: &str, value: &str);
    fn storage_get(&self, key: &str) -> Option<String>;
}

/// Everything a student could see on a [`HeadlessPage`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageSnapshot {
    pub nodes: Vec<HiddenNode>,
    pub console: Vec<String>,
    pub globals: Vec<String>,
    pub local_storage: BTreeMap<String, String>,
}

#[derive(Default)]
struct PageState {
    nodes: Vec<HiddenNode>,
    console: Vec<String>,
    globals: BTreeMap<String, VerifyHook>,
    storage_keys: BTreeSet<String>,
}

impl PageState {
    fn push_console(&mut self, line: String) {
        if self.console.len() >= CONSOLE_HISTORY_LIMIT {
            let overflow = self.console.len() + 1 - CONSOLE_HISTORY_LIMIT;
            self.console.drain(..overflow);
        }
        self.console.push(line);
    }
}

pub struct HeadlessPage {
    state: Mutex<PageState>,
    storage: Arc<dyn KeyValueStore>,
}

impl HeadlessPage {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            state: Mutex::new(PageState::default()),
            storage,
        }
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        // A poisoned page only ever held plain data; keep using it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Call `verify()` on a registered global, as a student would from the console
    pub fn call_verify(&self, name: &str) -> Option<String> {
        let mut state = self.state();
        let hook = state.globals.get(name).cloned()?;
        state.push_console(hook.log_line);
        Some(hook.sentinel)
    }

    pub fn node(&self, id: &str) -> Option<HiddenNode> {
        self.state().nodes.iter().find(|n| n.id == id).cloned()
    }

    pub fn console_lines(&self) -> Vec<String> {
        self.state().console.clone()
    }

    pub fn snapshot(&self) -> PageSnapshot {
        let state = self.state();
        let local_storage = state
            .storage_keys
            .iter()
            .filter_map(|key| self.storage_get(key).map(|value| (key.clone(), value)))
            .collect();

        PageSnapshot {
            nodes: state.nodes.clone(),
            console: state.console.clone(),
            globals: state.globals.keys().cloned().collect(),
            local_storage,
        }
    }
}

impl Page for HeadlessPage {
    fn insert_node(&self, node: HiddenNode) {
        let mut state = self.state();
        state.nodes.retain(|n| n.id != node.id);
        state.nodes.push(node);
    }

    fn remove_node(&self, id: &str) -> bool {
        let mut state = self.state();
        let before = state.nodes.len();
        state.nodes.retain(|n| n.id != id);
        state.nodes.len() != before
    }

    fn console_log(&self, line: String) {
        tracing::trace!(target: "page_console", "{}", line);
        self.state().push_console(line);
    }

    fn register_global(&self, name: &str, hook: VerifyHook) {
        self.state().globals.insert(name.to_string(), hook);
    }

    fn remove_global(&self, name: &str) -> bool {
        self.state().globals.remove(name).is_some()
    }

    fn storage_set(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            tracing::warn!(key = %key, "page storage write failed: {}", e);
            return;
        }
        self.state().storage_keys.insert(key.to_string());
    }

    fn storage_get(&self, key: &str) -> Option<String> {
        self.storage.get(key).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MemoryStore;

    fn page() -> HeadlessPage {
        HeadlessPage::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_nodes_replace_by_id() {
        let page = page();
        let node = |text: &str| HiddenNode {
            id: "marker".to_string(),
            attributes: BTreeMap::new(),
            text: text.to_string(),
        };
        page.insert_node(node("one"));
        page.insert_node(node("two"));

        let snapshot = page.snapshot();
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].text, "two");
        assert!(page.remove_node("marker"));
        assert!(!page.remove_node("marker"));
    }

    #[test]
    fn test_verify_logs_and_returns_sentinel() {
        let page = page();
        page.register_global(
            "__ns",
            VerifyHook {
                log_line: "called".to_string(),
                sentinel: "OK".to_string(),
            },
        );

        assert_eq!(page.call_verify("__ns").as_deref(), Some("OK"));
        assert_eq!(page.console_lines(), vec!["called".to_string()]);
        assert!(page.remove_global("__ns"));
        assert_eq!(page.call_verify("__ns"), None);
    }

    #[test]
    fn test_console_keeps_only_recent_lines() {
        let page = page();
        page.console_log("first".to_string());
        page.register_global(
            "__ns",
            VerifyHook {
                log_line: "called".to_string(),
                sentinel: "OK".to_string(),
            },
        );
        for _ in 0..CONSOLE_HISTORY_LIMIT + 50 {
            page.call_verify("__ns");
        }

        let lines = page.console_lines();
        assert_eq!(lines.len(), CONSOLE_HISTORY_LIMIT);
        assert!(lines.iter().all(|l| l == "called"));
    }

    #[test]
    fn test_snapshot_shows_storage_written_through_page() {
        let page = page();
        page.storage_set("challenge_xor_key_h", "KEY001");
        assert_eq!(
            page.snapshot().local_storage.get("challenge_xor_key_h").map(String::as_str),
            Some("KEY001")
        );
    }
}
