#![allow(dead_code)]

use masrof_core::api::ApiResponse;
use masrof_core::store::{MemorySlots, SlotKey, SlotStore, StoreError};
use masrof_core::transport::{Transport, TransportError};
use masrof_core::{Notice, Surface, SyncClient, SyncConfig, ViewHook};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fake remote service. Scriptable per-action responses and failures, an
/// online switch, optional latency, and a full log of every body received.
pub struct ScriptedTransport {
    online: AtomicBool,
    latency_ms: AtomicU64,
    responses: Mutex<HashMap<String, Value>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Value>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            responses: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedTransport {
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Delay every call; lets a test overlap work with an in-flight request.
    pub fn set_latency(&self, ms: u64) {
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    pub fn respond(&self, action: &str, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(action.to_owned(), body);
    }

    pub fn fail_action(&self, action: &str) {
        self.failing.lock().unwrap().insert(action.to_owned());
    }

    pub fn recover_action(&self, action: &str) {
        self.failing.lock().unwrap().remove(action);
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actions_called(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|body| body["action"].as_str().unwrap_or("?").to_owned())
            .collect()
    }

    pub fn count_action(&self, action: &str) -> usize {
        self.actions_called().iter().filter(|a| a == &action).count()
    }

    pub fn bodies_of(&self, action: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|body| body["action"] == action)
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, body: &Value) -> Result<ApiResponse, TransportError> {
        self.calls.lock().unwrap().push(body.clone());
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("network is down".into()));
        }
        let action = body["action"].as_str().unwrap_or_default();
        if self.failing.lock().unwrap().contains(action) {
            return Err(TransportError::Rejected(format!("{action} failed")));
        }
        let canned = self.responses.lock().unwrap().get(action).cloned();
        Ok(ApiResponse::new(canned.unwrap_or_else(|| json!({ "ok": true }))))
    }
}

/// Records every notice and invalidation the core emits.
#[derive(Default)]
pub struct RecordingHook {
    notices: Mutex<Vec<Notice>>,
    invalidations: Mutex<Vec<Surface>>,
}

impl RecordingHook {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn invalidation_count(&self, surface: Surface) -> usize {
        self.invalidations
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == surface)
            .count()
    }
}

impl ViewHook for RecordingHook {
    fn notice(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    fn invalidate(&self, surface: Surface) {
        self.invalidations.lock().unwrap().push(surface);
    }
}

/// In-memory store whose writes can be made to fail on demand.
pub struct FailingSlots {
    inner: MemorySlots,
    fail_writes: AtomicBool,
}

impl Default for FailingSlots {
    fn default() -> Self {
        Self {
            inner: MemorySlots::new(),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl FailingSlots {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SlotStore for FailingSlots {
    async fn read(&self, key: &SlotKey) -> Result<Option<String>, StoreError> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &SlotKey, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "slot write refused",
            )));
        }
        self.inner.write(key, value).await
    }

    async fn remove(&self, key: &SlotKey) -> Result<(), StoreError> {
        self.inner.remove(key).await
    }
}

pub struct TestRig {
    pub transport: Arc<ScriptedTransport>,
    pub slots: Arc<MemorySlots>,
    pub hook: Arc<RecordingHook>,
    pub client: SyncClient,
}

pub fn rig() -> TestRig {
    rig_with_config(SyncConfig::default())
}

pub fn rig_with_config(config: SyncConfig) -> TestRig {
    let transport = Arc::new(ScriptedTransport::default());
    let slots = Arc::new(MemorySlots::new());
    let hook = Arc::new(RecordingHook::default());
    let client = SyncClient::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&slots) as Arc<dyn SlotStore>,
        Arc::clone(&hook) as Arc<dyn ViewHook>,
        config,
    )
    .expect("default config is valid");
    TestRig {
        transport,
        slots,
        hook,
        client,
    }
}
