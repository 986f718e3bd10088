//! In-process fake of the remote API for engine tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use super::gateway::{GatewayError, GatewayResult, PullResponse, RemoteGateway, RemoteRecord};
use crate::models::ResourceKind;

/// Pauses write calls until released.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(ResourceKind, serde_json::Value),
    Update(ResourceKind, String, serde_json::Value),
    Delete(ResourceKind, String),
    Pull(Option<i64>),
}

#[derive(Default)]
struct ServerState {
    records: BTreeMap<(ResourceKind, String), RemoteRecord>,
    clock: i64,
    next_id: u64,
    calls: Vec<Call>,
    write_failures: VecDeque<GatewayError>,
    always_fail_writes: Option<GatewayError>,
    pull_failure: Option<GatewayError>,
    next_pull_failure: Option<GatewayError>,
    lost_create_responses: usize,
    gate: Option<Arc<Gate>>,
}

impl ServerState {
    fn tick(&mut self) -> i64 {
        self.clock = crate::util::now_millis().max(self.clock + 1);
        self.clock
    }

    fn injected_failure(&mut self) -> Option<GatewayError> {
        self.write_failures
            .pop_front()
            .or_else(|| self.always_fail_writes.clone())
    }
}

/// Shared server; clones talk to the same state, so two engines can act as
/// two devices.
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn write_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::Pull(_)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Fail the next write calls, in order.
    pub fn fail_next_writes(&self, errors: impl IntoIterator<Item = GatewayError>) {
        self.state.lock().unwrap().write_failures.extend(errors);
    }

    pub fn fail_all_writes(&self, error: Option<GatewayError>) {
        self.state.lock().unwrap().always_fail_writes = error;
    }

    pub fn fail_pulls(&self, error: Option<GatewayError>) {
        self.state.lock().unwrap().pull_failure = error;
    }

    /// Fail only the next pull.
    pub fn fail_next_pull(&self, error: GatewayError) {
        self.state.lock().unwrap().next_pull_failure = Some(error);
    }

    /// Commit the next creates but answer them with a timeout.
    pub fn lose_next_create_responses(&self, count: usize) {
        self.state.lock().unwrap().lost_create_responses = count;
    }

    /// Block write calls until `release` is notified.
    pub fn hold_writes(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.state.lock().unwrap().gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn record(&self, kind: ResourceKind, server_id: &str) -> Option<RemoteRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&(kind, server_id.to_string()))
            .cloned()
    }

    pub fn live_records(&self, kind: ResourceKind) -> Vec<RemoteRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|((k, _), record)| *k == kind && !record.deleted)
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Change a record as another client would, at the server's current time.
    pub fn edit_remote(&self, kind: ResourceKind, server_id: &str, fields: serde_json::Value) -> i64 {
        let mut state = self.state.lock().unwrap();
        let updated_at = state.tick();
        let record = state
            .records
            .get_mut(&(kind, server_id.to_string()))
            .expect("record exists");
        record.fields = fields;
        record.updated_at = updated_at;
        updated_at
    }

    async fn pass_gate(&self) {
        let gate = self.state.lock().unwrap().gate.take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }

    fn begin_write(&self, call: Call) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.injected_failure() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl RemoteGateway for FakeServer {
    async fn create(
        &self,
        kind: ResourceKind,
        payload: &serde_json::Value,
    ) -> GatewayResult<RemoteRecord> {
        self.pass_gate().await;
        self.begin_write(Call::Create(kind, payload.clone()))?;

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let record = RemoteRecord {
            server_id: format!("srv-{}", state.next_id),
            updated_at: state.tick(),
            deleted: false,
            fields: payload.clone(),
        };
        state
            .records
            .insert((kind, record.server_id.clone()), record.clone());
        if state.lost_create_responses > 0 {
            state.lost_create_responses -= 1;
            return Err(GatewayError::Transient("response timed out".to_string()));
        }
        Ok(record)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        server_id: &str,
        payload: &serde_json::Value,
    ) -> GatewayResult<RemoteRecord> {
        self.pass_gate().await;
        self.begin_write(Call::Update(kind, server_id.to_string(), payload.clone()))?;

        let mut state = self.state.lock().unwrap();
        let updated_at = state.tick();
        let Some(record) = state.records.get_mut(&(kind, server_id.to_string())) else {
            return Err(GatewayError::Permanent {
                status: Some(404),
                message: format!("{kind} {server_id} not found"),
            });
        };
        record.fields = payload.clone();
        record.updated_at = updated_at;
        record.deleted = false;
        Ok(record.clone())
    }

    async fn delete(&self, kind: ResourceKind, server_id: &str) -> GatewayResult<()> {
        self.pass_gate().await;
        self.begin_write(Call::Delete(kind, server_id.to_string()))?;

        let mut state = self.state.lock().unwrap();
        let updated_at = state.tick();
        if let Some(record) = state.records.get_mut(&(kind, server_id.to_string())) {
            record.deleted = true;
            record.updated_at = updated_at;
        }
        Ok(())
    }

    async fn pull_changes(&self, since: Option<i64>) -> GatewayResult<PullResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Pull(since));
        if let Some(error) = state.next_pull_failure.take() {
            return Err(error);
        }
        if let Some(error) = state.pull_failure.clone() {
            return Err(error);
        }

        let as_of = state.tick();
        let mut resources: BTreeMap<ResourceKind, Vec<RemoteRecord>> = BTreeMap::new();
        for ((kind, _), record) in &state.records {
            if since.is_none_or(|since| record.updated_at > since) {
                resources.entry(*kind).or_default().push(record.clone());
            }
        }
        Ok(PullResponse { as_of, resources })
    }
}
