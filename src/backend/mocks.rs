// Scripted backend for tests - no network, every call recorded

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::backend::{BackendError, TaskBackend};
use crate::tasks::types::{TaskId, TaskKindId};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Start {
        kind: TaskKindId,
        body: Option<Value>,
    },
    Status {
        kind: TaskKindId,
        id: TaskId,
    },
}

#[derive(Debug, Default)]
struct Script {
    starts: HashMap<TaskKindId, VecDeque<Result<TaskId, BackendError>>>,
    statuses: HashMap<TaskKindId, VecDeque<Result<Value, BackendError>>>,
    issued: HashMap<TaskKindId, u32>,
    calls: Vec<BackendCall>,
}

/// Backend that replays queued responses per task kind.
///
/// Start calls with nothing queued succeed with `<kind>-<n>` ids. The last
/// queued status response repeats forever, so a script ending in `running`
/// keeps the task alive.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_start(&self, kind: TaskKindId, result: Result<TaskId, BackendError>) {
        let mut script = self.script.lock().unwrap();
        script.starts.entry(kind).or_default().push_back(result);
    }

    pub fn push_status(&self, kind: TaskKindId, body: Value) {
        let mut script = self.script.lock().unwrap();
        script.statuses.entry(kind).or_default().push_back(Ok(body));
    }

    pub fn push_status_error(&self, kind: TaskKindId, err: BackendError) {
        let mut script = self.script.lock().unwrap();
        script.statuses.entry(kind).or_default().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn start_calls(&self, kind: TaskKindId) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::Start { kind: k, .. } if *k == kind))
            .count()
    }

    pub fn status_calls(&self, kind: TaskKindId) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::Status { kind: k, .. } if *k == kind))
            .count()
    }

    /// Body of the most recent start call for `kind`
    pub fn last_start_body(&self, kind: TaskKindId) -> Option<Value> {
        self.calls().into_iter().rev().find_map(|call| match call {
            BackendCall::Start { kind: k, body } if k == kind => body,
            _ => None,
        })
    }
}

#[async_trait]
impl TaskBackend for ScriptedBackend {
    async fn start_task(
        &self,
        kind: TaskKindId,
        body: Option<Value>,
    ) -> Result<TaskId, BackendError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(BackendCall::Start { kind, body });
        if let Some(result) = script.starts.get_mut(&kind).and_then(VecDeque::pop_front) {
            return result;
        }
        let n = script.issued.entry(kind).or_insert(0);
        *n += 1;
        let resource = match kind {
            TaskKindId::Validation => "validation",
            TaskKindId::Import => "import",
            TaskKindId::Delete => "delete",
            TaskKindId::Export => "export",
        };
        Ok(TaskId::new(format!("{resource}-{n}")))
    }

    async fn fetch_status(&self, kind: TaskKindId, id: &TaskId) -> Result<Value, BackendError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(BackendCall::Status {
            kind,
            id: id.clone(),
        });
        let queue = script.statuses.entry(kind).or_default();
        match queue.len() {
            0 => Ok(serde_json::json!({"status": "running"})),
            1 => queue[0].clone(),
            _ => queue
                .pop_front()
                .unwrap_or_else(|| Ok(serde_json::json!({"status": "running"}))),
        }
    }
}
