//! In-memory detection backend that records every call.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use vigil_core::backend::{DetectionBackend, SessionAck};
use vigil_core::error::BackendError;
use vigil_core::selection::{OperatorSelection, SelectionCell};
use vigil_core::types::{ModelConfig, ModelUpdate};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Update(String, ModelUpdate),
    Start,
    Stop,
}

#[derive(Default)]
pub struct FakeBackend {
    pub models: Vec<ModelConfig>,
    calls: Mutex<Vec<Call>>,
    start_error: Mutex<Option<String>>,
    failing_models: Mutex<HashSet<String>>,
}

impl FakeBackend {
    pub fn with_models(models: Vec<ModelConfig>) -> Self {
        Self {
            models,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn fail_start(&self, reason: &str) {
        *self.start_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn fail_updates_for(&self, model: &str) {
        self.failing_models.lock().unwrap().insert(model.to_string());
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DetectionBackend for FakeBackend {
    async fn list_models(&self) -> Result<Vec<ModelConfig>, BackendError> {
        self.record(Call::List);
        Ok(self.models.clone())
    }

    async fn update_model(&self, name: &str, update: &ModelUpdate) -> Result<(), BackendError> {
        self.record(Call::Update(name.to_string(), update.clone()));
        if self.failing_models.lock().unwrap().contains(name) {
            return Err(BackendError::Rejected {
                status: 500,
                reason: format!("registry write failed for {name}"),
            });
        }
        Ok(())
    }

    async fn start_detection(&self) -> Result<SessionAck, BackendError> {
        self.record(Call::Start);
        match self.start_error.lock().unwrap().clone() {
            Some(reason) => Err(BackendError::Rejected { status: 400, reason }),
            None => Ok(SessionAck {
                status: Some("started".into()),
                ..Default::default()
            }),
        }
    }

    async fn stop_detection(&self) -> Result<SessionAck, BackendError> {
        self.record(Call::Stop);
        Ok(SessionAck {
            status: Some("stopped".into()),
            ..Default::default()
        })
    }
}

pub fn model(name: &str, labels: &[&str]) -> ModelConfig {
    ModelConfig {
        name: name.to_string(),
        kind: "coco".to_string(),
        enabled: true,
        conf: 0.25,
        iou: 0.45,
        labels: labels.iter().map(|l| l.to_string()).collect(),
        enabled_classes: BTreeMap::new(),
    }
}

pub fn selection(entries: &[(&str, &[&str])]) -> OperatorSelection {
    let mut sel = OperatorSelection::new();
    for (model, classes) in entries {
        sel.set_model_selected(model, true);
        sel.set_model_classes(model, classes.iter().copied()).unwrap();
    }
    sel
}

/// Replace the whole selection held by `cell`.
pub fn set_selection(cell: &SelectionCell, entries: &[(&str, &[&str])]) {
    let next = selection(entries);
    cell.update(|sel| {
        let changed = *sel != next;
        *sel = next;
        changed
    });
}

pub fn class_map(pairs: &[(&str, bool)]) -> BTreeMap<String, bool> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}
