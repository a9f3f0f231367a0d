//! Operator selection: which models, and which classes per model, are
//! currently wanted on screen.
//!
//! [`OperatorSelection`] is the local source of truth for display
//! filtering. [`SelectionCell`] is the single-slot live holder through
//! which long-lived handlers read it, so a handler registered once at
//! connection time always observes the latest operator edit.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::CoreError;
use crate::types::DetectionBox;

/// Client-local, ephemeral selection state.
///
/// Invariant: `model_class_selections` only has entries for models in
/// `selected_models`, and never holds an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorSelection {
    selected_models: BTreeSet<String>,
    model_class_selections: BTreeMap<String, BTreeSet<String>>,
}

impl OperatorSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_models(&self) -> &BTreeSet<String> {
        &self.selected_models
    }

    pub fn is_model_selected(&self, model: &str) -> bool {
        self.selected_models.contains(model)
    }

    /// Selected classes for `model`, if any.
    pub fn classes_for(&self, model: &str) -> Option<&BTreeSet<String>> {
        self.model_class_selections.get(model)
    }

    /// Select or deselect a model.
    ///
    /// Deselecting purges the model's class selection in the same step.
    /// Returns `true` when the selection changed.
    pub fn set_model_selected(&mut self, model: &str, selected: bool) -> bool {
        if selected {
            self.selected_models.insert(model.to_string())
        } else {
            self.model_class_selections.remove(model);
            self.selected_models.remove(model)
        }
    }

    /// Replace the class selection of a selected model.
    ///
    /// An empty set removes the model's entry.
    pub fn set_model_classes<I, S>(&mut self, model: &str, classes: I) -> Result<bool, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.is_model_selected(model) {
            return Err(CoreError::ModelNotSelected(model.to_string()));
        }
        let classes: BTreeSet<String> = classes.into_iter().map(Into::into).collect();
        let changed = if classes.is_empty() {
            self.model_class_selections.remove(model).is_some()
        } else {
            self.model_class_selections.insert(model.to_string(), classes.clone()) != Some(classes)
        };
        Ok(changed)
    }

    /// Add or remove a single class for a selected model.
    pub fn toggle_class(&mut self, model: &str, cls: &str, on: bool) -> Result<bool, CoreError> {
        if !self.is_model_selected(model) {
            return Err(CoreError::ModelNotSelected(model.to_string()));
        }
        if on {
            Ok(self
                .model_class_selections
                .entry(model.to_string())
                .or_default()
                .insert(cls.to_string()))
        } else {
            let Some(set) = self.model_class_selections.get_mut(model) else {
                return Ok(false);
            };
            let removed = set.remove(cls);
            if set.is_empty() {
                self.model_class_selections.remove(model);
            }
            Ok(removed)
        }
    }

    /// Whether `b` may be displayed. Boxes without a model never are.
    pub fn is_eligible(&self, b: &DetectionBox) -> bool {
        let Some(model) = b.model.as_deref() else {
            return false;
        };
        self.selected_models.contains(model)
            && self
                .model_class_selections
                .get(model)
                .is_some_and(|classes| classes.contains(&b.cls))
    }

    /// Selected models that have at least one selected class.
    pub fn active_models(&self) -> impl Iterator<Item = &str> {
        self.selected_models
            .iter()
            .filter(|m| {
                self.model_class_selections
                    .get(m.as_str())
                    .is_some_and(|c| !c.is_empty())
            })
            .map(String::as_str)
    }

    /// True when the detection session should be running.
    pub fn has_active_classes(&self) -> bool {
        self.active_models().next().is_some()
    }

    /// Full label-to-enabled map for `model`.
    ///
    /// Every entry of `labels` is present; a selected class missing from
    /// `labels` is still included as enabled.
    pub fn class_map(&self, model: &str, labels: &[String]) -> BTreeMap<String, bool> {
        let selected = self.model_class_selections.get(model);
        let mut map: BTreeMap<String, bool> = labels
            .iter()
            .map(|l| (l.clone(), selected.is_some_and(|s| s.contains(l))))
            .collect();
        if let Some(selected) = selected {
            for cls in selected {
                map.entry(cls.clone()).or_insert(true);
            }
        }
        map
    }
}

/// Single-slot shared holder for the live [`OperatorSelection`].
///
/// Cloning yields another handle to the same slot. Readers call
/// [`current`](Self::current) on every use instead of keeping a copy.
#[derive(Debug, Clone)]
pub struct SelectionCell {
    tx: Arc<watch::Sender<OperatorSelection>>,
}

impl Default for SelectionCell {
    fn default() -> Self {
        Self::new(OperatorSelection::default())
    }
}

impl SelectionCell {
    pub fn new(initial: OperatorSelection) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Snapshot of the latest selection.
    pub fn current(&self) -> OperatorSelection {
        self.tx.borrow().clone()
    }

    /// Run `f` against the latest selection without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&OperatorSelection) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Mutate the selection in place; `f` reports whether it changed
    /// anything. Subscribers are notified only on change.
    pub fn update(&self, f: impl FnOnce(&mut OperatorSelection) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Fallible variant of [`update`](Self::update).
    pub fn try_update<E>(
        &self,
        f: impl FnOnce(&mut OperatorSelection) -> Result<bool, E>,
    ) -> Result<bool, E> {
        let mut result = Ok(false);
        self.tx.send_if_modified(|sel| {
            result = f(sel);
            matches!(result, Ok(true))
        });
        result
    }

    /// Change-notified receiver for reconciliation and view clearing.
    pub fn subscribe(&self) -> watch::Receiver<OperatorSelection> {
        self.tx.subscribe()
    }
}
