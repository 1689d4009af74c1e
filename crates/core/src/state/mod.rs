//! Keyed runtime state for visualizations.
//!
//! Every registered style owns one [`StateRecord`], seeded from its
//! [`StateTemplate`] and reset to a fresh copy at the start of each render.
//! Records are never removed; the same record is reused across words and
//! re-selections of the style.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::timeline::{Scheduler, TaskHandle};
use crate::Result;

pub type StateFields = Map<String, Value>;

/// Long-lived handle that survives resets of a resource-backed record, such
/// as an audio context.
pub type PersistentResource = Rc<dyn Any>;

pub type SharedStateStore = Rc<RefCell<StateStore>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Ephemeral,
    ResourceBacked,
}

/// Declares every field a style's state may hold, with neutral defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTemplate {
    fields: StateFields,
    kind: TemplateKind,
}

impl Default for StateTemplate {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTemplate {
    pub fn new() -> Self {
        Self {
            fields: StateFields::new(),
            kind: TemplateKind::Ephemeral,
        }
    }

    pub fn field(mut self, key: impl Into<String>, default: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), default.into());
        self
    }

    /// Marks records built from this template as owning a persistent
    /// resource that is carried across resets.
    pub fn resource_backed(mut self) -> Self {
        self.kind = TemplateKind::ResourceBacked;
        self
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn fields(&self) -> &StateFields {
        &self.fields
    }

    pub fn declares(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    fn instantiate(self: &Rc<Self>) -> StateRecord {
        let kind = match self.kind {
            TemplateKind::Ephemeral => RecordKind::Ephemeral,
            TemplateKind::ResourceBacked => RecordKind::ResourceBacked { resource: None },
        };
        StateRecord {
            fields: self.fields.clone(),
            kind,
            pending: None,
            generation: 0,
            template: Rc::clone(self),
        }
    }
}

pub enum RecordKind {
    Ephemeral,
    ResourceBacked { resource: Option<PersistentResource> },
}

impl fmt::Debug for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ephemeral => f.write_str("Ephemeral"),
            Self::ResourceBacked { resource } => f
                .debug_struct("ResourceBacked")
                .field("resource", &resource.is_some())
                .finish(),
        }
    }
}

/// Live state of one visualization.
#[derive(Debug)]
pub struct StateRecord {
    fields: StateFields,
    kind: RecordKind,
    pending: Option<TaskHandle>,
    generation: u64,
    template: Rc<StateTemplate>,
}

impl StateRecord {
    pub fn fields(&self) -> &StateFields {
        &self.fields
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(Value::as_u64)
    }

    pub fn bool(&self, key: &str) -> bool {
        self.fields
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Deserializes a field. `null` and shape mismatches read as `None`, so
    /// redraw code can treat them as "not populated yet".
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.fields.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|err| tracing::debug!(key, %err, "state field has unexpected shape"))
                .ok(),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        if !self.template.declares(key) {
            tracing::warn!(key, "writing a field the state template does not declare");
        }
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn write<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    /// Shallow merge: every top-level entry of `partial` replaces the field
    /// of the same name.
    pub fn merge(&mut self, partial: StateFields) {
        for (key, value) in partial {
            self.set(&key, value);
        }
    }

    pub fn pending(&self) -> Option<TaskHandle> {
        self.pending
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn is_resource_backed(&self) -> bool {
        matches!(self.kind, RecordKind::ResourceBacked { .. })
    }

    pub fn resource(&self) -> Option<&PersistentResource> {
        match &self.kind {
            RecordKind::ResourceBacked { resource } => resource.as_ref(),
            RecordKind::Ephemeral => None,
        }
    }

    /// Typed view of the persistent resource.
    pub fn resource_as<T: 'static>(&self) -> Option<Rc<T>> {
        self.resource()
            .and_then(|resource| Rc::clone(resource).downcast::<T>().ok())
    }

    /// Attaches the persistent resource. Ephemeral records refuse.
    pub fn set_resource(&mut self, handle: PersistentResource) -> bool {
        match &mut self.kind {
            RecordKind::ResourceBacked { resource } => {
                *resource = Some(handle);
                true
            }
            RecordKind::Ephemeral => {
                tracing::warn!("ephemeral state cannot hold a persistent resource");
                false
            }
        }
    }
}

/// Owner of every style's template and live record.
pub struct StateStore {
    scheduler: Scheduler,
    templates: HashMap<String, Rc<StateTemplate>>,
    records: HashMap<String, StateRecord>,
}

impl StateStore {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            templates: HashMap::new(),
            records: HashMap::new(),
        }
    }

    pub fn shared(self) -> SharedStateStore {
        Rc::new(RefCell::new(self))
    }

    /// Stores the template and seeds a record when none exists yet.
    pub fn register_template(&mut self, key: &str, template: StateTemplate) {
        let template = Rc::new(template);
        self.records
            .entry(key.to_string())
            .or_insert_with(|| template.instantiate());
        self.templates.insert(key.to_string(), template);
    }

    pub fn template(&self, key: &str) -> Option<&StateTemplate> {
        self.templates.get(key).map(Rc::as_ref)
    }

    pub fn get(&self, key: &str) -> Option<&StateRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut StateRecord> {
        self.records.get_mut(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Runs `f` against the record, if the key is registered.
    pub fn with_record_mut<R>(
        &mut self,
        key: &str,
        f: impl FnOnce(&mut StateRecord) -> R,
    ) -> Option<R> {
        self.records.get_mut(key).map(f)
    }

    /// Shallow-merges `partial` into the record. Unknown keys are ignored.
    pub fn update(&mut self, key: &str, partial: StateFields) {
        match self.records.get_mut(key) {
            Some(record) => record.merge(partial),
            None => tracing::debug!(key, "ignoring update for unknown state key"),
        }
    }

    /// Replaces the record with a fresh copy of its template. A
    /// resource-backed record keeps its persistent resource; the render
    /// generation also survives.
    pub fn reset_to_template(&mut self, key: &str) {
        let Some(template) = self.templates.get(key).cloned() else {
            tracing::debug!(key, "ignoring reset for unknown state key");
            return;
        };
        let mut fresh = template.instantiate();
        if let Some(previous) = self.records.remove(key) {
            if let Some(task) = previous.pending {
                self.scheduler.cancel(task);
            }
            fresh.generation = previous.generation;
            if let (
                RecordKind::ResourceBacked { resource },
                RecordKind::ResourceBacked {
                    resource: carried @ Some(_),
                },
            ) = (&mut fresh.kind, previous.kind)
            {
                *resource = carried;
            }
        }
        self.records.insert(key.to_string(), fresh);
    }

    /// Cancels the record's pending task, if any. Safe to call repeatedly.
    pub fn cancel_pending_animation(&mut self, key: &str) -> bool {
        let Some(task) = self
            .records
            .get_mut(key)
            .and_then(|record| record.pending.take())
        else {
            return false;
        };
        let cancelled = self.scheduler.cancel(task);
        tracing::trace!(key, ?task, cancelled, "cancelled pending animation");
        cancelled
    }

    /// Records the task now driving `key`. A different task still pending is
    /// cancelled so at most one stays queued per key.
    pub fn set_pending(&mut self, key: &str, task: TaskHandle) {
        let Some(record) = self.records.get_mut(key) else {
            self.scheduler.cancel(task);
            return;
        };
        if let Some(previous) = record.pending.replace(task) {
            if previous != task && self.scheduler.cancel(previous) {
                tracing::warn!(key, ?previous, "replaced a still pending animation task");
            }
        }
    }

    /// Forgets the recorded task without cancelling it, once it has run
    /// and scheduled nothing further.
    pub fn release_pending(&mut self, key: &str) -> Option<TaskHandle> {
        self.records
            .get_mut(key)
            .and_then(|record| record.pending.take())
    }

    /// Starts a new render run and returns its generation.
    pub fn begin_run(&mut self, key: &str) -> Option<u64> {
        self.records.get_mut(key).map(|record| {
            record.generation += 1;
            record.generation
        })
    }

    pub fn generation(&self, key: &str) -> Option<u64> {
        self.records.get(key).map(StateRecord::generation)
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("records", &self.records.len())
            .finish()
    }
}
