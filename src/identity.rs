//! Instance identity tracking.
//!
//! Encoded graphs preserve object identity: the first encounter of an
//! instance writes its full state under a fresh small id, later encounters
//! write the id alone. [`WriteIdentities`] hands out ids on the write side,
//! [`ReadIdentities`] maps them back to instances on the read side, and
//! [`CircularReferences`] tracks the set of instances currently mid-encode
//! so cycles are observable.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

/// A dynamically typed, shared, heap-allocated value from the host model.
///
/// Cloning an `Instance` clones the handle, never the value, so identity is
/// the allocation itself.
pub type Instance = Rc<dyn Any>;

/// Identity key of an instance: the address of its allocation, erased to a
/// thin pointer so two handles to the same allocation always compare equal.
pub fn instance_key(instance: &Instance) -> usize {
    Rc::as_ptr(instance) as *const () as usize
}

/// Write-side identity registry. Assigns ids monotonically from zero in
/// order of first encounter.
///
/// The registry keeps a clone of every registered handle, which pins the
/// allocation for the lifetime of the registry. Without that, a dropped
/// instance could free its address for reuse and a later, unrelated
/// instance could alias a stale id.
#[derive(Default)]
pub struct WriteIdentities {
    ids: HashMap<usize, u32>,
    pinned: Vec<Instance>,
}

impl WriteIdentities {
    pub fn new() -> Self {
        WriteIdentities::default()
    }

    /// The id previously assigned to this instance, if any.
    pub fn id_of(&self, instance: &Instance) -> Option<u32> {
        self.ids.get(&instance_key(instance)).copied()
    }

    /// Assigns the next id to an instance seen for the first time.
    ///
    /// Panics if the instance already has an id. Callers are expected to
    /// check [`WriteIdentities::id_of`] first.
    pub fn assign(&mut self, instance: Instance) -> u32 {
        let id = self.pinned.len() as u32;
        if let Some(prev) = self.ids.insert(instance_key(&instance), id) {
            panic!("instance already has identity {prev}");
        }
        self.pinned.push(instance);
        id
    }

    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }
}

/// Read-side identity registry, mapping decoded ids back to instances.
#[derive(Default)]
pub struct ReadIdentities {
    instances: HashMap<u32, Instance>,
}

impl ReadIdentities {
    pub fn new() -> Self {
        ReadIdentities::default()
    }

    pub fn get(&self, id: u32) -> Option<Instance> {
        self.instances.get(&id).cloned()
    }

    /// Registers the instance decoded under `id`.
    ///
    /// Decoders must register an instance before decoding any state that
    /// could refer back to it. Panics if the id is already taken; one id
    /// maps to exactly one instance per registry.
    pub fn put(&mut self, id: u32, instance: Instance) {
        let prev = self.instances.insert(id, instance);
        assert!(prev.is_none(), "instance id {id} registered twice");
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// The chain of instances currently being encoded on the call stack.
///
/// Enter and leave calls must nest like the call stack they mirror; leaving
/// out of order is a codec bug and panics.
#[derive(Default)]
pub struct CircularReferences {
    encoding: Vec<Instance>,
}

impl CircularReferences {
    pub fn new() -> Self {
        CircularReferences::default()
    }

    /// True while `instance` is somewhere on the current encode chain, which
    /// means a reference to it from below closes a cycle.
    pub fn contains(&self, instance: &Instance) -> bool {
        let key = instance_key(instance);
        self.encoding.iter().any(|e| instance_key(e) == key)
    }

    pub fn enter(&mut self, instance: &Instance) {
        self.encoding.push(instance.clone());
    }

    pub fn leave(&mut self, instance: &Instance) {
        let top = self
            .encoding
            .pop()
            .unwrap_or_else(|| panic!("circular reference tracker is empty"));
        assert!(
            instance_key(&top) == instance_key(instance),
            "circular reference tracker left out of order"
        );
    }

    pub fn depth(&self) -> usize {
        self.encoding.len()
    }
}
