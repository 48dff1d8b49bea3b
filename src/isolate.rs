//! Isolate scopes.
//!
//! An isolate binds three things for the duration of a nested region of an
//! operation: the owner the values belong to, the codec used for nested
//! values, and a local identity registry that starts empty when the scope
//! is entered. The stack of isolates mirrors the write-side call structure
//! and must be pushed and popped identically on the read side.

use std::rc::Rc;

use crate::codec::Codec;
use crate::identity::{ReadIdentities, WriteIdentities};
use crate::owner::Owner;

pub(crate) struct WriteIsolate {
    pub(crate) owner: Owner,
    pub(crate) codec: Rc<dyn Codec>,
    pub(crate) identities: WriteIdentities,
}

impl WriteIsolate {
    pub(crate) fn new(owner: Owner, codec: Rc<dyn Codec>) -> Self {
        WriteIsolate {
            owner,
            codec,
            identities: WriteIdentities::new(),
        }
    }
}

pub(crate) struct ReadIsolate {
    pub(crate) owner: Owner,
    pub(crate) codec: Rc<dyn Codec>,
    pub(crate) identities: ReadIdentities,
}

impl ReadIsolate {
    pub(crate) fn new(owner: Owner, codec: Rc<dyn Codec>) -> Self {
        ReadIsolate {
            owner,
            codec,
            identities: ReadIdentities::new(),
        }
    }
}

/// Stack of isolate scopes. The root scope is installed at construction and
/// stays for the whole operation; popping it is a protocol violation.
pub(crate) struct IsolateStack<T> {
    frames: Vec<T>,
}

impl<T> IsolateStack<T> {
    pub(crate) fn new(root: T) -> Self {
        IsolateStack { frames: vec![root] }
    }

    pub(crate) fn top(&self) -> &T {
        self.frames.last().unwrap_or_else(|| panic!("isolate stack is empty"))
    }

    pub(crate) fn top_mut(&mut self) -> &mut T {
        self.frames.last_mut().unwrap_or_else(|| panic!("isolate stack is empty"))
    }

    pub(crate) fn push(&mut self, frame: T) {
        self.frames.push(frame);
    }

    pub(crate) fn pop(&mut self) {
        assert!(
            self.frames.len() > 1,
            "isolate stack underflow: the root isolate cannot be popped"
        );
        self.frames.pop();
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }
}
