//! Deferred values.
//!
//! A deferred value stands for the output of work that may not have run
//! yet. Encoding one suspends the whole write operation until the producer
//! completes it; the suspended operation resumes with its full isolate and
//! trace state intact. On decode the value always arrives resolved, since
//! only the resolved form is ever written.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use futures::channel::oneshot;

use crate::codec::{Codec, CodecError};
use crate::context::{ReadContext, WriteContext};
use crate::identity::Instance;

enum DeferredState {
    Pending(oneshot::Receiver<Instance>),
    Resolving,
    Ready(Instance),
    Abandoned,
}

/// A value that may not exist yet.
pub struct DeferredValue {
    state: RefCell<DeferredState>,
}

impl DeferredValue {
    /// A deferred value whose producer has not run yet, together with the
    /// handle the producer completes it through.
    pub fn pending() -> (Rc<DeferredValue>, DeferredHandle) {
        let (tx, rx) = oneshot::channel();
        let value = Rc::new(DeferredValue {
            state: RefCell::new(DeferredState::Pending(rx)),
        });
        (value, DeferredHandle { tx })
    }

    /// A deferred value that is already available.
    pub fn ready(value: Instance) -> Rc<DeferredValue> {
        Rc::new(DeferredValue {
            state: RefCell::new(DeferredState::Ready(value)),
        })
    }

    /// The value, if it has already been resolved.
    pub fn peek(&self) -> Option<Instance> {
        match &*self.state.borrow() {
            DeferredState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Waits for the value, suspending until the producer completes it.
    ///
    /// Fails with [`CodecError::DeferredAbandoned`] if the handle was
    /// dropped without completing, and [`CodecError::DeferredCycle`] if
    /// resolution reaches this value again while it is being resolved.
    pub async fn resolve(&self) -> Result<Instance, CodecError> {
        let state = self.state.replace(DeferredState::Resolving);
        match state {
            DeferredState::Ready(value) => {
                self.state.replace(DeferredState::Ready(value.clone()));
                Ok(value)
            }
            DeferredState::Resolving => Err(CodecError::DeferredCycle),
            DeferredState::Abandoned => {
                self.state.replace(DeferredState::Abandoned);
                Err(CodecError::DeferredAbandoned)
            }
            DeferredState::Pending(rx) => match rx.await {
                Ok(value) => {
                    self.state.replace(DeferredState::Ready(value.clone()));
                    Ok(value)
                }
                Err(oneshot::Canceled) => {
                    self.state.replace(DeferredState::Abandoned);
                    Err(CodecError::DeferredAbandoned)
                }
            },
        }
    }
}

/// Completes a pending [`DeferredValue`], waking any suspended resolver.
pub struct DeferredHandle {
    tx: oneshot::Sender<Instance>,
}

impl DeferredHandle {
    pub fn complete(self, value: Instance) {
        let _ = self.tx.send(value);
    }
}

/// Codec that carries the resolved form of a deferred value.
///
/// Encode suspends until the producer completes; this is the suspension
/// point of the engine. Decode yields an already resolved `DeferredValue`
/// and never suspends.
pub struct DeferredCodec;

#[async_trait(?Send)]
impl Codec for DeferredCodec {
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError> {
        let deferred =
            value
                .clone()
                .downcast::<DeferredValue>()
                .map_err(|_| CodecError::InvalidValue {
                    reason: "expected a deferred value".into(),
                })?;
        let inner = deferred.resolve().await?;
        ctx.write_value(&inner).await
    }

    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError> {
        let inner = ctx.read_value().await?;
        let resolved: Instance = DeferredValue::ready(inner);
        Ok(resolved)
    }
}
