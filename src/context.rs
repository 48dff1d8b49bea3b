//! Write and read contexts.
//!
//! A context carries everything one encode or decode operation needs: the
//! byte stream, the isolate stack, the shared identity registry, the current
//! property trace, and the problem sink. Codecs receive a mutable context
//! and drive it; the scoped helpers (`with_isolate`, `with_codec`,
//! `with_record_trace`, `for_incompatible_type`, `with_immediate_mode`)
//! save state, run an action, and restore state on every exit path, so a
//! failing codec cannot leak a scope.
//!
//! Operations may suspend at any `write_value`/`read_value` call site.
//! Context state lives in the context itself, not in a thread local, so a
//! resumed operation continues exactly where it stopped.

use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;
use futures::FutureExt;

use crate::codec::{Codec, CodecError};
use crate::identity::{
    CircularReferences, Instance, ReadIdentities, WriteIdentities, instance_key,
};
use crate::isolate::{IsolateStack, ReadIsolate, WriteIsolate};
use crate::limits::Limits;
use crate::owner::Owner;
use crate::problems::{Problem, ProblemSink};
use crate::trace::PropertyTrace;
use crate::wire::{ByteSink, ByteSource, DecodeError};

/// Which identity registry an identity-preserving combinator works against.
#[derive(Clone, Copy)]
enum IdentityScope {
    /// The registry of the current isolate.
    Local,
    /// The registry shared by the whole operation.
    Shared,
}

/// Context for one encode operation.
pub struct WriteContext {
    sink: ByteSink,
    isolates: IsolateStack<WriteIsolate>,
    shared_identities: WriteIdentities,
    circular: CircularReferences,
    trace: PropertyTrace,
    problems: Rc<dyn ProblemSink>,
    tolerate_incompatible: bool,
}

impl WriteContext {
    pub fn new(codec: Rc<dyn Codec>, owner: Owner, problems: Rc<dyn ProblemSink>) -> Self {
        WriteContext {
            sink: ByteSink::new(),
            isolates: IsolateStack::new(WriteIsolate::new(owner, codec)),
            shared_identities: WriteIdentities::new(),
            circular: CircularReferences::new(),
            trace: PropertyTrace::root(),
            problems,
            tolerate_incompatible: false,
        }
    }

    /// Consumes the context and returns the encoded stream.
    pub fn into_bytes(self) -> Bytes {
        self.sink.into_bytes()
    }

    pub fn bytes_written(&self) -> usize {
        self.sink.len()
    }

    // Primitive writes, delegated to the wire layer.

    pub fn write_bool(&mut self, value: bool) -> Result<(), CodecError> {
        Ok(self.sink.write_bool(value)?)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), CodecError> {
        Ok(self.sink.write_u64(value)?)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), CodecError> {
        Ok(self.sink.write_i64(value)?)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), CodecError> {
        Ok(self.sink.write_f64(value)?)
    }

    pub fn write_str(&mut self, value: &str) -> Result<(), CodecError> {
        Ok(self.sink.write_str(value)?)
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), CodecError> {
        Ok(self.sink.write_bytes(value)?)
    }

    pub fn write_tag(&mut self, tag: u8) -> Result<(), CodecError> {
        Ok(self.sink.write_tag(tag)?)
    }

    pub fn write_small_id(&mut self, id: u32) -> Result<(), CodecError> {
        Ok(self.sink.write_small_id(id)?)
    }

    pub fn write_type_token(&mut self, token: &str) -> Result<(), CodecError> {
        Ok(self.sink.write_type_token(token)?)
    }

    pub fn write_sequence_len(&mut self, len: usize) -> Result<(), CodecError> {
        Ok(self.sink.write_sequence_len(len)?)
    }

    /// Writes one value through the codec of the current isolate.
    pub async fn write_value(&mut self, value: &Instance) -> Result<(), CodecError> {
        let codec = self.isolates.top().codec.clone();
        codec.encode(self, value).await
    }

    // Isolates.

    /// The owner of the current isolate.
    pub fn owner(&self) -> &Owner {
        &self.isolates.top().owner
    }

    pub fn isolate_depth(&self) -> usize {
        self.isolates.depth()
    }

    pub fn push_isolate(&mut self, owner: Owner, codec: Rc<dyn Codec>) {
        self.isolates.push(WriteIsolate::new(owner, codec));
    }

    /// Pops the current isolate. Every push must be matched by exactly one
    /// pop; prefer [`WriteContext::with_isolate`], which pairs them.
    pub fn pop_isolate(&mut self) {
        self.isolates.pop();
    }

    /// Runs `f` inside a fresh isolate bound to `owner` and `codec`. The
    /// isolate starts with an empty local identity registry and is popped
    /// whether or not `f` succeeds.
    ///
    /// The matching read must enter an isolate at the same point in the
    /// stream.
    pub async fn with_isolate<R>(
        &mut self,
        owner: Owner,
        codec: Rc<dyn Codec>,
        f: impl AsyncFnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        self.push_isolate(owner, codec);
        let result = f(self).await;
        self.pop_isolate();
        result
    }

    /// Runs `f` inside a fresh isolate that keeps the current owner but
    /// swaps the active codec.
    pub async fn with_codec<R>(
        &mut self,
        codec: Rc<dyn Codec>,
        f: impl AsyncFnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        let owner = self.isolates.top().owner.clone();
        self.with_isolate(owner, codec, f).await
    }

    // Identity.

    /// The id already assigned to `value` in the current isolate, if any.
    pub fn identity_of(&self, value: &Instance) -> Option<u32> {
        self.isolates.top().identities.id_of(value)
    }

    /// The id already assigned to `value` in the shared registry, if any.
    pub fn shared_identity_of(&self, value: &Instance) -> Option<u32> {
        self.shared_identities.id_of(value)
    }

    /// True while `value` is being encoded somewhere up the call chain, so
    /// a reference to it from the current position closes a cycle.
    pub fn currently_encoding(&self, value: &Instance) -> bool {
        self.circular.contains(value)
    }

    /// Encodes `value` at most once per isolate. The first encounter writes
    /// a fresh id followed by whatever `body` produces; later encounters
    /// write the id alone. Cycles are not an error, a value referring back
    /// to itself simply resolves to its already assigned id.
    pub async fn encode_preserving_identity(
        &mut self,
        value: &Instance,
        body: impl AsyncFnOnce(&mut Self) -> Result<(), CodecError>,
    ) -> Result<(), CodecError> {
        self.encode_identity(IdentityScope::Local, value, body).await
    }

    /// Like [`WriteContext::encode_preserving_identity`], but deduplicates
    /// against the registry shared by all isolates of this operation.
    pub async fn encode_preserving_shared_identity(
        &mut self,
        value: &Instance,
        body: impl AsyncFnOnce(&mut Self) -> Result<(), CodecError>,
    ) -> Result<(), CodecError> {
        self.encode_identity(IdentityScope::Shared, value, body).await
    }

    async fn encode_identity(
        &mut self,
        scope: IdentityScope,
        value: &Instance,
        body: impl AsyncFnOnce(&mut Self) -> Result<(), CodecError>,
    ) -> Result<(), CodecError> {
        let existing = match scope {
            IdentityScope::Local => self.isolates.top().identities.id_of(value),
            IdentityScope::Shared => self.shared_identities.id_of(value),
        };
        if let Some(id) = existing {
            return self.write_small_id(id);
        }
        let id = match scope {
            IdentityScope::Local => self.isolates.top_mut().identities.assign(value.clone()),
            IdentityScope::Shared => self.shared_identities.assign(value.clone()),
        };
        self.write_small_id(id)?;
        self.circular.enter(value);
        let result = body(self).await;
        self.circular.leave(value);
        result
    }

    // Traces and problems.

    /// The trace describing where in the graph this operation currently is.
    pub fn trace(&self) -> PropertyTrace {
        self.trace.clone()
    }

    /// Runs `f` with the trace extended by a record of `type_name`,
    /// restoring the previous trace afterwards.
    pub async fn with_record_trace<R>(
        &mut self,
        type_name: &'static str,
        f: impl AsyncFnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        let next = self.trace.record(type_name);
        let saved = std::mem::replace(&mut self.trace, next);
        let result = f(self).await;
        self.trace = saved;
        result
    }

    /// Runs `f` with the given trace installed, restoring the previous
    /// trace afterwards.
    pub async fn with_property_trace<R>(
        &mut self,
        trace: PropertyTrace,
        f: impl AsyncFnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        let saved = std::mem::replace(&mut self.trace, trace);
        let result = f(self).await;
        self.trace = saved;
        result
    }

    /// Reports a non-fatal problem attributed to the current trace.
    pub fn report_problem(&self, message: impl Into<String>) {
        let problem = Problem::new(self.trace.clone(), message);
        tracing::debug!("problem at {}: {}", problem.trace, problem.message);
        self.problems.on_problem(problem);
    }

    /// Runs `f` with incompatible-type tolerance enabled: codecs that meet
    /// a value they cannot carry report a problem and write a placeholder
    /// instead of failing. The previous setting is restored afterwards.
    pub async fn for_incompatible_type<R>(
        &mut self,
        f: impl AsyncFnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        let saved = self.tolerate_incompatible;
        self.tolerate_incompatible = true;
        let result = f(self).await;
        self.tolerate_incompatible = saved;
        result
    }

    pub fn tolerates_incompatible_types(&self) -> bool {
        self.tolerate_incompatible
    }
}

/// Context for one decode operation.
pub struct ReadContext {
    source: ByteSource,
    isolates: IsolateStack<ReadIsolate>,
    shared_identities: ReadIdentities,
    trace: PropertyTrace,
    problems: Rc<dyn ProblemSink>,
    tolerate_incompatible: bool,
    immediate: bool,
    depth: usize,
    finish_actions: VecDeque<Box<dyn FnOnce()>>,
}

impl ReadContext {
    pub fn new(
        codec: Rc<dyn Codec>,
        owner: Owner,
        bytes: Bytes,
        limits: &Limits,
        problems: Rc<dyn ProblemSink>,
    ) -> Self {
        ReadContext {
            source: ByteSource::new(bytes, limits),
            isolates: IsolateStack::new(ReadIsolate::new(owner, codec)),
            shared_identities: ReadIdentities::new(),
            trace: PropertyTrace::root(),
            problems,
            tolerate_incompatible: false,
            immediate: false,
            depth: 0,
            finish_actions: VecDeque::new(),
        }
    }

    pub fn limits(&self) -> &Limits {
        self.source.limits()
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.source.remaining()
    }

    /// Fails unless the stream was fully consumed.
    pub fn expect_end(&self) -> Result<(), CodecError> {
        Ok(self.source.expect_end()?)
    }

    // Primitive reads, delegated to the wire layer.

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.source.read_bool()?)
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(self.source.read_u64()?)
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(self.source.read_i64()?)
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(self.source.read_f64()?)
    }

    pub fn read_str(&mut self) -> Result<String, CodecError> {
        Ok(self.source.read_str()?)
    }

    pub fn read_bytes(&mut self) -> Result<Bytes, CodecError> {
        Ok(self.source.read_bytes()?)
    }

    pub fn read_tag(&mut self) -> Result<u8, CodecError> {
        Ok(self.source.read_tag()?)
    }

    pub fn read_small_id(&mut self) -> Result<u32, CodecError> {
        Ok(self.source.read_small_id()?)
    }

    pub fn read_type_token(&mut self) -> Result<String, CodecError> {
        Ok(self.source.read_type_token()?)
    }

    pub fn read_sequence_len(&mut self) -> Result<usize, CodecError> {
        Ok(self.source.read_sequence_len()?)
    }

    /// Reads one value through the codec of the current isolate.
    pub async fn read_value(&mut self) -> Result<Instance, CodecError> {
        if self.depth >= self.source.limits().max_decode_depth {
            return Err(DecodeError::Limit("max_decode_depth").into());
        }
        self.depth += 1;
        let codec = self.isolates.top().codec.clone();
        let result = codec.decode(self).await;
        self.depth -= 1;
        result
    }

    /// Reads one value without allowing suspension. If the codec suspends,
    /// the read fails with [`CodecError::Suspended`] and the stream is left
    /// mid-value; the operation cannot continue past that point.
    ///
    /// Used when a strictly synchronous decoding protocol embedded in the
    /// stream calls back into the engine.
    pub fn read_value_immediate(&mut self) -> Result<Instance, CodecError> {
        let saved = self.immediate;
        self.immediate = true;
        let outcome = self.read_value().now_or_never();
        self.immediate = saved;
        match outcome {
            Some(result) => result,
            None => Err(CodecError::Suspended),
        }
    }

    /// True while suspension is disallowed. Codecs that must wait should
    /// check this and fail with [`CodecError::Suspended`] instead of
    /// suspending, because a parked future will never be resumed here.
    pub fn immediate_mode(&self) -> bool {
        self.immediate
    }

    /// Runs `f` with immediate mode forced to `on`, restoring the previous
    /// setting afterwards.
    pub async fn with_immediate_mode<R>(
        &mut self,
        on: bool,
        f: impl AsyncFnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        let saved = self.immediate;
        self.immediate = on;
        let result = f(self).await;
        self.immediate = saved;
        result
    }

    // Isolates.

    /// The owner of the current isolate.
    pub fn owner(&self) -> &Owner {
        &self.isolates.top().owner
    }

    pub fn isolate_depth(&self) -> usize {
        self.isolates.depth()
    }

    pub fn push_isolate(&mut self, owner: Owner, codec: Rc<dyn Codec>) {
        self.isolates.push(ReadIsolate::new(owner, codec));
    }

    /// Pops the current isolate. Every push must be matched by exactly one
    /// pop; prefer [`ReadContext::with_isolate`], which pairs them.
    pub fn pop_isolate(&mut self) {
        self.isolates.pop();
    }

    /// Runs `f` inside a fresh isolate bound to `owner` and `codec`,
    /// mirroring the isolate the writer entered at this point.
    pub async fn with_isolate<R>(
        &mut self,
        owner: Owner,
        codec: Rc<dyn Codec>,
        f: impl AsyncFnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        self.push_isolate(owner, codec);
        let result = f(self).await;
        self.pop_isolate();
        result
    }

    /// Runs `f` inside a fresh isolate that keeps the current owner but
    /// swaps the active codec.
    pub async fn with_codec<R>(
        &mut self,
        codec: Rc<dyn Codec>,
        f: impl AsyncFnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        let owner = self.isolates.top().owner.clone();
        self.with_isolate(owner, codec, f).await
    }

    // Identity.

    /// The instance registered under `id` in the current isolate, if any.
    pub fn instance(&self, id: u32) -> Option<Instance> {
        self.isolates.top().identities.get(id)
    }

    /// The instance registered under `id` in the shared registry, if any.
    pub fn shared_instance(&self, id: u32) -> Option<Instance> {
        self.shared_identities.get(id)
    }

    /// Registers the instance decoded under `id` in the current isolate.
    ///
    /// Decoders running inside [`ReadContext::decode_preserving_identity`]
    /// must call this before reading any state that could refer back to the
    /// instance.
    pub fn register_instance(&mut self, id: u32, instance: Instance) {
        self.isolates.top_mut().identities.put(id, instance);
    }

    /// Registers the instance decoded under `id` in the shared registry.
    pub fn register_shared_instance(&mut self, id: u32, instance: Instance) {
        self.shared_identities.put(id, instance);
    }

    /// Counterpart of [`WriteContext::encode_preserving_identity`]. Reads
    /// an id; if it is already registered the registered instance is
    /// returned and nothing further is read. Otherwise `body` decodes the
    /// value, and **must** register the produced instance under the given
    /// id before reading anything that could refer back to it.
    ///
    /// Panics if `body` returns without registering, or registers a
    /// different instance than it returns. That is a defect in the calling
    /// codec, not malformed input.
    pub async fn decode_preserving_identity(
        &mut self,
        body: impl AsyncFnOnce(&mut Self, u32) -> Result<Instance, CodecError>,
    ) -> Result<Instance, CodecError> {
        self.decode_identity(IdentityScope::Local, body).await
    }

    /// Like [`ReadContext::decode_preserving_identity`], but against the
    /// registry shared by all isolates of this operation.
    pub async fn decode_preserving_shared_identity(
        &mut self,
        body: impl AsyncFnOnce(&mut Self, u32) -> Result<Instance, CodecError>,
    ) -> Result<Instance, CodecError> {
        self.decode_identity(IdentityScope::Shared, body).await
    }

    async fn decode_identity(
        &mut self,
        scope: IdentityScope,
        body: impl AsyncFnOnce(&mut Self, u32) -> Result<Instance, CodecError>,
    ) -> Result<Instance, CodecError> {
        let id = self.read_small_id()?;
        let existing = match scope {
            IdentityScope::Local => self.isolates.top().identities.get(id),
            IdentityScope::Shared => self.shared_identities.get(id),
        };
        if let Some(instance) = existing {
            return Ok(instance);
        }
        let instance = body(self, id).await?;
        let registered = match scope {
            IdentityScope::Local => self.isolates.top().identities.get(id),
            IdentityScope::Shared => self.shared_identities.get(id),
        };
        let registered = registered
            .unwrap_or_else(|| panic!("decoder for instance id {id} returned without registering"));
        assert!(
            instance_key(&registered) == instance_key(&instance),
            "decoder for instance id {id} registered a different instance than it returned"
        );
        Ok(instance)
    }

    // Traces and problems.

    /// The trace describing where in the graph this operation currently is.
    pub fn trace(&self) -> PropertyTrace {
        self.trace.clone()
    }

    /// Runs `f` with the trace extended by a record of `type_name`,
    /// restoring the previous trace afterwards.
    pub async fn with_record_trace<R>(
        &mut self,
        type_name: &'static str,
        f: impl AsyncFnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        let next = self.trace.record(type_name);
        let saved = std::mem::replace(&mut self.trace, next);
        let result = f(self).await;
        self.trace = saved;
        result
    }

    /// Runs `f` with the given trace installed, restoring the previous
    /// trace afterwards.
    pub async fn with_property_trace<R>(
        &mut self,
        trace: PropertyTrace,
        f: impl AsyncFnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        let saved = std::mem::replace(&mut self.trace, trace);
        let result = f(self).await;
        self.trace = saved;
        result
    }

    /// Reports a non-fatal problem attributed to the current trace.
    pub fn report_problem(&self, message: impl Into<String>) {
        let problem = Problem::new(self.trace.clone(), message);
        tracing::debug!("problem at {}: {}", problem.trace, problem.message);
        self.problems.on_problem(problem);
    }

    /// Runs `f` with incompatible-type tolerance enabled, restoring the
    /// previous setting afterwards.
    pub async fn for_incompatible_type<R>(
        &mut self,
        f: impl AsyncFnOnce(&mut Self) -> Result<R, CodecError>,
    ) -> Result<R, CodecError> {
        let saved = self.tolerate_incompatible;
        self.tolerate_incompatible = true;
        let result = f(self).await;
        self.tolerate_incompatible = saved;
        result
    }

    pub fn tolerates_incompatible_types(&self) -> bool {
        self.tolerate_incompatible
    }

    // Finish actions.

    /// Queues an action to run after the whole read operation completes and
    /// every instance is registered. Actions run in registration order.
    pub fn on_finish(&mut self, action: impl FnOnce() + 'static) {
        self.finish_actions.push_back(Box::new(action));
    }

    /// Runs queued finish actions in FIFO order. Actions queued while
    /// running are executed in the same pass.
    pub fn run_finish_actions(&mut self) {
        while let Some(action) = self.finish_actions.pop_front() {
            action();
        }
    }
}
