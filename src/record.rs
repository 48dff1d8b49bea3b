//! Record codecs.
//!
//! A record is a host object carried field by field. The engine does not
//! know any record layout itself; an external [`RecordState`] collaborator
//! allocates instances and walks their fields, looked up by runtime type on
//! the write side and by type token on the read side. Records are the
//! identity-preserving workhorse, so shared and cyclic structures survive a
//! round trip.

use std::any::TypeId;
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;

use crate::codec::{Codec, CodecError};
use crate::context::{ReadContext, WriteContext};
use crate::identity::Instance;

/// Allocates and walks the state of one record type.
///
/// `new_instance` must produce an empty shell without running any normal
/// construction logic; fields are populated afterwards by `read_fields`,
/// possibly with back-references to the shell itself.
#[async_trait(?Send)]
pub trait RecordState {
    /// Stable token identifying this record type in streams.
    fn type_name(&self) -> &'static str;

    /// The runtime type this walker handles.
    fn type_id(&self) -> TypeId;

    /// Allocates an empty instance.
    fn new_instance(&self) -> Result<Instance, CodecError>;

    /// Writes the fields of `instance`.
    async fn write_fields(
        &self,
        instance: &Instance,
        ctx: &mut WriteContext,
    ) -> Result<(), CodecError>;

    /// Populates the fields of a freshly allocated `instance`.
    async fn read_fields(
        &self,
        instance: &Instance,
        ctx: &mut ReadContext,
    ) -> Result<(), CodecError>;
}

/// The set of record types known to one stream, indexed both ways.
///
/// Both sides of a stream must register the same walkers; the registry is
/// part of the protocol, not negotiated.
#[derive(Clone, Default)]
pub struct RecordRegistry {
    by_type: HashMap<TypeId, Rc<dyn RecordState>>,
    by_token: HashMap<&'static str, Rc<dyn RecordState>>,
}

impl RecordRegistry {
    pub fn new() -> Self {
        RecordRegistry::default()
    }

    /// Adds a walker. Panics if its type or token is already registered;
    /// one walker per record type.
    pub fn register(mut self, walker: impl RecordState + 'static) -> Self {
        let walker: Rc<dyn RecordState> = Rc::new(walker);
        let token = walker.type_name();
        let prev = self.by_type.insert(walker.type_id(), walker.clone());
        assert!(prev.is_none(), "record type `{token}` registered twice");
        let prev = self.by_token.insert(token, walker);
        assert!(prev.is_none(), "record token `{token}` registered twice");
        self
    }

    pub fn contains_type(&self, type_id: TypeId) -> bool {
        self.by_type.contains_key(&type_id)
    }

    pub fn walker_for_type(&self, type_id: TypeId) -> Option<Rc<dyn RecordState>> {
        self.by_type.get(&type_id).cloned()
    }

    pub fn walker_for_token(&self, token: &str) -> Option<Rc<dyn RecordState>> {
        self.by_token.get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

#[derive(Clone, Copy)]
enum Registration {
    Local,
    Shared,
}

/// Codec for registered record types. Identity is preserved within the
/// current isolate: encoding the same instance twice in one isolate writes
/// its state once.
pub struct RecordCodec {
    registry: RecordRegistry,
}

impl RecordCodec {
    pub fn new(registry: RecordRegistry) -> Self {
        RecordCodec { registry }
    }
}

#[async_trait(?Send)]
impl Codec for RecordCodec {
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError> {
        let value = value.clone();
        ctx.encode_preserving_identity(&value, async |ctx| {
            encode_record(ctx, &self.registry, &value).await
        })
        .await
    }

    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError> {
        ctx.decode_preserving_identity(async |ctx, id| {
            decode_record(ctx, &self.registry, id, Registration::Local).await
        })
        .await
    }
}

/// Codec for record types whose instances are deduplicated across all
/// isolates of an operation, for values referenced from multiple
/// independent sub-graphs.
pub struct SharedRecordCodec {
    registry: RecordRegistry,
}

impl SharedRecordCodec {
    pub fn new(registry: RecordRegistry) -> Self {
        SharedRecordCodec { registry }
    }
}

#[async_trait(?Send)]
impl Codec for SharedRecordCodec {
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError> {
        let value = value.clone();
        ctx.encode_preserving_shared_identity(&value, async |ctx| {
            encode_record(ctx, &self.registry, &value).await
        })
        .await
    }

    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError> {
        ctx.decode_preserving_shared_identity(async |ctx, id| {
            decode_record(ctx, &self.registry, id, Registration::Shared).await
        })
        .await
    }
}

async fn encode_record(
    ctx: &mut WriteContext,
    registry: &RecordRegistry,
    value: &Instance,
) -> Result<(), CodecError> {
    let type_id = (**value).type_id();
    let walker = registry
        .walker_for_type(type_id)
        .ok_or(CodecError::UnsupportedValue { type_id })?;
    ctx.write_type_token(walker.type_name())?;
    ctx.with_record_trace(walker.type_name(), async |ctx| {
        walker.write_fields(value, ctx).await
    })
    .await
}

async fn decode_record(
    ctx: &mut ReadContext,
    registry: &RecordRegistry,
    id: u32,
    registration: Registration,
) -> Result<Instance, CodecError> {
    let token = ctx.read_type_token()?;
    let walker = registry
        .walker_for_token(&token)
        .ok_or(CodecError::UnknownType { token })?;
    ctx.with_record_trace(walker.type_name(), async |ctx| {
        let instance = walker.new_instance()?;
        // Registered before any field is read, so fields that refer back to
        // this record resolve to the shell under construction.
        match registration {
            Registration::Local => ctx.register_instance(id, instance.clone()),
            Registration::Shared => ctx.register_shared_instance(id, instance.clone()),
        }
        walker.read_fields(&instance, ctx).await?;
        Ok(instance)
    })
    .await
}
