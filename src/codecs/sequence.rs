//! Sequence codec.

use std::rc::Rc;

use async_trait::async_trait;

use crate::codec::{Codec, CodecError};
use crate::context::{ReadContext, WriteContext};
use crate::identity::Instance;

/// Codec for heterogeneous sequences (`Vec<Instance>`).
///
/// Elements go back through the codec of the current isolate, so each one
/// dispatches polymorphically, and each element's position is attributed in
/// the property trace. Sequences are carried structurally; a sequence whose
/// identity matters must be wrapped in an identity-preserving record.
pub struct SequenceCodec;

#[async_trait(?Send)]
impl Codec for SequenceCodec {
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError> {
        let items = value
            .downcast_ref::<Vec<Instance>>()
            .ok_or(CodecError::InvalidValue {
                reason: "expected a sequence".into(),
            })?;
        ctx.write_sequence_len(items.len())?;
        for (index, item) in items.iter().enumerate() {
            let trace = ctx.trace().element(index);
            ctx.with_property_trace(trace, async |ctx| ctx.write_value(item).await)
                .await?;
        }
        Ok(())
    }

    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError> {
        let len = ctx.read_sequence_len()?;
        let mut items: Vec<Instance> = Vec::with_capacity(len);
        for index in 0..len {
            let trace = ctx.trace().element(index);
            let item = ctx
                .with_property_trace(trace, async |ctx| ctx.read_value().await)
                .await?;
            items.push(item);
        }
        Ok(Rc::new(items) as Instance)
    }
}
