//! Scalar codecs.
//!
//! One codec per primitive type. These are reached through [`Bindings`]
//! dispatch, so a type mismatch here means the dispatch table and the value
//! disagree, which is a configuration error surfaced as
//! [`CodecError::InvalidValue`].
//!
//! [`Bindings`]: crate::codecs::Bindings

use std::rc::Rc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::{Codec, CodecError};
use crate::context::{ReadContext, WriteContext};
use crate::identity::Instance;

fn type_mismatch<T>(what: &str) -> Result<T, CodecError> {
    Err(CodecError::InvalidValue {
        reason: format!("expected {what}"),
    })
}

pub struct BoolCodec;

#[async_trait(?Send)]
impl Codec for BoolCodec {
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError> {
        match value.downcast_ref::<bool>() {
            Some(v) => ctx.write_bool(*v),
            None => type_mismatch("a boolean"),
        }
    }

    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError> {
        Ok(Rc::new(ctx.read_bool()?))
    }
}

pub struct U64Codec;

#[async_trait(?Send)]
impl Codec for U64Codec {
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError> {
        match value.downcast_ref::<u64>() {
            Some(v) => ctx.write_u64(*v),
            None => type_mismatch("an unsigned integer"),
        }
    }

    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError> {
        Ok(Rc::new(ctx.read_u64()?))
    }
}

pub struct I64Codec;

#[async_trait(?Send)]
impl Codec for I64Codec {
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError> {
        match value.downcast_ref::<i64>() {
            Some(v) => ctx.write_i64(*v),
            None => type_mismatch("a signed integer"),
        }
    }

    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError> {
        Ok(Rc::new(ctx.read_i64()?))
    }
}

pub struct F64Codec;

#[async_trait(?Send)]
impl Codec for F64Codec {
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError> {
        match value.downcast_ref::<f64>() {
            Some(v) => ctx.write_f64(*v),
            None => type_mismatch("a float"),
        }
    }

    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError> {
        Ok(Rc::new(ctx.read_f64()?))
    }
}

pub struct StringCodec;

#[async_trait(?Send)]
impl Codec for StringCodec {
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError> {
        match value.downcast_ref::<String>() {
            Some(v) => ctx.write_str(v),
            None => type_mismatch("a string"),
        }
    }

    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError> {
        Ok(Rc::new(ctx.read_str()?))
    }
}

pub struct BytesCodec;

#[async_trait(?Send)]
impl Codec for BytesCodec {
    async fn encode(&self, ctx: &mut WriteContext, value: &Instance) -> Result<(), CodecError> {
        match value.downcast_ref::<Bytes>() {
            Some(v) => ctx.write_bytes(v),
            None => type_mismatch("a byte block"),
        }
    }

    async fn decode(&self, ctx: &mut ReadContext) -> Result<Instance, CodecError> {
        Ok(Rc::new(ctx.read_bytes()?))
    }
}
