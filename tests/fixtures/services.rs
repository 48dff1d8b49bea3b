#![allow(dead_code)]

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;

use keepsake::{
    CodecError, Instance, ReadContext, RecordRegistry, RecordState, ServiceMap, WriteContext,
};

/// Live decode-side service: the directory outputs are rooted under on the
/// machine doing the decoding.
pub struct OutputRoot {
    pub path: String,
}

/// Counts work scheduled by finish actions.
#[derive(Default)]
pub struct Tally {
    pub total: Cell<u64>,
    pub order: RefCell<Vec<u64>>,
}

/// A file reference carried as a relative path; the absolute path is
/// rebuilt at decode time from the current owner's [`OutputRoot`].
#[derive(Default)]
pub struct OutputFile {
    pub rel: RefCell<String>,
    pub resolved: RefCell<String>,
}

pub fn output_file(rel: &str) -> Rc<OutputFile> {
    let file = Rc::new(OutputFile::default());
    *file.rel.borrow_mut() = rel.to_string();
    file
}

pub fn output_file_of(instance: &Instance) -> Result<&OutputFile, CodecError> {
    instance
        .downcast_ref::<OutputFile>()
        .ok_or(CodecError::InvalidValue {
            reason: "expected an output file".into(),
        })
}

pub struct OutputFileState;

#[async_trait(?Send)]
impl RecordState for OutputFileState {
    fn type_name(&self) -> &'static str {
        "OutputFile"
    }

    fn type_id(&self) -> TypeId {
        TypeId::of::<OutputFile>()
    }

    fn new_instance(&self) -> Result<Instance, CodecError> {
        Ok(Rc::new(OutputFile::default()))
    }

    async fn write_fields(
        &self,
        instance: &Instance,
        ctx: &mut WriteContext,
    ) -> Result<(), CodecError> {
        let file = output_file_of(instance)?;
        ctx.write_str(&file.rel.borrow())
    }

    async fn read_fields(
        &self,
        instance: &Instance,
        ctx: &mut ReadContext,
    ) -> Result<(), CodecError> {
        let file = output_file_of(instance)?;
        let rel = ctx.read_str()?;
        let root = ctx.owner().service::<OutputRoot>()?;
        *file.resolved.borrow_mut() = format!("{}/{rel}", root.path);
        *file.rel.borrow_mut() = rel;
        Ok(())
    }
}

/// A counter contribution that is applied only once the whole read
/// operation has completed, through the finish-action queue.
#[derive(Default)]
pub struct Contribution {
    pub amount: RefCell<u64>,
}

pub fn contribution(amount: u64) -> Rc<Contribution> {
    let c = Rc::new(Contribution::default());
    *c.amount.borrow_mut() = amount;
    c
}

pub struct ContributionState;

#[async_trait(?Send)]
impl RecordState for ContributionState {
    fn type_name(&self) -> &'static str {
        "Contribution"
    }

    fn type_id(&self) -> TypeId {
        TypeId::of::<Contribution>()
    }

    fn new_instance(&self) -> Result<Instance, CodecError> {
        Ok(Rc::new(Contribution::default()))
    }

    async fn write_fields(
        &self,
        instance: &Instance,
        ctx: &mut WriteContext,
    ) -> Result<(), CodecError> {
        let c = instance
            .downcast_ref::<Contribution>()
            .ok_or(CodecError::InvalidValue {
                reason: "expected a contribution".into(),
            })?;
        ctx.write_u64(*c.amount.borrow())
    }

    async fn read_fields(
        &self,
        instance: &Instance,
        ctx: &mut ReadContext,
    ) -> Result<(), CodecError> {
        let c = instance
            .downcast_ref::<Contribution>()
            .ok_or(CodecError::InvalidValue {
                reason: "expected a contribution".into(),
            })?;
        let amount = ctx.read_u64()?;
        *c.amount.borrow_mut() = amount;
        let tally = ctx.owner().service::<Tally>()?;
        ctx.on_finish(move || {
            tally.total.set(tally.total.get() + amount);
            tally.order.borrow_mut().push(amount);
        });
        Ok(())
    }
}

pub fn registry() -> RecordRegistry {
    RecordRegistry::new()
        .register(OutputFileState)
        .register(ContributionState)
}

pub fn output_services(path: &str) -> Rc<ServiceMap> {
    Rc::new(ServiceMap::new().with(OutputRoot {
        path: path.to_string(),
    }))
}
