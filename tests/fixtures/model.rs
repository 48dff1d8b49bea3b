#![allow(dead_code)]

use std::any::TypeId;
use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;

use keepsake::{
    Bindings, CodecError, Instance, Owner, PropertyKind, ReadContext, RecordRegistry, RecordState,
    ServiceMap, WriteContext,
};

/// A linked node with an optional successor, enough to build shared and
/// cyclic graphs.
#[derive(Default)]
pub struct Node {
    pub label: RefCell<String>,
    pub next: RefCell<Option<Instance>>,
}

/// A named collection of entries, the root shape of most test graphs.
#[derive(Default)]
pub struct Manifest {
    pub name: RefCell<String>,
    pub entries: RefCell<Vec<Instance>>,
}

/// A record whose payload is not always serializable, for exercising
/// problem reporting.
#[derive(Default)]
pub struct Widget {
    pub portable: RefCell<bool>,
    pub payload: RefCell<u64>,
}

pub fn node(label: &str) -> Rc<Node> {
    let node = Rc::new(Node::default());
    *node.label.borrow_mut() = label.to_string();
    node
}

pub fn link(node: &Rc<Node>, next: Instance) {
    *node.next.borrow_mut() = Some(next);
}

pub fn manifest(name: &str, entries: Vec<Instance>) -> Rc<Manifest> {
    let manifest = Rc::new(Manifest::default());
    *manifest.name.borrow_mut() = name.to_string();
    *manifest.entries.borrow_mut() = entries;
    manifest
}

pub fn widget(portable: bool, payload: u64) -> Rc<Widget> {
    let widget = Rc::new(Widget::default());
    *widget.portable.borrow_mut() = portable;
    *widget.payload.borrow_mut() = payload;
    widget
}

pub fn node_of(instance: &Instance) -> Result<&Node, CodecError> {
    instance.downcast_ref::<Node>().ok_or(CodecError::InvalidValue {
        reason: "expected a node".into(),
    })
}

pub fn manifest_of(instance: &Instance) -> Result<&Manifest, CodecError> {
    instance
        .downcast_ref::<Manifest>()
        .ok_or(CodecError::InvalidValue {
            reason: "expected a manifest".into(),
        })
}

pub fn widget_of(instance: &Instance) -> Result<&Widget, CodecError> {
    instance
        .downcast_ref::<Widget>()
        .ok_or(CodecError::InvalidValue {
            reason: "expected a widget".into(),
        })
}

pub struct NodeState;

#[async_trait(?Send)]
impl RecordState for NodeState {
    fn type_name(&self) -> &'static str {
        "Node"
    }

    fn type_id(&self) -> TypeId {
        TypeId::of::<Node>()
    }

    fn new_instance(&self) -> Result<Instance, CodecError> {
        Ok(Rc::new(Node::default()))
    }

    async fn write_fields(
        &self,
        instance: &Instance,
        ctx: &mut WriteContext,
    ) -> Result<(), CodecError> {
        let node = node_of(instance)?;
        let label = node.label.borrow().clone();
        ctx.write_str(&label)?;
        let next = node.next.borrow().clone();
        match &next {
            Some(next) => {
                ctx.write_bool(true)?;
                ctx.write_value(next).await
            }
            None => ctx.write_bool(false),
        }
    }

    async fn read_fields(
        &self,
        instance: &Instance,
        ctx: &mut ReadContext,
    ) -> Result<(), CodecError> {
        let node = node_of(instance)?;
        *node.label.borrow_mut() = ctx.read_str()?;
        let next = if ctx.read_bool()? {
            Some(ctx.read_value().await?)
        } else {
            None
        };
        *node.next.borrow_mut() = next;
        Ok(())
    }
}

pub struct ManifestState;

#[async_trait(?Send)]
impl RecordState for ManifestState {
    fn type_name(&self) -> &'static str {
        "Manifest"
    }

    fn type_id(&self) -> TypeId {
        TypeId::of::<Manifest>()
    }

    fn new_instance(&self) -> Result<Instance, CodecError> {
        Ok(Rc::new(Manifest::default()))
    }

    async fn write_fields(
        &self,
        instance: &Instance,
        ctx: &mut WriteContext,
    ) -> Result<(), CodecError> {
        let manifest = manifest_of(instance)?;
        let name = manifest.name.borrow().clone();
        ctx.write_str(&name)?;
        let entries: Instance = Rc::new(manifest.entries.borrow().clone());
        let trace = ctx.trace().property(PropertyKind::Field, "entries");
        ctx.with_property_trace(trace, async |ctx| ctx.write_value(&entries).await)
            .await
    }

    async fn read_fields(
        &self,
        instance: &Instance,
        ctx: &mut ReadContext,
    ) -> Result<(), CodecError> {
        let manifest = manifest_of(instance)?;
        *manifest.name.borrow_mut() = ctx.read_str()?;
        let trace = ctx.trace().property(PropertyKind::Field, "entries");
        let entries = ctx
            .with_property_trace(trace, async |ctx| ctx.read_value().await)
            .await?;
        let entries = entries
            .downcast_ref::<Vec<Instance>>()
            .ok_or(CodecError::InvalidValue {
                reason: "expected a sequence of entries".into(),
            })?
            .clone();
        *manifest.entries.borrow_mut() = entries;
        Ok(())
    }
}

pub struct WidgetState;

#[async_trait(?Send)]
impl RecordState for WidgetState {
    fn type_name(&self) -> &'static str {
        "Widget"
    }

    fn type_id(&self) -> TypeId {
        TypeId::of::<Widget>()
    }

    fn new_instance(&self) -> Result<Instance, CodecError> {
        Ok(Rc::new(Widget::default()))
    }

    async fn write_fields(
        &self,
        instance: &Instance,
        ctx: &mut WriteContext,
    ) -> Result<(), CodecError> {
        let widget = widget_of(instance)?;
        let portable = *widget.portable.borrow();
        ctx.write_bool(portable)?;
        let trace = ctx.trace().property(PropertyKind::Field, "payload");
        ctx.with_property_trace(trace, async |ctx| {
            if portable {
                ctx.write_u64(*widget.payload.borrow())
            } else {
                ctx.report_problem("widget payload cannot be serialized");
                ctx.write_u64(0)
            }
        })
        .await
    }

    async fn read_fields(
        &self,
        instance: &Instance,
        ctx: &mut ReadContext,
    ) -> Result<(), CodecError> {
        let widget = widget_of(instance)?;
        *widget.portable.borrow_mut() = ctx.read_bool()?;
        let trace = ctx.trace().property(PropertyKind::Field, "payload");
        let payload = ctx.with_property_trace(trace, async |ctx| ctx.read_u64()).await?;
        *widget.payload.borrow_mut() = payload;
        Ok(())
    }
}

pub fn registry() -> RecordRegistry {
    RecordRegistry::new()
        .register(NodeState)
        .register(ManifestState)
        .register(WidgetState)
}

pub fn bindings() -> Rc<Bindings> {
    Bindings::standard(registry())
}

pub fn session_owner() -> Owner {
    Owner::session(Rc::new(ServiceMap::new()))
}
