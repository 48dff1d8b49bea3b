//! Property traces for diagnostics.
//!
//! A trace is an immutable, parent-linked path describing where in the
//! object graph the engine currently is: which record, which property,
//! which sequence element. Child traces share their parent by reference,
//! so extending a trace never touches existing frames. Traces influence
//! diagnostics only, never encoded bytes.

use std::fmt;
use std::rc::Rc;

/// What kind of property a trace segment refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    Field,
    Input,
    Output,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::Field => f.write_str("field"),
            PropertyKind::Input => f.write_str("input"),
            PropertyKind::Output => f.write_str("output"),
        }
    }
}

/// An attribution path through the graph, cheap to clone and extend.
#[derive(Clone, Debug)]
pub struct PropertyTrace {
    node: Rc<TraceNode>,
}

#[derive(Debug)]
enum TraceNode {
    Root,
    Record {
        type_name: &'static str,
        parent: PropertyTrace,
    },
    Property {
        kind: PropertyKind,
        name: String,
        parent: PropertyTrace,
    },
    Element {
        index: usize,
        parent: PropertyTrace,
    },
}

impl PropertyTrace {
    /// The empty trace at the top of an operation.
    pub fn root() -> Self {
        PropertyTrace {
            node: Rc::new(TraceNode::Root),
        }
    }

    /// Extends this trace with a record of the given type.
    pub fn record(&self, type_name: &'static str) -> Self {
        PropertyTrace {
            node: Rc::new(TraceNode::Record {
                type_name,
                parent: self.clone(),
            }),
        }
    }

    /// Extends this trace with a named property.
    pub fn property(&self, kind: PropertyKind, name: impl Into<String>) -> Self {
        PropertyTrace {
            node: Rc::new(TraceNode::Property {
                kind,
                name: name.into(),
                parent: self.clone(),
            }),
        }
    }

    /// Extends this trace with a sequence element position.
    pub fn element(&self, index: usize) -> Self {
        PropertyTrace {
            node: Rc::new(TraceNode::Element {
                index,
                parent: self.clone(),
            }),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(*self.node, TraceNode::Root)
    }

    fn parent(&self) -> Option<&PropertyTrace> {
        match &*self.node {
            TraceNode::Root => None,
            TraceNode::Record { parent, .. }
            | TraceNode::Property { parent, .. }
            | TraceNode::Element { parent, .. } => Some(parent),
        }
    }

    /// Path segments ordered outermost to innermost. The root produces no
    /// segment.
    pub fn segments(&self) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = Some(self);
        while let Some(trace) = current {
            match &*trace.node {
                TraceNode::Root => {}
                TraceNode::Record { type_name, .. } => {
                    segments.push(format!("record {type_name}"));
                }
                TraceNode::Property { kind, name, .. } => {
                    segments.push(format!("{kind} {name}"));
                }
                TraceNode::Element { index, .. } => {
                    segments.push(format!("element {index}"));
                }
            }
            current = trace.parent();
        }
        segments.reverse();
        segments
    }
}

impl fmt::Display for PropertyTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments = self.segments();
        if segments.is_empty() {
            return f.write_str("root");
        }
        f.write_str(&segments.join(" / "))
    }
}
