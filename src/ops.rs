//! Top-level encode and decode operations.
//!
//! An operation owns one context for its whole duration: it installs the
//! root isolate, collects problems, runs read-side finish actions, checks
//! for trailing bytes, and digests the output. Callers that need finer
//! control (embedding a context in a larger stream, driving suspension with
//! their own executor) can build contexts directly.

use std::fmt;
use std::rc::Rc;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::codec::{Codec, CodecError};
use crate::context::{ReadContext, WriteContext};
use crate::identity::Instance;
use crate::limits::Limits;
use crate::owner::Owner;
use crate::problems::{Problem, ProblemCollector, ProblemReport};

/// Correlates the log lines and outputs of one operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        OperationId(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        OperationId::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 digest of an encoded graph, for change detection and integrity
/// checks on stored graphs.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphDigest([u8; 32]);

impl GraphDigest {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let out = hasher.finalize();
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&out);
        GraphDigest(buf)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for GraphDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for GraphDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphDigest({})", self.to_hex())
    }
}

/// Product of one encode operation.
#[derive(Debug)]
pub struct EncodedGraph {
    pub operation: OperationId,
    pub bytes: Bytes,
    pub digest: GraphDigest,
    pub problems: Vec<Problem>,
}

impl EncodedGraph {
    pub fn problem_report(&self) -> ProblemReport {
        ProblemReport::new(&self.problems)
    }
}

/// Product of one decode operation.
#[derive(Debug)]
pub struct DecodedGraph {
    pub operation: OperationId,
    pub root: Instance,
    pub problems: Vec<Problem>,
}

impl DecodedGraph {
    pub fn problem_report(&self) -> ProblemReport {
        ProblemReport::new(&self.problems)
    }
}

/// Encodes `root` and everything reachable from it into one value stream.
///
/// Problems raised along the way are collected, never thrown; the operation
/// fails only on stream-level errors. May suspend while a deferred value
/// waits on its producer.
pub async fn encode_graph(
    codec: Rc<dyn Codec>,
    owner: Owner,
    root: &Instance,
) -> Result<EncodedGraph, CodecError> {
    let operation = OperationId::new();
    let collector = ProblemCollector::new();
    let mut ctx = WriteContext::new(codec, owner, Rc::new(collector.clone()));
    ctx.write_value(root).await?;
    let bytes = ctx.into_bytes();
    let digest = GraphDigest::of(&bytes);
    let problems = collector.take();
    tracing::debug!(
        "graph encoded: operation {operation}, {} bytes, {} problems",
        bytes.len(),
        problems.len()
    );
    Ok(EncodedGraph {
        operation,
        bytes,
        digest,
        problems,
    })
}

/// Decodes the graph previously written by [`encode_graph`] with an
/// identically configured codec.
///
/// Finish actions queued during the read run after the root value is fully
/// decoded; the stream must then be exhausted.
pub async fn decode_graph(
    codec: Rc<dyn Codec>,
    owner: Owner,
    bytes: Bytes,
    limits: &Limits,
) -> Result<DecodedGraph, CodecError> {
    let operation = OperationId::new();
    let collector = ProblemCollector::new();
    let mut ctx = ReadContext::new(codec, owner, bytes, limits, Rc::new(collector.clone()));
    let root = ctx.read_value().await?;
    ctx.run_finish_actions();
    ctx.expect_end()?;
    let problems = collector.take();
    tracing::debug!(
        "graph decoded: operation {operation}, {} problems",
        problems.len()
    );
    Ok(DecodedGraph {
        operation,
        root,
        problems,
    })
}
