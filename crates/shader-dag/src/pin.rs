use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::format::{ArraySize, PinFormat};

/// Identity of one [`crate::ShaderCode`] instance.
///
/// Pins carry it so operations can reject pins coming from an unrelated graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphId(u64);

impl GraphId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Handle of an operation inside its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId(pub(crate) u32);

impl OpId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Producing operation and output slot of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinSource {
    pub graph: GraphId,
    pub op: OpId,
    pub slot: u32,
}

/// Typed, array-aware output slot of an operation.
///
/// Equality and hashing look at the format, texture format and array size only; the producing
/// operation is ignored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pin {
    format: PinFormat,
    texture_format: PinFormat,
    size: ArraySize,
    source: Option<PinSource>,
}

impl Pin {
    pub fn new(format: PinFormat, size: ArraySize) -> Self {
        Self {
            format,
            texture_format: PinFormat::Undefined,
            size,
            source: None,
        }
    }

    pub fn scalar(format: PinFormat) -> Self {
        Self::new(format, ArraySize::NotArray)
    }

    /// A texture pin whose texels have `texture_format`.
    pub fn texture(format: PinFormat, texture_format: PinFormat, size: ArraySize) -> Self {
        Self {
            format,
            texture_format,
            size,
            source: None,
        }
    }

    pub fn format(&self) -> PinFormat {
        self.format
    }

    pub fn texture_format(&self) -> PinFormat {
        self.texture_format
    }

    pub fn size(&self) -> ArraySize {
        self.size
    }

    pub fn is_array(&self) -> bool {
        self.size.is_array()
    }

    pub fn source(&self) -> Option<PinSource> {
        self.source
    }

    pub fn owner(&self) -> Option<OpId> {
        self.source.map(|s| s.op)
    }

    /// Same pin description, produced by another operation.
    pub fn with_source(self, source: PinSource) -> Self {
        Self {
            source: Some(source),
            ..self
        }
    }

    pub(crate) fn unowned(self) -> Self {
        Self {
            source: None,
            ..self
        }
    }

    pub(crate) fn rebind_graph(&mut self, graph: GraphId) {
        if let Some(source) = &mut self.source {
            source.graph = graph;
        }
    }
}

impl PartialEq for Pin {
    fn eq(&self, other: &Self) -> bool {
        self.format == other.format
            && self.size == other.size
            && self.texture_format == other.texture_format
    }
}

impl Eq for Pin {}

impl Hash for Pin {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.format.hash(state);
        self.size.hash(state);
        self.texture_format.hash(state);
    }
}

impl PartialOrd for Pin {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pin {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size
            .cmp(&other.size)
            .then(self.format.cmp(&other.format))
            .then(self.texture_format.cmp(&other.texture_format))
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.format, self.size)?;
        if self.texture_format != PinFormat::Undefined {
            write!(f, "<{}>", self.texture_format)?;
        }
        Ok(())
    }
}
