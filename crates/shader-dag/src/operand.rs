use std::fmt;

use crate::format::{ArraySize, PinFormat};
use crate::value::Value;

/// Backend register/value id allocated by a compiler session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperandId(pub(crate) u32);

impl OperandId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for OperandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Compiler-side handle to a backend value.
///
/// A fixed operand carries its host value; arithmetic on two fixed operands is folded on the
/// host.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub(crate) id: OperandId,
    pub(crate) format: PinFormat,
    pub(crate) texture_format: PinFormat,
    pub(crate) size: ArraySize,
    pub(crate) writable: bool,
    pub(crate) value: Option<Value>,
}

impl Operand {
    pub fn id(&self) -> OperandId {
        self.id
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

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_fixed(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Same format and array size.
    pub fn matches(&self, other: &Operand) -> bool {
        self.format == other.format && self.size == other.size
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.id, self.format, self.size)
    }
}
