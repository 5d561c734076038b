use serde::{Deserialize, Serialize};
use std::fmt;

use crate::format::{ArraySize, PinFormat};
use crate::pin::Pin;

/// Declared parameter of a shader code or interface: a name and the pin it feeds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParameterDescription {
    name: String,
    pin: Pin,
    #[serde(default)]
    fixed: bool,
}

impl ParameterDescription {
    pub fn new(name: impl Into<String>, pin: Pin) -> Self {
        Self {
            name: name.into(),
            pin: pin.unowned(),
            fixed: false,
        }
    }

    /// Marks the parameter as accepted only as a fixed value.
    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pin(&self) -> &Pin {
        &self.pin
    }

    pub fn format(&self) -> PinFormat {
        self.pin.format()
    }

    pub fn array_size(&self) -> ArraySize {
        self.pin.size()
    }

    /// Parameters that can only be supplied as fixed values, never through a constant buffer.
    pub fn is_fixed(&self) -> bool {
        self.fixed || self.format().is_resource() || self.array_size() == ArraySize::Dynamic
    }

    /// Same parameter, re-scoped under `scope.`.
    pub fn scoped(&self, scope: &str) -> Self {
        Self {
            name: format!("{scope}.{}", self.name),
            pin: self.pin,
            fixed: self.fixed,
        }
    }

    /// Same parameter, re-scoped under `scope[index].`.
    pub fn scoped_indexed(&self, scope: &str, index: usize) -> Self {
        Self {
            name: format!("{scope}[{index}].{}", self.name),
            pin: self.pin,
            fixed: self.fixed,
        }
    }

    /// Key of the synthetic fixed value carrying a dynamic array's length.
    pub fn length_key(name: &str) -> String {
        format!("{name}.length")
    }
}

impl fmt::Display for ParameterDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.pin)
    }
}
