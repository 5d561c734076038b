use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ShaderError};
use crate::format::{PinFormat, Shape};

/// Component selection for a swizzle: `"xyzw"`, `"rgba"`, or matrix cells such as `"m00m11"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwizzleMask {
    /// `(row, column)` of every selected component.
    selectors: Vec<(u8, u8)>,
}

impl SwizzleMask {
    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn selectors(&self) -> &[(u8, u8)] {
        &self.selectors
    }

    /// Result format when applied to a value of `source`.
    pub fn output_format(&self, source: PinFormat) -> Result<PinFormat> {
        let shape = self.check(source)?;
        PinFormat::vector(shape.kind, self.selectors.len() as u32)
            .ok_or_else(|| ShaderError::incompatible(format!("swizzle '{self}' of {source}")))
    }

    /// Flattened component indices for `source`, matching [`crate::value::Value`]'s
    /// column-major matrix storage.
    pub(crate) fn lane_indices(&self, source: PinFormat) -> Result<Vec<usize>> {
        let shape = self.check(source)?;
        Ok(self
            .selectors
            .iter()
            .map(|&(row, column)| {
                if shape.is_matrix() {
                    column as usize * shape.rows as usize + row as usize
                } else {
                    column as usize
                }
            })
            .collect())
    }

    fn check(&self, source: PinFormat) -> Result<Shape> {
        let shape = source
            .shape()
            .ok_or_else(|| ShaderError::incompatible(format!("cannot swizzle {source}")))?;
        let fits = self
            .selectors
            .iter()
            .all(|&(row, column)| (row as u32) < shape.rows && (column as u32) < shape.columns);
        if !fits {
            return Err(ShaderError::OutOfRange(format!(
                "swizzle '{self}' selects outside of {source}"
            )));
        }
        Ok(shape)
    }
}

impl FromStr for SwizzleMask {
    type Err = ShaderError;

    fn from_str(mask: &str) -> Result<Self> {
        let invalid = || ShaderError::incompatible(format!("invalid swizzle mask '{mask}'"));
        let bytes = mask.as_bytes();
        let mut selectors = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let selector = match bytes[i] {
                b'x' | b'r' => (0, 0),
                b'y' | b'g' => (0, 1),
                b'z' | b'b' => (0, 2),
                b'w' | b'a' => (0, 3),
                b'm' if i + 2 < bytes.len() => {
                    let digit = |b: u8| match b {
                        b'0'..=b'3' => Some(b - b'0'),
                        _ => None,
                    };
                    let cell = (
                        digit(bytes[i + 1]).ok_or_else(invalid)?,
                        digit(bytes[i + 2]).ok_or_else(invalid)?,
                    );
                    i += 2;
                    cell
                }
                _ => return Err(invalid()),
            };
            selectors.push(selector);
            i += 1;
        }
        if selectors.is_empty() || selectors.len() > 4 {
            return Err(invalid());
        }
        Ok(Self { selectors })
    }
}

impl fmt::Display for SwizzleMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &(row, column) in &self.selectors {
            match (row, column) {
                (0, c) if c < 4 && !self.selectors.iter().any(|&(r, _)| r > 0) => {
                    f.write_str(["x", "y", "z", "w"][c as usize])?
                }
                (r, c) => write!(f, "m{r}{c}")?,
            }
        }
        Ok(())
    }
}
