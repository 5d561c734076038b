//! Constant buffer packing.
//!
//! Offsets are measured in 32-bit words. Four consecutive words form a register and no value
//! may straddle a register boundary.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::error::{Result, ShaderError};
use crate::format::{ArraySize, PinFormat, ScalarKind};
use crate::limits::{REGISTER_WORDS, WORD_BYTES};
use crate::parameter::ParameterDescription;
use crate::pin::Pin;
use crate::value::{Lanes, Value};

fn align_up(offset: u32, alignment: u32) -> u32 {
    offset.div_ceil(alignment) * alignment
}

fn check_format(name: &str, format: PinFormat) -> Result<u32> {
    match format.shape() {
        Some(shape)
            if matches!(
                shape.kind,
                ScalarKind::Integer | ScalarKind::UInteger | ScalarKind::Float
            ) =>
        {
            Ok(format.words().unwrap_or(REGISTER_WORDS))
        }
        _ => Err(ShaderError::Unsupported(format!(
            "constant '{name}' of format {format} cannot be placed in a constant buffer"
        ))),
    }
}

/// Words between consecutive array elements.
fn stride(words: u32) -> u32 {
    align_up(words, REGISTER_WORDS)
}

fn footprint(name: &str, format: PinFormat, size: ArraySize) -> Result<u32> {
    let words = check_format(name, format)?;
    match size {
        ArraySize::NotArray => Ok(words),
        ArraySize::Static(0) => Ok(0),
        ArraySize::Static(n) => Ok((n - 1) * stride(words) + words),
        ArraySize::Dynamic => Err(ShaderError::Unsupported(format!(
            "dynamic array '{name}' cannot be placed in a constant buffer"
        ))),
    }
}

fn natural_alignment(format: PinFormat, size: ArraySize) -> u32 {
    if size.is_array() || format.is_matrix() {
        return REGISTER_WORDS;
    }
    match format.components() {
        1 => 1,
        2 => 2,
        _ => REGISTER_WORDS,
    }
}

fn straddles(offset: u32, words: u32, format: PinFormat, size: ArraySize) -> bool {
    if size.is_array() || format.is_matrix() {
        return offset % REGISTER_WORDS != 0;
    }
    words > 0 && offset / REGISTER_WORDS != (offset + words - 1) / REGISTER_WORDS
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub description: ParameterDescription,
    pub offset: u32,
    footprint: u32,
}

impl LayoutEntry {
    pub fn footprint(&self) -> u32 {
        self.footprint
    }

    fn end(&self) -> u32 {
        self.offset + self.footprint
    }
}

/// One-shot builder for a [`ConstantBufferLayout`].
#[derive(Debug, Default)]
pub struct ConstantBufferLayoutBuilder {
    entries: BTreeMap<String, LayoutEntry>,
    cursor: u32,
    finished: bool,
}

impl ConstantBufferLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(ShaderError::BuilderFinalized);
        }
        Ok(())
    }

    fn insert(&mut self, name: &str, format: PinFormat, size: ArraySize, offset: u32) -> Result<()> {
        let footprint = footprint(name, format, size)?;
        if self.entries.contains_key(name) {
            return Err(ShaderError::DuplicateDefinition { name: name.into() });
        }
        let end = offset + footprint;
        if let Some(other) = self
            .entries
            .values()
            .find(|e| e.offset < end && offset < e.end())
        {
            return Err(ShaderError::OutOfRange(format!(
                "'{name}' at word {offset} overlaps '{}'",
                other.description.name()
            )));
        }
        self.entries.insert(
            name.to_owned(),
            LayoutEntry {
                description: ParameterDescription::new(name, Pin::new(format, size)),
                offset,
                footprint,
            },
        );
        self.cursor = self.cursor.max(end);
        Ok(())
    }

    /// Places `name` at an explicit word offset.
    pub fn add_element(
        &mut self,
        name: &str,
        format: PinFormat,
        size: ArraySize,
        offset: u32,
    ) -> Result<()> {
        self.ensure_open()?;
        let words = check_format(name, format)?;
        if straddles(offset, words, format, size) {
            return Err(ShaderError::OutOfRange(format!(
                "'{name}' of format {format} at word {offset} crosses a register boundary"
            )));
        }
        self.insert(name, format, size, offset)
    }

    /// Places a non-array `name` after the previous element and returns its offset.
    pub fn append_element(&mut self, name: &str, format: PinFormat) -> Result<u32> {
        self.append_array(name, format, ArraySize::NotArray)
    }

    pub fn append_array(&mut self, name: &str, format: PinFormat, size: ArraySize) -> Result<u32> {
        self.ensure_open()?;
        let words = check_format(name, format)?;
        let mut offset = align_up(self.cursor, natural_alignment(format, size));
        if straddles(offset, words, format, size) {
            offset = align_up(offset, REGISTER_WORDS);
        }
        self.insert(name, format, size, offset)?;
        Ok(offset)
    }

    /// Finalizes the layout. The builder rejects every later call.
    pub fn create_layout(&mut self) -> Result<ConstantBufferLayout> {
        self.ensure_open()?;
        self.finished = true;
        Ok(ConstantBufferLayout {
            entries: std::mem::take(&mut self.entries),
        })
    }
}

/// Immutable name → (description, word offset) map.
#[derive(Debug, Clone, Default)]
pub struct ConstantBufferLayout {
    entries: BTreeMap<String, LayoutEntry>,
}

impl ConstantBufferLayout {
    pub fn builder() -> ConstantBufferLayoutBuilder {
        ConstantBufferLayoutBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn try_offset(&self, name: &str) -> Option<u32> {
        self.entries.get(name).map(|e| e.offset)
    }

    pub fn offset(&self, name: &str) -> Result<u32> {
        self.try_offset(name).ok_or_else(|| {
            ShaderError::missing(name, "an entry in the constant buffer layout", "nothing")
        })
    }

    /// Offset, format and array size of `name`.
    pub fn data(&self, name: &str) -> Option<(u32, PinFormat, ArraySize)> {
        self.entries
            .get(name)
            .map(|e| (e.offset, e.description.format(), e.description.array_size()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &LayoutEntry> {
        self.entries.values()
    }

    /// Highest occupied word, rounded up to a whole register.
    pub fn minimum_buffer_size(&self) -> u32 {
        let end = self.entries.values().map(LayoutEntry::end).max().unwrap_or(0);
        align_up(end, REGISTER_WORDS)
    }

    pub fn minimum_buffer_size_in_bytes(&self) -> u32 {
        self.minimum_buffer_size() * WORD_BYTES
    }

    /// Stores `value` into a word image of the buffer at `name`'s offset.
    pub fn write_value(&self, buffer: &mut [u32], name: &str, value: &Value) -> Result<()> {
        let entry = self.entries.get(name).ok_or_else(|| {
            ShaderError::missing(name, "an entry in the constant buffer layout", "nothing")
        })?;
        let format = entry.description.format();
        let (elements, stride_words): (Vec<&Value>, u32) = match (entry.description.array_size(), value) {
            (ArraySize::NotArray, v) if v.is_compatible(format) => (vec![v], 0),
            (ArraySize::Static(n), Value::Array(items))
                if value.array_len(format) == Some(n) =>
            {
                (items.iter().collect(), stride(check_format(name, format)?))
            }
            _ => {
                return Err(ShaderError::missing(
                    name,
                    format!("{format}{}", entry.description.array_size()),
                    format!("{:?}", value),
                ))
            }
        };
        if entry.end() as usize > buffer.len() {
            return Err(ShaderError::OutOfRange(format!(
                "'{name}' ends at word {} but the buffer holds {}",
                entry.end(),
                buffer.len()
            )));
        }
        let columns = format.shape().map_or(1, |s| s.columns) as usize;
        for (i, element) in elements.into_iter().enumerate() {
            let words: Vec<u32> = match element.lanes() {
                Some(Lanes::Float(v)) => v.iter().map(|&x| bytemuck::cast(x)).collect(),
                Some(Lanes::Integer(v)) => v.iter().map(|&x| bytemuck::cast(x)).collect(),
                Some(Lanes::UInteger(v)) => v,
                Some(Lanes::Bool(v)) => v.iter().map(|&x| x as u32).collect(),
                None => continue,
            };
            let base = (entry.offset + i as u32 * stride_words) as usize;
            for (row, chunk) in words.chunks(columns).enumerate() {
                let start = base + row * REGISTER_WORDS as usize;
                buffer[start..start + chunk.len()].copy_from_slice(chunk);
            }
        }
        Ok(())
    }
}

impl PartialEq for ConstantBufferLayout {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ConstantBufferLayout {}

impl PartialOrd for ConstantBufferLayout {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl LayoutEntry {
    fn key(&self) -> (u32, &str, PinFormat, ArraySize) {
        (
            self.offset,
            self.description.name(),
            self.description.format(),
            self.description.array_size(),
        )
    }
}

/// Entry count first, then `(offset, name, format, size)` in name order.
impl Ord for ConstantBufferLayout {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entries.len().cmp(&other.entries.len()).then_with(|| {
            self.entries
                .values()
                .map(LayoutEntry::key)
                .cmp(other.entries.values().map(LayoutEntry::key))
        })
    }
}

impl Hash for ConstantBufferLayout {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entries.len().hash(state);
        for entry in self.entries.values() {
            entry.key().hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn float_then_vector_moves_to_next_register() {
        let mut builder = ConstantBufferLayout::builder();
        assert_eq!(builder.append_element("a", PinFormat::Float).unwrap(), 0);
        assert_eq!(builder.append_element("b", PinFormat::Floatx4).unwrap(), 4);
        let layout = builder.create_layout().unwrap();
        assert_eq!(layout.minimum_buffer_size(), 8);
        assert_eq!(layout.minimum_buffer_size_in_bytes(), 32);
    }

    #[test]
    fn small_elements_share_a_register() {
        let mut builder = ConstantBufferLayout::builder();
        builder.append_element("a", PinFormat::Float).unwrap();
        assert_eq!(builder.append_element("b", PinFormat::Floatx2).unwrap(), 2);
        assert_eq!(builder.append_element("c", PinFormat::Integer).unwrap(), 4);
        assert_eq!(builder.append_element("d", PinFormat::UInteger).unwrap(), 5);
        let layout = builder.create_layout().unwrap();
        assert_eq!(layout.minimum_buffer_size(), 8);
    }

    #[test]
    fn arrays_use_one_register_per_element() {
        let mut builder = ConstantBufferLayout::builder();
        builder.append_element("t", PinFormat::Float).unwrap();
        let offset = builder
            .append_array("weights", PinFormat::Float, ArraySize::Static(3))
            .unwrap();
        assert_eq!(offset, 4);
        let layout = builder.create_layout().unwrap();
        // last element ends at word 4 + 2 * 4 + 1
        assert_eq!(layout.minimum_buffer_size(), 16);
        assert_eq!(
            layout.data("weights"),
            Some((4, PinFormat::Float, ArraySize::Static(3)))
        );
    }

    #[test]
    fn size_covers_trailing_element_extent() {
        let mut builder = ConstantBufferLayout::builder();
        builder.append_element("world", PinFormat::Float4x4).unwrap();
        builder.append_element("tint", PinFormat::Floatx3).unwrap();
        let layout = builder.create_layout().unwrap();
        assert_eq!(layout.offset("tint").unwrap(), 16);
        assert_eq!(layout.minimum_buffer_size(), 20);
    }

    #[test]
    fn rejects_bad_elements() {
        let mut builder = ConstantBufferLayout::builder();
        assert!(matches!(
            builder.append_element("b", PinFormat::Bool),
            Err(ShaderError::Unsupported(_))
        ));
        assert!(matches!(
            builder.append_element("t", PinFormat::Texture2D),
            Err(ShaderError::Unsupported(_))
        ));
        builder.append_element("x", PinFormat::Float).unwrap();
        assert!(matches!(
            builder.append_element("x", PinFormat::Float),
            Err(ShaderError::DuplicateDefinition { .. })
        ));
        assert!(matches!(
            builder.add_element("v", PinFormat::Floatx4, ArraySize::NotArray, 2),
            Err(ShaderError::OutOfRange(_))
        ));
        assert!(matches!(
            builder.add_element("y", PinFormat::Float, ArraySize::NotArray, 0),
            Err(ShaderError::OutOfRange(_))
        ));
    }

    #[test]
    fn builder_is_single_use() {
        let mut builder = ConstantBufferLayout::builder();
        builder.append_element("a", PinFormat::Float).unwrap();
        builder.create_layout().unwrap();
        let err = builder.append_element("b", PinFormat::Float).unwrap_err();
        assert!(err.is_structural_mutation());
        assert_eq!(builder.create_layout().unwrap_err(), ShaderError::BuilderFinalized);
    }

    #[test]
    fn comparison_uses_count_then_offsets_and_names() {
        let build = |names: &[(&str, u32)]| {
            let mut b = ConstantBufferLayout::builder();
            for (name, offset) in names {
                b.add_element(name, PinFormat::Float, ArraySize::NotArray, *offset)
                    .unwrap();
            }
            b.create_layout().unwrap()
        };
        assert_eq!(build(&[("a", 0), ("b", 1)]), build(&[("b", 1), ("a", 0)]));
        assert!(build(&[("a", 0)]) < build(&[("a", 0), ("b", 1)]));
        assert!(build(&[("a", 0), ("b", 1)]) < build(&[("a", 0), ("b", 2)]));
    }

    #[test]
    fn write_value_packs_registers() {
        let mut builder = ConstantBufferLayout::builder();
        builder.append_element("scale", PinFormat::Float).unwrap();
        builder
            .append_array("ids", PinFormat::Integer, ArraySize::Static(2))
            .unwrap();
        let layout = builder.create_layout().unwrap();
        let mut buffer = vec![0u32; layout.minimum_buffer_size() as usize];
        layout
            .write_value(&mut buffer, "scale", &Value::Float(1.5))
            .unwrap();
        layout
            .write_value(&mut buffer, "ids", &Value::from(vec![-1i32, 7]))
            .unwrap();
        assert_eq!(buffer[0], 1.5f32.to_bits());
        assert_eq!(buffer[4], u32::MAX);
        assert_eq!(buffer[8], 7);
        assert!(layout
            .write_value(&mut buffer, "scale", &Value::Integer(1))
            .is_err());
    }
}
