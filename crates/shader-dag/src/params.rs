//! Fixed parameters bound to a frozen [`crate::ShaderCode`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use glam::{IVec2, IVec3, IVec4, Mat2, Mat3, Mat4, UVec2, UVec3, UVec4, Vec2, Vec3, Vec4};

use crate::device::DeviceLimits;
use crate::error::{Result, ShaderError};
use crate::format::{ArraySize, PinFormat};
use crate::interface::ShaderInterface;
use crate::layout::ConstantBufferLayout;
use crate::limits::MAX_CONSTANT_BUFFER_BINDING_SLOTS;
use crate::parameter::ParameterDescription;
use crate::pin::GraphId;
use crate::value::Value;

/// Value of one fixed parameter.
#[derive(Clone)]
pub enum ParameterValue {
    Value(Value),
    Interface(Arc<dyn ShaderInterface>),
    InterfaceArray(Vec<Arc<dyn ShaderInterface>>),
}

impl ParameterValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ParameterValue::Value(v) => Some(v),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ParameterValue::Value(_) => 0,
            ParameterValue::Interface(_) => 1,
            ParameterValue::InterfaceArray(_) => 2,
        }
    }

    /// Interfaces compare by declared type, never by contents.
    pub fn structural_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ParameterValue::Value(a), ParameterValue::Value(b)) => a.structural_cmp(b),
            (ParameterValue::Interface(a), ParameterValue::Interface(b)) => {
                a.type_name().cmp(b.type_name())
            }
            (ParameterValue::InterfaceArray(a), ParameterValue::InterfaceArray(b)) => {
                a.len().cmp(&b.len()).then_with(|| {
                    a.iter()
                        .map(|i| i.type_name())
                        .cmp(b.iter().map(|i| i.type_name()))
                })
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn structural_hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            ParameterValue::Value(v) => v.structural_hash(state),
            ParameterValue::Interface(i) => i.type_name().hash(state),
            ParameterValue::InterfaceArray(items) => {
                items.len().hash(state);
                for item in items {
                    item.type_name().hash(state);
                }
            }
        }
    }
}

impl fmt::Debug for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Value(v) => fmt::Debug::fmt(v, f),
            ParameterValue::Interface(i) => write!(f, "interface {}", i.type_name()),
            ParameterValue::InterfaceArray(items) => f
                .debug_list()
                .entries(items.iter().map(|i| i.type_name()))
                .finish(),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for ParameterValue {
            fn from(value: $ty) -> Self {
                ParameterValue::Value(value.into())
            }
        })*
    };
}

impl_from_value!(
    Value, bool, i32, u32, f32, IVec2, IVec3, IVec4, UVec2, UVec3, UVec4, Vec2, Vec3, Vec4, Mat2,
    Mat3, Mat4, Vec<i32>, Vec<u32>, Vec<f32>, Vec<Vec2>, Vec<Vec3>, Vec<Vec4>, Vec<Mat4>,
);

impl From<Arc<dyn ShaderInterface>> for ParameterValue {
    fn from(value: Arc<dyn ShaderInterface>) -> Self {
        ParameterValue::Interface(value)
    }
}

impl From<Vec<Arc<dyn ShaderInterface>>> for ParameterValue {
    fn from(value: Vec<Arc<dyn ShaderInterface>>) -> Self {
        ParameterValue::InterfaceArray(value)
    }
}

/// Concrete values and constant buffer layouts for one compilation of a frozen shader code.
///
/// Doubles as the key of the compiled-shader cache: two instances built from equal layouts
/// and equal values compare equal.
#[derive(Debug, Clone)]
pub struct FixedShaderParameters {
    graph: GraphId,
    parameters: Arc<[ParameterDescription]>,
    layouts: Vec<Arc<ConstantBufferLayout>>,
    values: BTreeMap<String, ParameterValue>,
}

impl FixedShaderParameters {
    pub(crate) fn new(graph: GraphId, parameters: Arc<[ParameterDescription]>) -> Self {
        Self {
            graph,
            parameters,
            layouts: Vec::new(),
            values: BTreeMap::new(),
        }
    }

    pub fn graph(&self) -> GraphId {
        self.graph
    }

    /// Declared parameters of the owning shader code, sorted by name.
    pub fn parameters(&self) -> &[ParameterDescription] {
        &self.parameters
    }

    pub fn layouts(&self) -> &[Arc<ConstantBufferLayout>] {
        &self.layouts
    }

    /// Attaches `layout` at `index`, replacing an existing one or appending right after the last.
    pub fn add_layout(&mut self, index: usize, layout: Arc<ConstantBufferLayout>) -> Result<()> {
        if index >= MAX_CONSTANT_BUFFER_BINDING_SLOTS {
            return Err(ShaderError::OutOfRange(format!(
                "constant buffer slot {index} exceeds the {MAX_CONSTANT_BUFFER_BINDING_SLOTS} binding slots"
            )));
        }
        match index.cmp(&self.layouts.len()) {
            Ordering::Less => self.layouts[index] = layout,
            Ordering::Equal => self.layouts.push(layout),
            Ordering::Greater => {
                return Err(ShaderError::OutOfRange(format!(
                    "constant buffer slot {index} would leave a gap after slot {}",
                    self.layouts.len()
                )))
            }
        }
        Ok(())
    }

    /// Attaches `layout` after the last one and returns its slot.
    pub fn append_layout(&mut self, layout: Arc<ConstantBufferLayout>) -> Result<usize> {
        let index = self.layouts.len();
        self.add_layout(index, layout)?;
        Ok(index)
    }

    /// Detaches the last layout.
    pub fn pop_layout(&mut self) -> Option<Arc<ConstantBufferLayout>> {
        self.layouts.pop()
    }

    pub fn clear_layouts(&mut self) {
        self.layouts.clear();
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Records the length of a dynamic array under `<name>.length`.
    pub fn set_array_size(&mut self, name: &str, len: u32) {
        self.values.insert(
            ParameterDescription::length_key(name),
            ParameterValue::Value(Value::UInteger(len)),
        );
    }

    pub fn remove_parameter(&mut self, name: &str) -> Option<ParameterValue> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name).and_then(ParameterValue::as_value)
    }

    pub fn interface(&self, name: &str) -> Option<&Arc<dyn ShaderInterface>> {
        match self.values.get(name) {
            Some(ParameterValue::Interface(i)) => Some(i),
            _ => None,
        }
    }

    pub fn is_fixed(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Slot and word offset of `name` in the first attached layout defining it.
    pub fn try_offset(&self, name: &str) -> Option<(usize, u32)> {
        self.layouts
            .iter()
            .enumerate()
            .find_map(|(slot, layout)| layout.try_offset(name).map(|offset| (slot, offset)))
    }

    /// Offset, format and array size of `name` in the first attached layout defining it.
    pub fn layout_data(&self, name: &str) -> Option<(u32, PinFormat, ArraySize)> {
        self.layouts.iter().find_map(|layout| layout.data(name))
    }

    pub fn offset(&self, name: &str) -> Result<(usize, u32)> {
        self.try_offset(name).ok_or_else(|| {
            ShaderError::missing(name, "an entry in an attached constant buffer", "nothing")
        })
    }

    pub fn is_defined(&self) -> bool {
        self.validate().is_ok()
    }

    /// Reason the parameters are not complete, if any.
    pub fn definition_error(&self) -> Option<String> {
        self.validate().err().map(|e| e.to_string())
    }

    /// Validates against the default device limits.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(DeviceLimits::default())
    }

    /// Checks every declared parameter, stopping at the first violation.
    pub fn validate_with(&self, limits: DeviceLimits) -> Result<()> {
        for description in self.parameters.iter() {
            self.check(description, limits)?;
        }
        Ok(())
    }

    fn check(&self, desc: &ParameterDescription, limits: DeviceLimits) -> Result<()> {
        let name = desc.name();
        let Some(value) = self.values.get(name) else {
            if desc.is_fixed() {
                return Err(ShaderError::missing(
                    name,
                    format!("a fixed {}", expected_shape(desc)),
                    "no value",
                ));
            }
            let Some((_, format, size)) = self.layout_data(name) else {
                return Err(ShaderError::missing(
                    name,
                    format!("a fixed value or constant buffer entry of {}", expected_shape(desc)),
                    "neither",
                ));
            };
            let size_matches = match desc.array_size() {
                ArraySize::Dynamic => size.is_array(),
                declared => declared == size,
            };
            if format != desc.format() || !size_matches {
                return Err(ShaderError::missing(
                    name,
                    format!("a constant buffer entry of {}", expected_shape(desc)),
                    format!("an entry of {format}{size}"),
                ));
            }
            return Ok(());
        };

        match desc.array_size() {
            ArraySize::Dynamic => {
                let len = self.check_array(desc, value, limits)?;
                if let Some(declared) = self.values.get(&ParameterDescription::length_key(name)) {
                    let declared_len = declared.as_value().and_then(Value::as_u32);
                    if declared_len != Some(len) {
                        return Err(ShaderError::missing(
                            ParameterDescription::length_key(name),
                            format!("the array length {len}"),
                            format!("{declared:?}"),
                        ));
                    }
                }
                Ok(())
            }
            ArraySize::Static(n) => {
                let len = self.check_array(desc, value, limits)?;
                if len != n {
                    return Err(ShaderError::missing(
                        name,
                        expected_shape(desc),
                        format!("an array of {len} elements"),
                    ));
                }
                Ok(())
            }
            ArraySize::NotArray => self.check_scalar(desc, value, limits),
        }
    }

    fn check_array(
        &self,
        desc: &ParameterDescription,
        value: &ParameterValue,
        limits: DeviceLimits,
    ) -> Result<u32> {
        let name = desc.name();
        let format = desc.format();
        let mismatch = || ShaderError::missing(name, expected_shape(desc), format!("{value:?}"));

        if format == PinFormat::Interface {
            let ParameterValue::InterfaceArray(items) = value else {
                return Err(mismatch());
            };
            for (i, item) in items.iter().enumerate() {
                for nested in item.parameters() {
                    self.check(&nested.scoped_indexed(name, i), limits)?;
                }
            }
            return u32::try_from(items.len()).map_err(|_| mismatch());
        }

        let value = value.as_value().ok_or_else(mismatch)?;
        if let Some(max) = register_limit(format, limits) {
            let registers = value.as_u32_array().ok_or_else(mismatch)?;
            if let Some(bad) = registers.iter().find(|&&r| r >= max) {
                return Err(ShaderError::OutOfRange(format!(
                    "'{name}' binds {format} register {bad}, the device exposes {max}"
                )));
            }
            return u32::try_from(registers.len()).map_err(|_| mismatch());
        }
        value.array_len(format).ok_or_else(mismatch)
    }

    fn check_scalar(
        &self,
        desc: &ParameterDescription,
        value: &ParameterValue,
        limits: DeviceLimits,
    ) -> Result<()> {
        let name = desc.name();
        let format = desc.format();
        let mismatch = || ShaderError::missing(name, expected_shape(desc), format!("{value:?}"));

        if format == PinFormat::Interface {
            let ParameterValue::Interface(interface) = value else {
                return Err(mismatch());
            };
            for nested in interface.parameters() {
                self.check(&nested.scoped(name), limits)?;
            }
            return Ok(());
        }

        let value = value.as_value().ok_or_else(mismatch)?;
        if let Some(max) = register_limit(format, limits) {
            let register = value.as_u32().ok_or_else(mismatch)?;
            if register >= max {
                return Err(ShaderError::OutOfRange(format!(
                    "'{name}' binds {format} register {register}, the device exposes {max}"
                )));
            }
            return Ok(());
        }
        if value.is_compatible(format) {
            Ok(())
        } else {
            Err(mismatch())
        }
    }
}

fn register_limit(format: PinFormat, limits: DeviceLimits) -> Option<u32> {
    if format.is_texture() {
        Some(limits.max_textures)
    } else if format == PinFormat::Sampler {
        Some(limits.max_samplers)
    } else {
        None
    }
}

fn expected_shape(desc: &ParameterDescription) -> String {
    match desc.array_size() {
        ArraySize::NotArray => desc.format().to_string(),
        ArraySize::Dynamic => format!("array of {}", desc.format()),
        ArraySize::Static(n) => format!("array of {n} {}", desc.format()),
    }
}

impl PartialEq for FixedShaderParameters {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FixedShaderParameters {}

impl PartialOrd for FixedShaderParameters {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FixedShaderParameters {
    fn cmp(&self, other: &Self) -> Ordering {
        self.layouts
            .len()
            .cmp(&other.layouts.len())
            .then_with(|| self.values.len().cmp(&other.values.len()))
            .then_with(|| {
                self.layouts
                    .iter()
                    .map(|l| &**l)
                    .cmp(other.layouts.iter().map(|l| &**l))
            })
            .then_with(|| {
                self.values
                    .iter()
                    .zip(&other.values)
                    .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.structural_cmp(vb)))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
    }
}

impl Hash for FixedShaderParameters {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.layouts.len().hash(state);
        self.values.len().hash(state);
        for layout in &self.layouts {
            layout.hash(state);
        }
        for (name, value) in &self.values {
            name.hash(state);
            value.structural_hash(state);
        }
    }
}
