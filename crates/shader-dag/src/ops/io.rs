use serde::{Deserialize, Serialize};

use crate::compiler::ShaderCompiler;
use crate::descriptor::{PinDescriptor, PinsDescriptor};
use crate::error::{Result, ShaderError};
use crate::format::{ArraySize, PinComponent, PinFormat};
use crate::operand::Operand;
use crate::parameter::ParameterDescription;
use crate::params::FixedShaderParameters;
use crate::pin::{GraphId, Pin};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSlot {
    pub component: PinComponent,
    pub format: PinFormat,
    /// Removed slots keep their index so pins of later slots stay valid.
    pub removed: bool,
}

/// Stage inputs. Output pin `i` is slot `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputOperation {
    slots: Vec<InputSlot>,
}

impl InputOperation {
    pub fn slots(&self) -> &[InputSlot] {
        &self.slots
    }

    pub(crate) fn find(&self, component: PinComponent) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| !s.removed && s.component == component)
    }

    pub(crate) fn push(&mut self, component: PinComponent, format: PinFormat) -> usize {
        self.slots.push(InputSlot {
            component,
            format,
            removed: false,
        });
        self.slots.len() - 1
    }

    pub(crate) fn remove(&mut self, component: PinComponent) -> bool {
        match self.find(component) {
            Some(i) => {
                self.slots[i].removed = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_removed(&self, slot: u32) -> bool {
        self.slots.get(slot as usize).map_or(true, |s| s.removed)
    }

    pub(super) fn pins(&self) -> Vec<Pin> {
        self.slots.iter().map(|s| Pin::scalar(s.format)).collect()
    }

    pub(super) fn compile(&self, compiler: &mut ShaderCompiler) -> Vec<Operand> {
        self.slots
            .iter()
            .map(|s| {
                if s.removed {
                    // Nothing reads a removed slot; freezing rejects such graphs.
                    compiler.create_unresolved(s.format, ArraySize::NotArray)
                } else {
                    compiler.create_input(s.format, s.component)
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSlot {
    pub component: PinComponent,
    pub format: PinFormat,
    pub link: Option<Pin>,
}

/// Stage outputs. Its input pins are the linked slots, in slot order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputOperation {
    pixel: bool,
    slots: Vec<OutputSlot>,
}

impl OutputOperation {
    pub(crate) fn new(pixel: bool) -> Self {
        Self {
            pixel,
            slots: Vec::new(),
        }
    }

    pub fn is_pixel(&self) -> bool {
        self.pixel
    }

    pub fn slots(&self) -> &[OutputSlot] {
        &self.slots
    }

    /// Pixel outputs are depth and render targets; other stages may write anything else.
    pub fn accepts(&self, component: PinComponent) -> bool {
        component.is_single() && self.pixel == PinComponent::PIXEL_OUTPUTS.contains(component)
    }

    pub(crate) fn slot_mut(&mut self, component: PinComponent) -> Option<&mut OutputSlot> {
        self.slots.iter_mut().find(|s| s.component == component)
    }

    pub(crate) fn push(&mut self, component: PinComponent, format: PinFormat) {
        self.slots.push(OutputSlot {
            component,
            format,
            link: None,
        });
    }

    pub(crate) fn remove(&mut self, component: PinComponent) -> bool {
        let before = self.slots.len();
        self.slots.retain(|s| s.component != component);
        self.slots.len() != before
    }

    pub(crate) fn rebind_graph(&mut self, graph: GraphId) {
        for pin in self.slots.iter_mut().filter_map(|s| s.link.as_mut()) {
            pin.rebind_graph(graph);
        }
    }

    pub(crate) fn linked(&self) -> Vec<Pin> {
        self.slots.iter().filter_map(|s| s.link).collect()
    }

    pub(crate) fn unlinked(&self) -> impl Iterator<Item = PinComponent> + '_ {
        self.slots
            .iter()
            .filter(|s| s.link.is_none())
            .map(|s| s.component)
    }

    pub(super) fn descriptor(&self) -> PinsDescriptor {
        PinsDescriptor::new(self.slots.iter().filter(|s| s.link.is_some()).map(|s| {
            PinDescriptor::new(format!("{:?}", s.component), [s.format]).with_component(s.component)
        }))
    }

    pub(super) fn compile(&self, compiler: &mut ShaderCompiler, inputs: &[Operand]) -> Result<()> {
        let linked = self.slots.iter().filter(|s| s.link.is_some());
        for (slot, operand) in linked.zip(inputs) {
            compiler.output(operand, slot.component)?;
        }
        Ok(())
    }
}

/// Named parameter or anonymous baked value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantOperation {
    name: Option<String>,
    pin: Pin,
    fixed: bool,
    value: Option<Value>,
}

impl ConstantOperation {
    pub(crate) fn named(name: impl Into<String>, pin: Pin, fixed: bool) -> Self {
        Self {
            name: Some(name.into()),
            pin: pin.unowned(),
            fixed,
            value: None,
        }
    }

    pub(crate) fn baked(value: Value) -> Self {
        let size = match &value {
            Value::Array(items) => ArraySize::Static(items.len() as u32),
            _ => ArraySize::NotArray,
        };
        Self {
            name: None,
            pin: Pin::new(value.format(), size),
            fixed: true,
            value: Some(value),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn pin(&self) -> Pin {
        self.pin
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Declared parameter, for named constants.
    pub fn description(&self) -> Option<ParameterDescription> {
        let name = self.name.as_deref()?;
        let description = ParameterDescription::new(name, self.pin);
        Some(if self.fixed {
            description.fixed()
        } else {
            description
        })
    }

    pub(super) fn compile(
        &self,
        compiler: &mut ShaderCompiler,
        parameters: &FixedShaderParameters,
    ) -> Result<Operand> {
        match (&self.value, self.description()) {
            (Some(value), _) => Ok(compiler.create_fixed(value.clone())),
            (None, Some(description)) => resolve_parameter(compiler, parameters, &description),
            (None, None) => Err(ShaderError::InvalidGraph(
                "constant has neither a name nor a value".into(),
            )),
        }
    }
}

/// Operand for declared parameter `description`: a fixed value, a bound resource register or a
/// constant buffer entry.
pub(crate) fn resolve_parameter(
    compiler: &mut ShaderCompiler,
    parameters: &FixedShaderParameters,
    description: &ParameterDescription,
) -> Result<Operand> {
    let name = description.name();
    let pin = description.pin();
    let format = pin.format();

    if format == PinFormat::Interface {
        return Ok(compiler.create_unresolved(format, pin.size()));
    }
    if format.is_resource() {
        if pin.is_array() {
            return Err(ShaderError::Unsupported(format!(
                "'{name}' is an array of {format}"
            )));
        }
        let register = parameters
            .value(name)
            .and_then(Value::as_u32)
            .ok_or_else(|| ShaderError::missing(name, "a register index", "nothing"))?;
        return if format == PinFormat::Sampler {
            compiler.create_sampler(name, register)
        } else {
            compiler.create_texture(name, format, pin.texture_format(), register)
        };
    }
    if let Some(value) = parameters.value(name) {
        let mut operand = compiler.create_fixed(value.clone());
        if !pin.is_array() {
            operand.format = format;
        }
        return Ok(operand);
    }

    let (buffer, offset) = parameters.offset(name)?;
    let size = match pin.size() {
        ArraySize::Dynamic => parameters
            .value(&ParameterDescription::length_key(name))
            .and_then(Value::as_u32)
            .map_or(ArraySize::Dynamic, ArraySize::Static),
        size => size,
    };
    Ok(compiler.create_constant(name, format, size, buffer, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_outputs_are_depth_and_render_targets() {
        let pixel = OutputOperation::new(true);
        let vertex = OutputOperation::new(false);

        assert!(pixel.accepts(PinComponent::RENDER_TARGET3));
        assert!(pixel.accepts(PinComponent::DEPTH));
        assert!(!pixel.accepts(PinComponent::POSITION));
        assert!(vertex.accepts(PinComponent::POSITION));
        assert!(!vertex.accepts(PinComponent::RENDER_TARGET0));
        assert!(!vertex.accepts(PinComponent::POSITION | PinComponent::NORMAL));
    }

    #[test]
    fn removed_inputs_keep_their_slot() {
        let mut input = InputOperation::default();
        input.push(PinComponent::POSITION, PinFormat::Floatx4);
        let normal = input.push(PinComponent::NORMAL, PinFormat::Floatx3);

        assert!(input.remove(PinComponent::POSITION));
        assert!(!input.remove(PinComponent::POSITION));
        assert_eq!(input.find(PinComponent::NORMAL), Some(normal));
        assert!(input.is_removed(0));
        assert_eq!(input.pins().len(), 2);
    }

    #[test]
    fn baked_arrays_get_a_static_size() {
        let constant = ConstantOperation::baked(Value::from(vec![1u32, 2, 3]));
        assert_eq!(constant.pin().size(), ArraySize::Static(3));
        assert_eq!(constant.pin().format(), PinFormat::UInteger);
        assert!(constant.description().is_none());
    }
}
