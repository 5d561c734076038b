//! Backend emission session.
//!
//! A [`ShaderCompiler`] wraps one [`ShaderDriver`]. Between [`ShaderCompiler::begin`] and
//! [`ShaderCompiler::end`] it hands out operands, folds arithmetic on fixed operands and
//! forwards everything else to the driver.

mod flow;
mod math;
mod texture;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::device::DeviceLimits;
use crate::driver::{BindingStage, ShaderDriver};
use crate::error::{Result, ShaderError};
use crate::format::{ArraySize, PinComponent, PinFormat};
use crate::operand::{Operand, OperandId};
use crate::params::FixedShaderParameters;
use crate::shader::Shader;
use crate::value::Value;

use flow::FlowFrame;
pub(crate) use math::call_result_format;

pub struct ShaderCompiler {
    driver: Box<dyn ShaderDriver>,
    limits: DeviceLimits,
    stage: Option<BindingStage>,
    next_id: u32,
    flow: Vec<FlowFrame>,
}

impl std::fmt::Debug for ShaderCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCompiler")
            .field("limits", &self.limits)
            .field("stage", &self.stage)
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl ShaderCompiler {
    pub fn new(driver: Box<dyn ShaderDriver>, limits: DeviceLimits) -> Self {
        Self {
            driver,
            limits,
            stage: None,
            next_id: 0,
            flow: Vec::new(),
        }
    }

    /// Session over `driver` with the default device limits.
    pub fn with_driver(driver: impl ShaderDriver + 'static) -> Self {
        Self::new(Box::new(driver), DeviceLimits::default())
    }

    pub fn limits(&self) -> DeviceLimits {
        self.limits
    }

    /// Stage of the program being emitted, if any.
    pub fn stage(&self) -> Option<BindingStage> {
        self.stage
    }

    /// Starts a program. Discards the state of any unfinished one.
    pub fn begin(&mut self, stage: BindingStage) {
        self.stage = Some(stage);
        self.next_id = 0;
        self.flow.clear();
        self.driver.begin(stage);
    }

    /// Finishes the program and wraps it in a shader object owning `parameters`.
    pub fn end(&mut self, parameters: FixedShaderParameters) -> Result<Arc<Shader>> {
        let stage = self
            .stage
            .take()
            .ok_or_else(|| ShaderError::InvalidControlFlow("end without begin".into()))?;
        if let Some(open) = self.flow.pop() {
            self.flow.clear();
            return Err(ShaderError::InvalidControlFlow(format!(
                "{open:?} block is still open at the end of the program"
            )));
        }
        if stage == BindingStage::Geometry {
            return Err(ShaderError::Unsupported(
                "geometry shaders cannot be finalized".into(),
            ));
        }
        let handle = self.driver.end()?;
        debug!(?stage, operands = self.next_id, "compiled shader program");
        Ok(Shader::new(stage, handle, parameters))
    }

    /// Debug path: lets the driver compile `path` directly, bypassing graph emission.
    pub fn compile_file(
        &mut self,
        stage: BindingStage,
        path: &Path,
        parameters: FixedShaderParameters,
    ) -> Result<Arc<Shader>> {
        if stage == BindingStage::Geometry {
            return Err(ShaderError::Unsupported(
                "geometry shaders cannot be finalized".into(),
            ));
        }
        let handle = self.driver.compile_file(stage, path)?;
        Ok(Shader::new(stage, handle, parameters))
    }

    fn next_id(&mut self) -> OperandId {
        let id = OperandId(self.next_id);
        self.next_id += 1;
        id
    }

    fn operand(
        &mut self,
        format: PinFormat,
        texture_format: PinFormat,
        size: ArraySize,
        writable: bool,
        value: Option<Value>,
    ) -> Operand {
        Operand {
            id: self.next_id(),
            format,
            texture_format,
            size,
            writable,
            value,
        }
    }

    pub fn create_input(&mut self, format: PinFormat, component: PinComponent) -> Operand {
        let operand = self.operand(format, PinFormat::Undefined, ArraySize::NotArray, false, None);
        self.driver.register_input(operand.id, format, component);
        operand
    }

    /// Operand read from word `offset` of constant buffer `buffer`.
    pub fn create_constant(
        &mut self,
        name: &str,
        format: PinFormat,
        size: ArraySize,
        buffer: usize,
        offset: u32,
    ) -> Operand {
        let operand = self.operand(format, PinFormat::Undefined, size, false, None);
        self.driver
            .register_constant(operand.id, name, format, size, buffer, offset);
        operand
    }

    pub fn create_temporary(&mut self, format: PinFormat, size: ArraySize) -> Operand {
        let operand = self.operand(format, PinFormat::Undefined, size, true, None);
        self.driver.register_temp(operand.id, format, size);
        operand
    }

    pub fn create_fixed(&mut self, value: Value) -> Operand {
        let size = match &value {
            Value::Array(items) => ArraySize::Static(items.len() as u32),
            _ => ArraySize::NotArray,
        };
        let operand = self.operand(value.format(), PinFormat::Undefined, size, false, None);
        self.driver.register_fixed(operand.id, &value);
        Operand {
            value: Some(value),
            ..operand
        }
    }

    pub fn create_texture(
        &mut self,
        name: &str,
        format: PinFormat,
        texture_format: PinFormat,
        register: u32,
    ) -> Result<Operand> {
        if !format.is_texture() {
            return Err(ShaderError::incompatible(format!(
                "'{name}' of format {format} is not a texture"
            )));
        }
        if register >= self.limits.max_textures {
            return Err(ShaderError::OutOfRange(format!(
                "texture register {register} of '{name}' exceeds {}",
                self.limits.max_textures
            )));
        }
        let operand = self.operand(format, texture_format, ArraySize::NotArray, false, None);
        self.driver
            .register_texture(operand.id, name, format, texture_format, register);
        Ok(operand)
    }

    pub fn create_sampler(&mut self, name: &str, register: u32) -> Result<Operand> {
        if register >= self.limits.max_samplers {
            return Err(ShaderError::OutOfRange(format!(
                "sampler register {register} of '{name}' exceeds {}",
                self.limits.max_samplers
            )));
        }
        let operand = self.operand(
            PinFormat::Sampler,
            PinFormat::Undefined,
            ArraySize::NotArray,
            false,
            None,
        );
        self.driver.register_sampler(operand.id, name, register);
        Ok(operand)
    }

    /// Placeholder for values resolved outside the driver, such as interface bindings.
    pub(crate) fn create_unresolved(&mut self, format: PinFormat, size: ArraySize) -> Operand {
        self.operand(format, PinFormat::Undefined, size, false, None)
    }

    fn check_destination(dst: &Operand, format: PinFormat, size: ArraySize) -> Result<()> {
        if !dst.writable {
            return Err(ShaderError::incompatible(format!("{dst} is not writable")));
        }
        if dst.format != format || dst.size != size {
            return Err(ShaderError::incompatible(format!(
                "{dst} cannot hold a {format}{size} result"
            )));
        }
        Ok(())
    }

    pub fn mov(&mut self, src: &Operand, dst: &Operand) -> Result<()> {
        Self::check_destination(dst, src.format, src.size)?;
        self.driver.mov(src.id, dst.id);
        Ok(())
    }

    pub fn output(&mut self, src: &Operand, component: PinComponent) -> Result<()> {
        if src.is_array() {
            return Err(ShaderError::incompatible(format!(
                "array {src} cannot be written to {component:?}"
            )));
        }
        self.driver.output(src.id, component);
        Ok(())
    }

    /// Produces the result of an instruction: a fresh fixed operand when `folded` is known,
    /// otherwise `dst` or a new temporary filled by `emit`.
    fn finish(
        &mut self,
        dst: Option<&Operand>,
        format: PinFormat,
        size: ArraySize,
        folded: Option<Value>,
        emit: impl FnOnce(&mut dyn ShaderDriver, OperandId),
    ) -> Result<Operand> {
        if let Some(dst) = dst {
            Self::check_destination(dst, format, size)?;
        }
        match (folded, dst) {
            (Some(value), dst) => {
                // Normalized results fold as floats but keep the instruction's format.
                let mut fixed = self.create_fixed(value);
                if !size.is_array() {
                    fixed.format = format;
                }
                match dst {
                    Some(dst) => {
                        self.driver.mov(fixed.id, dst.id);
                        Ok(dst.clone())
                    }
                    None => Ok(fixed),
                }
            }
            (None, dst) => {
                let target = match dst {
                    Some(dst) => dst.clone(),
                    None => self.create_temporary(format, size),
                };
                emit(self.driver.as_mut(), target.id);
                Ok(target)
            }
        }
    }
}

/// Host folding result: `Unsupported` means "no host representation", which falls back to
/// emitting the instruction.
fn foldable(result: Result<Value>) -> Result<Option<Value>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ShaderError::Unsupported(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
