//! Driver boundary: the backend that turns emitted instructions into a device shader.
//!
//! The compiler never encodes machine code itself. Every operand is registered with the driver
//! before it is used, and every instruction is forwarded through [`ShaderDriver`].

mod trace;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::DriverError;
use crate::format::{ArraySize, PinComponent, PinFormat};
use crate::operand::OperandId;
use crate::swizzle::SwizzleMask;
use crate::value::{CompareFunction, Value};

pub use trace::{
    FlowInstruction, Instruction, Registration, TraceDriver, TraceEvent, TraceLog, TraceShader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingStage {
    Vertex,
    Pixel,
    Geometry,
}

/// How [`ShaderDriver::expand`] fills the added components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpandType {
    AddZeros,
    AddOnes,
    /// Zeros, except a one in `w`.
    AddOnesAtW,
}

/// Intrinsic functions reachable through [`ShaderDriver::call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderFunction {
    Abs,
    Floor,
    Ceil,
    Length,
    All,
    Any,
    None,
    Clamp,
    Lerp,
}

impl ShaderFunction {
    pub fn arity(self) -> usize {
        match self {
            ShaderFunction::Clamp | ShaderFunction::Lerp => 3,
            _ => 1,
        }
    }
}

/// Finished backend program. Dropping it releases the device resources.
pub trait DriverShader: fmt::Debug + Send + Sync {
    fn stage(&self) -> BindingStage;
}

pub trait ShaderDriver: Send {
    fn begin(&mut self, stage: BindingStage);

    fn end(&mut self) -> Result<Box<dyn DriverShader>, DriverError>;

    /// Debug path: compiles an external source file directly.
    fn compile_file(
        &mut self,
        stage: BindingStage,
        path: &Path,
    ) -> Result<Box<dyn DriverShader>, DriverError>;

    fn register_input(&mut self, id: OperandId, format: PinFormat, component: PinComponent);

    fn register_constant(
        &mut self,
        id: OperandId,
        name: &str,
        format: PinFormat,
        size: ArraySize,
        buffer: usize,
        offset: u32,
    );

    fn register_texture(
        &mut self,
        id: OperandId,
        name: &str,
        format: PinFormat,
        texture_format: PinFormat,
        register: u32,
    );

    fn register_sampler(&mut self, id: OperandId, name: &str, register: u32);

    fn register_fixed(&mut self, id: OperandId, value: &Value);

    fn register_temp(&mut self, id: OperandId, format: PinFormat, size: ArraySize);

    fn mov(&mut self, src: OperandId, dst: OperandId);

    fn add(&mut self, a: OperandId, b: OperandId, dst: OperandId);

    fn sub(&mut self, a: OperandId, b: OperandId, dst: OperandId);

    fn mul(&mut self, a: OperandId, b: OperandId, dst: OperandId);

    fn div(&mut self, a: OperandId, b: OperandId, dst: OperandId);

    fn min(&mut self, a: OperandId, b: OperandId, dst: OperandId);

    fn max(&mut self, a: OperandId, b: OperandId, dst: OperandId);

    /// Multiply involving a matrix operand.
    fn mul_ex(&mut self, a: OperandId, b: OperandId, dst: OperandId);

    fn dot(&mut self, a: OperandId, b: OperandId, dst: OperandId);

    fn compare(&mut self, function: CompareFunction, a: OperandId, b: OperandId, dst: OperandId);

    fn call(&mut self, function: ShaderFunction, args: &[OperandId], dst: OperandId);

    fn swizzle(&mut self, src: OperandId, mask: &SwizzleMask, dst: OperandId);

    fn expand(&mut self, src: OperandId, policy: ExpandType, dst: OperandId);

    fn convert(&mut self, src: OperandId, dst: OperandId);

    fn index_in_array(&mut self, array: OperandId, index: OperandId, dst: OperandId);

    fn load(
        &mut self,
        texture: OperandId,
        position: OperandId,
        offset: Option<OperandId>,
        dst: OperandId,
    );

    fn sample(
        &mut self,
        texture: OperandId,
        sampler: OperandId,
        position: OperandId,
        dst: OperandId,
    );

    fn output(&mut self, src: OperandId, component: PinComponent);

    fn begin_if(&mut self, condition: OperandId);

    fn begin_else(&mut self);

    fn end_if(&mut self);

    fn begin_while(&mut self);

    /// Leaves the innermost loop, unconditionally or when `condition` holds.
    fn break_loop(&mut self, condition: Option<OperandId>);

    fn end_while(&mut self);

    fn begin_switch(&mut self, selector: OperandId);

    fn begin_case(&mut self, label: &Value);

    fn begin_default(&mut self);

    fn end_case(&mut self);

    fn end_switch(&mut self);
}
