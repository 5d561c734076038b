//! Shader graph IR and compiler.
//!
//! Shaders are authored as a DAG of typed operations inside a [`ShaderCode`], frozen, bound to
//! concrete [`FixedShaderParameters`] and compiled through a pluggable [`ShaderDriver`] into
//! cached, reference-counted [`Shader`] objects. This crate provides:
//!
//! - [`Pin`] / [`PinFormat`] / [`PinsDescriptor`]: structural typing of data-flow edges
//! - [`ShaderCode`]: the operation arena, freeze state and topological scheduler
//! - [`ShaderBuilder`] / [`Expr`]: operator-overloaded construction of a [`ShaderCode`]
//! - [`ConstantBufferLayout`]: register-aligned constant buffer packing
//! - [`FixedShaderParameters`]: recursive parameter validation and the compile cache key
//! - [`ShaderCompiler`]: operand allocation, constant folding and control flow
//! - [`TraceDriver`]: a recording backend for debugging emission
//!
//! Device code generation lives behind the [`ShaderDriver`] boundary.

mod builder;
mod cache;
mod code;
mod compiler;
mod descriptor;
mod device;
mod driver;
mod error;
mod format;
mod graph;
mod interface;
mod layout;
pub mod limits;
mod operand;
mod ops;
mod parameter;
mod params;
mod pin;
mod shader;
mod swizzle;
mod value;

pub use builder::{Expr, ShaderBuilder};
pub use cache::{ShaderCacheConfig, ShaderCacheStats};
pub use code::{CodeState, ShaderCode, ShaderCodeSnapshot};
pub use compiler::ShaderCompiler;
pub use descriptor::{
    numeric_formats, texture_formats, vector_formats, PinDescriptor, PinEqual, PinMultipliable,
    PinRelation, PinTextureAddressable, PinTextureMipmappedAddressable, PinsDescriptor,
};
pub use device::{DeviceLimits, GraphicsDevice};
pub use driver::{
    BindingStage, DriverShader, ExpandType, FlowInstruction, Instruction, Registration,
    ShaderDriver, ShaderFunction, TraceDriver, TraceEvent, TraceLog, TraceShader,
};
pub use error::{DriverError, Result, ShaderError};
pub use format::{mul_result_format, ArraySize, PinComponent, PinFormat, ScalarKind, Shape};
pub use interface::{InterfaceConstants, ShaderInterface};
pub use layout::{ConstantBufferLayout, ConstantBufferLayoutBuilder, LayoutEntry};
pub use operand::{Operand, OperandId};
pub use ops::{
    ConstantOperation, InputOperation, InputSlot, OpKind, OutputOperation, OutputSlot,
    ShareContext,
};
pub use parameter::ParameterDescription;
pub use params::{FixedShaderParameters, ParameterValue};
pub use pin::{GraphId, OpId, Pin, PinSource};
pub use shader::{CacheableState, Shader, ShaderUse};
pub use swizzle::SwizzleMask;
pub use value::{BinaryOp, CompareFunction, Value};
