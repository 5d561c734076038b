//! Polymorphic interface parameters.
//!
//! An interface value is bound as a fixed parameter of format [`crate::PinFormat::Interface`].
//! It declares its own parameters, which are re-scoped under the binding name (`light.colour`,
//! `lights[2].colour`) and validated like top-level ones.

use std::collections::BTreeMap;
use std::fmt;

use crate::compiler::ShaderCompiler;
use crate::error::Result;
use crate::format::PinFormat;
use crate::operand::Operand;
use crate::parameter::ParameterDescription;

/// Operands resolved for an interface's own parameters, keyed by unscoped name.
pub type InterfaceConstants = BTreeMap<String, Operand>;

pub trait ShaderInterface: fmt::Debug + Send + Sync {
    /// Declared type identity; fixed parameters holding interfaces compare by it.
    fn type_name(&self) -> &str;

    fn parameters(&self) -> Vec<ParameterDescription> {
        Vec::new()
    }

    /// Format of the value produced by [`ShaderInterface::compile`].
    fn output_format(&self) -> PinFormat;

    /// Emits the interface body for `inputs` and returns its result.
    fn compile(
        &self,
        compiler: &mut ShaderCompiler,
        constants: &InterfaceConstants,
        inputs: &[Operand],
    ) -> Result<Operand>;
}
