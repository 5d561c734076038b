use crate::compiler::ShaderCompiler;
use crate::descriptor::{PinDescriptor, PinsDescriptor};
use crate::error::{Result, ShaderError};
use crate::format::PinFormat;
use crate::interface::InterfaceConstants;
use crate::operand::Operand;
use crate::params::FixedShaderParameters;

use super::io::resolve_parameter;
use super::math::value_formats;

/// The interface binding followed by up to four arguments.
pub(super) fn descriptor() -> PinsDescriptor {
    PinsDescriptor::new(
        std::iter::once(PinDescriptor::new("interface", [PinFormat::Interface])).chain(
            (0..crate::limits::MAX_INTRINSIC_ARGUMENTS).map(|i| {
                PinDescriptor::new(format!("arg{i}"), value_formats())
                    .any_size()
                    .optional()
            }),
        ),
    )
}

/// Resolves the bound interface's own parameters under `parameter.` and emits its body.
pub(super) fn compile(
    compiler: &mut ShaderCompiler,
    parameters: &FixedShaderParameters,
    parameter: &str,
    format: PinFormat,
    inputs: &[Operand],
) -> Result<Operand> {
    let interface = parameters.interface(parameter).ok_or_else(|| {
        ShaderError::missing(parameter, "an interface", "no interface value")
    })?;
    if interface.output_format() != format {
        return Err(ShaderError::incompatible(format!(
            "interface {} of '{parameter}' produces {}, the graph expects {format}",
            interface.type_name(),
            interface.output_format()
        )));
    }

    let mut constants = InterfaceConstants::new();
    for description in interface.parameters() {
        let operand = resolve_parameter(compiler, parameters, &description.scoped(parameter))?;
        constants.insert(description.name().to_owned(), operand);
    }

    let arguments = inputs.get(1..).unwrap_or_default();
    let result = interface.compile(compiler, &constants, arguments)?;
    if result.format() != format {
        return Err(ShaderError::incompatible(format!(
            "interface {} returned {result}, expected {format}",
            interface.type_name()
        )));
    }
    Ok(result)
}
