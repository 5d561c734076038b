use crate::compiler::call_result_format;
use crate::descriptor::{
    numeric_formats, vector_formats, PinDescriptor, PinEqual, PinMultipliable, PinsDescriptor,
};
use crate::driver::ShaderFunction;
use crate::error::{Result, ShaderError};
use crate::format::{mul_result_format, ArraySize, PinFormat, ScalarKind};
use crate::pin::Pin;

const NUMERIC_KINDS: [ScalarKind; 5] = [
    ScalarKind::Integer,
    ScalarKind::UInteger,
    ScalarKind::SNorm,
    ScalarKind::UNorm,
    ScalarKind::Float,
];

const ALL_KINDS: [ScalarKind; 6] = [
    ScalarKind::Integer,
    ScalarKind::UInteger,
    ScalarKind::Bool,
    ScalarKind::SNorm,
    ScalarKind::UNorm,
    ScalarKind::Float,
];

/// Every numeric format plus the boolean vectors.
pub(super) fn value_formats() -> Vec<PinFormat> {
    let mut formats = numeric_formats();
    formats.extend(vector_formats(&[ScalarKind::Bool]));
    formats
}

pub(super) fn arithmetic_descriptor() -> PinsDescriptor {
    PinsDescriptor::new([
        PinDescriptor::numeric("a").any_size(),
        PinDescriptor::numeric("b").any_size(),
    ])
    .with_relation(PinEqual::new([0, 1]))
}

pub(super) fn multiply_descriptor() -> PinsDescriptor {
    PinsDescriptor::new([
        PinDescriptor::numeric("a").any_size(),
        PinDescriptor::numeric("b").any_size(),
    ])
    .with_relation(PinMultipliable::new(0, 1))
}

pub(super) fn dot_descriptor() -> PinsDescriptor {
    let formats = vector_formats(&NUMERIC_KINDS);
    PinsDescriptor::new([
        PinDescriptor::new("a", formats.clone()),
        PinDescriptor::new("b", formats),
    ])
    .with_relation(PinEqual::new([0, 1]))
}

pub(super) fn compare_descriptor() -> PinsDescriptor {
    let formats = vector_formats(&ALL_KINDS);
    PinsDescriptor::new([
        PinDescriptor::new("a", formats.clone()),
        PinDescriptor::new("b", formats),
    ])
    .with_relation(PinEqual::new([0, 1]))
}

pub(super) fn call_descriptor(function: ShaderFunction) -> PinsDescriptor {
    let arity = function.arity();
    let formats = value_formats();
    PinsDescriptor::new(
        (0..arity).map(|i| PinDescriptor::new(format!("arg{i}"), formats.clone())),
    )
    .with_relation(PinEqual::new((0..arity).collect::<Vec<_>>()))
}

/// Single non-array source of a swizzle, expand or convert.
pub(super) fn reshape_descriptor() -> PinsDescriptor {
    PinsDescriptor::new([PinDescriptor::new("source", value_formats())])
}

pub(super) fn index_descriptor() -> PinsDescriptor {
    PinsDescriptor::new([
        PinDescriptor::new("array", value_formats()).any_size(),
        PinDescriptor::new("index", [PinFormat::Integer, PinFormat::UInteger]),
    ])
}

pub(super) fn multiply_outputs(inputs: &[Pin]) -> Result<Vec<Pin>> {
    let (a, b) = (&inputs[0], &inputs[1]);
    let format = mul_result_format(a.format(), b.format())
        .ok_or_else(|| ShaderError::incompatible(format!("cannot multiply {a} by {b}")))?;
    Ok(vec![Pin::new(format, a.size())])
}

pub(super) fn dot_outputs(inputs: &[Pin]) -> Result<Vec<Pin>> {
    let format = inputs[0]
        .format()
        .to_scalar()
        .ok_or_else(|| ShaderError::incompatible(format!("dot of {}", inputs[0])))?;
    Ok(vec![Pin::scalar(format)])
}

pub(super) fn compare_outputs(inputs: &[Pin]) -> Result<Vec<Pin>> {
    let components = inputs[0].format().components();
    let format = PinFormat::vector(ScalarKind::Bool, components)
        .ok_or_else(|| ShaderError::incompatible(format!("compare of {}", inputs[0])))?;
    Ok(vec![Pin::scalar(format)])
}

pub(super) fn call_outputs(function: ShaderFunction, inputs: &[Pin]) -> Result<Vec<Pin>> {
    let format = call_result_format(function, inputs[0].format()).ok_or_else(|| {
        ShaderError::incompatible(format!("{function:?} is not defined for {}", inputs[0]))
    })?;
    Ok(vec![Pin::scalar(format)])
}

pub(super) fn expand_outputs(inputs: &[Pin], format: PinFormat) -> Result<Vec<Pin>> {
    let source = inputs[0].format();
    let widens = match (source.shape(), format.shape()) {
        (Some(from), Some(to)) => {
            from.kind == to.kind && from.rows == 1 && to.rows == 1 && to.columns >= from.columns
        }
        _ => false,
    };
    if !widens {
        return Err(ShaderError::incompatible(format!(
            "cannot expand {source} to {format}"
        )));
    }
    Ok(vec![Pin::scalar(format)])
}

pub(super) fn convert_outputs(inputs: &[Pin], format: PinFormat) -> Result<Vec<Pin>> {
    let source = inputs[0].format();
    let same_shape = match (source.shape(), format.shape()) {
        (Some(from), Some(to)) => from.rows == to.rows && from.columns == to.columns,
        _ => false,
    };
    if !same_shape {
        return Err(ShaderError::incompatible(format!(
            "cannot convert {source} to {format}"
        )));
    }
    Ok(vec![Pin::new(format, ArraySize::NotArray)])
}

pub(super) fn index_outputs(inputs: &[Pin]) -> Result<Vec<Pin>> {
    let array = &inputs[0];
    if !array.is_array() {
        return Err(ShaderError::incompatible(format!("{array} is not an array")));
    }
    Ok(vec![Pin::texture(
        array.format(),
        array.texture_format(),
        ArraySize::NotArray,
    )])
}
