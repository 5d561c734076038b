use super::math::value_formats;
use super::{Emission, ShareContext};
use crate::compiler::ShaderCompiler;
use crate::descriptor::{PinDescriptor, PinsDescriptor};
use crate::error::{Result, ShaderError};
use crate::format::{ArraySize, PinFormat};
use crate::operand::Operand;
use crate::pin::{OpId, Pin};
use crate::value::{CompareFunction, Value};

fn loop_value(i: usize) -> PinDescriptor {
    PinDescriptor::new(format!("value{i}"), value_formats()).any_size()
}

pub(super) fn begin_descriptor(values: usize) -> PinsDescriptor {
    PinsDescriptor::new((0..values).map(loop_value))
}

/// Iteration count followed by the carried values.
pub(super) fn repeat_begin_descriptor(values: usize) -> PinsDescriptor {
    PinsDescriptor::new(
        std::iter::once(PinDescriptor::new("count", [PinFormat::UInteger]))
            .chain((0..values).map(loop_value)),
    )
}

pub(super) fn repeat_end_descriptor(values: usize) -> PinsDescriptor {
    PinsDescriptor::new((0..values).map(loop_value))
}

/// The iteration index, then one pin per carried value.
pub(super) fn repeat_begin_outputs(inputs: &[Pin]) -> Vec<Pin> {
    std::iter::once(Pin::scalar(PinFormat::UInteger))
        .chain(inputs.iter().skip(1).map(|p| p.unowned()))
        .collect()
}

pub(super) fn end_descriptor(values: usize) -> PinsDescriptor {
    PinsDescriptor::new(
        std::iter::once(PinDescriptor::new("condition", [PinFormat::Bool]))
            .chain((0..values).map(loop_value)),
    )
}

/// Copies the initial values into loop registers, opens the loop and hands the registers to
/// the matching end.
pub(super) fn compile_begin(
    compiler: &mut ShaderCompiler,
    end: Option<OpId>,
    inputs: &[Operand],
) -> Result<Emission> {
    let destination =
        end.ok_or_else(|| ShaderError::InvalidGraph("while loop is never closed".into()))?;
    let registers = loop_registers(compiler, inputs)?;
    compiler.begin_while();
    Ok(Emission {
        outputs: registers.clone(),
        share: Some(ShareContext {
            destination,
            operands: registers,
        }),
    })
}

/// Stores the next values into the loop registers and leaves the loop once `inputs[0]` holds.
pub(super) fn compile_end(
    compiler: &mut ShaderCompiler,
    begin: OpId,
    inputs: &[Operand],
    share: Option<ShareContext>,
) -> Result<Emission> {
    let registers = share.map(|s| s.operands).ok_or_else(|| {
        ShaderError::InvalidGraph(format!("end of the loop opened by {begin} was not shared"))
    })?;
    let (condition, next) = inputs
        .split_first()
        .ok_or_else(|| ShaderError::InvalidGraph("loop end without a condition".into()))?;
    if next.len() != registers.len() {
        return Err(ShaderError::InvalidGraph(format!(
            "loop opened by {begin} carries {} values, its end {}",
            registers.len(),
            next.len()
        )));
    }
    for (value, register) in next.iter().zip(&registers) {
        compiler.mov(value, register)?;
    }
    compiler.break_loop(Some(condition))?;
    compiler.end_while()?;
    Ok(Emission::outputs(registers))
}

fn loop_registers(compiler: &mut ShaderCompiler, initial: &[Operand]) -> Result<Vec<Operand>> {
    initial
        .iter()
        .map(|value| {
            let register = compiler.create_temporary(value.format(), value.size());
            compiler.mov(value, &register)?;
            Ok(register)
        })
        .collect()
}

/// Opens a loop running `inputs[0]` times. The first shared operand is the iteration counter,
/// which the end increments.
pub(super) fn compile_repeat_begin(
    compiler: &mut ShaderCompiler,
    end: Option<OpId>,
    inputs: &[Operand],
) -> Result<Emission> {
    let destination =
        end.ok_or_else(|| ShaderError::InvalidGraph("counted loop is never closed".into()))?;
    let (count, initial) = inputs
        .split_first()
        .ok_or_else(|| ShaderError::InvalidGraph("counted loop without a count".into()))?;
    let zero = compiler.create_fixed(Value::UInteger(0));
    let counter = compiler.create_temporary(PinFormat::UInteger, ArraySize::NotArray);
    compiler.mov(&zero, &counter)?;
    let registers = loop_registers(compiler, initial)?;

    compiler.begin_while();
    let done = compiler.compare(CompareFunction::GreaterEqual, &counter, count)?;
    compiler.break_loop(Some(&done))?;

    let mut outputs = vec![counter];
    outputs.extend(registers);
    Ok(Emission {
        outputs: outputs.clone(),
        share: Some(ShareContext {
            destination,
            operands: outputs,
        }),
    })
}

/// Stores the next values, advances the counter and closes the loop.
pub(super) fn compile_repeat_end(
    compiler: &mut ShaderCompiler,
    begin: OpId,
    inputs: &[Operand],
    share: Option<ShareContext>,
) -> Result<Emission> {
    let shared = share.map(|s| s.operands).ok_or_else(|| {
        ShaderError::InvalidGraph(format!("end of the loop opened by {begin} was not shared"))
    })?;
    let (counter, registers) = shared.split_first().ok_or_else(|| {
        ShaderError::InvalidGraph(format!("loop opened by {begin} shared no counter"))
    })?;
    if inputs.len() != registers.len() {
        return Err(ShaderError::InvalidGraph(format!(
            "loop opened by {begin} carries {} values, its end {}",
            registers.len(),
            inputs.len()
        )));
    }
    for (value, register) in inputs.iter().zip(registers) {
        compiler.mov(value, register)?;
    }
    let one = compiler.create_fixed(Value::UInteger(1));
    compiler.add_into(counter, &one, counter)?;
    compiler.end_while()?;
    Ok(Emission::outputs(registers.to_vec()))
}
