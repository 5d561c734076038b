//! Operation kinds of a shader graph.
//!
//! Every node of a [`crate::ShaderCode`] arena holds one [`OpKind`] together with the pins it
//! consumes and produces. A kind declares its input contract ([`OpKind::descriptor`]), derives
//! its output pins ([`OpKind::outputs`]) and emits itself through a [`ShaderCompiler`]
//! ([`OpKind::compile`]).

mod flow;
mod interface;
mod io;
mod math;
mod texture;

use serde::{Deserialize, Serialize};

use crate::compiler::ShaderCompiler;
use crate::descriptor::PinsDescriptor;
use crate::driver::{ExpandType, ShaderFunction};
use crate::error::{Result, ShaderError};
use crate::format::PinFormat;
use crate::operand::Operand;
use crate::params::FixedShaderParameters;
use crate::pin::{OpId, Pin};
use crate::swizzle::SwizzleMask;
use crate::value::{BinaryOp, CompareFunction};

pub use io::{ConstantOperation, InputOperation, InputSlot, OutputOperation, OutputSlot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    Input(InputOperation),
    Output(OutputOperation),
    Constant(ConstantOperation),
    /// `Mul` follows the shader `mul` typing rules, the others need equal operands.
    Arithmetic(BinaryOp),
    Dot,
    Compare(CompareFunction),
    Call(ShaderFunction),
    Swizzle(SwizzleMask),
    Expand {
        format: PinFormat,
        policy: ExpandType,
    },
    Convert(PinFormat),
    Index,
    Sample,
    Load,
    /// Opens a loop over `values` loop-carried values.
    WhileBegin {
        values: usize,
        end: Option<OpId>,
    },
    /// Closes the loop opened by `begin` once the condition input holds.
    WhileEnd {
        begin: OpId,
        values: usize,
    },
    /// Opens a loop running a `UInteger` count of times over `values` loop-carried values.
    RepeatBegin {
        values: usize,
        end: Option<OpId>,
    },
    RepeatEnd {
        begin: OpId,
        values: usize,
    },
    /// Emits the interface bound to parameter `parameter`.
    InterfaceCall {
        parameter: String,
        format: PinFormat,
    },
}

/// Arena node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Node {
    pub(crate) kind: OpKind,
    pub(crate) inputs: Vec<Pin>,
    pub(crate) outputs: Vec<Pin>,
    pub(crate) removed: bool,
}

impl Node {
    pub(crate) fn new(kind: OpKind, inputs: Vec<Pin>, outputs: Vec<Pin>) -> Self {
        Self {
            kind,
            inputs,
            outputs,
            removed: false,
        }
    }

    /// Operations whose results this node needs emitted first.
    pub(crate) fn dependencies(&self) -> impl Iterator<Item = OpId> + '_ {
        self.inputs
            .iter()
            .filter_map(Pin::owner)
            .chain(self.kind.closed_loop())
    }
}

/// Token one operation hands to a later one during emission.
///
/// The scheduler keeps it until operation `destination` is emitted and never looks inside.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareContext {
    pub destination: OpId,
    pub operands: Vec<Operand>,
}

/// What the scheduler passes to [`OpKind::compile`].
pub(crate) struct CompileContext<'a> {
    pub(crate) compiler: &'a mut ShaderCompiler,
    pub(crate) parameters: &'a FixedShaderParameters,
    pub(crate) op: OpId,
}

/// Result of emitting one operation.
#[derive(Debug)]
pub(crate) struct Emission {
    /// One operand per output pin.
    pub(crate) outputs: Vec<Operand>,
    pub(crate) share: Option<ShareContext>,
}

impl Emission {
    fn outputs(outputs: Vec<Operand>) -> Self {
        Self {
            outputs,
            share: None,
        }
    }

    fn single(output: Operand) -> Self {
        Self::outputs(vec![output])
    }
}

impl OpKind {
    /// `Some(end)` for operations opening a loop, `end` being `None` while it is open.
    pub(crate) fn opened_loop(&self) -> Option<Option<OpId>> {
        match *self {
            OpKind::WhileBegin { end, .. } | OpKind::RepeatBegin { end, .. } => Some(end),
            _ => None,
        }
    }

    /// Beginning of the loop an end operation closes.
    pub(crate) fn closed_loop(&self) -> Option<OpId> {
        match *self {
            OpKind::WhileEnd { begin, .. } | OpKind::RepeatEnd { begin, .. } => Some(begin),
            _ => None,
        }
    }

    /// Whether `end` is the kind of operation closing a loop opened by `self`.
    pub(crate) fn is_closed_by(&self, end: &OpKind) -> bool {
        matches!(
            (self, end),
            (OpKind::WhileBegin { .. }, OpKind::WhileEnd { .. })
                | (OpKind::RepeatBegin { .. }, OpKind::RepeatEnd { .. })
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Input(_) => "input",
            OpKind::Output(_) => "output",
            OpKind::Constant(_) => "constant",
            OpKind::Arithmetic(BinaryOp::Add) => "add",
            OpKind::Arithmetic(BinaryOp::Sub) => "sub",
            OpKind::Arithmetic(BinaryOp::Mul) => "mul",
            OpKind::Arithmetic(BinaryOp::Div) => "div",
            OpKind::Arithmetic(BinaryOp::Min) => "min",
            OpKind::Arithmetic(BinaryOp::Max) => "max",
            OpKind::Dot => "dot",
            OpKind::Compare(_) => "compare",
            OpKind::Call(_) => "call",
            OpKind::Swizzle(_) => "swizzle",
            OpKind::Expand { .. } => "expand",
            OpKind::Convert(_) => "convert",
            OpKind::Index => "index",
            OpKind::Sample => "sample",
            OpKind::Load => "load",
            OpKind::WhileBegin { .. } => "while",
            OpKind::WhileEnd { .. } => "end while",
            OpKind::RepeatBegin { .. } => "repeat",
            OpKind::RepeatEnd { .. } => "end repeat",
            OpKind::InterfaceCall { .. } => "interface call",
        }
    }

    /// Input contract of the kind.
    pub fn descriptor(&self) -> PinsDescriptor {
        match self {
            OpKind::Input(_) | OpKind::Constant(_) => PinsDescriptor::default(),
            OpKind::Output(output) => output.descriptor(),
            OpKind::Arithmetic(BinaryOp::Mul) => math::multiply_descriptor(),
            OpKind::Arithmetic(_) => math::arithmetic_descriptor(),
            OpKind::Dot => math::dot_descriptor(),
            OpKind::Compare(_) => math::compare_descriptor(),
            OpKind::Call(function) => math::call_descriptor(*function),
            OpKind::Swizzle(_) | OpKind::Expand { .. } | OpKind::Convert(_) => {
                math::reshape_descriptor()
            }
            OpKind::Index => math::index_descriptor(),
            OpKind::Sample => texture::sample_descriptor(),
            OpKind::Load => texture::load_descriptor(),
            OpKind::WhileBegin { values, .. } => flow::begin_descriptor(*values),
            OpKind::WhileEnd { values, .. } => flow::end_descriptor(*values),
            OpKind::RepeatBegin { values, .. } => flow::repeat_begin_descriptor(*values),
            OpKind::RepeatEnd { values, .. } => flow::repeat_end_descriptor(*values),
            OpKind::InterfaceCall { .. } => interface::descriptor(),
        }
    }

    /// Output pins produced for `inputs`, not yet attached to a node.
    pub(crate) fn outputs(&self, inputs: &[Pin]) -> Result<Vec<Pin>> {
        match self {
            OpKind::Input(input) => Ok(input.pins()),
            OpKind::Output(_) => Ok(Vec::new()),
            OpKind::Constant(constant) => Ok(vec![constant.pin()]),
            OpKind::Arithmetic(BinaryOp::Mul) => math::multiply_outputs(inputs),
            OpKind::Arithmetic(_) => Ok(vec![inputs[0].unowned()]),
            OpKind::Dot => math::dot_outputs(inputs),
            OpKind::Compare(_) => math::compare_outputs(inputs),
            OpKind::Call(function) => math::call_outputs(*function, inputs),
            OpKind::Swizzle(mask) => Ok(vec![Pin::scalar(mask.output_format(inputs[0].format())?)]),
            OpKind::Expand { format, .. } => math::expand_outputs(inputs, *format),
            OpKind::Convert(format) => math::convert_outputs(inputs, *format),
            OpKind::Index => math::index_outputs(inputs),
            OpKind::Sample | OpKind::Load => texture::outputs(inputs),
            OpKind::WhileBegin { .. } => Ok(inputs.iter().map(|p| p.unowned()).collect()),
            OpKind::WhileEnd { .. } => Ok(inputs[1..].iter().map(|p| p.unowned()).collect()),
            OpKind::RepeatBegin { .. } => Ok(flow::repeat_begin_outputs(inputs)),
            OpKind::RepeatEnd { .. } => Ok(inputs.iter().map(|p| p.unowned()).collect()),
            OpKind::InterfaceCall { format, .. } => Ok(vec![Pin::scalar(*format)]),
        }
    }

    /// Emits the operation. `inputs` holds one operand per input pin, `share` the token a
    /// previous operation addressed to this one.
    pub(crate) fn compile(
        &self,
        ctx: &mut CompileContext<'_>,
        inputs: &[Operand],
        share: Option<ShareContext>,
    ) -> Result<Emission> {
        if share.is_some() && self.closed_loop().is_none() {
            return Err(ShaderError::InvalidGraph(format!(
                "{} {} received a share context it cannot use",
                self.name(),
                ctx.op
            )));
        }
        let compiler = &mut *ctx.compiler;
        match self {
            OpKind::Input(input) => Ok(Emission::outputs(input.compile(compiler))),
            OpKind::Output(output) => {
                output.compile(compiler, inputs)?;
                Ok(Emission::outputs(Vec::new()))
            }
            OpKind::Constant(constant) => {
                constant.compile(compiler, ctx.parameters).map(Emission::single)
            }
            OpKind::Arithmetic(op) => {
                let (a, b) = (&inputs[0], &inputs[1]);
                let result = match op {
                    BinaryOp::Add => compiler.add(a, b),
                    BinaryOp::Sub => compiler.sub(a, b),
                    BinaryOp::Mul => compiler.mul(a, b),
                    BinaryOp::Div => compiler.div(a, b),
                    BinaryOp::Min => compiler.min(a, b),
                    BinaryOp::Max => compiler.max(a, b),
                };
                result.map(Emission::single)
            }
            OpKind::Dot => compiler.dot(&inputs[0], &inputs[1]).map(Emission::single),
            OpKind::Compare(function) => compiler
                .compare(*function, &inputs[0], &inputs[1])
                .map(Emission::single),
            OpKind::Call(function) => compiler.call(*function, inputs).map(Emission::single),
            OpKind::Swizzle(mask) => compiler.swizzle(&inputs[0], mask).map(Emission::single),
            OpKind::Expand { format, policy } => compiler
                .expand(&inputs[0], *format, *policy)
                .map(Emission::single),
            OpKind::Convert(format) => compiler.convert(&inputs[0], *format).map(Emission::single),
            OpKind::Index => compiler
                .index_in_array(&inputs[0], &inputs[1])
                .map(Emission::single),
            OpKind::Sample => compiler
                .sample(&inputs[0], &inputs[1], &inputs[2])
                .map(Emission::single),
            OpKind::Load => compiler
                .load(&inputs[0], &inputs[1], inputs.get(2))
                .map(Emission::single),
            OpKind::WhileBegin { end, .. } => flow::compile_begin(compiler, *end, inputs),
            OpKind::WhileEnd { begin, .. } => flow::compile_end(compiler, *begin, inputs, share),
            OpKind::RepeatBegin { end, .. } => flow::compile_repeat_begin(compiler, *end, inputs),
            OpKind::RepeatEnd { begin, .. } => {
                flow::compile_repeat_end(compiler, *begin, inputs, share)
            }
            OpKind::InterfaceCall { parameter, format } => {
                interface::compile(compiler, ctx.parameters, parameter, *format, inputs)
                    .map(Emission::single)
            }
        }
    }
}
