//! Shader graph container.
//!
//! A [`ShaderCode`] owns an arena of operations for one pipeline stage. It is built mutably,
//! frozen once, and then compiled any number of times against different
//! [`FixedShaderParameters`], each distinct binding producing at most one cached [`Shader`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{ShaderCache, ShaderCacheConfig, ShaderCacheStats};
use crate::compiler::ShaderCompiler;
use crate::device::GraphicsDevice;
use crate::driver::{BindingStage, ExpandType, ShaderFunction};
use crate::error::{Result, ShaderError};
use crate::format::{ArraySize, PinComponent, PinFormat};
use crate::graph;
use crate::operand::Operand;
use crate::ops::{
    CompileContext, ConstantOperation, InputOperation, Node, OpKind, OutputOperation, ShareContext,
};
use crate::parameter::ParameterDescription;
use crate::params::FixedShaderParameters;
use crate::pin::{GraphId, OpId, Pin, PinSource};
use crate::shader::Shader;
use crate::swizzle::SwizzleMask;
use crate::value::{BinaryOp, CompareFunction, Value};

const INPUT: OpId = OpId(0);
const OUTPUT: OpId = OpId(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeState {
    Building,
    Frozen,
    /// Cache released; the code no longer compiles.
    Disposed,
}

/// Persisted form of a frozen [`ShaderCode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderCodeSnapshot {
    stage: BindingStage,
    comment: Option<String>,
    nodes: Vec<Node>,
    constants: BTreeMap<String, OpId>,
}

#[derive(Debug)]
pub struct ShaderCode {
    id: GraphId,
    stage: BindingStage,
    state: CodeState,
    comment: Option<String>,
    nodes: Vec<Node>,
    constants: BTreeMap<String, OpId>,
    parameters: Option<Arc<[ParameterDescription]>>,
    order: Mutex<Option<Arc<[OpId]>>>,
    cache: Mutex<ShaderCache>,
    cache_config: ShaderCacheConfig,
}

impl ShaderCode {
    pub fn new(stage: BindingStage) -> Self {
        Self::with_cache_config(stage, ShaderCacheConfig::default())
    }

    pub fn with_cache_config(stage: BindingStage, cache_config: ShaderCacheConfig) -> Self {
        let id = GraphId::next();
        let output = OutputOperation::new(stage == BindingStage::Pixel);
        let nodes = vec![
            Node::new(OpKind::Input(InputOperation::default()), Vec::new(), Vec::new()),
            Node::new(OpKind::Output(output), Vec::new(), Vec::new()),
        ];
        Self::assemble(id, stage, None, nodes, BTreeMap::new(), cache_config)
    }

    fn assemble(
        id: GraphId,
        stage: BindingStage,
        comment: Option<String>,
        nodes: Vec<Node>,
        constants: BTreeMap<String, OpId>,
        cache_config: ShaderCacheConfig,
    ) -> Self {
        Self {
            id,
            stage,
            state: CodeState::Building,
            comment,
            nodes,
            constants,
            parameters: None,
            order: Mutex::new(None),
            cache: Mutex::new(ShaderCache::new(cache_config)),
            cache_config,
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn stage(&self) -> BindingStage {
        self.stage
    }

    pub fn state(&self) -> CodeState {
        if self.is_disposed() {
            CodeState::Disposed
        } else {
            self.state
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.state == CodeState::Frozen
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) -> Result<()> {
        self.ensure_building("set the comment")?;
        self.comment = Some(comment.into());
        Ok(())
    }

    /// Number of operations in the arena, removed ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn operation(&self, id: OpId) -> Option<&OpKind> {
        self.nodes.get(id.index()).map(|n| &n.kind)
    }

    fn ensure_building(&self, action: &'static str) -> Result<()> {
        match self.state() {
            CodeState::Building => Ok(()),
            CodeState::Frozen => Err(ShaderError::Frozen { action }),
            CodeState::Disposed => Err(ShaderError::Disposed),
        }
    }

    /// Forgets the memoized emission order. Only a graph under construction may change.
    pub fn signal_changed(&mut self) -> Result<()> {
        self.ensure_building("change the graph")?;
        *self.order.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    // Freezing.

    /// Freezes with `true`. Freezing twice is a no-op; unfreezing a frozen graph fails.
    pub fn set_immutable(&mut self, immutable: bool) -> Result<()> {
        match (self.state(), immutable) {
            (CodeState::Disposed, _) => Err(ShaderError::Disposed),
            (CodeState::Building, true) => self.freeze(),
            (CodeState::Building, false) | (CodeState::Frozen, true) => Ok(()),
            (CodeState::Frozen, false) => Err(ShaderError::Frozen { action: "unfreeze" }),
        }
    }

    /// Validates the graph and fixes its parameter list.
    pub fn freeze(&mut self) -> Result<()> {
        if self.is_frozen() {
            return Ok(());
        }
        self.validate_structure()?;
        let parameters: Vec<ParameterDescription> = self
            .constants
            .values()
            .filter_map(|&op| match self.nodes.get(op.index()).map(|n| &n.kind) {
                Some(OpKind::Constant(constant)) => constant.description(),
                _ => None,
            })
            .collect();
        debug!(
            graph = ?self.id,
            stage = ?self.stage,
            operations = self.nodes.len(),
            parameters = parameters.len(),
            "froze shader code"
        );
        self.parameters = Some(parameters.into());
        self.state = CodeState::Frozen;
        Ok(())
    }

    fn validate_structure(&self) -> Result<()> {
        let output = self.output_operation()?;
        if let Some(component) = output.unlinked().next() {
            return Err(ShaderError::InvalidGraph(format!(
                "output {component:?} is not linked"
            )));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if node.removed {
                continue;
            }
            for pin in &node.inputs {
                self.check_live(pin)?;
            }
            if node.kind.opened_loop() == Some(None) {
                return Err(ShaderError::InvalidGraph(format!(
                    "loop {} is never closed",
                    OpId(index as u32)
                )));
            }
        }
        graph::check_loop_scopes(&self.nodes)
    }

    /// Checks what the builder methods guarantee for graphs built in memory: the constant
    /// table names live constants and every operation matches its input contract.
    fn validate_snapshot(&self) -> Result<()> {
        self.input_operation()?;
        self.output_operation()?;
        for (name, &op) in &self.constants {
            let declared = match self.nodes.get(op.index()) {
                Some(Node {
                    kind: OpKind::Constant(constant),
                    removed: false,
                    ..
                }) => constant.name(),
                _ => None,
            };
            if declared != Some(name.as_str()) {
                return Err(ShaderError::InvalidGraph(format!(
                    "constant '{name}' does not name a constant operation at {op}"
                )));
            }
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if node.removed || matches!(node.kind, OpKind::Input(_)) {
                continue;
            }
            let id = OpId(index as u32);
            node.kind.descriptor().validate(&node.inputs).map_err(|e| {
                ShaderError::InvalidGraph(format!("{} {id}: {e}", node.kind.name()))
            })?;
            let outputs = node.kind.outputs(&node.inputs)?;
            if outputs.len() != node.outputs.len() {
                return Err(ShaderError::InvalidGraph(format!(
                    "{} {id} exposes {} outputs, expected {}",
                    node.kind.name(),
                    node.outputs.len(),
                    outputs.len()
                )));
            }
        }
        Ok(())
    }

    /// Declared parameters in name order. Available once frozen.
    pub fn parameter_descriptions(&self) -> Result<&[ParameterDescription]> {
        self.parameters.as_deref().ok_or(ShaderError::NotFrozen {
            action: "describe parameters",
        })
    }

    /// Empty parameter set bound to this graph.
    pub fn fixed_parameters(&self) -> Result<FixedShaderParameters> {
        let parameters = self.parameters.clone().ok_or(ShaderError::NotFrozen {
            action: "create fixed parameters",
        })?;
        Ok(FixedShaderParameters::new(self.id, parameters))
    }

    // Scope.

    fn check_scope(&self, slot: &str, pin: &Pin) -> Result<()> {
        let invalid = |reason: &str| ShaderError::InvalidPin {
            slot: slot.to_owned(),
            reason: reason.to_owned(),
        };
        let source = pin
            .source()
            .ok_or_else(|| invalid("pin is not produced by an operation"))?;
        if source.graph != self.id {
            return Err(invalid("pin belongs to another shader code"));
        }
        self.check_live(pin)
            .map_err(|e| invalid(&e.to_string()))
    }

    /// The producer of `pin` exists, is live and still exposes the slot.
    fn check_live(&self, pin: &Pin) -> Result<()> {
        let Some(source) = pin.source() else {
            return Err(ShaderError::InvalidGraph(format!("{pin} has no producer")));
        };
        let node = self
            .nodes
            .get(source.op.index())
            .ok_or_else(|| ShaderError::InvalidGraph(format!("{} does not exist", source.op)))?;
        if node.removed {
            return Err(ShaderError::InvalidGraph(format!(
                "{} consumes removed {} {}",
                pin,
                node.kind.name(),
                source.op
            )));
        }
        if source.slot as usize >= node.outputs.len() {
            return Err(ShaderError::InvalidGraph(format!(
                "{} has no output {}",
                source.op, source.slot
            )));
        }
        if let OpKind::Input(input) = &node.kind {
            if input.is_removed(source.slot) {
                return Err(ShaderError::InvalidGraph(format!(
                    "input slot {} was removed",
                    source.slot
                )));
            }
        }
        Ok(())
    }

    // Inputs and outputs.

    fn input_operation(&self) -> Result<&InputOperation> {
        match &self.nodes[INPUT.index()].kind {
            OpKind::Input(input) => Ok(input),
            _ => Err(ShaderError::InvalidGraph("operation 0 is not the input".into())),
        }
    }

    fn output_operation(&self) -> Result<&OutputOperation> {
        match &self.nodes[OUTPUT.index()].kind {
            OpKind::Output(output) => Ok(output),
            _ => Err(ShaderError::InvalidGraph("operation 1 is not the output".into())),
        }
    }

    fn output_operation_mut(&mut self) -> Result<&mut OutputOperation> {
        match &mut self.nodes[OUTPUT.index()].kind {
            OpKind::Output(output) => Ok(output),
            _ => Err(ShaderError::InvalidGraph("operation 1 is not the output".into())),
        }
    }

    /// Declares stage input `component` and returns its pin.
    pub fn add_input(&mut self, component: PinComponent, format: PinFormat) -> Result<Pin> {
        self.ensure_building("add an input")?;
        if !component.is_single() {
            return Err(ShaderError::InvalidPin {
                slot: format!("{component:?}"),
                reason: "an input carries exactly one component".into(),
            });
        }
        if self.input(component).is_some() {
            return Err(ShaderError::DuplicateDefinition {
                name: format!("{component:?}"),
            });
        }
        let node = &mut self.nodes[INPUT.index()];
        let OpKind::Input(input) = &mut node.kind else {
            return Err(ShaderError::InvalidGraph("operation 0 is not the input".into()));
        };
        let slot = input.push(component, format);
        let pin = Pin::scalar(format).with_source(PinSource {
            graph: self.id,
            op: INPUT,
            slot: slot as u32,
        });
        node.outputs.push(pin);
        self.signal_changed()?;
        Ok(pin)
    }

    pub fn input(&self, component: PinComponent) -> Option<Pin> {
        let slot = self.input_operation().ok()?.find(component)?;
        self.nodes[INPUT.index()].outputs.get(slot).copied()
    }

    /// Removes stage input `component`. Freezing fails while anything still reads it.
    pub fn remove_input(&mut self, component: PinComponent) -> Result<bool> {
        self.ensure_building("remove an input")?;
        let removed = match &mut self.nodes[INPUT.index()].kind {
            OpKind::Input(input) => input.remove(component),
            _ => false,
        };
        if removed {
            self.signal_changed()?;
        }
        Ok(removed)
    }

    /// Declares stage output `component`; it must be linked before freezing.
    pub fn add_output(&mut self, component: PinComponent, format: PinFormat) -> Result<()> {
        self.ensure_building("add an output")?;
        let output = self.output_operation_mut()?;
        if !output.accepts(component) {
            return Err(ShaderError::InvalidPin {
                slot: format!("{component:?}"),
                reason: "not an output of this stage".into(),
            });
        }
        if output.slot_mut(component).is_some() {
            return Err(ShaderError::DuplicateDefinition {
                name: format!("{component:?}"),
            });
        }
        output.push(component, format);
        self.signal_changed()
    }

    /// Routes `pin` to output `component`. The pin format must equal the declared one.
    pub fn link_output(&mut self, component: PinComponent, pin: Pin) -> Result<()> {
        self.ensure_building("link an output")?;
        let slot_name = format!("{component:?}");
        self.check_scope(&slot_name, &pin)?;
        let output = self.output_operation_mut()?;
        let slot = output
            .slot_mut(component)
            .ok_or_else(|| ShaderError::InvalidPin {
                slot: slot_name.clone(),
                reason: "output is not declared".into(),
            })?;
        if pin.format() != slot.format || pin.is_array() {
            return Err(ShaderError::InvalidPin {
                slot: slot_name,
                reason: format!("expected {}, found {pin}", slot.format),
            });
        }
        slot.link = Some(pin);
        self.relink_outputs()
    }

    pub fn unlink_output(&mut self, component: PinComponent) -> Result<bool> {
        self.ensure_building("unlink an output")?;
        let unlinked = match self.output_operation_mut()?.slot_mut(component) {
            Some(slot) => slot.link.take().is_some(),
            None => false,
        };
        self.relink_outputs()?;
        Ok(unlinked)
    }

    pub fn remove_output(&mut self, component: PinComponent) -> Result<bool> {
        self.ensure_building("remove an output")?;
        let removed = self.output_operation_mut()?.remove(component);
        self.relink_outputs()?;
        Ok(removed)
    }

    fn relink_outputs(&mut self) -> Result<()> {
        let linked = self.output_operation()?.linked();
        self.nodes[OUTPUT.index()].inputs = linked;
        self.signal_changed()
    }

    // Constants.

    fn push_node(&mut self, kind: OpKind, inputs: Vec<Pin>) -> Result<OpId> {
        let id = OpId(self.nodes.len() as u32);
        let outputs = kind
            .outputs(&inputs)?
            .into_iter()
            .enumerate()
            .map(|(slot, pin)| {
                pin.with_source(PinSource {
                    graph: self.id,
                    op: id,
                    slot: slot as u32,
                })
            })
            .collect();
        self.nodes.push(Node::new(kind, inputs, outputs));
        self.signal_changed()?;
        Ok(id)
    }

    fn declare(&mut self, name: &str, pin: Pin, fixed: bool) -> Result<Pin> {
        self.ensure_building("create a constant")?;
        if self.constants.contains_key(name) {
            return Err(ShaderError::DuplicateDefinition {
                name: name.to_owned(),
            });
        }
        let kind = OpKind::Constant(ConstantOperation::named(name, pin, fixed));
        let id = self.push_node(kind, Vec::new())?;
        self.constants.insert(name.to_owned(), id);
        Ok(self.nodes[id.index()].outputs[0])
    }

    /// Numeric parameter fed from a constant buffer or a fixed value.
    pub fn create_constant(&mut self, name: &str, format: PinFormat) -> Result<Pin> {
        self.create_array_constant(name, format, ArraySize::NotArray)
    }

    pub fn create_array_constant(
        &mut self,
        name: &str,
        format: PinFormat,
        size: ArraySize,
    ) -> Result<Pin> {
        if !format.is_numeric() && format != PinFormat::Interface {
            return Err(ShaderError::incompatible(format!(
                "constant '{name}' cannot have format {format}"
            )));
        }
        self.declare(name, Pin::new(format, size), false)
    }

    /// Numeric parameter that must be supplied as a fixed value.
    pub fn create_fixed_constant(
        &mut self,
        name: &str,
        format: PinFormat,
        size: ArraySize,
    ) -> Result<Pin> {
        if !format.is_numeric() {
            return Err(ShaderError::incompatible(format!(
                "fixed constant '{name}' cannot have format {format}"
            )));
        }
        self.declare(name, Pin::new(format, size), true)
    }

    /// Texture parameter whose texels have `texture_format`; bound by register index.
    pub fn create_texture_constant(
        &mut self,
        name: &str,
        format: PinFormat,
        texture_format: PinFormat,
    ) -> Result<Pin> {
        if !format.is_texture() || !texture_format.is_numeric() {
            return Err(ShaderError::incompatible(format!(
                "'{name}' cannot be a {format} of {texture_format}"
            )));
        }
        self.declare(
            name,
            Pin::texture(format, texture_format, ArraySize::NotArray),
            true,
        )
    }

    pub fn create_sampler_constant(&mut self, name: &str) -> Result<Pin> {
        self.declare(name, Pin::scalar(PinFormat::Sampler), true)
    }

    /// Interface parameter, used through [`ShaderCode::call_interface`].
    pub fn create_interface_constant(&mut self, name: &str) -> Result<Pin> {
        self.declare(name, Pin::scalar(PinFormat::Interface), true)
    }

    /// Anonymous constant whose value is baked into the graph.
    pub fn create_fixed(&mut self, value: impl Into<Value>) -> Result<Pin> {
        self.ensure_building("create a constant")?;
        let kind = OpKind::Constant(ConstantOperation::baked(value.into()));
        let id = self.push_node(kind, Vec::new())?;
        Ok(self.nodes[id.index()].outputs[0])
    }

    pub fn constant(&self, name: &str) -> Option<Pin> {
        let id = self.constants.get(name)?;
        self.nodes[id.index()].outputs.first().copied()
    }

    pub fn constant_names(&self) -> impl Iterator<Item = &str> {
        self.constants.keys().map(String::as_str)
    }

    /// Discards constant `name`. Freezing fails while anything still reads it.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        self.ensure_building("remove a constant")?;
        let Some(id) = self.constants.remove(name) else {
            return Ok(false);
        };
        self.nodes[id.index()].removed = true;
        self.signal_changed()?;
        Ok(true)
    }

    // Operations.

    /// Adds an operation of `kind` reading `inputs` and returns its output pins.
    pub fn add_operation(&mut self, kind: OpKind, inputs: &[Pin]) -> Result<Vec<Pin>> {
        self.ensure_building("add an operation")?;
        match kind {
            OpKind::Input(_) | OpKind::Output(_) | OpKind::Constant(_) => {
                return Err(ShaderError::Unsupported(format!(
                    "{} operations are created by the shader code",
                    kind.name()
                )))
            }
            OpKind::WhileEnd { .. } | OpKind::RepeatEnd { .. } => {
                return Err(ShaderError::Unsupported(
                    "loops are closed with end_while and end_repeat".into(),
                ))
            }
            _ if kind.opened_loop().is_some_and(|end| end.is_some()) => {
                return Err(ShaderError::Unsupported(
                    "loops are opened with begin_while and begin_repeat".into(),
                ))
            }
            _ => {}
        }
        let descriptor = kind.descriptor();
        for (i, pin) in inputs.iter().enumerate() {
            let slot = descriptor
                .descriptors()
                .get(i)
                .map_or_else(|| format!("#{i}"), |d| d.name().to_owned());
            self.check_scope(&slot, pin)?;
        }
        descriptor.validate(inputs)?;
        let id = self.push_node(kind, inputs.to_vec())?;
        Ok(self.nodes[id.index()].outputs.clone())
    }

    fn single(&mut self, kind: OpKind, inputs: &[Pin]) -> Result<Pin> {
        let outputs = self.add_operation(kind, inputs)?;
        outputs
            .first()
            .copied()
            .ok_or_else(|| ShaderError::InvalidGraph("operation produced no output".into()))
    }

    pub fn add(&mut self, a: Pin, b: Pin) -> Result<Pin> {
        self.single(OpKind::Arithmetic(BinaryOp::Add), &[a, b])
    }

    pub fn sub(&mut self, a: Pin, b: Pin) -> Result<Pin> {
        self.single(OpKind::Arithmetic(BinaryOp::Sub), &[a, b])
    }

    pub fn mul(&mut self, a: Pin, b: Pin) -> Result<Pin> {
        self.single(OpKind::Arithmetic(BinaryOp::Mul), &[a, b])
    }

    pub fn div(&mut self, a: Pin, b: Pin) -> Result<Pin> {
        self.single(OpKind::Arithmetic(BinaryOp::Div), &[a, b])
    }

    pub fn min(&mut self, a: Pin, b: Pin) -> Result<Pin> {
        self.single(OpKind::Arithmetic(BinaryOp::Min), &[a, b])
    }

    pub fn max(&mut self, a: Pin, b: Pin) -> Result<Pin> {
        self.single(OpKind::Arithmetic(BinaryOp::Max), &[a, b])
    }

    pub fn dot(&mut self, a: Pin, b: Pin) -> Result<Pin> {
        self.single(OpKind::Dot, &[a, b])
    }

    pub fn compare(&mut self, function: CompareFunction, a: Pin, b: Pin) -> Result<Pin> {
        self.single(OpKind::Compare(function), &[a, b])
    }

    pub fn call(&mut self, function: ShaderFunction, args: &[Pin]) -> Result<Pin> {
        self.single(OpKind::Call(function), args)
    }

    pub fn swizzle(&mut self, source: Pin, mask: SwizzleMask) -> Result<Pin> {
        self.single(OpKind::Swizzle(mask), &[source])
    }

    pub fn expand(&mut self, source: Pin, format: PinFormat, policy: ExpandType) -> Result<Pin> {
        self.single(OpKind::Expand { format, policy }, &[source])
    }

    pub fn convert(&mut self, source: Pin, format: PinFormat) -> Result<Pin> {
        self.single(OpKind::Convert(format), &[source])
    }

    pub fn index(&mut self, array: Pin, index: Pin) -> Result<Pin> {
        self.single(OpKind::Index, &[array, index])
    }

    pub fn sample(&mut self, texture: Pin, sampler: Pin, position: Pin) -> Result<Pin> {
        self.single(OpKind::Sample, &[texture, sampler, position])
    }

    pub fn load(&mut self, texture: Pin, position: Pin, offset: Option<Pin>) -> Result<Pin> {
        let mut inputs = vec![texture, position];
        inputs.extend(offset);
        self.single(OpKind::Load, &inputs)
    }

    /// Opens a loop carrying `initial`. Returns the loop operation and the in-loop values.
    pub fn begin_while(&mut self, initial: &[Pin]) -> Result<(OpId, Vec<Pin>)> {
        let kind = OpKind::WhileBegin {
            values: initial.len(),
            end: None,
        };
        let values = self.add_operation(kind, initial)?;
        Ok((OpId(self.nodes.len() as u32 - 1), values))
    }

    /// Closes loop `begin`: `next` become the values of the following iteration, and the loop
    /// ends once `condition` holds. Returns the values after the loop.
    pub fn end_while(&mut self, begin: OpId, condition: Pin, next: &[Pin]) -> Result<Vec<Pin>> {
        let kind = OpKind::WhileEnd {
            begin,
            values: next.len(),
        };
        self.close_loop(begin, kind, Some(condition), next)
    }

    /// Opens a loop running `count` times. Returns the loop operation, the zero-based
    /// iteration index and the in-loop values.
    pub fn begin_repeat(&mut self, count: Pin, initial: &[Pin]) -> Result<(OpId, Pin, Vec<Pin>)> {
        let kind = OpKind::RepeatBegin {
            values: initial.len(),
            end: None,
        };
        let mut inputs = vec![count];
        inputs.extend_from_slice(initial);
        let mut outputs = self.add_operation(kind, &inputs)?;
        let index = outputs.remove(0);
        Ok((OpId(self.nodes.len() as u32 - 1), index, outputs))
    }

    /// Closes counted loop `begin`; `next` become the values of the following iteration.
    /// Returns the values after the last iteration.
    pub fn end_repeat(&mut self, begin: OpId, next: &[Pin]) -> Result<Vec<Pin>> {
        let kind = OpKind::RepeatEnd {
            begin,
            values: next.len(),
        };
        self.close_loop(begin, kind, None, next)
    }

    fn close_loop(
        &mut self,
        begin: OpId,
        kind: OpKind,
        condition: Option<Pin>,
        next: &[Pin],
    ) -> Result<Vec<Pin>> {
        self.ensure_building("close a loop")?;
        let carried = match self.nodes.get(begin.index()) {
            Some(node)
                if !node.removed
                    && node.kind.opened_loop() == Some(None)
                    && node.kind.is_closed_by(&kind) =>
            {
                let skip = usize::from(matches!(node.kind, OpKind::RepeatBegin { .. }));
                node.outputs[skip..].to_vec()
            }
            _ => {
                return Err(ShaderError::InvalidGraph(format!(
                    "{begin} is not a loop closed by {}",
                    kind.name()
                )))
            }
        };
        let differs = |a: &Pin, b: &Pin| a.format() != b.format() || a.size() != b.size();
        if carried.len() != next.len() || carried.iter().zip(next).any(|(a, b)| differs(a, b)) {
            return Err(ShaderError::incompatible(format!(
                "loop {begin} carries {} values that do not match the next iteration",
                carried.len()
            )));
        }
        let mut inputs: Vec<Pin> = condition.into_iter().collect();
        inputs.extend_from_slice(next);

        let descriptor = kind.descriptor();
        for (slot, pin) in descriptor.descriptors().iter().zip(&inputs) {
            self.check_scope(slot.name(), pin)?;
        }
        descriptor.validate(&inputs)?;
        let end = self.push_node(kind, inputs)?;
        if let OpKind::WhileBegin { end: slot, .. } | OpKind::RepeatBegin { end: slot, .. } =
            &mut self.nodes[begin.index()].kind
        {
            *slot = Some(end);
        }
        Ok(self.nodes[end.index()].outputs.clone())
    }

    /// Emits the interface bound to parameter `name`, which produces a `format` value.
    pub fn call_interface(&mut self, name: &str, format: PinFormat, args: &[Pin]) -> Result<Pin> {
        let interface = self
            .constant(name)
            .filter(|pin| pin.format() == PinFormat::Interface && !pin.is_array())
            .ok_or_else(|| {
                ShaderError::missing(name, "an interface constant", "no such constant")
            })?;
        let mut inputs = vec![interface];
        inputs.extend_from_slice(args);
        self.single(
            OpKind::InterfaceCall {
                parameter: name.to_owned(),
                format,
            },
            &inputs,
        )
    }

    // Copies.

    /// Independent, unfrozen deep copy with its own identity and an empty cache.
    pub fn edittable(&self) -> ShaderCode {
        let id = GraphId::next();
        let mut nodes = self.nodes.clone();
        rebind(&mut nodes, id);
        Self::assemble(
            id,
            self.stage,
            self.comment.clone(),
            nodes,
            self.constants.clone(),
            self.cache_config,
        )
    }

    pub fn snapshot(&self) -> Result<ShaderCodeSnapshot> {
        if !self.is_frozen() {
            return Err(ShaderError::NotFrozen {
                action: "snapshot",
            });
        }
        Ok(ShaderCodeSnapshot {
            stage: self.stage,
            comment: self.comment.clone(),
            nodes: self.nodes.clone(),
            constants: self.constants.clone(),
        })
    }

    /// Rebuilds a frozen graph from a snapshot, with a fresh identity.
    pub fn from_snapshot(snapshot: ShaderCodeSnapshot) -> Result<ShaderCode> {
        let ShaderCodeSnapshot {
            stage,
            comment,
            mut nodes,
            constants,
        } = snapshot;
        let id = GraphId::next();
        rebind(&mut nodes, id);
        if nodes.len() < 2 {
            return Err(ShaderError::InvalidGraph(
                "snapshot lacks the input and output operations".into(),
            ));
        }
        let mut code = Self::assemble(
            id,
            stage,
            comment,
            nodes,
            constants,
            ShaderCacheConfig::default(),
        );
        code.validate_snapshot()?;
        graph::sorted_operations(&code.nodes, OUTPUT)?;
        code.freeze()?;
        Ok(code)
    }

    // Compilation.

    fn lock_cache(&self) -> MutexGuard<'_, ShaderCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sorted(&self) -> Result<Arc<[OpId]>> {
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(order) = order.as_ref() {
            return Ok(Arc::clone(order));
        }
        let sorted: Arc<[OpId]> = graph::sorted_operations(&self.nodes, OUTPUT)?.into();
        *order = Some(Arc::clone(&sorted));
        Ok(sorted)
    }

    /// Emission order of the operations reachable from the output.
    pub fn sorted_operations(&self) -> Result<Arc<[OpId]>> {
        self.sorted()
    }

    /// Compiles the frozen graph for `parameters`, reusing the cached shader of an equal
    /// binding.
    pub fn compile(
        &self,
        compiler: &mut ShaderCompiler,
        parameters: &FixedShaderParameters,
    ) -> Result<Arc<Shader>> {
        if !self.is_frozen() {
            return Err(ShaderError::NotFrozen { action: "compile" });
        }
        if parameters.graph() != self.id {
            return Err(ShaderError::ForeignParameters);
        }
        {
            let mut cache = self.lock_cache();
            if cache.is_closed() {
                return Err(ShaderError::Disposed);
            }
            if let Some(shader) = cache.get(parameters) {
                debug!(graph = ?self.id, "shader cache hit");
                return Ok(shader);
            }
        }

        parameters.validate_with(compiler.limits())?;
        let order = self.sorted()?;
        debug!(graph = ?self.id, stage = ?self.stage, operations = order.len(), "compiling shader code");
        let shader = self.emit(compiler, parameters, &order)?;

        let mut cache = self.lock_cache();
        if cache.is_closed() {
            shader.evict();
            return Err(ShaderError::Disposed);
        }
        let (shader, source) = cache.insert(shader);
        debug!(graph = ?self.id, ?source, cached = cache.len(), "cached compiled shader");
        Ok(shader)
    }

    /// Compiles with a session opened on `device`.
    pub fn compile_on(
        &self,
        device: &dyn GraphicsDevice,
        parameters: &FixedShaderParameters,
    ) -> Result<Arc<Shader>> {
        let mut compiler = device.create_compiler();
        self.compile(&mut compiler, parameters)
    }

    fn emit(
        &self,
        compiler: &mut ShaderCompiler,
        parameters: &FixedShaderParameters,
        order: &[OpId],
    ) -> Result<Arc<Shader>> {
        compiler.begin(self.stage);
        let mut values: HashMap<OpId, Vec<Operand>> = HashMap::with_capacity(order.len());
        let mut pending: BTreeMap<OpId, ShareContext> = BTreeMap::new();

        for &op in order {
            let node = &self.nodes[op.index()];
            let inputs = node
                .inputs
                .iter()
                .map(|pin| operand_of(&values, pin))
                .collect::<Result<Vec<_>>>()?;
            let share = pending.remove(&op);
            let mut ctx = CompileContext {
                compiler: &mut *compiler,
                parameters,
                op,
            };
            let emission = node.kind.compile(&mut ctx, &inputs, share)?;
            if emission.outputs.len() != node.outputs.len() {
                return Err(ShaderError::InvalidGraph(format!(
                    "{} {op} produced {} operands for {} pins",
                    node.kind.name(),
                    emission.outputs.len(),
                    node.outputs.len()
                )));
            }
            if let Some(token) = emission.share {
                let destination = token.destination;
                if values.contains_key(&destination) || pending.insert(destination, token).is_some()
                {
                    return Err(ShaderError::InvalidGraph(format!(
                        "{op} shared a context with {destination}, which cannot receive it"
                    )));
                }
            }
            values.insert(op, emission.outputs);
        }

        if let Some(destination) = pending.keys().next() {
            return Err(ShaderError::InvalidGraph(format!(
                "share context for {destination} was never retired"
            )));
        }
        compiler.end(parameters.clone())
    }

    // Cache.

    pub fn cache_stats(&self) -> ShaderCacheStats {
        self.lock_cache().stats()
    }

    pub fn cached_shaders(&self) -> usize {
        self.lock_cache().len()
    }

    /// Evicts every cached shader and refuses further compiles.
    pub fn dispose(&self) {
        self.lock_cache().evict_all(true);
    }

    pub fn is_disposed(&self) -> bool {
        self.lock_cache().is_closed()
    }
}

impl Drop for ShaderCode {
    fn drop(&mut self) {
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .evict_all(true);
    }
}

fn operand_of(values: &HashMap<OpId, Vec<Operand>>, pin: &Pin) -> Result<Operand> {
    let source = pin
        .source()
        .ok_or_else(|| ShaderError::InvalidGraph(format!("{pin} has no producer")))?;
    values
        .get(&source.op)
        .and_then(|outputs| outputs.get(source.slot as usize))
        .cloned()
        .ok_or_else(|| {
            ShaderError::InvalidGraph(format!(
                "{} output {} is read before it is emitted",
                source.op, source.slot
            ))
        })
}

fn rebind(nodes: &mut [Node], graph: GraphId) {
    for node in nodes {
        for pin in node.inputs.iter_mut().chain(node.outputs.iter_mut()) {
            pin.rebind_graph(graph);
        }
        if let OpKind::Output(output) = &mut node.kind {
            output.rebind_graph(graph);
        }
    }
}
