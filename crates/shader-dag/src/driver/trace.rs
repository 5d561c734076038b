//! Recording backend.
//!
//! [`TraceDriver`] produces no device code. It appends every registration and instruction to a
//! shared [`TraceLog`], which makes it the reference backend for debugging graph emission.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::{BindingStage, DriverShader, ExpandType, ShaderDriver, ShaderFunction};
use crate::error::DriverError;
use crate::format::{ArraySize, PinComponent, PinFormat};
use crate::operand::OperandId;
use crate::swizzle::SwizzleMask;
use crate::value::{BinaryOp, CompareFunction, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Input {
        id: OperandId,
        format: PinFormat,
        component: PinComponent,
    },
    Constant {
        id: OperandId,
        name: String,
        format: PinFormat,
        size: ArraySize,
        buffer: usize,
        offset: u32,
    },
    Texture {
        id: OperandId,
        name: String,
        format: PinFormat,
        texture_format: PinFormat,
        register: u32,
    },
    Sampler {
        id: OperandId,
        name: String,
        register: u32,
    },
    Fixed {
        id: OperandId,
        value: Value,
    },
    Temp {
        id: OperandId,
        format: PinFormat,
        size: ArraySize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowInstruction {
    BeginIf(OperandId),
    Else,
    EndIf,
    BeginWhile,
    Break(Option<OperandId>),
    EndWhile,
    BeginSwitch(OperandId),
    Case(Value),
    Default,
    EndCase,
    EndSwitch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Mov {
        src: OperandId,
        dst: OperandId,
    },
    Arithmetic {
        op: BinaryOp,
        a: OperandId,
        b: OperandId,
        dst: OperandId,
    },
    MulEx {
        a: OperandId,
        b: OperandId,
        dst: OperandId,
    },
    Dot {
        a: OperandId,
        b: OperandId,
        dst: OperandId,
    },
    Compare {
        function: CompareFunction,
        a: OperandId,
        b: OperandId,
        dst: OperandId,
    },
    Call {
        function: ShaderFunction,
        args: Vec<OperandId>,
        dst: OperandId,
    },
    Swizzle {
        src: OperandId,
        mask: SwizzleMask,
        dst: OperandId,
    },
    Expand {
        src: OperandId,
        policy: ExpandType,
        dst: OperandId,
    },
    Convert {
        src: OperandId,
        dst: OperandId,
    },
    IndexInArray {
        array: OperandId,
        index: OperandId,
        dst: OperandId,
    },
    Load {
        texture: OperandId,
        position: OperandId,
        offset: Option<OperandId>,
        dst: OperandId,
    },
    Sample {
        texture: OperandId,
        sampler: OperandId,
        position: OperandId,
        dst: OperandId,
    },
    Output {
        src: OperandId,
        component: PinComponent,
    },
    Flow(FlowInstruction),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Begin(BindingStage),
    CompileFile(BindingStage, PathBuf),
    Register(Registration),
    Emit(Instruction),
    End,
}

#[derive(Debug, Default)]
struct TraceState {
    events: Vec<TraceEvent>,
    programs: usize,
}

/// Shared view of everything a [`TraceDriver`] recorded.
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    state: Arc<Mutex<TraceState>>,
    live: Arc<AtomicUsize>,
}

impl TraceLog {
    fn lock(&self) -> MutexGuard<'_, TraceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.lock().events.clone()
    }

    pub fn instructions(&self) -> Vec<Instruction> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Emit(i) => Some(i.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Register(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of programs finished by the driver.
    pub fn programs(&self) -> usize {
        self.lock().programs
    }

    /// Programs handed out and not yet released.
    pub fn live_shaders(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }

    fn push(&self, event: TraceEvent) {
        self.lock().events.push(event);
    }
}

/// Program produced by [`TraceDriver`].
#[derive(Debug)]
pub struct TraceShader {
    stage: BindingStage,
    program: Vec<TraceEvent>,
    live: Arc<AtomicUsize>,
}

impl TraceShader {
    pub fn program(&self) -> &[TraceEvent] {
        &self.program
    }
}

impl DriverShader for TraceShader {
    fn stage(&self) -> BindingStage {
        self.stage
    }
}

impl Drop for TraceShader {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct TraceDriver {
    log: TraceLog,
    stage: Option<BindingStage>,
    program_start: usize,
}

impl TraceDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver writing into an existing log.
    pub fn with_log(log: TraceLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn log(&self) -> TraceLog {
        self.log.clone()
    }

    fn register(&mut self, registration: Registration) {
        self.log.push(TraceEvent::Register(registration));
    }

    fn emit(&mut self, instruction: Instruction) {
        self.log.push(TraceEvent::Emit(instruction));
    }

    fn arithmetic(&mut self, op: BinaryOp, a: OperandId, b: OperandId, dst: OperandId) {
        self.emit(Instruction::Arithmetic { op, a, b, dst });
    }

    fn flow(&mut self, flow: FlowInstruction) {
        self.emit(Instruction::Flow(flow));
    }

    fn finish(&mut self, stage: BindingStage, program: Vec<TraceEvent>) -> Box<dyn DriverShader> {
        self.log.lock().programs += 1;
        self.log.live.fetch_add(1, Ordering::SeqCst);
        Box::new(TraceShader {
            stage,
            program,
            live: self.log.live.clone(),
        })
    }
}

impl ShaderDriver for TraceDriver {
    fn begin(&mut self, stage: BindingStage) {
        self.stage = Some(stage);
        self.program_start = self.log.lock().events.len();
        self.log.push(TraceEvent::Begin(stage));
    }

    fn end(&mut self) -> Result<Box<dyn DriverShader>, DriverError> {
        let stage = self
            .stage
            .take()
            .ok_or_else(|| DriverError::new("end called without begin"))?;
        self.log.push(TraceEvent::End);
        let program = self
            .log
            .lock()
            .events
            .get(self.program_start..)
            .map(<[TraceEvent]>::to_vec)
            .unwrap_or_default();
        debug!(?stage, events = program.len(), "trace driver finished program");
        Ok(self.finish(stage, program))
    }

    fn compile_file(
        &mut self,
        stage: BindingStage,
        path: &Path,
    ) -> Result<Box<dyn DriverShader>, DriverError> {
        std::fs::metadata(path)
            .map_err(|e| DriverError::new(format!("cannot read {}: {e}", path.display())))?;
        let event = TraceEvent::CompileFile(stage, path.to_path_buf());
        self.log.push(event.clone());
        Ok(self.finish(stage, vec![event]))
    }

    fn register_input(&mut self, id: OperandId, format: PinFormat, component: PinComponent) {
        self.register(Registration::Input {
            id,
            format,
            component,
        });
    }

    fn register_constant(
        &mut self,
        id: OperandId,
        name: &str,
        format: PinFormat,
        size: ArraySize,
        buffer: usize,
        offset: u32,
    ) {
        self.register(Registration::Constant {
            id,
            name: name.to_owned(),
            format,
            size,
            buffer,
            offset,
        });
    }

    fn register_texture(
        &mut self,
        id: OperandId,
        name: &str,
        format: PinFormat,
        texture_format: PinFormat,
        register: u32,
    ) {
        self.register(Registration::Texture {
            id,
            name: name.to_owned(),
            format,
            texture_format,
            register,
        });
    }

    fn register_sampler(&mut self, id: OperandId, name: &str, register: u32) {
        self.register(Registration::Sampler {
            id,
            name: name.to_owned(),
            register,
        });
    }

    fn register_fixed(&mut self, id: OperandId, value: &Value) {
        self.register(Registration::Fixed {
            id,
            value: value.clone(),
        });
    }

    fn register_temp(&mut self, id: OperandId, format: PinFormat, size: ArraySize) {
        self.register(Registration::Temp { id, format, size });
    }

    fn mov(&mut self, src: OperandId, dst: OperandId) {
        self.emit(Instruction::Mov { src, dst });
    }

    fn add(&mut self, a: OperandId, b: OperandId, dst: OperandId) {
        self.arithmetic(BinaryOp::Add, a, b, dst);
    }

    fn sub(&mut self, a: OperandId, b: OperandId, dst: OperandId) {
        self.arithmetic(BinaryOp::Sub, a, b, dst);
    }

    fn mul(&mut self, a: OperandId, b: OperandId, dst: OperandId) {
        self.arithmetic(BinaryOp::Mul, a, b, dst);
    }

    fn div(&mut self, a: OperandId, b: OperandId, dst: OperandId) {
        self.arithmetic(BinaryOp::Div, a, b, dst);
    }

    fn min(&mut self, a: OperandId, b: OperandId, dst: OperandId) {
        self.arithmetic(BinaryOp::Min, a, b, dst);
    }

    fn max(&mut self, a: OperandId, b: OperandId, dst: OperandId) {
        self.arithmetic(BinaryOp::Max, a, b, dst);
    }

    fn mul_ex(&mut self, a: OperandId, b: OperandId, dst: OperandId) {
        self.emit(Instruction::MulEx { a, b, dst });
    }

    fn dot(&mut self, a: OperandId, b: OperandId, dst: OperandId) {
        self.emit(Instruction::Dot { a, b, dst });
    }

    fn compare(&mut self, function: CompareFunction, a: OperandId, b: OperandId, dst: OperandId) {
        self.emit(Instruction::Compare { function, a, b, dst });
    }

    fn call(&mut self, function: ShaderFunction, args: &[OperandId], dst: OperandId) {
        self.emit(Instruction::Call {
            function,
            args: args.to_vec(),
            dst,
        });
    }

    fn swizzle(&mut self, src: OperandId, mask: &SwizzleMask, dst: OperandId) {
        self.emit(Instruction::Swizzle {
            src,
            mask: mask.clone(),
            dst,
        });
    }

    fn expand(&mut self, src: OperandId, policy: ExpandType, dst: OperandId) {
        self.emit(Instruction::Expand { src, policy, dst });
    }

    fn convert(&mut self, src: OperandId, dst: OperandId) {
        self.emit(Instruction::Convert { src, dst });
    }

    fn index_in_array(&mut self, array: OperandId, index: OperandId, dst: OperandId) {
        self.emit(Instruction::IndexInArray { array, index, dst });
    }

    fn load(
        &mut self,
        texture: OperandId,
        position: OperandId,
        offset: Option<OperandId>,
        dst: OperandId,
    ) {
        self.emit(Instruction::Load {
            texture,
            position,
            offset,
            dst,
        });
    }

    fn sample(
        &mut self,
        texture: OperandId,
        sampler: OperandId,
        position: OperandId,
        dst: OperandId,
    ) {
        self.emit(Instruction::Sample {
            texture,
            sampler,
            position,
            dst,
        });
    }

    fn output(&mut self, src: OperandId, component: PinComponent) {
        self.emit(Instruction::Output { src, component });
    }

    fn begin_if(&mut self, condition: OperandId) {
        self.flow(FlowInstruction::BeginIf(condition));
    }

    fn begin_else(&mut self) {
        self.flow(FlowInstruction::Else);
    }

    fn end_if(&mut self) {
        self.flow(FlowInstruction::EndIf);
    }

    fn begin_while(&mut self) {
        self.flow(FlowInstruction::BeginWhile);
    }

    fn break_loop(&mut self, condition: Option<OperandId>) {
        self.flow(FlowInstruction::Break(condition));
    }

    fn end_while(&mut self) {
        self.flow(FlowInstruction::EndWhile);
    }

    fn begin_switch(&mut self, selector: OperandId) {
        self.flow(FlowInstruction::BeginSwitch(selector));
    }

    fn begin_case(&mut self, label: &Value) {
        self.flow(FlowInstruction::Case(label.clone()));
    }

    fn begin_default(&mut self) {
        self.flow(FlowInstruction::Default);
    }

    fn end_case(&mut self) {
        self.flow(FlowInstruction::EndCase);
    }

    fn end_switch(&mut self) {
        self.flow(FlowInstruction::EndSwitch);
    }
}
