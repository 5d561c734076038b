use std::num::NonZeroUsize;
use std::sync::Arc;

use glam::Vec4;
use pretty_assertions::assert_eq;
use shader_dag::{
    ArraySize, BindingStage, CacheableState, CodeState, CompareFunction, ConstantBufferLayout,
    DeviceLimits, FlowInstruction, GraphicsDevice, Instruction, OpId, OpKind, PinComponent,
    PinFormat, ShaderCacheConfig, ShaderCode, ShaderCodeSnapshot, ShaderDriver, ShaderError,
    TraceDriver, TraceLog,
};

struct TraceDevice {
    log: TraceLog,
    limits: DeviceLimits,
}

impl TraceDevice {
    fn new() -> Self {
        Self {
            log: TraceLog::default(),
            limits: DeviceLimits::default(),
        }
    }
}

impl GraphicsDevice for TraceDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_driver(&self) -> Box<dyn ShaderDriver> {
        Box::new(TraceDriver::with_log(self.log.clone()))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Vertex shader writing `position + offset` to the position output.
fn offset_shader() -> ShaderCode {
    let mut code = ShaderCode::new(BindingStage::Vertex);
    let position = code
        .add_input(PinComponent::POSITION, PinFormat::Floatx4)
        .unwrap();
    let offset = code.create_constant("offset", PinFormat::Floatx4).unwrap();
    let moved = code.add(position, offset).unwrap();
    code.add_output(PinComponent::POSITION, PinFormat::Floatx4)
        .unwrap();
    code.link_output(PinComponent::POSITION, moved).unwrap();
    code
}

fn offset_layout() -> Arc<ConstantBufferLayout> {
    let mut builder = ConstantBufferLayout::builder();
    builder.append_element("offset", PinFormat::Floatx4).unwrap();
    Arc::new(builder.create_layout().unwrap())
}

fn mnemonic(instruction: &Instruction) -> &'static str {
    match instruction {
        Instruction::Mov { .. } => "mov",
        Instruction::Arithmetic { .. } => "arith",
        Instruction::MulEx { .. } => "mulex",
        Instruction::Dot { .. } => "dot",
        Instruction::Compare { .. } => "cmp",
        Instruction::Call { .. } => "call",
        Instruction::Swizzle { .. } => "swizzle",
        Instruction::Expand { .. } => "expand",
        Instruction::Convert { .. } => "convert",
        Instruction::IndexInArray { .. } => "index",
        Instruction::Load { .. } => "load",
        Instruction::Sample { .. } => "sample",
        Instruction::Output { .. } => "output",
        Instruction::Flow(FlowInstruction::BeginWhile) => "while",
        Instruction::Flow(FlowInstruction::Break(_)) => "break",
        Instruction::Flow(FlowInstruction::EndWhile) => "endwhile",
        Instruction::Flow(_) => "flow",
    }
}

#[test]
fn freezing_is_one_way_and_idempotent() {
    let mut code = offset_shader();
    assert_eq!(code.state(), CodeState::Building);
    assert!(matches!(
        code.parameter_descriptions(),
        Err(ShaderError::NotFrozen { .. })
    ));

    code.set_immutable(true).unwrap();
    let first: Vec<String> = code
        .parameter_descriptions()
        .unwrap()
        .iter()
        .map(|d| d.name().to_owned())
        .collect();
    code.set_immutable(true).unwrap();
    code.freeze().unwrap();

    assert!(code.is_frozen());
    assert_eq!(first, vec!["offset".to_owned()]);
    assert!(matches!(
        code.set_immutable(false),
        Err(ShaderError::Frozen { .. })
    ));
    assert!(matches!(
        code.create_constant("late", PinFormat::Float),
        Err(ShaderError::Frozen { .. })
    ));
    assert!(matches!(
        code.set_comment("frozen"),
        Err(ShaderError::Frozen { .. })
    ));
}

#[test]
fn parameter_descriptions_are_in_name_order() {
    let mut code = ShaderCode::new(BindingStage::Vertex);
    code.create_constant("zeta", PinFormat::Float).unwrap();
    code.create_constant("alpha", PinFormat::Floatx2).unwrap();
    code.create_sampler_constant("mid").unwrap();
    code.freeze().unwrap();

    let names: Vec<&str> = code
        .parameter_descriptions()
        .unwrap()
        .iter()
        .map(|d| d.name())
        .collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    assert!(code.parameter_descriptions().unwrap()[1].is_fixed());
}

#[test]
fn freeze_requires_linked_outputs() {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    code.add_output(PinComponent::RENDER_TARGET0, PinFormat::Floatx4)
        .unwrap();

    assert!(matches!(code.freeze(), Err(ShaderError::InvalidGraph(_))));
    assert_eq!(code.state(), CodeState::Building);
}

#[test]
fn freeze_rejects_consumers_of_removed_constants() {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let tint = code.create_constant("tint", PinFormat::Floatx4).unwrap();
    let one = code.create_fixed(Vec4::ONE).unwrap();
    let colour = code.mul(tint, one).unwrap();
    code.add_output(PinComponent::RENDER_TARGET0, PinFormat::Floatx4)
        .unwrap();
    code.link_output(PinComponent::RENDER_TARGET0, colour).unwrap();

    assert!(code.remove("tint").unwrap());
    assert!(!code.remove("tint").unwrap());

    assert!(matches!(code.freeze(), Err(ShaderError::InvalidGraph(_))));
}

#[test]
fn stage_outputs_are_checked() {
    let mut pixel = ShaderCode::new(BindingStage::Pixel);
    assert!(matches!(
        pixel.add_output(PinComponent::POSITION, PinFormat::Floatx4),
        Err(ShaderError::InvalidPin { .. })
    ));

    let mut vertex = offset_shader();
    let colour = vertex.create_constant("colour", PinFormat::Floatx3).unwrap();
    assert!(matches!(
        vertex.link_output(PinComponent::POSITION, colour),
        Err(ShaderError::InvalidPin { .. })
    ));
}

#[test]
fn duplicate_names_are_rejected() {
    let mut code = ShaderCode::new(BindingStage::Vertex);
    code.create_constant("scale", PinFormat::Float).unwrap();

    assert_eq!(
        code.create_sampler_constant("scale"),
        Err(ShaderError::DuplicateDefinition {
            name: "scale".into()
        })
    );
    code.add_input(PinComponent::NORMAL, PinFormat::Floatx3)
        .unwrap();
    assert!(matches!(
        code.add_input(PinComponent::NORMAL, PinFormat::Floatx3),
        Err(ShaderError::DuplicateDefinition { .. })
    ));
}

#[test]
fn pins_of_another_code_are_rejected() {
    let mut a = ShaderCode::new(BindingStage::Vertex);
    let mut b = ShaderCode::new(BindingStage::Vertex);
    let x = a.create_constant("x", PinFormat::Float).unwrap();
    let y = b.create_constant("y", PinFormat::Float).unwrap();

    assert!(matches!(b.add(x, y), Err(ShaderError::InvalidPin { .. })));
}

#[test]
fn emission_order_puts_producers_first() {
    let mut code = offset_shader();
    code.freeze().unwrap();

    let order = code.sorted_operations().unwrap();
    let position = |id: OpId| order.iter().position(|&o| o == id).unwrap();
    let input = code
        .input(PinComponent::POSITION)
        .and_then(|p| p.owner())
        .unwrap();
    let offset = code.constant("offset").and_then(|p| p.owner()).unwrap();

    assert_eq!(order.len(), 4);
    assert!(position(input) < order.len() - 1);
    assert!(position(offset) < order.len() - 1);
    assert_eq!(
        code.sorted_operations().unwrap(),
        order,
        "order is memoized"
    );
}

#[test]
fn compiles_through_a_device() {
    init_tracing();
    let device = TraceDevice::new();
    let mut code = offset_shader();
    code.freeze().unwrap();
    let mut params = code.fixed_parameters().unwrap();
    params.append_layout(offset_layout()).unwrap();

    let shader = code.compile_on(&device, &params).unwrap();

    assert_eq!(shader.stage(), BindingStage::Vertex);
    assert_eq!(shader.state(), CacheableState::Normal);
    assert_eq!(
        device
            .log
            .instructions()
            .iter()
            .map(mnemonic)
            .collect::<Vec<_>>(),
        vec!["arith", "output"]
    );
    assert_eq!(device.log.programs(), 1);
    assert_eq!(device.log.live_shaders(), 1);
}

#[test]
fn fixed_values_fold_away() {
    let device = TraceDevice::new();
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let tint = code.create_constant("tint", PinFormat::Floatx4).unwrap();
    let half = code.create_fixed(Vec4::splat(0.5)).unwrap();
    let colour = code.mul(tint, half).unwrap();
    code.add_output(PinComponent::RENDER_TARGET0, PinFormat::Floatx4)
        .unwrap();
    code.link_output(PinComponent::RENDER_TARGET0, colour).unwrap();
    code.freeze().unwrap();

    let mut params = code.fixed_parameters().unwrap();
    params.set_parameter("tint", Vec4::new(1.0, 0.0, 0.0, 1.0));
    code.compile_on(&device, &params).unwrap();

    assert_eq!(
        device
            .log
            .instructions()
            .iter()
            .map(mnemonic)
            .collect::<Vec<_>>(),
        vec!["output"]
    );
}

#[test]
fn normalized_fixed_chains_compile() {
    let device = TraceDevice::new();
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let a = code
        .create_fixed_constant("a", PinFormat::SNorm, ArraySize::NotArray)
        .unwrap();
    let twice = code.add(a, a).unwrap();
    let thrice = code.add(twice, a).unwrap();
    code.add_output(PinComponent::DEPTH, PinFormat::SNorm).unwrap();
    code.link_output(PinComponent::DEPTH, thrice).unwrap();
    code.freeze().unwrap();

    let mut params = code.fixed_parameters().unwrap();
    params.set_parameter("a", 0.25f32);
    params.validate().unwrap();
    code.compile_on(&device, &params).unwrap();

    assert_eq!(
        device
            .log
            .instructions()
            .iter()
            .map(mnemonic)
            .collect::<Vec<_>>(),
        vec!["output"]
    );
}

#[test]
fn equal_parameters_share_one_compiled_shader() {
    let device = TraceDevice::new();
    let mut code = offset_shader();
    code.freeze().unwrap();

    let mut first = code.fixed_parameters().unwrap();
    first.append_layout(offset_layout()).unwrap();
    let mut second = code.fixed_parameters().unwrap();
    second.append_layout(offset_layout()).unwrap();
    assert_eq!(first, second);

    let a = code.compile_on(&device, &first).unwrap();
    let b = code.compile_on(&device, &second).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(device.log.programs(), 1);
    let stats = code.cache_stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));

    let mut fixed = code.fixed_parameters().unwrap();
    fixed.set_parameter("offset", Vec4::ZERO);
    let c = code.compile_on(&device, &fixed).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(code.cached_shaders(), 2);
}

#[test]
fn compile_checks_frozen_state_and_ownership() {
    let device = TraceDevice::new();
    let mut code = offset_shader();
    let mut other = offset_shader();
    other.freeze().unwrap();
    let foreign = other.fixed_parameters().unwrap();

    assert!(matches!(
        code.compile_on(&device, &foreign),
        Err(ShaderError::NotFrozen { .. })
    ));
    code.freeze().unwrap();
    assert_eq!(
        code.compile_on(&device, &foreign).unwrap_err(),
        ShaderError::ForeignParameters
    );
}

#[test]
fn incomplete_parameters_fail_before_emission() {
    let device = TraceDevice::new();
    let mut code = offset_shader();
    code.freeze().unwrap();
    let params = code.fixed_parameters().unwrap();

    let err = code.compile_on(&device, &params).unwrap_err();

    assert!(
        matches!(&err, ShaderError::MissingOrInvalidParameter { name, .. } if name == "offset"),
        "{err}"
    );
    assert!(device.log.events().is_empty());
}

#[test]
fn disposed_code_refuses_to_compile() {
    let device = TraceDevice::new();
    let mut code = offset_shader();
    code.freeze().unwrap();
    let mut params = code.fixed_parameters().unwrap();
    params.append_layout(offset_layout()).unwrap();
    let shader = code.compile_on(&device, &params).unwrap();

    code.dispose();

    assert!(code.is_disposed());
    assert_eq!(code.state(), CodeState::Disposed);
    assert_eq!(shader.state(), CacheableState::Disposed);
    assert_eq!(device.log.live_shaders(), 0);
    assert_eq!(
        code.compile_on(&device, &params).unwrap_err(),
        ShaderError::Disposed
    );
}

#[test]
fn eviction_waits_for_the_last_device_use() {
    let device = TraceDevice::new();
    let mut code = offset_shader();
    code.freeze().unwrap();
    let mut params = code.fixed_parameters().unwrap();
    params.append_layout(offset_layout()).unwrap();
    let shader = code.compile_on(&device, &params).unwrap();

    let first = shader.begin_use().unwrap();
    let second = shader.begin_use().unwrap();
    code.dispose();

    assert_eq!(shader.state(), CacheableState::Evicted);
    assert_eq!(shader.use_count(), 2);
    assert_eq!(device.log.live_shaders(), 1);

    drop(first);
    assert_eq!(shader.state(), CacheableState::Evicted);
    drop(second);

    assert_eq!(shader.state(), CacheableState::Disposed);
    assert_eq!(device.log.live_shaders(), 0);
    assert!(shader.with_handle(|_| ()).is_none());
    assert!(matches!(shader.begin_use(), Err(ShaderError::Disposed)));
}

#[test]
fn cache_overflow_evicts_least_recently_used_batch() {
    init_tracing();
    let device = TraceDevice::new();
    let config = ShaderCacheConfig {
        capacity: NonZeroUsize::new(4).unwrap(),
        eviction_ratio: 0.5,
    };
    let mut code = ShaderCode::with_cache_config(BindingStage::Pixel, config);
    let tint = code.create_constant("tint", PinFormat::Floatx4).unwrap();
    code.add_output(PinComponent::RENDER_TARGET0, PinFormat::Floatx4)
        .unwrap();
    code.link_output(PinComponent::RENDER_TARGET0, tint).unwrap();
    code.freeze().unwrap();

    let shaders: Vec<_> = (0..5)
        .map(|i| {
            let mut params = code.fixed_parameters().unwrap();
            params.set_parameter("tint", Vec4::splat(i as f32));
            code.compile_on(&device, &params).unwrap()
        })
        .collect();

    assert_eq!(code.cached_shaders(), 3);
    assert_eq!(code.cache_stats().evictions, 2);
    let states: Vec<_> = shaders.iter().map(|s| s.state()).collect();
    assert_eq!(
        states,
        vec![
            CacheableState::Disposed,
            CacheableState::Disposed,
            CacheableState::Normal,
            CacheableState::Normal,
            CacheableState::Normal,
        ]
    );
    assert_eq!(device.log.live_shaders(), 3);
}

#[test]
fn dropping_the_code_releases_its_shaders() {
    let device = TraceDevice::new();
    let mut code = offset_shader();
    code.freeze().unwrap();
    let mut params = code.fixed_parameters().unwrap();
    params.append_layout(offset_layout()).unwrap();
    let shader = code.compile_on(&device, &params).unwrap();

    drop(code);

    assert!(shader.is_disposed());
    assert_eq!(device.log.live_shaders(), 0);
}

#[test]
fn while_loop_emits_moves_around_the_body() {
    init_tracing();
    let device = TraceDevice::new();
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let start = code.create_constant("start", PinFormat::Float).unwrap();
    let limit = code.create_constant("limit", PinFormat::Float).unwrap();
    let (begin, carried) = code.begin_while(&[start]).unwrap();
    let one = code.create_fixed(1.0f32).unwrap();
    let next = code.add(carried[0], one).unwrap();
    let done = code
        .compare(CompareFunction::GreaterEqual, next, limit)
        .unwrap();
    let after = code.end_while(begin, done, &[next]).unwrap();
    code.add_output(PinComponent::DEPTH, PinFormat::Float)
        .unwrap();
    code.link_output(PinComponent::DEPTH, after[0]).unwrap();
    code.freeze().unwrap();

    let mut builder = ConstantBufferLayout::builder();
    builder.append_element("start", PinFormat::Float).unwrap();
    builder.append_element("limit", PinFormat::Float).unwrap();
    let mut params = code.fixed_parameters().unwrap();
    params
        .append_layout(Arc::new(builder.create_layout().unwrap()))
        .unwrap();
    code.compile_on(&device, &params).unwrap();

    assert_eq!(
        device
            .log
            .instructions()
            .iter()
            .map(mnemonic)
            .collect::<Vec<_>>(),
        vec!["mov", "while", "arith", "cmp", "mov", "break", "endwhile", "output"]
    );
}

/// Pixel shader reading `start + 10` from inside a loop, before or after closing it.
fn escaping_loop_value(read_before_end: bool) -> ShaderCode {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let start = code.create_constant("start", PinFormat::Float).unwrap();
    let ten = code.create_fixed(10.0f32).unwrap();
    let (begin, carried) = code.begin_while(&[start]).unwrap();
    let early = read_before_end.then(|| code.add(carried[0], ten).unwrap());
    let done = code
        .compare(CompareFunction::GreaterEqual, carried[0], ten)
        .unwrap();
    let after = code.end_while(begin, done, &carried).unwrap();
    let escaped = match early {
        Some(pin) => pin,
        None => code.add(carried[0], ten).unwrap(),
    };
    let total = code.add(escaped, after[0]).unwrap();
    code.add_output(PinComponent::DEPTH, PinFormat::Float)
        .unwrap();
    code.link_output(PinComponent::DEPTH, total).unwrap();
    code
}

#[test]
fn loop_values_leave_only_through_the_loop_end() {
    for read_before_end in [true, false] {
        let mut code = escaping_loop_value(read_before_end);
        assert!(
            matches!(code.freeze(), Err(ShaderError::InvalidGraph(_))),
            "read_before_end = {read_before_end}"
        );
        assert_eq!(code.state(), CodeState::Building);
    }
}

#[test]
fn outputs_cannot_read_loop_registers_directly() {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let start = code.create_constant("start", PinFormat::Float).unwrap();
    let (begin, carried) = code.begin_while(&[start]).unwrap();
    let done = code
        .compare(CompareFunction::Equal, carried[0], start)
        .unwrap();
    code.end_while(begin, done, &carried).unwrap();
    code.add_output(PinComponent::DEPTH, PinFormat::Float)
        .unwrap();
    code.link_output(PinComponent::DEPTH, carried[0]).unwrap();

    assert!(matches!(code.freeze(), Err(ShaderError::InvalidGraph(_))));
}

#[test]
fn loop_results_are_read_after_the_loop() {
    let device = TraceDevice::new();
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let start = code.create_constant("start", PinFormat::Float).unwrap();
    let ten = code.create_fixed(10.0f32).unwrap();
    let (begin, carried) = code.begin_while(&[start]).unwrap();
    let next = code.add(carried[0], ten).unwrap();
    let done = code
        .compare(CompareFunction::GreaterEqual, next, ten)
        .unwrap();
    let after = code.end_while(begin, done, &[next]).unwrap();
    let total = code.add(after[0], ten).unwrap();
    code.add_output(PinComponent::DEPTH, PinFormat::Float)
        .unwrap();
    code.link_output(PinComponent::DEPTH, total).unwrap();
    code.freeze().unwrap();

    let mut params = code.fixed_parameters().unwrap();
    params.set_parameter("start", 1.0f32);
    code.compile_on(&device, &params).unwrap();

    assert_eq!(
        device
            .log
            .instructions()
            .iter()
            .map(mnemonic)
            .collect::<Vec<_>>(),
        vec!["mov", "while", "arith", "cmp", "mov", "break", "endwhile", "arith", "output"]
    );
}

#[test]
fn counted_loop_advances_a_counter() {
    let device = TraceDevice::new();
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let count = code.create_constant("count", PinFormat::UInteger).unwrap();
    let start = code.create_constant("start", PinFormat::Float).unwrap();
    let ten = code.create_fixed(10.0f32).unwrap();
    let (begin, _index, carried) = code.begin_repeat(count, &[start]).unwrap();
    let next = code.add(carried[0], ten).unwrap();
    let after = code.end_repeat(begin, &[next]).unwrap();
    code.add_output(PinComponent::DEPTH, PinFormat::Float)
        .unwrap();
    code.link_output(PinComponent::DEPTH, after[0]).unwrap();
    code.freeze().unwrap();

    let mut params = code.fixed_parameters().unwrap();
    params.set_parameter("count", 3u32);
    params.set_parameter("start", 1.0f32);
    code.compile_on(&device, &params).unwrap();

    assert_eq!(
        device
            .log
            .instructions()
            .iter()
            .map(mnemonic)
            .collect::<Vec<_>>(),
        vec![
            "mov", "mov", "while", "cmp", "break", "arith", "mov", "arith", "endwhile", "output"
        ]
    );
}

#[test]
fn loop_index_stays_inside_the_loop() {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let count = code.create_constant("count", PinFormat::UInteger).unwrap();
    let start = code.create_constant("start", PinFormat::Float).unwrap();
    let (begin, index, carried) = code.begin_repeat(count, &[start]).unwrap();
    let after = code.end_repeat(begin, &carried).unwrap();
    let last = code.convert(index, PinFormat::Float).unwrap();
    let total = code.add(after[0], last).unwrap();
    code.add_output(PinComponent::DEPTH, PinFormat::Float)
        .unwrap();
    code.link_output(PinComponent::DEPTH, total).unwrap();

    assert!(matches!(code.freeze(), Err(ShaderError::InvalidGraph(_))));
}

#[test]
fn counted_loops_pair_with_their_own_end() {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let start = code.create_constant("start", PinFormat::Float).unwrap();
    assert!(matches!(
        code.begin_repeat(start, &[start]),
        Err(ShaderError::InvalidPin { .. })
    ));

    let count = code.create_constant("count", PinFormat::UInteger).unwrap();
    let (repeat, _, carried) = code.begin_repeat(count, &[start]).unwrap();
    let (while_loop, _) = code.begin_while(&[]).unwrap();
    assert!(matches!(
        code.end_repeat(while_loop, &[]),
        Err(ShaderError::InvalidGraph(_))
    ));
    assert!(matches!(
        code.add_operation(
            OpKind::RepeatEnd {
                begin: repeat,
                values: 1
            },
            &carried
        ),
        Err(ShaderError::Unsupported(_))
    ));
    code.end_repeat(repeat, &carried).unwrap();
    assert!(matches!(
        code.end_repeat(repeat, &carried),
        Err(ShaderError::InvalidGraph(_))
    ));
}

#[test]
fn open_loops_cannot_be_frozen() {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let start = code.create_constant("start", PinFormat::Float).unwrap();
    let (begin, carried) = code.begin_while(&[start]).unwrap();

    assert!(matches!(code.freeze(), Err(ShaderError::InvalidGraph(_))));

    let wrong = code.create_constant("wrong", PinFormat::Floatx2).unwrap();
    let done = code
        .compare(CompareFunction::Equal, carried[0], carried[0])
        .unwrap();
    assert!(matches!(
        code.end_while(begin, done, &[wrong]),
        Err(ShaderError::IncompatibleOperands(_))
    ));
    code.end_while(begin, done, &carried).unwrap();
    assert!(matches!(
        code.end_while(begin, done, &carried),
        Err(ShaderError::InvalidGraph(_))
    ));
    code.freeze().unwrap();
}

#[test]
fn textures_sample_through_bound_registers() {
    let device = TraceDevice::new();
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let uv = code
        .add_input(PinComponent::TEX_COORD0, PinFormat::Floatx2)
        .unwrap();
    let albedo = code
        .create_texture_constant("albedo", PinFormat::Texture2D, PinFormat::Floatx4)
        .unwrap();
    let sampler = code.create_sampler_constant("linear").unwrap();
    let texel = code.sample(albedo, sampler, uv).unwrap();
    assert_eq!(texel.format(), PinFormat::Floatx4);
    code.add_output(PinComponent::RENDER_TARGET0, PinFormat::Floatx4)
        .unwrap();
    code.link_output(PinComponent::RENDER_TARGET0, texel).unwrap();
    code.freeze().unwrap();

    let mut params = code.fixed_parameters().unwrap();
    params.set_parameter("albedo", 3u32);
    params.set_parameter("linear", 1u32);
    code.compile_on(&device, &params).unwrap();

    assert_eq!(
        device
            .log
            .instructions()
            .iter()
            .map(mnemonic)
            .collect::<Vec<_>>(),
        vec!["sample", "output"]
    );
}

#[test]
fn texture_positions_are_checked_when_building() {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let uvw = code
        .add_input(PinComponent::TEX_COORD0, PinFormat::Floatx3)
        .unwrap();
    let albedo = code
        .create_texture_constant("albedo", PinFormat::Texture2D, PinFormat::Floatx4)
        .unwrap();
    let sampler = code.create_sampler_constant("linear").unwrap();

    assert!(code.sample(albedo, sampler, uvw).is_err());
    assert!(code.sample(albedo, albedo, uvw).is_err());
}

#[test]
fn snapshots_restore_a_frozen_copy() {
    let mut code = offset_shader();
    assert!(matches!(
        code.snapshot(),
        Err(ShaderError::NotFrozen { .. })
    ));
    code.set_comment("offset positions").unwrap();
    code.freeze().unwrap();

    let json = serde_json::to_string(&code.snapshot().unwrap()).unwrap();
    let snapshot: ShaderCodeSnapshot = serde_json::from_str(&json).unwrap();
    let restored = ShaderCode::from_snapshot(snapshot).unwrap();

    assert!(restored.is_frozen());
    assert_ne!(restored.id(), code.id());
    assert_eq!(restored.comment(), Some("offset positions"));
    assert_eq!(
        restored.parameter_descriptions().unwrap(),
        code.parameter_descriptions().unwrap()
    );
    assert_eq!(
        restored.sorted_operations().unwrap(),
        code.sorted_operations().unwrap()
    );

    let device = TraceDevice::new();
    let mut params = restored.fixed_parameters().unwrap();
    params.append_layout(offset_layout()).unwrap();
    restored.compile_on(&device, &params).unwrap();
}

#[test]
fn corrupt_snapshots_are_rejected() {
    let mut code = offset_shader();
    code.freeze().unwrap();
    let snapshot = serde_json::to_value(code.snapshot().unwrap()).unwrap();

    let mut missing = snapshot.clone();
    missing["constants"]["offset"] = serde_json::json!(99);
    let mut not_a_constant = snapshot.clone();
    not_a_constant["constants"]["offset"] = serde_json::json!(3);
    let mut renamed = snapshot.clone();
    let entry = renamed["constants"]["offset"].take();
    renamed["constants"]["shift"] = entry;
    renamed["constants"]
        .as_object_mut()
        .unwrap()
        .remove("offset");
    let mut unbound = snapshot.clone();
    unbound["nodes"][3]["inputs"] = serde_json::json!([]);

    for corrupt in [missing, not_a_constant, renamed, unbound] {
        let snapshot: ShaderCodeSnapshot = serde_json::from_value(corrupt).unwrap();
        assert!(matches!(
            ShaderCode::from_snapshot(snapshot),
            Err(ShaderError::InvalidGraph(_))
        ));
    }
}

#[test]
fn edittable_copies_are_independent() {
    let mut code = offset_shader();
    code.freeze().unwrap();

    let mut copy = code.edittable();
    assert_eq!(copy.state(), CodeState::Building);
    assert_ne!(copy.id(), code.id());

    let offset = copy.constant("offset").unwrap();
    let scale = copy.create_constant("scale", PinFormat::Floatx4).unwrap();
    copy.mul(offset, scale).unwrap();
    copy.freeze().unwrap();

    assert_eq!(copy.len(), code.len() + 2);
    assert_eq!(code.parameter_descriptions().unwrap().len(), 1);
    assert_eq!(copy.parameter_descriptions().unwrap().len(), 2);
    assert!(matches!(
        copy.add(code.constant("offset").unwrap(), scale),
        Err(ShaderError::Frozen { .. })
    ));
}

#[test]
fn device_limits_bound_resource_registers() {
    let device = TraceDevice {
        log: TraceLog::default(),
        limits: DeviceLimits {
            max_textures: 4,
            max_samplers: 2,
        },
    };
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let texture = code
        .create_texture_constant("shadow", PinFormat::Texture2D, PinFormat::Float)
        .unwrap();
    let position = code
        .add_input(PinComponent::TEX_COORD0, PinFormat::Integerx3)
        .unwrap();
    let depth = code.load(texture, position, None).unwrap();
    code.add_output(PinComponent::DEPTH, PinFormat::Float)
        .unwrap();
    code.link_output(PinComponent::DEPTH, depth).unwrap();
    code.freeze().unwrap();

    let mut params = code.fixed_parameters().unwrap();
    params.set_parameter("shadow", 4u32);
    assert!(matches!(
        code.compile_on(&device, &params),
        Err(ShaderError::OutOfRange(_))
    ));

    params.set_parameter("shadow", 3u32);
    code.compile_on(&device, &params).unwrap();
    assert_eq!(
        device
            .log
            .instructions()
            .iter()
            .map(mnemonic)
            .collect::<Vec<_>>(),
        vec!["load", "output"]
    );
}

#[test]
fn array_sizes_are_part_of_the_pin() {
    let mut code = ShaderCode::new(BindingStage::Vertex);
    let weights = code
        .create_array_constant("weights", PinFormat::Float, ArraySize::Static(4))
        .unwrap();
    let index = code.create_constant("bone", PinFormat::Integer).unwrap();

    let weight = code.index(weights, index).unwrap();

    assert_eq!(weight.format(), PinFormat::Float);
    assert!(!weight.is_array());
    assert!(weights.is_array());
    assert!(code.index(index, index).is_err());
}
