use std::sync::Arc;

use glam::Vec4;
use pretty_assertions::assert_eq;
use shader_dag::{
    ArraySize, BindingStage, ConstantBufferLayout, DeviceLimits, InterfaceConstants, Operand,
    ParameterDescription, Pin, PinComponent, PinFormat, Result, ShaderCode, ShaderCompiler,
    ShaderError, ShaderInterface, SwizzleMask, TraceDriver,
};

/// Multiplies its argument by the `factor` parameter.
#[derive(Debug)]
struct Scale;

impl ShaderInterface for Scale {
    fn type_name(&self) -> &str {
        "Scale"
    }

    fn parameters(&self) -> Vec<ParameterDescription> {
        vec![ParameterDescription::new(
            "factor",
            Pin::scalar(PinFormat::Float),
        )]
    }

    fn output_format(&self) -> PinFormat {
        PinFormat::Floatx4
    }

    fn compile(
        &self,
        compiler: &mut ShaderCompiler,
        constants: &InterfaceConstants,
        inputs: &[Operand],
    ) -> Result<Operand> {
        let factor = constants
            .get("factor")
            .ok_or_else(|| ShaderError::InvalidGraph("factor was not resolved".into()))?;
        let colour = inputs
            .first()
            .ok_or_else(|| ShaderError::InvalidGraph("missing argument".into()))?;
        compiler.mul(colour, factor)
    }
}

/// Drops the alpha channel; never matches a four-component call site.
#[derive(Debug)]
struct Opaque;

impl ShaderInterface for Opaque {
    fn type_name(&self) -> &str {
        "Opaque"
    }

    fn output_format(&self) -> PinFormat {
        PinFormat::Floatx3
    }

    fn compile(
        &self,
        compiler: &mut ShaderCompiler,
        _constants: &InterfaceConstants,
        inputs: &[Operand],
    ) -> Result<Operand> {
        let colour = inputs
            .first()
            .ok_or_else(|| ShaderError::InvalidGraph("missing argument".into()))?;
        compiler.swizzle(colour, &"xyz".parse::<SwizzleMask>()?)
    }
}

/// Wraps another interface bound under `inner`.
#[derive(Debug)]
struct Layered;

impl ShaderInterface for Layered {
    fn type_name(&self) -> &str {
        "Layered"
    }

    fn parameters(&self) -> Vec<ParameterDescription> {
        vec![ParameterDescription::new(
            "inner",
            Pin::scalar(PinFormat::Interface),
        )]
    }

    fn output_format(&self) -> PinFormat {
        PinFormat::Floatx4
    }

    fn compile(
        &self,
        _compiler: &mut ShaderCompiler,
        _constants: &InterfaceConstants,
        inputs: &[Operand],
    ) -> Result<Operand> {
        inputs
            .first()
            .cloned()
            .ok_or_else(|| ShaderError::InvalidGraph("missing argument".into()))
    }
}

fn interface(value: impl ShaderInterface + 'static) -> Arc<dyn ShaderInterface> {
    Arc::new(value)
}

fn missing_name(err: ShaderError) -> String {
    match err {
        ShaderError::MissingOrInvalidParameter { name, .. } => name,
        other => panic!("expected a missing parameter, got {other}"),
    }
}

/// Pixel shader colouring its output through the interface bound to `light`.
fn lit_shader() -> ShaderCode {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    let colour = code
        .add_input(PinComponent::COLOUR, PinFormat::Floatx4)
        .unwrap();
    code.create_interface_constant("light").unwrap();
    let lit = code
        .call_interface("light", PinFormat::Floatx4, &[colour])
        .unwrap();
    code.add_output(PinComponent::RENDER_TARGET0, PinFormat::Floatx4)
        .unwrap();
    code.link_output(PinComponent::RENDER_TARGET0, lit).unwrap();
    code.freeze().unwrap();
    code
}

#[test]
fn fixed_values_and_layouts_together_define_the_binding() {
    let mut code = ShaderCode::new(BindingStage::Vertex);
    for i in 0..5 {
        code.create_fixed_constant(&format!("f{i}"), PinFormat::Float, ArraySize::NotArray)
            .unwrap();
    }
    code.create_constant("k0", PinFormat::Floatx4).unwrap();
    code.create_constant("k1", PinFormat::Float).unwrap();
    code.freeze().unwrap();

    let mut params = code.fixed_parameters().unwrap();
    for i in 0..5 {
        params.set_parameter(format!("f{i}"), i as f32);
    }
    let mut builder = ConstantBufferLayout::builder();
    builder.append_element("k0", PinFormat::Floatx4).unwrap();
    builder.append_element("k1", PinFormat::Float).unwrap();
    params
        .append_layout(Arc::new(builder.create_layout().unwrap()))
        .unwrap();

    assert!(params.is_defined());
    assert_eq!(params.offset("k1").unwrap(), (0, 4));

    params.pop_layout();
    assert!(!params.is_defined());
    assert_eq!(missing_name(params.validate().unwrap_err()), "k0");
    assert!(params.definition_error().unwrap().contains("k0"));
}

#[test]
fn layout_entries_must_match_the_declaration() {
    let mut code = ShaderCode::new(BindingStage::Vertex);
    code.create_constant("k", PinFormat::Floatx4).unwrap();
    code.freeze().unwrap();

    let mut builder = ConstantBufferLayout::builder();
    builder
        .add_element("k", PinFormat::Float, ArraySize::NotArray, 3)
        .unwrap();
    let narrow = Arc::new(builder.create_layout().unwrap());
    let mut builder = ConstantBufferLayout::builder();
    builder
        .add_element("k", PinFormat::Floatx4, ArraySize::NotArray, 0)
        .unwrap();
    let wide = Arc::new(builder.create_layout().unwrap());

    let mut params = code.fixed_parameters().unwrap();
    params.append_layout(Arc::clone(&narrow)).unwrap();
    assert_eq!(missing_name(params.validate().unwrap_err()), "k");

    params.pop_layout();
    params.append_layout(wide).unwrap();
    params.validate().unwrap();

    let mut builder = ConstantBufferLayout::builder();
    builder
        .add_element("k", PinFormat::Integer, ArraySize::NotArray, 3)
        .unwrap();
    let integer = builder.create_layout().unwrap();
    assert!(*narrow != integer);
}

#[test]
fn fixed_constants_need_a_value() {
    let mut code = ShaderCode::new(BindingStage::Vertex);
    code.create_fixed_constant("mode", PinFormat::Integer, ArraySize::NotArray)
        .unwrap();
    code.freeze().unwrap();
    let mut params = code.fixed_parameters().unwrap();

    let mut builder = ConstantBufferLayout::builder();
    builder.append_element("mode", PinFormat::Integer).unwrap();
    params
        .append_layout(Arc::new(builder.create_layout().unwrap()))
        .unwrap();
    assert_eq!(missing_name(params.validate().unwrap_err()), "mode");

    params.set_parameter("mode", 1.5f32);
    assert_eq!(missing_name(params.validate().unwrap_err()), "mode");

    params.set_parameter("mode", 2i32);
    params.validate().unwrap();
}

#[test]
fn normalized_constants_accept_float_values() {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    code.create_constant("tint", PinFormat::UNormx4).unwrap();
    code.freeze().unwrap();
    let mut params = code.fixed_parameters().unwrap();

    params.set_parameter("tint", Vec4::ONE);

    params.validate().unwrap();
}

#[test]
fn array_lengths_are_checked() {
    let mut code = ShaderCode::new(BindingStage::Vertex);
    code.create_array_constant("weights", PinFormat::Float, ArraySize::Static(3))
        .unwrap();
    code.create_array_constant("lights", PinFormat::Floatx4, ArraySize::Dynamic)
        .unwrap();
    code.freeze().unwrap();
    let mut params = code.fixed_parameters().unwrap();

    params.set_parameter("lights", vec![Vec4::ONE, Vec4::ZERO]);
    params.set_parameter("weights", vec![0.5f32, 0.5]);
    assert_eq!(missing_name(params.validate().unwrap_err()), "weights");

    params.set_parameter("weights", vec![0.25f32, 0.25, 0.5]);
    params.validate().unwrap();

    params.set_array_size("lights", 3);
    assert_eq!(
        missing_name(params.validate().unwrap_err()),
        ParameterDescription::length_key("lights")
    );
    params.set_array_size("lights", 2);
    params.validate().unwrap();
}

#[test]
fn resource_registers_respect_device_limits() {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    code.create_texture_constant("albedo", PinFormat::Texture2D, PinFormat::Floatx4)
        .unwrap();
    code.create_sampler_constant("linear").unwrap();
    code.freeze().unwrap();
    let limits = DeviceLimits {
        max_textures: 8,
        max_samplers: 2,
    };
    let mut params = code.fixed_parameters().unwrap();

    assert_eq!(missing_name(params.validate().unwrap_err()), "albedo");

    params.set_parameter("albedo", 8u32);
    params.set_parameter("linear", 0u32);
    assert!(matches!(
        params.validate_with(limits),
        Err(ShaderError::OutOfRange(_))
    ));
    params.validate().unwrap();

    params.set_parameter("albedo", 7u32);
    params.set_parameter("linear", 2u32);
    assert!(matches!(
        params.validate_with(limits),
        Err(ShaderError::OutOfRange(_))
    ));

    params.set_parameter("linear", 1u32);
    params.validate_with(limits).unwrap();
}

#[test]
fn constant_buffer_slots_are_bounded_and_contiguous() {
    let code = {
        let mut code = ShaderCode::new(BindingStage::Vertex);
        code.freeze().unwrap();
        code
    };
    let mut params = code.fixed_parameters().unwrap();
    let empty = Arc::new(ConstantBufferLayout::default());

    assert!(matches!(
        params.add_layout(1, Arc::clone(&empty)),
        Err(ShaderError::OutOfRange(_))
    ));
    for slot in 0..shader_dag::limits::MAX_CONSTANT_BUFFER_BINDING_SLOTS {
        assert_eq!(params.append_layout(Arc::clone(&empty)).unwrap(), slot);
    }
    assert!(matches!(
        params.append_layout(empty),
        Err(ShaderError::OutOfRange(_))
    ));
}

#[test]
fn interface_parameters_are_validated_under_their_scope() {
    let code = lit_shader();
    let mut params = code.fixed_parameters().unwrap();

    assert_eq!(missing_name(params.validate().unwrap_err()), "light");

    params.set_parameter("light", interface(Scale));
    assert_eq!(
        missing_name(params.validate().unwrap_err()),
        "light.factor"
    );

    params.set_parameter("light.factor", 2.0f32);
    params.validate().unwrap();
}

#[test]
fn nested_interfaces_are_validated_recursively() {
    let code = lit_shader();
    let mut params = code.fixed_parameters().unwrap();
    params.set_parameter("light", interface(Layered));

    assert_eq!(missing_name(params.validate().unwrap_err()), "light.inner");

    params.set_parameter("light.inner", interface(Scale));
    assert_eq!(
        missing_name(params.validate().unwrap_err()),
        "light.inner.factor"
    );

    params.set_parameter("light.inner.factor", 0.5f32);
    params.validate().unwrap();
}

#[test]
fn interfaces_compare_by_type() {
    let code = lit_shader();
    let mut a = code.fixed_parameters().unwrap();
    a.set_parameter("light", interface(Scale));
    let mut b = code.fixed_parameters().unwrap();
    b.set_parameter("light", interface(Scale));
    let mut c = code.fixed_parameters().unwrap();
    c.set_parameter("light", interface(Opaque));

    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn interfaces_compile_into_the_graph() {
    let code = lit_shader();
    let mut params = code.fixed_parameters().unwrap();
    params.set_parameter("light", interface(Scale));
    params.set_parameter("light.factor", 2.0f32);
    let driver = TraceDriver::new();
    let log = driver.log();
    let mut compiler = ShaderCompiler::with_driver(driver);

    let shader = code.compile(&mut compiler, &params).unwrap();

    assert_eq!(shader.stage(), BindingStage::Pixel);
    assert_eq!(log.programs(), 1);
    assert_eq!(log.instructions().len(), 2);
}

#[test]
fn interface_results_must_match_the_call_site() {
    let code = lit_shader();
    let mut params = code.fixed_parameters().unwrap();
    params.set_parameter("light", interface(Opaque));
    let mut compiler = ShaderCompiler::with_driver(TraceDriver::new());

    assert!(matches!(
        code.compile(&mut compiler, &params),
        Err(ShaderError::IncompatibleOperands(_))
    ));
}

#[test]
fn interface_arrays_scope_each_element() {
    let mut code = ShaderCode::new(BindingStage::Pixel);
    code.create_array_constant("lights", PinFormat::Interface, ArraySize::Static(2))
        .unwrap();
    code.freeze().unwrap();
    let mut params = code.fixed_parameters().unwrap();

    params.set_parameter("lights", vec![interface(Scale), interface(Scale)]);
    params.set_parameter("lights[0].factor", 1.0f32);
    assert_eq!(
        missing_name(params.validate().unwrap_err()),
        "lights[1].factor"
    );

    params.set_parameter("lights[1].factor", 3.0f32);
    params.validate().unwrap();

    params.set_parameter("lights", vec![interface(Scale)]);
    assert_eq!(missing_name(params.validate().unwrap_err()), "lights");
}
