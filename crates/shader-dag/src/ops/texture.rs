use crate::descriptor::{
    texture_formats, vector_formats, PinDescriptor, PinTextureAddressable,
    PinTextureMipmappedAddressable, PinsDescriptor,
};
use crate::error::{Result, ShaderError};
use crate::format::{PinFormat, ScalarKind};
use crate::pin::Pin;

pub(super) fn sample_descriptor() -> PinsDescriptor {
    PinsDescriptor::new([
        PinDescriptor::new("texture", texture_formats()),
        PinDescriptor::new("sampler", [PinFormat::Sampler]),
        PinDescriptor::new("position", vector_formats(&[ScalarKind::Float])),
    ])
    .with_relation(PinTextureAddressable::new(0, 2))
}

pub(super) fn load_descriptor() -> PinsDescriptor {
    let positions = vector_formats(&[ScalarKind::Integer]);
    PinsDescriptor::new([
        PinDescriptor::new("texture", texture_formats()),
        PinDescriptor::new("position", positions.clone()),
        PinDescriptor::new("offset", positions).optional(),
    ])
    .with_relation(PinTextureMipmappedAddressable::new(0, 1))
}

/// Texel pin of a sample or load from `inputs[0]`.
pub(super) fn outputs(inputs: &[Pin]) -> Result<Vec<Pin>> {
    let texture = &inputs[0];
    if !texture.texture_format().is_numeric() {
        return Err(ShaderError::incompatible(format!(
            "{texture} has no texel format"
        )));
    }
    Ok(vec![Pin::scalar(texture.texture_format())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ArraySize;

    fn texture(format: PinFormat) -> Pin {
        Pin::texture(format, PinFormat::Floatx4, ArraySize::NotArray)
    }

    #[test]
    fn sample_position_matches_texture_dimensions() {
        let d = sample_descriptor();
        let sampler = Pin::scalar(PinFormat::Sampler);
        let uv = Pin::scalar(PinFormat::Floatx2);
        assert!(d.validate(&[texture(PinFormat::Texture2D), sampler, uv]).is_ok());
        assert!(d.validate(&[texture(PinFormat::Texture3D), sampler, uv]).is_err());
        assert!(d.validate(&[texture(PinFormat::BufferTexture), sampler, uv]).is_err());
    }

    #[test]
    fn load_offset_is_optional() {
        let d = load_descriptor();
        let position = Pin::scalar(PinFormat::Integerx3);
        let offset = Pin::scalar(PinFormat::Integerx2);
        assert!(d.validate(&[texture(PinFormat::Texture2D), position]).is_ok());
        assert!(d
            .validate(&[texture(PinFormat::Texture2D), position, offset])
            .is_ok());
        assert!(d.validate(&[texture(PinFormat::TextureCube), position]).is_err());
    }

    #[test]
    fn texel_format_comes_from_the_texture() {
        let out = outputs(&[texture(PinFormat::Texture2D)]).unwrap();
        assert_eq!(out, vec![Pin::scalar(PinFormat::Floatx4)]);
        let untyped = Pin::texture(PinFormat::Texture2D, PinFormat::Undefined, ArraySize::NotArray);
        assert!(outputs(&[untyped]).is_err());
    }
}
