use super::ShaderCompiler;
use crate::error::{Result, ShaderError};
use crate::format::{ArraySize, PinFormat, ScalarKind};
use crate::operand::Operand;

fn texel_format(texture: &Operand) -> Result<PinFormat> {
    if !texture.format.is_texture() || texture.is_array() {
        return Err(ShaderError::incompatible(format!("{texture} is not a texture")));
    }
    if !texture.texture_format.is_numeric() {
        return Err(ShaderError::incompatible(format!(
            "{texture} has no texel format"
        )));
    }
    Ok(texture.texture_format)
}

fn check_position(
    texture: &Operand,
    position: &Operand,
    kind: ScalarKind,
    components: Option<u32>,
    what: &str,
) -> Result<()> {
    let expected = components.and_then(|n| PinFormat::vector(kind, n)).ok_or_else(|| {
        ShaderError::Unsupported(format!("{what} from {}", texture.format))
    })?;
    if position.format != expected || position.is_array() {
        return Err(ShaderError::incompatible(format!(
            "{what} from {} needs a {expected} position, got {position}",
            texture.format
        )));
    }
    Ok(())
}

impl ShaderCompiler {
    /// Fetches a texel at an integer position (with mip level where the texture has mips).
    pub fn load(
        &mut self,
        texture: &Operand,
        position: &Operand,
        offset: Option<&Operand>,
    ) -> Result<Operand> {
        let format = texel_format(texture)?;
        let components = texture.format.load_position_components();
        check_position(texture, position, ScalarKind::Integer, components, "load")?;
        if let Some(offset) = offset {
            let expected = texture
                .format
                .texel_offset_components()
                .and_then(|n| PinFormat::vector(ScalarKind::Integer, n));
            if expected != Some(offset.format) || offset.is_array() {
                return Err(ShaderError::incompatible(format!(
                    "{offset} is not a texel offset for {}",
                    texture.format
                )));
            }
        }
        let dst = self.create_temporary(format, ArraySize::NotArray);
        self.driver
            .load(texture.id, position.id, offset.map(Operand::id), dst.id);
        Ok(dst)
    }

    /// Filters the texture at a float position.
    pub fn sample(
        &mut self,
        texture: &Operand,
        sampler: &Operand,
        position: &Operand,
    ) -> Result<Operand> {
        let format = texel_format(texture)?;
        if sampler.format != PinFormat::Sampler || sampler.is_array() {
            return Err(ShaderError::incompatible(format!("{sampler} is not a sampler")));
        }
        check_position(
            texture,
            position,
            ScalarKind::Float,
            texture.format.sample_position_components(),
            "sample",
        )?;
        let dst = self.create_temporary(format, ArraySize::NotArray);
        self.driver
            .sample(texture.id, sampler.id, position.id, dst.id);
        Ok(dst)
    }
}
