use serde::{Deserialize, Serialize};

use crate::compiler::ShaderCompiler;
use crate::driver::ShaderDriver;
use crate::limits::{DEFAULT_MAX_SAMPLERS, DEFAULT_MAX_TEXTURES};

/// Resource index limits consulted while validating fixed parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceLimits {
    pub max_textures: u32,
    pub max_samplers: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_textures: DEFAULT_MAX_TEXTURES,
            max_samplers: DEFAULT_MAX_SAMPLERS,
        }
    }
}

/// Device boundary: supplies limits and owns creation of compiler sessions.
pub trait GraphicsDevice: Send + Sync {
    fn limits(&self) -> DeviceLimits;

    fn create_driver(&self) -> Box<dyn ShaderDriver>;

    fn create_compiler(&self) -> ShaderCompiler {
        ShaderCompiler::new(self.create_driver(), self.limits())
    }
}
