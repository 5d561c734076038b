//! Compiled shader objects.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::driver::{BindingStage, DriverShader};
use crate::error::{Result, ShaderError};
use crate::params::FixedShaderParameters;

/// Cache lifecycle of a compiled shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheableState {
    Normal,
    /// Evicted while in use; disposed on the last release.
    Evicted,
    Disposed,
}

#[derive(Debug)]
struct ShaderInner {
    state: CacheableState,
    uses: u32,
    handle: Option<Box<dyn DriverShader>>,
}

impl ShaderInner {
    fn release(&mut self) {
        self.state = CacheableState::Disposed;
        self.handle = None;
    }
}

/// A driver program plus the fixed parameters it was compiled for.
#[derive(Debug)]
pub struct Shader {
    stage: BindingStage,
    parameters: FixedShaderParameters,
    inner: Mutex<ShaderInner>,
}

impl Shader {
    pub(crate) fn new(
        stage: BindingStage,
        handle: Box<dyn DriverShader>,
        parameters: FixedShaderParameters,
    ) -> Arc<Self> {
        Arc::new(Self {
            stage,
            parameters,
            inner: Mutex::new(ShaderInner {
                state: CacheableState::Normal,
                uses: 0,
                handle: Some(handle),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ShaderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stage(&self) -> BindingStage {
        self.stage
    }

    pub fn parameters(&self) -> &FixedShaderParameters {
        &self.parameters
    }

    pub fn state(&self) -> CacheableState {
        self.lock().state
    }

    pub fn use_count(&self) -> u32 {
        self.lock().uses
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == CacheableState::Disposed
    }

    /// Runs `f` on the driver program unless the shader has been disposed.
    pub fn with_handle<R>(&self, f: impl FnOnce(&dyn DriverShader) -> R) -> Option<R> {
        let inner = self.lock();
        inner.handle.as_deref().map(f)
    }

    /// Marks one outstanding device use. Fails once the shader is disposed.
    pub fn used_by_device(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state == CacheableState::Disposed {
            return Err(ShaderError::Disposed);
        }
        inner.uses += 1;
        Ok(())
    }

    /// Releases one device use, completing a deferred eviction on the last one.
    pub fn unused_by_device(&self) {
        let mut inner = self.lock();
        if inner.uses == 0 {
            warn!(stage = ?self.stage, "device use released without a matching use");
            return;
        }
        inner.uses -= 1;
        if inner.uses == 0 && inner.state == CacheableState::Evicted {
            inner.release();
            debug!(stage = ?self.stage, "released evicted shader after last use");
        }
    }

    /// Scoped device use; released when the guard drops.
    pub fn begin_use(self: &Arc<Self>) -> Result<ShaderUse> {
        self.used_by_device()?;
        Ok(ShaderUse {
            shader: Arc::clone(self),
        })
    }

    /// Disposes the program now when unused, otherwise once the last use is released.
    pub fn evict(&self) {
        let mut inner = self.lock();
        match inner.state {
            CacheableState::Normal if inner.uses == 0 => {
                inner.release();
                debug!(stage = ?self.stage, "disposed evicted shader");
            }
            CacheableState::Normal => inner.state = CacheableState::Evicted,
            CacheableState::Evicted | CacheableState::Disposed => {}
        }
    }
}

/// Guard returned by [`Shader::begin_use`].
#[derive(Debug)]
pub struct ShaderUse {
    shader: Arc<Shader>,
}

impl Deref for ShaderUse {
    type Target = Shader;

    fn deref(&self) -> &Shader {
        &self.shader
    }
}

impl Drop for ShaderUse {
    fn drop(&mut self) {
        self.shader.unused_by_device();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::GraphId;

    #[derive(Debug)]
    struct Handle;

    impl DriverShader for Handle {
        fn stage(&self) -> BindingStage {
            BindingStage::Vertex
        }
    }

    fn shader() -> Arc<Shader> {
        let parameters = FixedShaderParameters::new(GraphId::next(), Arc::from(Vec::new()));
        Shader::new(BindingStage::Vertex, Box::new(Handle), parameters)
    }

    #[test]
    fn unused_shaders_are_released_on_eviction() {
        let shader = shader();
        assert!(shader.with_handle(|h| h.stage()).is_some());

        shader.evict();

        assert_eq!(shader.state(), CacheableState::Disposed);
        assert!(shader.with_handle(|h| h.stage()).is_none());
        assert_eq!(shader.used_by_device(), Err(ShaderError::Disposed));
    }

    #[test]
    fn eviction_is_deferred_until_the_last_use() {
        let shader = shader();
        shader.used_by_device().unwrap();
        let guard = shader.begin_use().unwrap();

        shader.evict();
        shader.evict();
        assert_eq!(shader.state(), CacheableState::Evicted);

        shader.unused_by_device();
        assert_eq!(shader.state(), CacheableState::Evicted);
        assert_eq!(guard.use_count(), 1);

        drop(guard);
        assert_eq!(shader.state(), CacheableState::Disposed);
        assert_eq!(shader.use_count(), 0);
    }

    #[test]
    fn uses_without_eviction_keep_the_program() {
        let shader = shader();
        {
            let _guard = shader.begin_use().unwrap();
            assert_eq!(shader.use_count(), 1);
        }
        assert_eq!(shader.state(), CacheableState::Normal);
        assert_eq!(shader.stage(), BindingStage::Vertex);
    }

    #[test]
    fn unbalanced_releases_are_ignored() {
        let shader = shader();
        shader.unused_by_device();
        assert_eq!(shader.use_count(), 0);
        assert_eq!(shader.state(), CacheableState::Normal);

        shader.used_by_device().unwrap();
        shader.evict();
        shader.unused_by_device();
        shader.unused_by_device();
        assert_eq!(shader.state(), CacheableState::Disposed);
        assert_eq!(shader.use_count(), 0);
    }
}
