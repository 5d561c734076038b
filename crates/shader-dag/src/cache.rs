use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::{debug, warn};

use crate::limits::{DEFAULT_SHADER_CACHE_CAPACITY, DEFAULT_SHADER_CACHE_EVICTION_RATIO};
use crate::params::FixedShaderParameters;
use crate::shader::Shader;

/// Sizing of the compiled-shader cache kept by every [`crate::ShaderCode`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderCacheConfig {
    /// Entries kept before eviction starts.
    pub capacity: NonZeroUsize,
    /// Fraction of `capacity` evicted at once when the cache overflows, in `(0, 1]`.
    pub eviction_ratio: f32,
}

impl Default for ShaderCacheConfig {
    fn default() -> Self {
        Self {
            capacity: NonZeroUsize::new(DEFAULT_SHADER_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            eviction_ratio: DEFAULT_SHADER_CACHE_EVICTION_RATIO,
        }
    }
}

impl ShaderCacheConfig {
    fn batch(&self) -> usize {
        let ratio = self.eviction_ratio.clamp(0.0, 1.0);
        ((self.capacity.get() as f32 * ratio).ceil() as usize).max(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Compiles that lost the insert race and were discarded.
    pub duplicates: u64,
}

/// Where [`ShaderCache::insert`] got the returned shader from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShaderCacheLookupSource {
    Inserted,
    /// An equal entry was inserted concurrently; the new shader was evicted.
    Existing,
}

#[derive(Debug)]
pub(crate) struct ShaderCache {
    entries: LruCache<FixedShaderParameters, Arc<Shader>>,
    config: ShaderCacheConfig,
    stats: ShaderCacheStats,
    closed: bool,
}

impl ShaderCache {
    pub(crate) fn new(config: ShaderCacheConfig) -> Self {
        Self {
            entries: LruCache::unbounded(),
            config,
            stats: ShaderCacheStats::default(),
            closed: false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn stats(&self) -> ShaderCacheStats {
        self.stats
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Looks up and touches the entry for `key`.
    pub(crate) fn get(&mut self, key: &FixedShaderParameters) -> Option<Arc<Shader>> {
        match self.entries.get(key) {
            Some(shader) => {
                self.stats.hits += 1;
                Some(Arc::clone(shader))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Inserts a freshly compiled shader. The first insert for a key wins.
    pub(crate) fn insert(&mut self, shader: Arc<Shader>) -> (Arc<Shader>, ShaderCacheLookupSource) {
        if let Some(existing) = self.entries.get(shader.parameters()) {
            warn!(
                stage = ?shader.stage(),
                "shader compiled concurrently for the same parameters; discarding duplicate"
            );
            self.stats.duplicates += 1;
            shader.evict();
            return (Arc::clone(existing), ShaderCacheLookupSource::Existing);
        }
        self.entries
            .put(shader.parameters().clone(), Arc::clone(&shader));
        if self.entries.len() > self.config.capacity.get() {
            self.trim();
        }
        (shader, ShaderCacheLookupSource::Inserted)
    }

    fn trim(&mut self) {
        let count = self.config.batch().min(self.entries.len());
        for _ in 0..count {
            let Some((_, shader)) = self.entries.pop_lru() else {
                break;
            };
            shader.evict();
            self.stats.evictions += 1;
        }
        debug!(evicted = count, remaining = self.entries.len(), "trimmed shader cache");
    }

    /// Evicts every entry; with `close`, later inserts are refused.
    pub(crate) fn evict_all(&mut self, close: bool) {
        let evicted = self.entries.len();
        while let Some((_, shader)) = self.entries.pop_lru() {
            shader.evict();
        }
        self.stats.evictions += evicted as u64;
        self.closed |= close;
        if evicted > 0 {
            debug!(evicted, "evicted all cached shaders");
        }
    }
}
