//! Compile-time limits shared by the layout builder, the parameter validator and the cache.

/// Maximum number of constant buffers that may be attached to one set of fixed parameters.
pub const MAX_CONSTANT_BUFFER_BINDING_SLOTS: usize = 16;

/// Constant buffers are addressed in 4-word (16-byte) registers.
pub const REGISTER_WORDS: u32 = 4;

/// Size of one constant buffer word in bytes.
pub const WORD_BYTES: u32 = 4;

/// Texture slots assumed when no device supplies its own limits (D3D10 `t0..t127`).
pub const DEFAULT_MAX_TEXTURES: u32 = 128;

/// Sampler slots assumed when no device supplies its own limits (`s0..s15`).
pub const DEFAULT_MAX_SAMPLERS: u32 = 16;

/// Intrinsic calls take at most this many arguments.
pub const MAX_INTRINSIC_ARGUMENTS: usize = 4;

/// Default number of compiled shaders kept per shader code.
pub const DEFAULT_SHADER_CACHE_CAPACITY: usize = 64;

/// Default fraction of the cache reclaimed once it overflows.
pub const DEFAULT_SHADER_CACHE_EVICTION_RATIO: f32 = 0.2;
