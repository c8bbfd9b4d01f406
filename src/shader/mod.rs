// SHADER: stage compilation, link checks and the last-known-good program
pub mod compiler;
pub mod manager;
pub mod uniforms;

pub use compiler::{compile, link, BindingSlot, CompiledStage, LinkedProgram, LocationTable, ShaderStage};
pub use manager::{builtin_path, ShaderManager, BUILTIN_FRAGMENT, BUILTIN_VERTEX};
pub use uniforms::{normal_matrix, FlatUniforms, FrameUniforms, FRAME_UNIFORMS_SIZE};
