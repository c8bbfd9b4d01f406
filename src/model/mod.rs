// MODEL: transform state, mesh data and the loader collaborator
pub mod loader;
pub mod mesh;
pub mod transform;

pub use loader::{primitive_path, ModelLoader, ObjLoader};
pub use mesh::{AttributeOffsets, BoundingBox, Model, SubMesh, VertexAttribute};
pub use transform::{TransformState, PITCH_LIMIT_DEGREES};
