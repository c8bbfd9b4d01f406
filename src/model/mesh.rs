use std::path::PathBuf;

use glam::Vec3;

/// Axis-aligned bounds of a model in its own coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self { min: Vec3::ZERO, max: Vec3::ZERO }
    }
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box around `points`, or the zero box when there are none.
    pub fn from_points(points: &[[f32; 3]]) -> Self {
        let mut iter = points.iter().map(|p| Vec3::from_array(*p));
        let Some(first) = iter.next() else {
            return Self::default();
        };
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Self { min, max }
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        Self { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Distance from the origin to the farther of the min/max corners.
    /// Assumes the model was authored centred near its own origin.
    pub fn origin_extent(&self) -> f32 {
        self.max.length().max(self.min.length())
    }
}

/// Vertex inputs a mesh may supply and a shader may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexAttribute {
    Position,
    Normal,
    Uv,
    Color,
}

impl VertexAttribute {
    pub const ALL: [VertexAttribute; 4] = [
        VertexAttribute::Position,
        VertexAttribute::Normal,
        VertexAttribute::Uv,
        VertexAttribute::Color,
    ];

    /// Name the attribute is declared under in WGSL.
    pub fn shader_name(self) -> &'static str {
        match self {
            VertexAttribute::Position => "position",
            VertexAttribute::Normal => "normal",
            VertexAttribute::Uv => "uv",
            VertexAttribute::Color => "color",
        }
    }

    pub fn from_shader_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.shader_name() == name)
    }

    /// Number of f32 components.
    pub fn components(self) -> u32 {
        match self {
            VertexAttribute::Position | VertexAttribute::Normal => 3,
            VertexAttribute::Uv => 2,
            VertexAttribute::Color => 4,
        }
    }

    pub fn stride(self) -> u64 {
        self.components() as u64 * 4
    }
}

/// Byte offsets of each attribute block inside a packed vertex buffer.
/// `None` means the mesh does not provide that attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeOffsets {
    pub position: u64,
    pub normal: Option<u64>,
    pub uv: Option<u64>,
    pub color: Option<u64>,
}

impl AttributeOffsets {
    pub fn offset(&self, attribute: VertexAttribute) -> Option<u64> {
        match attribute {
            VertexAttribute::Position => Some(self.position),
            VertexAttribute::Normal => self.normal,
            VertexAttribute::Uv => self.uv,
            VertexAttribute::Color => self.color,
        }
    }

    pub fn has(&self, attribute: VertexAttribute) -> bool {
        self.offset(attribute).is_some()
    }
}

/// One drawable part of a model. Attribute arrays, when present, have one
/// entry per position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub indices: Vec<u32>,
}

impl SubMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(&self.positions)
    }

    /// Pack all attributes into one non-interleaved byte buffer, one block
    /// per attribute, returning the bytes and each block's offset.
    pub fn pack(&self) -> (Vec<u8>, AttributeOffsets) {
        let mut bytes: Vec<u8> = Vec::new();
        let mut offsets = AttributeOffsets::default();

        bytes.extend_from_slice(bytemuck::cast_slice(&self.positions));
        if let Some(normals) = &self.normals {
            offsets.normal = Some(bytes.len() as u64);
            bytes.extend_from_slice(bytemuck::cast_slice(normals));
        }
        if let Some(uvs) = &self.uvs {
            offsets.uv = Some(bytes.len() as u64);
            bytes.extend_from_slice(bytemuck::cast_slice(uvs));
        }
        if let Some(colors) = &self.colors {
            offsets.color = Some(bytes.len() as u64);
            bytes.extend_from_slice(bytemuck::cast_slice(colors));
        }
        (bytes, offsets)
    }
}

/// A loaded model: its sub-meshes and overall bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub source: PathBuf,
    pub meshes: Vec<SubMesh>,
    pub bounds: BoundingBox,
}

impl Model {
    pub fn new(source: PathBuf, meshes: Vec<SubMesh>) -> Self {
        let bounds = meshes
            .iter()
            .filter(|m| !m.positions.is_empty())
            .map(SubMesh::bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default();
        Self { source, meshes, bounds }
    }

    /// A model is drawable when it has at least one indexed triangle.
    pub fn is_valid(&self) -> bool {
        self.meshes.iter().any(|m| !m.indices.is_empty() && !m.positions.is_empty())
    }
}
