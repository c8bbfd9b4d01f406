use std::collections::{HashMap, HashSet};

use wgpu::util::DeviceExt;

use crate::model::{AttributeOffsets, Model, SubMesh, VertexAttribute};
use crate::shader::{FrameUniforms, LinkedProgram, LocationTable, ShaderManager, FRAME_UNIFORMS_SIZE};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
    (depth_texture, depth_view)
}

/// Values fed to attributes a sub-mesh does not provide.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ConstantAttributes {
    pub normal: [f32; 3],
    _pad0: f32,
    pub uv: [f32; 2],
    _pad1: [f32; 2],
    pub color: [f32; 4],
}

impl ConstantAttributes {
    /// Missing colours take the AD colour; missing normals face the viewer.
    pub fn new(ad_color: [f32; 4]) -> Self {
        Self {
            normal: [0.0, 0.0, 1.0],
            _pad0: 0.0,
            uv: [0.0, 0.0],
            _pad1: [0.0; 2],
            color: ad_color,
        }
    }

    pub fn offset(attribute: VertexAttribute) -> u64 {
        match attribute {
            VertexAttribute::Position => 0,
            VertexAttribute::Normal => std::mem::offset_of!(ConstantAttributes, normal) as u64,
            VertexAttribute::Uv => std::mem::offset_of!(ConstantAttributes, uv) as u64,
            VertexAttribute::Color => std::mem::offset_of!(ConstantAttributes, color) as u64,
        }
    }
}

/// Where one consumed attribute reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSource {
    /// Per-vertex block of the mesh buffer at this byte offset.
    Mesh { offset: u64 },
    /// Single value from the constant buffer at this byte offset.
    Constant { offset: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBinding {
    pub attribute: VertexAttribute,
    pub location: u32,
    pub source: AttributeSource,
}

/// Bind every attribute the program consumes, in location order. Attributes
/// the mesh lacks read the constant buffer so nothing is read out of bounds.
pub fn bind_attributes(locations: &LocationTable, offsets: &AttributeOffsets) -> Vec<AttributeBinding> {
    locations
        .consumed_attributes()
        .into_iter()
        .map(|(attribute, location)| {
            let source = match offsets.offset(attribute) {
                Some(offset) => AttributeSource::Mesh { offset },
                None => AttributeSource::Constant { offset: ConstantAttributes::offset(attribute) },
            };
            AttributeBinding { attribute, location, source }
        })
        .collect()
}

/// Pipeline cache key: which consumed attributes come from the mesh.
pub fn attribute_mask(bindings: &[AttributeBinding]) -> u8 {
    bindings
        .iter()
        .filter(|b| matches!(b.source, AttributeSource::Mesh { .. }))
        .fold(0, |mask, b| mask | 1 << b.attribute as u8)
}

fn vertex_format(attribute: VertexAttribute) -> wgpu::VertexFormat {
    match attribute.components() {
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

struct GpuSubMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    offsets: AttributeOffsets,
}

impl GpuSubMesh {
    fn upload(device: &wgpu::Device, mesh: &SubMesh) -> Self {
        let (bytes, offsets) = mesh.pack();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh_vertices"),
            contents: &bytes,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh_indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self { vertex_buffer, index_buffer, index_count: mesh.index_count(), offsets }
    }
}

/// Draws the loaded model with the shader manager's current program.
///
/// Pipelines are built per attribute mask and dropped whenever the program
/// generation changes; mesh buffers are re-uploaded when the model
/// generation changes. Both checks happen at the start of a frame, never
/// mid-draw.
pub struct ModelRenderer {
    format: wgpu::TextureFormat,
    uniform_buffer: wgpu::Buffer,
    constant_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    pipeline_layout: wgpu::PipelineLayout,
    program: Option<(wgpu::ShaderModule, wgpu::ShaderModule)>,
    locations: LocationTable,
    shader_generation: u64,
    pipelines: HashMap<u8, wgpu::RenderPipeline>,
    failed_masks: HashSet<u8>,
    meshes: Vec<GpuSubMesh>,
    model_generation: Option<u64>,
}

impl ModelRenderer {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_uniforms"),
            size: FRAME_UNIFORMS_SIZE as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let constant_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("constant_attributes"),
            contents: bytemuck::bytes_of(&ConstantAttributes::new([1.0; 4])),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame_bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_bg"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("model_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            format,
            uniform_buffer,
            constant_buffer,
            bind_group,
            pipeline_layout,
            program: None,
            locations: LocationTable::default(),
            shader_generation: 0,
            pipelines: HashMap::new(),
            failed_masks: HashSet::new(),
            meshes: Vec::new(),
            model_generation: None,
        }
    }

    /// Pick up a newly linked program. Returns `Ok(true)` when a new
    /// program was built. A program the GPU refuses leaves the previous one
    /// in place.
    pub fn sync_program(&mut self, device: &wgpu::Device, shaders: &ShaderManager) -> Result<bool, wgpu::Error> {
        if self.shader_generation == shaders.generation() {
            return Ok(false);
        }
        self.shader_generation = shaders.generation();
        let program = shaders.program();

        let (vertex, fragment) = validated(device, || create_modules(device, program))?;
        // The position-only pipeline is built up front so an unusable
        // program is caught before it replaces the current one
        let bindings = bind_attributes(&program.locations, &AttributeOffsets::default());
        let pipeline = validated(device, || {
            create_pipeline(device, &self.pipeline_layout, &vertex, &fragment, self.format, &bindings)
        })?;

        self.program = Some((vertex, fragment));
        self.locations = program.locations.clone();
        self.pipelines.clear();
        self.failed_masks.clear();
        self.pipelines.insert(attribute_mask(&bindings), pipeline);
        tracing::debug!("rebuilt shader modules for generation {}", self.shader_generation);
        Ok(true)
    }

    /// Upload the model's sub-meshes when the model changed.
    pub fn sync_model(&mut self, device: &wgpu::Device, generation: u64, model: Option<&Model>) {
        if self.model_generation == Some(generation) {
            return;
        }
        self.meshes = model
            .map(|m| m.meshes.iter().filter(|s| s.index_count() > 0).map(|s| GpuSubMesh::upload(device, s)).collect())
            .unwrap_or_default();
        self.model_generation = Some(generation);
        tracing::debug!("uploaded {} sub-meshes", self.meshes.len());
    }

    /// Write this frame's uniforms and the constant attribute values.
    pub fn update(&self, queue: &wgpu::Queue, uniforms: &FrameUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
        let constants = ConstantAttributes::new(uniforms.ad_color);
        queue.write_buffer(&self.constant_buffer, 0, bytemuck::bytes_of(&constants));
    }

    /// Build any pipeline the current meshes need. A mask the GPU refused
    /// once is not retried until the program changes.
    pub fn prepare(&mut self, device: &wgpu::Device) -> Result<(), wgpu::Error> {
        let Some((vertex, fragment)) = &self.program else {
            return Ok(());
        };
        let mut result = Ok(());
        for mesh in &self.meshes {
            let bindings = bind_attributes(&self.locations, &mesh.offsets);
            let mask = attribute_mask(&bindings);
            if self.pipelines.contains_key(&mask) || self.failed_masks.contains(&mask) {
                continue;
            }
            match validated(device, || {
                create_pipeline(device, &self.pipeline_layout, vertex, fragment, self.format, &bindings)
            }) {
                Ok(pipeline) => {
                    self.pipelines.insert(mask, pipeline);
                }
                Err(e) => {
                    self.failed_masks.insert(mask);
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_bind_group(0, &self.bind_group, &[]);
        for mesh in &self.meshes {
            let bindings = bind_attributes(&self.locations, &mesh.offsets);
            let Some(pipeline) = self.pipelines.get(&attribute_mask(&bindings)) else {
                continue;
            };
            pass.set_pipeline(pipeline);
            for (slot, binding) in bindings.iter().enumerate() {
                let buffer = match binding.source {
                    AttributeSource::Mesh { offset } => mesh.vertex_buffer.slice(offset..),
                    AttributeSource::Constant { offset } => {
                        self.constant_buffer.slice(offset..offset + binding.attribute.stride())
                    }
                };
                pass.set_vertex_buffer(slot as u32, buffer);
            }
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}

/// Run `build` inside a validation error scope so a GPU-side rejection is
/// returned instead of reaching the uncaptured-error handler.
pub fn validated<T>(device: &wgpu::Device, build: impl FnOnce() -> T) -> Result<T, wgpu::Error> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(error),
        None => Ok(value),
    }
}

fn create_modules(device: &wgpu::Device, program: &LinkedProgram) -> (wgpu::ShaderModule, wgpu::ShaderModule) {
    let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("model_vertex"),
        source: wgpu::ShaderSource::Wgsl(program.vertex.source.as_str().into()),
    });
    let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("model_fragment"),
        source: wgpu::ShaderSource::Wgsl(program.fragment.source.as_str().into()),
    });
    (vertex, fragment)
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    bindings: &[AttributeBinding],
) -> wgpu::RenderPipeline {
    // One buffer slot per attribute; constants step per instance so a
    // single value covers every vertex.
    let attributes: Vec<[wgpu::VertexAttribute; 1]> = bindings
        .iter()
        .map(|b| {
            [wgpu::VertexAttribute {
                offset: 0,
                shader_location: b.location,
                format: vertex_format(b.attribute),
            }]
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout> = bindings
        .iter()
        .zip(&attributes)
        .map(|(b, attrs)| wgpu::VertexBufferLayout {
            array_stride: b.attribute.stride(),
            step_mode: match b.source {
                AttributeSource::Mesh { .. } => wgpu::VertexStepMode::Vertex,
                AttributeSource::Constant { .. } => wgpu::VertexStepMode::Instance,
            },
            attributes: attrs,
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("model_pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("vs_main"),
            buffers: &buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState { count: 1, mask: !0, alpha_to_coverage_enabled: false },
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderManager;

    fn ads_locations() -> LocationTable {
        ShaderManager::builtin().unwrap().locations().clone()
    }

    #[test]
    fn test_missing_color_reads_constant() {
        let offsets = AttributeOffsets { position: 0, normal: Some(96), uv: None, color: None };
        let bindings = bind_attributes(&ads_locations(), &offsets);

        assert_eq!(
            bindings,
            vec![
                AttributeBinding { attribute: VertexAttribute::Position, location: 0, source: AttributeSource::Mesh { offset: 0 } },
                AttributeBinding { attribute: VertexAttribute::Normal, location: 1, source: AttributeSource::Mesh { offset: 96 } },
                AttributeBinding {
                    attribute: VertexAttribute::Color,
                    location: 2,
                    source: AttributeSource::Constant { offset: ConstantAttributes::offset(VertexAttribute::Color) },
                },
            ]
        );
    }

    #[test]
    fn test_unconsumed_attributes_are_not_bound() {
        // UVs present in the mesh but the program never reads them
        let offsets = AttributeOffsets { position: 0, normal: None, uv: Some(48), color: Some(80) };
        let bindings = bind_attributes(&ads_locations(), &offsets);
        assert_eq!(bindings.len(), 3);
        assert!(bindings.iter().all(|b| b.attribute != VertexAttribute::Uv));
    }

    #[test]
    fn test_mask_distinguishes_attribute_sets() {
        let locations = ads_locations();
        let bare = bind_attributes(&locations, &AttributeOffsets::default());
        let lit = bind_attributes(&locations, &AttributeOffsets { normal: Some(12), ..Default::default() });
        assert_eq!(attribute_mask(&bare), 1);
        assert_ne!(attribute_mask(&bare), attribute_mask(&lit));
    }

    #[test]
    fn test_constant_layout() {
        assert_eq!(ConstantAttributes::offset(VertexAttribute::Normal), 0);
        assert_eq!(ConstantAttributes::offset(VertexAttribute::Uv), 16);
        assert_eq!(ConstantAttributes::offset(VertexAttribute::Color), 32);
        assert_eq!(std::mem::size_of::<ConstantAttributes>(), 48);
        assert_eq!(ConstantAttributes::new([0.0, 1.0, 0.0, 1.0]).color, [0.0, 1.0, 0.0, 1.0]);
    }

    /// Headless device, or `None` on machines without any adapter.
    fn test_device() -> Option<wgpu::Device> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())).ok()?;
        let (device, _queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default())).ok()?;
        Some(device)
    }

    #[test]
    fn test_rejected_module_is_captured() {
        let Some(device) = test_device() else {
            return;
        };
        let result = validated(&device, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("broken"),
                source: wgpu::ShaderSource::Wgsl("@fragment fn fs_main( {".into()),
            })
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_program_builds_once_per_generation() {
        let Some(device) = test_device() else {
            return;
        };
        let shaders = ShaderManager::builtin().unwrap();
        let mut renderer = ModelRenderer::new(&device, wgpu::TextureFormat::Rgba8UnormSrgb);

        assert!(renderer.sync_program(&device, &shaders).unwrap());
        assert!(!renderer.sync_program(&device, &shaders).unwrap());
        assert!(renderer.prepare(&device).is_ok());
    }
}
