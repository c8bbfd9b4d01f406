//! WGSL stage compilation and program linking on the CPU, via `naga`.
//!
//! *Compile* parses and validates one stage and checks its entry point.
//! *Link* checks the two stages against each other and against what the
//! viewer can feed them, producing the attribute/uniform location table.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, Module, Scalar, Type, TypeInner, VectorSize};

use crate::error::ShaderError;
use crate::model::VertexAttribute;
use crate::shader::uniforms::FRAME_UNIFORMS_SIZE;

/// Vertex input locations must stay below the downlevel attribute limit.
pub const MAX_VERTEX_LOCATIONS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_main",
            ShaderStage::Fragment => "fs_main",
        }
    }

    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }

    pub fn other(self) -> Self {
        match self {
            ShaderStage::Vertex => ShaderStage::Fragment,
            ShaderStage::Fragment => ShaderStage::Vertex,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// A parsed and validated stage together with the source it came from.
#[derive(Debug, Clone)]
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub path: PathBuf,
    pub source: String,
    module: Module,
}

impl CompiledStage {
    pub fn module(&self) -> &Module {
        &self.module
    }
}

/// `@group` / `@binding` pair of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSlot {
    pub group: u32,
    pub binding: u32,
}

/// Where the linked program expects each input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationTable {
    /// Vertex attribute name → `@location`.
    pub attributes: BTreeMap<String, u32>,
    /// Uniform variable name → binding slot.
    pub uniforms: BTreeMap<String, BindingSlot>,
}

impl LocationTable {
    pub fn attribute(&self, attribute: VertexAttribute) -> Option<u32> {
        self.attributes.get(attribute.shader_name()).copied()
    }

    /// Consumed attributes ordered by location.
    pub fn consumed_attributes(&self) -> Vec<(VertexAttribute, u32)> {
        let mut consumed: Vec<_> = VertexAttribute::ALL
            .into_iter()
            .filter_map(|a| self.attribute(a).map(|loc| (a, loc)))
            .collect();
        consumed.sort_by_key(|(_, loc)| *loc);
        consumed
    }
}

/// Vertex and fragment stages that link, plus their location table.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex: CompiledStage,
    pub fragment: CompiledStage,
    pub locations: LocationTable,
}

impl LinkedProgram {
    pub fn stage(&self, stage: ShaderStage) -> &CompiledStage {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
        }
    }

    /// Link `vertex` with `fragment`.
    pub fn link(vertex: CompiledStage, fragment: CompiledStage) -> Result<Self, ShaderError> {
        let locations = link(&vertex, &fragment)?;
        Ok(Self { vertex, fragment, locations })
    }
}

/// Parse, validate and check the entry point of one stage.
pub fn compile(stage: ShaderStage, path: &Path, source: String) -> Result<CompiledStage, ShaderError> {
    let compile_error = |message: String| ShaderError::Compile {
        stage,
        path: path.to_path_buf(),
        message,
    };

    let module = naga::front::wgsl::parse_str(&source).map_err(|e| compile_error(e.emit_to_string(&source)))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| compile_error(e.emit_to_string(&source)))?;

    let has_entry = module
        .entry_points
        .iter()
        .any(|ep| ep.name == stage.entry_point() && ep.stage == stage.naga_stage());
    if !has_entry {
        return Err(compile_error(format!(
            "missing @{} entry point `{}`",
            stage,
            stage.entry_point()
        )));
    }

    Ok(CompiledStage { stage, path: path.to_path_buf(), source, module })
}

/// A located input or output of an entry point.
struct Varying {
    name: String,
    location: u32,
    ty: Handle<Type>,
}

fn push_varying(varyings: &mut Vec<Varying>, name: Option<&String>, binding: Option<&Binding>, ty: Handle<Type>) {
    if let Some(Binding::Location { location, .. }) = binding {
        varyings.push(Varying { name: name.cloned().unwrap_or_default(), location: *location, ty });
    }
}

/// Flatten a binding-or-struct into its located members.
fn collect_varyings(module: &Module, varyings: &mut Vec<Varying>, name: Option<&String>, binding: Option<&Binding>, ty: Handle<Type>) {
    match (&module.types[ty].inner, binding) {
        (TypeInner::Struct { members, .. }, None) => {
            for member in members {
                push_varying(varyings, member.name.as_ref(), member.binding.as_ref(), member.ty);
            }
        }
        _ => push_varying(varyings, name, binding, ty),
    }
}

fn entry_inputs(stage: &CompiledStage) -> Vec<Varying> {
    let mut inputs = Vec::new();
    let module = &stage.module;
    if let Some(ep) = module.entry_points.iter().find(|ep| ep.name == stage.stage.entry_point()) {
        for arg in &ep.function.arguments {
            collect_varyings(module, &mut inputs, arg.name.as_ref(), arg.binding.as_ref(), arg.ty);
        }
    }
    inputs
}

fn entry_outputs(stage: &CompiledStage) -> Vec<Varying> {
    let mut outputs = Vec::new();
    let module = &stage.module;
    if let Some(ep) = module.entry_points.iter().find(|ep| ep.name == stage.stage.entry_point()) {
        if let Some(result) = &ep.function.result {
            collect_varyings(module, &mut outputs, None, result.binding.as_ref(), result.ty);
        }
    }
    outputs
}

fn is_float(inner: &TypeInner) -> bool {
    match inner {
        TypeInner::Scalar(scalar) | TypeInner::Vector { scalar, .. } => *scalar == Scalar::F32,
        _ => false,
    }
}

/// The colour target is a blended float format: `@location(0)` must be a
/// `vec4<f32>` and every other output a float.
fn check_fragment_outputs(fragment: &CompiledStage) -> Result<(), ShaderError> {
    let outputs = entry_outputs(fragment);
    let types = &fragment.module.types;
    let color = TypeInner::Vector { size: VectorSize::Quad, scalar: Scalar::F32 };
    match outputs.iter().find(|o| o.location == 0) {
        Some(output) if types[output.ty].inner == color => {}
        Some(output) => {
            return Err(ShaderError::Link(format!(
                "fragment output `{}` at @location(0) must be a vec4<f32> to match the colour target",
                output.name
            )));
        }
        None => return Err(ShaderError::Link("fragment stage does not write @location(0)".into())),
    }
    if let Some(output) = outputs.iter().find(|o| !is_float(&types[o.ty].inner)) {
        return Err(ShaderError::Link(format!(
            "fragment output `{}` at @location({}) is not a float",
            output.name, output.location
        )));
    }
    Ok(())
}

fn expected_type(attribute: VertexAttribute) -> TypeInner {
    let size = match attribute.components() {
        2 => VectorSize::Bi,
        3 => VectorSize::Tri,
        _ => VectorSize::Quad,
    };
    TypeInner::Vector { size, scalar: Scalar::F32 }
}

/// Collect uniform bindings of one stage, rejecting resources the viewer
/// does not provide.
fn collect_uniforms(stage: &CompiledStage, uniforms: &mut BTreeMap<String, BindingSlot>) -> Result<(), ShaderError> {
    let module = &stage.module;
    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else {
            continue;
        };
        let name = var.name.clone().unwrap_or_default();
        let slot = BindingSlot { group: binding.group, binding: binding.binding };

        if var.space != AddressSpace::Uniform || slot != (BindingSlot { group: 0, binding: 0 }) {
            return Err(ShaderError::Link(format!(
                "{} stage resource `{}` at @group({}) @binding({}) is not provided; \
                 only the frame uniform block at @group(0) @binding(0) is",
                stage.stage, name, slot.group, slot.binding
            )));
        }
        let size = module.types[var.ty].inner.size(module.to_ctx());
        if size > FRAME_UNIFORMS_SIZE {
            return Err(ShaderError::Link(format!(
                "uniform block `{name}` is {size} bytes but the frame block is {FRAME_UNIFORMS_SIZE}"
            )));
        }
        uniforms.insert(name, slot);
    }
    Ok(())
}

/// Check the stages against each other and build the location table.
pub fn link(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<LocationTable, ShaderError> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(ShaderError::Link("stages attached to the wrong slots".into()));
    }

    let mut table = LocationTable::default();

    for input in entry_inputs(vertex) {
        let Some(attribute) = VertexAttribute::from_shader_name(&input.name) else {
            return Err(ShaderError::Link(format!(
                "vertex input `{}` at @location({}) is not a mesh attribute \
                 (expected position, normal, uv or color)",
                input.name, input.location
            )));
        };
        if input.location >= MAX_VERTEX_LOCATIONS {
            return Err(ShaderError::Link(format!(
                "vertex input `{}` at @location({}) exceeds the limit of {} attribute locations",
                input.name, input.location, MAX_VERTEX_LOCATIONS
            )));
        }
        if vertex.module.types[input.ty].inner != expected_type(attribute) {
            return Err(ShaderError::Link(format!(
                "vertex input `{}` must be a vec{}<f32>",
                input.name,
                attribute.components()
            )));
        }
        table.attributes.insert(input.name, input.location);
    }
    if table.attribute(VertexAttribute::Position).is_none() {
        return Err(ShaderError::Link("vertex stage does not consume a `position` attribute".into()));
    }

    let outputs = entry_outputs(vertex);
    for input in entry_inputs(fragment) {
        let Some(output) = outputs.iter().find(|o| o.location == input.location) else {
            return Err(ShaderError::Link(format!(
                "fragment input `{}` at @location({}) is not written by the vertex stage",
                input.name, input.location
            )));
        };
        if vertex.module.types[output.ty].inner != fragment.module.types[input.ty].inner {
            return Err(ShaderError::Link(format!(
                "@location({}) type differs between vertex output `{}` and fragment input `{}`",
                input.location, output.name, input.name
            )));
        }
    }

    check_fragment_outputs(fragment)?;

    collect_uniforms(vertex, &mut table.uniforms)?;
    collect_uniforms(fragment, &mut table.uniforms)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADS_VERT: &str = include_str!("../../assets/shaders/ads.vert.wgsl");
    const ADS_FRAG: &str = include_str!("../../assets/shaders/ads.frag.wgsl");
    const NORMALS_FRAG: &str = include_str!("../../assets/shaders/normals.frag.wgsl");
    const FLAT: &str = include_str!("../../assets/shaders/flat.wgsl");

    fn stage(stage: ShaderStage, source: &str) -> Result<CompiledStage, ShaderError> {
        compile(stage, Path::new("test.wgsl"), source.to_string())
    }

    #[test]
    fn test_bundled_program_links() {
        let vertex = stage(ShaderStage::Vertex, ADS_VERT).unwrap();
        let fragment = stage(ShaderStage::Fragment, ADS_FRAG).unwrap();
        let table = link(&vertex, &fragment).unwrap();

        assert_eq!(table.attribute(VertexAttribute::Position), Some(0));
        assert_eq!(table.attribute(VertexAttribute::Normal), Some(1));
        assert_eq!(table.attribute(VertexAttribute::Color), Some(2));
        assert_eq!(table.attribute(VertexAttribute::Uv), None);
        assert_eq!(table.uniforms.get("frame"), Some(&BindingSlot { group: 0, binding: 0 }));
    }

    #[test]
    fn test_bundled_alternates_compile() {
        let vertex = stage(ShaderStage::Vertex, ADS_VERT).unwrap();
        let normals = stage(ShaderStage::Fragment, NORMALS_FRAG).unwrap();
        assert!(link(&vertex, &normals).is_ok());
        stage(ShaderStage::Vertex, FLAT).unwrap();
        stage(ShaderStage::Fragment, FLAT).unwrap();
    }

    #[test]
    fn test_syntax_error_is_a_compile_error() {
        let err = stage(ShaderStage::Fragment, "@fragment fn fs_main( -> {").unwrap_err();
        assert!(matches!(err, ShaderError::Compile { stage: ShaderStage::Fragment, .. }));
    }

    #[test]
    fn test_missing_entry_point_is_a_compile_error() {
        let err = stage(ShaderStage::Vertex, ADS_FRAG).unwrap_err();
        match err {
            ShaderError::Compile { message, .. } => assert!(message.contains("vs_main")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unfed_fragment_input_fails_link() {
        let vertex = stage(ShaderStage::Vertex, ADS_VERT).unwrap();
        let fragment = stage(
            ShaderStage::Fragment,
            "@fragment fn fs_main(@location(7) tint: vec4<f32>) -> @location(0) vec4<f32> { return tint; }",
        )
        .unwrap();
        assert!(matches!(link(&vertex, &fragment), Err(ShaderError::Link(_))));
    }

    #[test]
    fn test_unknown_attribute_and_foreign_binding_fail_link() {
        let fragment = stage(ShaderStage::Fragment, NORMALS_FRAG).unwrap();

        let tangent = stage(
            ShaderStage::Vertex,
            "@vertex fn vs_main(@location(0) position: vec3<f32>, @location(3) tangent: vec3<f32>) \
             -> @builtin(position) vec4<f32> { return vec4<f32>(position + tangent, 1.0); }",
        )
        .unwrap();
        assert!(matches!(link(&tangent, &fragment), Err(ShaderError::Link(_))));

        let texture = stage(
            ShaderStage::Vertex,
            "@group(1) @binding(0) var<uniform> extra: vec4<f32>;
             @vertex fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
                 return vec4<f32>(position, 1.0) + extra;
             }",
        )
        .unwrap();
        assert!(matches!(link(&texture, &fragment), Err(ShaderError::Link(_))));
    }

    #[test]
    fn test_position_is_required() {
        let vertex = stage(
            ShaderStage::Vertex,
            "@vertex fn vs_main(@location(0) normal: vec3<f32>) -> @builtin(position) vec4<f32> { return vec4<f32>(normal, 1.0); }",
        )
        .unwrap();
        let fragment = stage(ShaderStage::Fragment, "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }").unwrap();
        assert!(matches!(link(&vertex, &fragment), Err(ShaderError::Link(_))));
    }

    #[test]
    fn test_integer_colour_output_fails_link() {
        let vertex = stage(ShaderStage::Vertex, ADS_VERT).unwrap();
        let fragment = stage(
            ShaderStage::Fragment,
            "@fragment fn fs_main() -> @location(0) vec4<i32> { return vec4<i32>(1); }",
        )
        .unwrap();
        let err = link(&vertex, &fragment).unwrap_err();
        assert!(matches!(err, ShaderError::Link(ref m) if m.contains("vec4<f32>")));
    }

    #[test]
    fn test_fragment_must_write_colour_target() {
        let vertex = stage(ShaderStage::Vertex, ADS_VERT).unwrap();
        let silent = stage(ShaderStage::Fragment, "@fragment fn fs_main() {}").unwrap();
        assert!(matches!(link(&vertex, &silent), Err(ShaderError::Link(_))));

        let extra = stage(
            ShaderStage::Fragment,
            "struct Out { @location(0) color: vec4<f32>, @location(1) id: u32 }
             @fragment fn fs_main() -> Out { return Out(vec4<f32>(1.0), 1u); }",
        )
        .unwrap();
        assert!(matches!(link(&vertex, &extra), Err(ShaderError::Link(_))));
    }

    #[test]
    fn test_vertex_location_beyond_limit_fails_link() {
        let vertex = stage(
            ShaderStage::Vertex,
            "@vertex fn vs_main(@location(40) position: vec3<f32>) -> @builtin(position) vec4<f32> { return vec4<f32>(position, 1.0); }",
        )
        .unwrap();
        let fragment = stage(ShaderStage::Fragment, "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }").unwrap();
        let err = link(&vertex, &fragment).unwrap_err();
        assert!(matches!(err, ShaderError::Link(ref m) if m.contains("@location(40)")));
    }
}
