//! Last-known-good shader program management.

use std::path::{Path, PathBuf};

use crate::error::ShaderError;
use crate::shader::compiler::{compile, link, CompiledStage, LinkedProgram, LocationTable, ShaderStage};

pub const BUILTIN_VERTEX: &str = include_str!("../../assets/shaders/ads.vert.wgsl");
pub const BUILTIN_FRAGMENT: &str = include_str!("../../assets/shaders/ads.frag.wgsl");

/// Path reported for an embedded stage.
pub fn builtin_path(stage: ShaderStage) -> PathBuf {
    match stage {
        ShaderStage::Vertex => PathBuf::from("builtin:ads.vert.wgsl"),
        ShaderStage::Fragment => PathBuf::from("builtin:ads.frag.wgsl"),
    }
}

fn builtin_source(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => BUILTIN_VERTEX,
        ShaderStage::Fragment => BUILTIN_FRAGMENT,
    }
}

/// Owns the linked vertex/fragment program.
///
/// The manager is always linked. A load that fails to read, compile or
/// link leaves the previous program, its paths and its location table in
/// place; the failure is only reported through the returned error.
///
/// The GPU may still refuse a program the CPU checks accepted. The renderer
/// reports that through [`ShaderManager::confirm`] and
/// [`ShaderManager::reject`], and a rejected program is swapped back for
/// the last one the GPU built.
#[derive(Debug, Clone)]
pub struct ShaderManager {
    program: LinkedProgram,
    generation: u64,
    confirmed: Option<(u64, LinkedProgram)>,
}

impl ShaderManager {
    /// Link the program at the given paths, falling back to the embedded
    /// default program when they do not link.
    pub fn new(vertex: &Path, fragment: &Path) -> Result<Self, ShaderError> {
        let attempt = read_and_compile(ShaderStage::Vertex, vertex).and_then(|v| {
            let f = read_and_compile(ShaderStage::Fragment, fragment)?;
            LinkedProgram::link(v, f)
        });
        match attempt {
            Ok(program) => {
                tracing::info!("linked shader program {:?} + {:?}", vertex, fragment);
                Ok(Self { program, generation: 1, confirmed: None })
            }
            Err(e) => {
                tracing::warn!("{e}; falling back to the built-in program");
                Self::builtin()
            }
        }
    }

    /// Manager holding the embedded default program.
    pub fn builtin() -> Result<Self, ShaderError> {
        let vertex = read_and_compile(ShaderStage::Vertex, &builtin_path(ShaderStage::Vertex))?;
        let fragment = read_and_compile(ShaderStage::Fragment, &builtin_path(ShaderStage::Fragment))?;
        let program = LinkedProgram::link(vertex, fragment)?;
        Ok(Self { program, generation: 1, confirmed: None })
    }

    pub fn load_vertex(&mut self, path: &Path) -> Result<(), ShaderError> {
        self.load_stage(ShaderStage::Vertex, path)
    }

    pub fn load_fragment(&mut self, path: &Path) -> Result<(), ShaderError> {
        self.load_stage(ShaderStage::Fragment, path)
    }

    /// Replace one stage, keeping the other stage's last-known-good source.
    /// An empty path is a cancelled selection and changes nothing.
    pub fn load_stage(&mut self, stage: ShaderStage, path: &Path) -> Result<(), ShaderError> {
        if path.as_os_str().is_empty() {
            return Err(ShaderError::EmptyPath);
        }
        let attempt = read_and_compile(stage, path).and_then(|compiled| {
            let other = self.program.stage(stage.other()).clone();
            match stage {
                ShaderStage::Vertex => LinkedProgram::link(compiled, other),
                ShaderStage::Fragment => LinkedProgram::link(other, compiled),
            }
        });

        match attempt {
            Ok(program) => {
                self.program = program;
                self.generation += 1;
                tracing::info!("{} shader now {:?} (generation {})", stage, path, self.generation);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "{e}; keeping {} shader {:?}",
                    stage,
                    self.program.stage(stage).path
                );
                Err(e)
            }
        }
    }

    /// Re-read both stages from their current paths. Both are attempted;
    /// the first failure is returned.
    pub fn reload(&mut self) -> Result<(), ShaderError> {
        let vertex_path = self.vertex_path().to_path_buf();
        let fragment_path = self.fragment_path().to_path_buf();
        let vertex = self.load_stage(ShaderStage::Vertex, &vertex_path);
        let fragment = self.load_stage(ShaderStage::Fragment, &fragment_path);
        vertex.and(fragment)
    }

    /// Whether the held stages link against each other.
    pub fn is_linked(&self) -> bool {
        link(&self.program.vertex, &self.program.fragment).is_ok()
    }

    /// The GPU built pipelines for the current generation.
    pub fn confirm(&mut self) {
        if self.confirmed.as_ref().is_some_and(|(g, _)| *g == self.generation) {
            return;
        }
        self.confirmed = Some((self.generation, self.program.clone()));
    }

    /// The GPU refused the current program. Restores the last confirmed
    /// program when there is an older one, or the built-in program when
    /// nothing was ever confirmed, and returns the error to report.
    pub fn reject(&mut self, reason: &str) -> ShaderError {
        let error = ShaderError::Link(format!("GPU rejected shader program: {reason}"));
        match self.confirmed.clone() {
            Some((generation, program)) if generation != self.generation => {
                tracing::warn!(
                    "{error}; restoring {:?} + {:?}",
                    program.vertex.path,
                    program.fragment.path
                );
                self.program = program;
                self.generation += 1;
                self.confirmed = Some((self.generation, self.program.clone()));
            }
            None if !self.is_builtin() => match Self::builtin() {
                Ok(builtin) => {
                    tracing::warn!("{error}; falling back to the built-in program");
                    self.program = builtin.program;
                    self.generation += 1;
                }
                Err(e) => tracing::warn!("{error}; built-in program unavailable: {e}"),
            },
            _ => tracing::warn!("{error}; no earlier program to restore"),
        }
        error
    }

    fn is_builtin(&self) -> bool {
        self.vertex_path() == builtin_path(ShaderStage::Vertex)
            && self.fragment_path() == builtin_path(ShaderStage::Fragment)
    }

    pub fn locations(&self) -> &LocationTable {
        &self.program.locations
    }

    pub fn program(&self) -> &LinkedProgram {
        &self.program
    }

    pub fn vertex_path(&self) -> &Path {
        &self.program.vertex.path
    }

    pub fn fragment_path(&self) -> &Path {
        &self.program.fragment.path
    }

    /// Bumped on every successful link so GPU pipelines know to rebuild.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn read_and_compile(stage: ShaderStage, path: &Path) -> Result<CompiledStage, ShaderError> {
    let source = if path == builtin_path(stage) {
        builtin_source(stage).to_string()
    } else {
        std::fs::read_to_string(path).map_err(|source| ShaderError::Io { path: path.to_path_buf(), source })?
    };
    compile(stage, path, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VertexAttribute;
    use std::fs;

    const INVALID: &str = "@fragment fn fs_main( -> @location(0) vec4<f32> {";
    const WHITE_FRAG: &str = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }";
    const POSITION_ONLY_VERT: &str = "@vertex fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> { return vec4<f32>(position, 1.0); }";

    fn write(dir: &Path, name: &str, source: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, source).unwrap();
        path
    }

    fn on_disk(dir: &Path) -> ShaderManager {
        let vertex = write(dir, "ads.vert.wgsl", BUILTIN_VERTEX);
        let fragment = write(dir, "ads.frag.wgsl", BUILTIN_FRAGMENT);
        let shaders = ShaderManager::new(&vertex, &fragment).unwrap();
        assert_eq!(shaders.vertex_path(), vertex);
        shaders
    }

    #[test]
    fn test_missing_files_fall_back_to_builtin() {
        let shaders = ShaderManager::new(Path::new("nope.vert.wgsl"), Path::new("nope.frag.wgsl")).unwrap();
        assert!(shaders.is_linked());
        assert_eq!(shaders.vertex_path(), builtin_path(ShaderStage::Vertex));
        assert_eq!(shaders.locations().attribute(VertexAttribute::Position), Some(0));
    }

    #[test]
    fn test_invalid_fragment_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut shaders = on_disk(dir.path());
        let before = shaders.locations().clone();
        let fragment_before = shaders.fragment_path().to_path_buf();
        let generation = shaders.generation();

        let bad = write(dir.path(), "bad.frag.wgsl", INVALID);
        let err = shaders.load_fragment(&bad).unwrap_err();

        assert!(matches!(err, ShaderError::Compile { stage: ShaderStage::Fragment, .. }));
        assert!(shaders.is_linked());
        assert_eq!(shaders.locations(), &before);
        assert_eq!(shaders.fragment_path(), fragment_before);
        assert_eq!(shaders.generation(), generation);
    }

    #[test]
    fn test_link_failure_rolls_back_vertex() {
        let dir = tempfile::tempdir().unwrap();
        let mut shaders = on_disk(dir.path());
        let before = shaders.locations().clone();

        // Compiles, but no longer writes what the ADS fragment stage reads
        let vert = write(dir.path(), "plain.vert.wgsl", POSITION_ONLY_VERT);
        assert!(matches!(shaders.load_vertex(&vert), Err(ShaderError::Link(_))));
        assert_eq!(shaders.locations(), &before);
        assert_ne!(shaders.vertex_path(), vert);
    }

    #[test]
    fn test_successful_load_refreshes_locations() {
        let dir = tempfile::tempdir().unwrap();
        let mut shaders = on_disk(dir.path());
        let generation = shaders.generation();

        let frag = write(dir.path(), "white.frag.wgsl", WHITE_FRAG);
        shaders.load_fragment(&frag).unwrap();
        let vert = write(dir.path(), "plain.vert.wgsl", POSITION_ONLY_VERT);
        shaders.load_vertex(&vert).unwrap();

        assert_eq!(shaders.vertex_path(), vert);
        assert_eq!(shaders.fragment_path(), frag);
        assert_eq!(shaders.locations().consumed_attributes(), vec![(VertexAttribute::Position, 0)]);
        assert!(shaders.locations().uniforms.is_empty());
        assert_eq!(shaders.generation(), generation + 2);
    }

    #[test]
    fn test_empty_path_and_missing_file_change_nothing() {
        let mut shaders = ShaderManager::builtin().unwrap();
        assert!(matches!(shaders.load_vertex(Path::new("")), Err(ShaderError::EmptyPath)));
        assert!(matches!(
            shaders.load_fragment(Path::new("/no/such/file.wgsl")),
            Err(ShaderError::Io { .. })
        ));
        assert_eq!(shaders.generation(), 1);
        assert_eq!(shaders.fragment_path(), builtin_path(ShaderStage::Fragment));
    }

    #[test]
    fn test_reload_picks_up_edits_and_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut shaders = on_disk(dir.path());
        let frag = shaders.fragment_path().to_path_buf();

        shaders.reload().unwrap();
        assert_eq!(shaders.generation(), 3);

        fs::write(&frag, INVALID).unwrap();
        assert!(shaders.reload().is_err());
        // The vertex stage still reloaded; the fragment kept its old source
        assert_eq!(shaders.generation(), 4);
        assert_eq!(shaders.program().fragment.source, BUILTIN_FRAGMENT);
    }

    #[test]
    fn test_builtin_program_reloads_without_disk() {
        let mut shaders = ShaderManager::builtin().unwrap();
        shaders.reload().unwrap();
        assert_eq!(shaders.generation(), 3);
    }

    #[test]
    fn test_gpu_rejection_restores_confirmed_program() {
        let dir = tempfile::tempdir().unwrap();
        let mut shaders = on_disk(dir.path());
        shaders.confirm();
        let good_fragment = shaders.fragment_path().to_path_buf();
        let good_locations = shaders.locations().clone();

        let frag = write(dir.path(), "white.frag.wgsl", WHITE_FRAG);
        shaders.load_fragment(&frag).unwrap();
        let generation = shaders.generation();

        let err = shaders.reject("pipeline validation failed");
        assert!(matches!(err, ShaderError::Link(ref m) if m.contains("pipeline validation failed")));
        assert_eq!(shaders.fragment_path(), good_fragment);
        assert_eq!(shaders.locations(), &good_locations);
        assert_eq!(shaders.generation(), generation + 1);
        assert!(shaders.is_linked());
    }

    #[test]
    fn test_rejection_without_older_program_keeps_state() {
        let mut shaders = ShaderManager::builtin().unwrap();
        shaders.confirm();
        let generation = shaders.generation();

        assert!(matches!(shaders.reject("no adapter support"), ShaderError::Link(_)));
        assert_eq!(shaders.generation(), generation);
        assert_eq!(shaders.vertex_path(), builtin_path(ShaderStage::Vertex));
    }

    #[test]
    fn test_integer_fragment_output_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut shaders = on_disk(dir.path());
        let generation = shaders.generation();

        let frag = write(
            dir.path(),
            "int.frag.wgsl",
            "@fragment fn fs_main() -> @location(0) vec4<i32> { return vec4<i32>(1); }",
        );
        assert!(matches!(shaders.load_fragment(&frag), Err(ShaderError::Link(_))));
        assert_eq!(shaders.generation(), generation);
        assert_ne!(shaders.fragment_path(), frag);
    }

    #[test]
    fn test_unconfirmed_startup_program_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let mut shaders = on_disk(dir.path());
        let generation = shaders.generation();

        assert!(matches!(shaders.reject("unsupported format"), ShaderError::Link(_)));
        assert_eq!(shaders.vertex_path(), builtin_path(ShaderStage::Vertex));
        assert_eq!(shaders.fragment_path(), builtin_path(ShaderStage::Fragment));
        assert_eq!(shaders.generation(), generation + 1);
    }
}
