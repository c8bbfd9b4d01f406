//! Error types for every fallible concern of the viewer.

use std::path::PathBuf;

use thiserror::Error;

use crate::shader::ShaderStage;

/// Shader compile/link failures. Always recoverable: the manager rolls back
/// to its last-known-good program before returning one of these.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("no shader file selected")]
    EmptyPath,
    #[error("failed to read shader {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to compile {stage} shader {path:?}:\n{message}")]
    Compile {
        stage: ShaderStage,
        path: PathBuf,
        message: String,
    },
    #[error("failed to link shader program: {0}")]
    Link(String),
}

/// Model loader failures.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no model file selected")]
    EmptyPath,
    #[error("failed to read model {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("model {0:?} contains no triangles")]
    Empty(PathBuf),
    #[error("unsupported model format {0:?}")]
    UnsupportedFormat(PathBuf),
}

/// Settings file failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Frame capture and export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no screenshot path given")]
    EmptyPath,
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("failed to create screenshot directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to read back frame: {0}")]
    Map(String),
}

/// Top-level error for the viewer session and its GPU front end.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("GPU error: {0}")]
    Gpu(String),
}
