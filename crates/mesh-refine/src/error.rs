//! Error types for refinement operations with rich diagnostics.
//!
//! Each error carries a machine-readable code in the format `REFINE-XXXX`:
//! - `REFINE-1xxx`: I/O errors (file reading, writing, parsing)
//! - `REFINE-2xxx`: Validation errors (geometry, coordinates)
//! - `REFINE-3xxx`: Pipeline errors (configuration, processing)
//! - `REFINE-4xxx`: Format errors (unsupported or malformed containers)
//!
//! The pipeline's own contract is that most failures are absorbed locally
//! (see the outcome types in `repair` and `smoothing`); the variants here are
//! the ones that terminate processing of a single file.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for refinement operations.
pub type RefineResult<T> = Result<T, RefineError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// REFINE-1001: Failed to read file
    IoRead = 1001,
    /// REFINE-1002: Failed to write file
    IoWrite = 1002,
    /// REFINE-1003: Failed to parse file format
    ParseError = 1003,
    /// REFINE-2001: Face references invalid vertex index
    InvalidVertexIndex = 2001,
    /// REFINE-2002: Vertex has NaN or Infinity coordinate
    InvalidCoordinate = 2002,
    /// REFINE-2003: Mesh has no vertices or faces
    EmptyMesh = 2003,
    /// REFINE-2004: Scene contains no geometry parts
    EmptyScene = 2004,
    /// REFINE-3001: Invalid pipeline configuration
    InvalidConfig = 3001,
    /// REFINE-4001: Unsupported file format
    UnsupportedFormat = 4001,
    /// REFINE-4002: Format requires external conversion first
    NeedsConversion = 4002,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `REFINE-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "REFINE-1001",
            ErrorCode::IoWrite => "REFINE-1002",
            ErrorCode::ParseError => "REFINE-1003",
            ErrorCode::InvalidVertexIndex => "REFINE-2001",
            ErrorCode::InvalidCoordinate => "REFINE-2002",
            ErrorCode::EmptyMesh => "REFINE-2003",
            ErrorCode::EmptyScene => "REFINE-2004",
            ErrorCode::InvalidConfig => "REFINE-3001",
            ErrorCode::UnsupportedFormat => "REFINE-4001",
            ErrorCode::NeedsConversion => "REFINE-4002",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for refinement errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Re-export the file from the original software with different settings.
    ReexportFile { format: Option<String> },
    /// Convert the file with an external tool before refining.
    ConvertFirst { tool: String, formats: Vec<String> },
    /// Use a different file format.
    UseDifferentFormat { suggested: Vec<String> },
    /// Check the original asset for issues.
    CheckSourceAsset { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::ReexportFile { format } => {
                if let Some(fmt) = format {
                    write!(
                        f,
                        "Try re-exporting the asset as {} from the original software",
                        fmt
                    )
                } else {
                    write!(f, "Try re-exporting the asset from the original software")
                }
            }
            RecoverySuggestion::ConvertFirst { tool, formats } => {
                write!(
                    f,
                    "Convert to {} first (e.g., via {}) and rerun",
                    formats.join(" or "),
                    tool
                )
            }
            RecoverySuggestion::UseDifferentFormat { suggested } => {
                write!(f, "Try using a different format: {}", suggested.join(", "))
            }
            RecoverySuggestion::CheckSourceAsset { checks } => {
                write!(f, "Check the source asset for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::None => {
                write!(f, "No automatic recovery available")
            }
        }
    }
}

/// Errors that can occur during refinement operations.
#[derive(Debug, Error, Diagnostic)]
pub enum RefineError {
    /// Error reading from a file.
    #[error("failed to read asset from {path}")]
    #[diagnostic(
        code(refine::io::read),
        help("Check that the file exists and is readable")
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write asset to {path}")]
    #[diagnostic(
        code(refine::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing an asset file.
    #[error("failed to parse asset from {path}: {details}")]
    #[diagnostic(
        code(refine::parse::error),
        help(
            "The file may be corrupted or in an unsupported format variant. Try re-exporting from the original software."
        )
    )]
    ParseError { path: PathBuf, details: String },

    /// Unsupported file format.
    #[error("unsupported asset format: {extension:?}")]
    #[diagnostic(
        code(refine::format::unsupported),
        help("Supported formats: OBJ, GLB, GLTF, STL")
    )]
    UnsupportedFormat { extension: Option<String> },

    /// FBX cannot be processed directly.
    #[error("FBX is not processed automatically: {path}")]
    #[diagnostic(
        code(refine::format::needs_conversion),
        help("Convert to GLB or OBJ first (e.g., via Blender) and rerun")
    )]
    NeedsConversion { path: PathBuf },

    /// Empty mesh (no vertices or faces).
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(refine::validation::empty_mesh),
        help(
            "The mesh must have at least one vertex and one face. Check that the file was exported correctly."
        )
    )]
    EmptyMesh { details: String },

    /// Scene with zero geometry parts; a terminal skip for processing.
    #[error("empty scene detected in {path}")]
    #[diagnostic(
        code(refine::validation::empty_scene),
        help("The scene contains no geometry parts. Check the export settings.")
    )]
    EmptyScene { path: PathBuf },

    /// Invalid vertex index in face data.
    #[error(
        "invalid vertex index: face {face_index} references vertex {vertex_index}, but mesh only has {vertex_count} vertices"
    )]
    #[diagnostic(
        code(refine::validation::vertex_index),
        help("The repair stage removes faces with invalid vertex references")
    )]
    InvalidVertexIndex {
        face_index: usize,
        vertex_index: u32,
        vertex_count: usize,
    },

    /// Invalid coordinate value (NaN or Infinity).
    #[error("invalid coordinate at vertex {vertex_index}: {coordinate} is {value}")]
    #[diagnostic(
        code(refine::validation::coordinate),
        help(
            "Check for numerical issues in the source data. This often happens with very small or very large values."
        )
    )]
    InvalidCoordinate {
        vertex_index: usize,
        coordinate: &'static str,
        value: f64,
    },

    /// Invalid pipeline configuration.
    #[error("invalid configuration: {details}")]
    #[diagnostic(
        code(refine::config::invalid),
        help("Check the method names and parameter ranges")
    )]
    InvalidConfig { details: String },
}

impl RefineError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            RefineError::IoRead { .. } => ErrorCode::IoRead,
            RefineError::IoWrite { .. } => ErrorCode::IoWrite,
            RefineError::ParseError { .. } => ErrorCode::ParseError,
            RefineError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            RefineError::NeedsConversion { .. } => ErrorCode::NeedsConversion,
            RefineError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            RefineError::EmptyScene { .. } => ErrorCode::EmptyScene,
            RefineError::InvalidVertexIndex { .. } => ErrorCode::InvalidVertexIndex,
            RefineError::InvalidCoordinate { .. } => ErrorCode::InvalidCoordinate,
            RefineError::InvalidConfig { .. } => ErrorCode::InvalidConfig,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            RefineError::IoRead { .. } => RecoverySuggestion::CheckSourceAsset {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            RefineError::IoWrite { .. } => RecoverySuggestion::CheckSourceAsset {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            RefineError::ParseError { .. } => RecoverySuggestion::ReexportFile {
                format: Some("GLB or OBJ".into()),
            },
            RefineError::UnsupportedFormat { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["OBJ".into(), "GLB".into(), "GLTF".into(), "STL".into()],
            },
            RefineError::NeedsConversion { .. } => RecoverySuggestion::ConvertFirst {
                tool: "Blender".into(),
                formats: vec!["GLB".into(), "OBJ".into()],
            },
            RefineError::EmptyMesh { .. } | RefineError::EmptyScene { .. } => {
                RecoverySuggestion::CheckSourceAsset {
                    checks: vec!["asset has geometry".into(), "correct export settings".into()],
                }
            }
            RefineError::InvalidVertexIndex { .. } => RecoverySuggestion::CheckSourceAsset {
                checks: vec!["face index data".into(), "export settings".into()],
            },
            RefineError::InvalidCoordinate { .. } => RecoverySuggestion::CheckSourceAsset {
                checks: vec!["coordinate values".into(), "export precision".into()],
            },
            RefineError::InvalidConfig { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("method".into(), "taubin or laplacian".into())],
            },
        }
    }

    // Constructor helpers for common error patterns

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RefineError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RefineError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        RefineError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an EmptyMesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        RefineError::EmptyMesh {
            details: details.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(details: impl Into<String>) -> Self {
        RefineError::InvalidConfig {
            details: details.into(),
        }
    }

    /// Create an UnsupportedFormat error.
    pub fn unsupported_format(extension: Option<String>) -> Self {
        RefineError::UnsupportedFormat { extension }
    }
}
