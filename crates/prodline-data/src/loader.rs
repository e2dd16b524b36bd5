//! Pipeline loading: reads line descriptions, detects their format and builds
//! a ready coordinator.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use prodline_core::config::{BuildError, PipelineConfig, Severity};
use prodline_core::coordinator::Coordinator;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading a line.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required line file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// The description parsed but does not form a line.
    #[error("cannot build line from {file}: {source}")]
    Build {
        file: PathBuf,
        #[source]
        source: BuildError,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported line file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    pub const EXTENSIONS: [&'static str; 3] = ["ron", "toml", "json"];
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a line file with the given base name (without
/// extension).
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_pipeline_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in Format::EXTENSIONS {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(ref existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing.clone(),
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_pipeline_file`], but returns an error if no file is found.
pub fn require_pipeline_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_pipeline_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

/// Every line file in `dir` with a supported extension, sorted by path.
pub fn list_pipeline_files(dir: &Path) -> Result<Vec<PathBuf>, DataLoadError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && detect_format(&path).is_ok() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its format (detected from
/// extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format).map_err(|detail| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail,
    })
}

/// Deserialize text in the given format. Errors are rendered to strings.
pub fn deserialize_str<T: DeserializeOwned>(content: &str, format: Format) -> Result<T, String> {
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
    }
}

// ===========================================================================
// Loading
// ===========================================================================

/// Load a line description from a file.
pub fn load_pipeline(path: &Path) -> Result<PipelineConfig, DataLoadError> {
    let config: PipelineConfig = deserialize_file(path)?;
    tracing::debug!(
        file = %path.display(),
        title = %config.title,
        stages = config.stages.len(),
        "line description loaded"
    );
    Ok(config)
}

/// Load a line description and build a coordinator from it.
///
/// Non-fatal configuration issues do not fail the load; they are logged and
/// stay available through [`Coordinator::issues`].
pub fn load_line(path: &Path) -> Result<Coordinator, DataLoadError> {
    let config = load_pipeline(path)?;
    build_coordinator(&config, path)
}

/// Build a coordinator from an already loaded description. `origin` is only
/// used in error messages.
pub fn build_coordinator(config: &PipelineConfig, origin: &Path) -> Result<Coordinator, DataLoadError> {
    let line = Coordinator::build(config).map_err(|source| DataLoadError::Build {
        file: origin.to_path_buf(),
        source,
    })?;
    let faults = line
        .issues()
        .iter()
        .filter(|issue| issue.severity() == Severity::Fault)
        .count();
    if faults > 0 {
        tracing::warn!(file = %origin.display(), faults, "line has faulted stages");
    }
    Ok(line)
}

// ===========================================================================
// Tests
// ===========================================================================
