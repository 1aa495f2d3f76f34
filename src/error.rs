use crate::pose::LandmarkKind;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("failed to open reference file: {1:?}")]
    OpenReference(#[source] std::io::Error, PathBuf),

    #[error("failed to parse reference file: {1:?}")]
    ParseReference(#[source] serde_json::Error, PathBuf),

    #[error("reference file contains no frames: {0:?}")]
    EmptyReference(PathBuf),

    #[error("failed to convert usize value to landmark kind: {0}")]
    ConvertUSizeToLandmarkKind(usize),

    #[error("failed to construct NotNan from f32: {1}")]
    ConstructNotNan(#[source] ordered_float::FloatIsNan, f32),

    #[error("failed to convert value to f32")]
    ConvertToF32,

    #[error("failed to convert value to f64")]
    ConvertToF64,

    #[error("cannot normalize pose: missing hip landmark {0:?}")]
    MissingHipLandmark(LandmarkKind),

    #[error("failed to open live landmark source: {1:?}")]
    OpenLiveSource(#[source] std::io::Error, PathBuf),

    #[error("failed to read live landmark frame")]
    ReadLiveFrame(#[source] std::io::Error),

    #[error("failed to parse live landmark frame on line {1}")]
    ParseLiveFrame(#[source] serde_json::Error, usize),

    #[error("failed to create output directory: {1:?}")]
    CreateOutputDir(#[source] std::io::Error, PathBuf),

    #[error("failed to serialize mistake log")]
    SerializeMistakeLog(#[source] serde_json::Error),

    #[error("failed to write mistake log: {1:?}")]
    WriteMistakeLog(#[source] std::io::Error, PathBuf),

    #[error("failed to read mistake log: {1:?}")]
    ReadMistakeLog(#[source] std::io::Error, PathBuf),

    #[error("failed to parse mistake log: {1:?}")]
    ParseMistakeLog(#[source] serde_json::Error, PathBuf),

    #[error("failed to serialize session summary")]
    SerializeSummary(#[source] serde_json::Error),

    #[error("failed to write session summary: {1:?}")]
    WriteSummary(#[source] std::io::Error, PathBuf),

    #[error("failed to serialize coaching analysis")]
    SerializeAnalysis(#[source] serde_json::Error),

    #[error("failed to write coaching analysis: {1:?}")]
    WriteAnalysis(#[source] std::io::Error, PathBuf),

    #[error("invalid tracking configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether the error happened while writing session output.
    pub(crate) fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::CreateOutputDir(..)
                | Self::SerializeMistakeLog(_)
                | Self::WriteMistakeLog(..)
                | Self::SerializeSummary(_)
                | Self::WriteSummary(..)
                | Self::SerializeAnalysis(_)
                | Self::WriteAnalysis(..)
        )
    }
}

/// Create the parent directory of an output file if it doesn't exist yet.
pub(crate) fn ensure_parent_dir(path: &std::path::Path) -> Result<(), Error> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| Error::CreateOutputDir(e, parent.to_path_buf())),
        _ => Ok(()),
    }
}
