use thiserror::Error;

/// Errors surfaced synchronously to callers of the analysis core.
///
/// "Nothing to report this tick" (silence, warm-up, too few notes, no beat)
/// is never an error; the estimators return sentinel values for those.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("invalid buffer length {requested}: expected one of 512, 1024, 2048, 4096, 8192")]
    InvalidConfiguration { requested: usize },

    #[error("unknown pitch class name: {0:?}")]
    UnknownPitchClass(String),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
