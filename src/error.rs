use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, RecorderError>;

/// Error taxonomy for the core. The hot capture path never surfaces these:
/// a failure there just flips the writer into `disabled` and forwards calls
/// to the real library thereafter. Only `init` and `finalize` return
/// `Result` to a caller that wants to observe the failure.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] ::std::io::Error),

    #[error("inter-process merge protocol error: {0}")]
    Protocol(String),

    #[error("trace version mismatch: reader {reader}, trace {trace}")]
    VersionMismatch { reader: String, trace: String },

    #[error("grammar invariant violation: {0}")]
    Invariant(String),
}
