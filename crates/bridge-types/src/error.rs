use thiserror::Error;

/// Domain error taxonomy for backend construction and wire parsing.
///
/// `TransientIoTimeout` is deliberately absent: a zero-length read is the
/// normal, expected outcome that drives the long-press sweep, not an error.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{backend} backend unavailable for '{id}': {source}")]
    BackendUnavailable {
        backend: &'static str,
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed wire data: {line:?}")]
    MalformedWireData { line: String },

    #[error("failed to start reader thread: {source}")]
    ThreadStartFailure {
        #[source]
        source: std::io::Error,
    },

    #[error("no output registered for fingerprint {fingerprint}")]
    OutputMissing { fingerprint: u32 },
}
