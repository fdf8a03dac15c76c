use thiserror::Error;

/// Failure kinds surfaced by the control surface and the host seams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// A setter argument is out of its valid range.
    #[error("invalid argument")]
    InvalidArgument,
    /// Unknown instance, behavior or persisted record.
    #[error("not found")]
    NotFound,
    /// The settings store failed to save or load.
    #[error("storage failure")]
    IoFailure,
    /// A behavior invocation was rejected by the host.
    #[error("behavior invocation failed")]
    ExternalFailure,
}
