use std::path::PathBuf;

/// Failure kinds callers are expected to match on.
///
/// Errors travel as `anyhow::Error`; use `downcast_ref::<GripError>()` to
/// recover the kind. Context added with `anyhow::Context` keeps the kind
/// reachable.
#[derive(Debug, thiserror::Error)]
pub enum GripError {
    #[error("{0} is closed")]
    Closed(&'static str),
    #[error("unable to find a file for type {0}")]
    TypeNotFound(String),
    #[error("file {} is not on the classpath", .0.display())]
    FileNotRegistered(PathBuf),
    #[error("class {0} already exists")]
    ClassAlreadyExists(String),
    #[error("unable to read a ClassMirror for {0}")]
    UnableToReadClassMirror(String),
    #[error("malformed class file: {0}")]
    MalformedClass(String),
    #[error("malformed signature {signature:?}: {reason}")]
    MalformedSignature { signature: String, reason: String },
    #[error("malformed descriptor {0:?}")]
    MalformedDescriptor(String),
    #[error("unsupported file {}", .0.display())]
    UnsupportedFile(PathBuf),
}

impl GripError {
    /// Return the kind carried by an error chain, if any.
    pub fn kind_of(error: &anyhow::Error) -> Option<&GripError> {
        error
            .downcast_ref::<GripError>()
            .or_else(|| error.chain().find_map(|cause| cause.downcast_ref::<GripError>()))
    }
}
