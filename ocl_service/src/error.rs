use thiserror::Error;

/// Errors surfaced to collaborators of the resource service.
///
/// Driver faults never show up here: they are logged and degrade to `None`
/// or `false` at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Requested OpenCL program '{name}' not found")]
    ProgramNotFound { name: String },

    #[error("Platform {platform} / device {device} is out of range")]
    DeviceOutOfRange { platform: usize, device: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
