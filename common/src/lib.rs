pub mod file_format;
pub mod log_setup;
pub mod serde;

pub use file_format::{FileExtensionError, FileFormat};
