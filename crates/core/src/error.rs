//! Error types shared across the workspace.

use thiserror::Error;

/// Main error type for configuration, windowing and glue code.
///
/// GPU-side failures have their own richer type in `vkpack-rhi`; this enum
/// covers everything that happens around it.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors raised outside the device layer
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation, event loop or surface errors
    #[error("Window error: {0}")]
    Window(String),

    /// Resource errors surfaced to application code
    #[error("Resource error: {0}")]
    Resource(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the workspace's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("target fps must be positive".to_string());
        assert_eq!(err.to_string(), "Config error: target fps must be positive");
    }

    #[test]
    fn test_io_error_converts() {
        fn read() -> Result<()> {
            Err(std::io::Error::other("disk gone"))?;
            Ok(())
        }

        assert!(matches!(read(), Err(Error::Io(_))));
    }
}
