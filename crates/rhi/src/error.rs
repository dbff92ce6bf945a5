//! RHI-specific error types.
//!
//! Failures fall into three groups: capacity exhaustion inside a memory block
//! or buffer, driver errors carrying the failing call, and precondition
//! violations on the resource graph. None of them are retried here.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// No contiguous range large enough in the named container.
    #[error("out of space in {container}: {requested} bytes with alignment {alignment}")]
    OutOfSpace {
        requested: u64,
        alignment: u64,
        container: String,
    },

    /// A driver call failed.
    #[error("{op} failed: {result}")]
    Vulkan { op: &'static str, result: vk::Result },

    /// Vulkan API error from a call without extra context
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// No memory type satisfies the property flags and the type filter.
    #[error("no memory type with {flags:?} in filter {filter:#b}")]
    NoCompatibleMemoryType {
        flags: vk::MemoryPropertyFlags,
        filter: u32,
    },

    /// Object is already bound to device memory.
    #[error("{0} is already bound to device memory")]
    AlreadyBound(String),

    /// Object is not bound to the memory block it was unbound from.
    #[error("{0} is not bound")]
    NotBound(String),

    /// Buffer tried to bind to an image block or the other way round.
    #[error("binding kind mismatch: {0}")]
    KindMismatch(String),

    /// Id or handle that no container knows about.
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// Zero-sized allocations and writes past the end of a range.
    #[error("invalid size: {0}")]
    InvalidSize(String),

    /// Host write into memory that is not host-visible and host-coherent.
    #[error("memory is not host coherent: {0}")]
    NotHostCoherent(String),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Surface creation or query error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),
}

impl RhiError {
    /// Wraps a driver result with the name of the call that produced it.
    pub fn vulkan(op: &'static str, result: vk::Result) -> Self {
        Self::Vulkan { op, result }
    }

    /// Builds a capacity error for `container`.
    pub fn out_of_space(requested: u64, alignment: u64, container: impl Into<String>) -> Self {
        Self::OutOfSpace {
            requested,
            alignment,
            container: container.into(),
        }
    }

    /// Whether this error is a violated precondition rather than an environmental failure.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::AlreadyBound(_)
                | Self::NotBound(_)
                | Self::KindMismatch(_)
                | Self::UnknownResource(_)
                | Self::InvalidSize(_)
                | Self::NotHostCoherent(_)
        )
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

/// Returns a precondition error, asserting first in debug builds.
macro_rules! precondition {
    ($err:expr) => {{
        let err = $err;
        debug_assert!(false, "precondition violated: {}", err);
        return Err(err);
    }};
}

pub(crate) use precondition;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_space_message_names_container() {
        let err = RhiError::out_of_space(250, 16, "memory block #3");
        let text = err.to_string();
        assert!(text.contains("memory block #3"));
        assert!(text.contains("250"));
        assert!(text.contains("16"));
    }

    #[test]
    fn test_vulkan_error_names_operation() {
        let err = RhiError::vulkan("vkAllocateMemory", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(err.to_string().starts_with("vkAllocateMemory failed"));
    }

    #[test]
    fn test_precondition_classification() {
        assert!(RhiError::AlreadyBound("buffer #1".into()).is_precondition());
        assert!(!RhiError::NoSuitableGpu.is_precondition());
        assert!(!RhiError::out_of_space(1, 1, "x").is_precondition());
    }
}
