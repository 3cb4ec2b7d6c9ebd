//! Error types and the fatal escalation path.
//!
//! Backend failures surface as [`GpuError`] and bytecode problems as
//! [`ReflectionError`]. Internal constructors propagate both with `?`; the
//! cache accessors are the boundary where a failure to build a native object
//! becomes fatal, because it means the declared shader contracts and the
//! supplied resources disagree.

use ash::vk;
use thiserror::Error;

/// Errors reported by a [`GpuDevice`](crate::backend::GpuDevice).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    /// The backend refused to create an object.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A native call returned an error code.
    #[error("{what} failed: {result}")]
    Vulkan {
        /// The native call that failed.
        what: &'static str,
        /// The returned error code.
        result: vk::Result,
    },
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl GpuError {
    /// Wrap a native error code, folding device loss into its own variant.
    pub fn vulkan(what: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            result => Self::Vulkan { what, result },
        }
    }
}

/// Malformed or unsupported SPIR-V bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReflectionError {
    /// The SPIR-V parser rejected the module.
    #[error("malformed SPIR-V: {0}")]
    Malformed(String),
    /// A resource's byte size does not fit in 32 bits.
    #[error("size of '{0}' overflows 32 bits")]
    SizeOverflow(String),
    /// A descriptor set index past [`MAX_DESCRIPTOR_SETS`](crate::config::MAX_DESCRIPTOR_SETS).
    #[error(
        "'{name}' is bound to descriptor set {set}, at most {} sets are supported",
        crate::config::MAX_DESCRIPTOR_SETS
    )]
    SetOutOfRange {
        /// Name of the resource.
        name: String,
        /// Its declared set index.
        set: u32,
    },
}

/// Log `message` as an error, flush the logger and panic.
#[track_caller]
pub(crate) fn fatal(message: std::fmt::Arguments<'_>) -> ! {
    log::error!("{message}");
    log::logger().flush();
    panic!("{message}");
}

/// Escalate a `Result` to the fatal path.
pub(crate) trait OrFatal<T> {
    fn or_fatal(self, context: &str) -> T;
}

impl<T, E: std::fmt::Display> OrFatal<T> for Result<T, E> {
    #[track_caller]
    fn or_fatal(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => fatal(format_args!("{context}: {e}")),
        }
    }
}

impl<T> OrFatal<T> for Option<T> {
    #[track_caller]
    fn or_fatal(self, context: &str) -> T {
        match self {
            Some(value) => value,
            None => fatal(format_args!("{context}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GpuError::DeviceLost;
        assert_eq!(err.to_string(), "GPU device lost");

        let err = GpuError::vulkan("vkCreateSampler", vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert!(err.to_string().starts_with("vkCreateSampler failed"));
    }

    #[test]
    fn test_device_lost_folds() {
        let err = GpuError::vulkan("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST);
        assert_eq!(err, GpuError::DeviceLost);
    }

    #[test]
    fn test_reflection_error_display() {
        let err = ReflectionError::SetOutOfRange {
            name: "Globals".to_string(),
            set: 40,
        };
        assert_eq!(
            err.to_string(),
            "'Globals' is bound to descriptor set 40, at most 32 sets are supported"
        );
    }

    #[test]
    #[should_panic(expected = "building thing: GPU device lost")]
    fn test_or_fatal_panics() {
        let result: Result<(), GpuError> = Err(GpuError::DeviceLost);
        result.or_fatal("building thing");
    }
}
