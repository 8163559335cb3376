// Errors - everything the context can fail with
//
// Setup failures abort Context creation. Per-frame failures abort the
// current draw_frame call. An out-of-date swapchain during acquire is NOT an
// error; it surfaces as FrameStatus::OutOfDate instead.

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    /// A Vulkan entry point returned a non-success status.
    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    #[error("surface creation callback failed: {0:#}")]
    SurfaceCreation(#[source] anyhow::Error),

    #[error("no physical device offers both a graphics and a present queue family")]
    NoSuitableDevice,

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("frames in flight must be at least 1")]
    InvalidFramesInFlight,

    #[error("failed to set up logging: {0}")]
    Logging(#[from] std::io::Error),
}

impl Error {
    /// The raw Vulkan status, if this error came from a Vulkan call.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Error::Vulkan { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Tags a [`VkResult`] with the entry point that produced it.
pub trait VkResultExt<T> {
    fn vk(self, call: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn vk(self, call: &'static str) -> Result<T> {
        self.map_err(|result| {
            log::error!("Vulkan error: {:?} ({}) - {} failed", result, result.as_raw(), call);
            Error::Vulkan { call, result }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vk_tags_the_failing_call() {
        let res: VkResult<()> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = res.vk("vkQueueSubmit").unwrap_err();

        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_DEVICE_LOST));
        assert!(err.to_string().starts_with("vkQueueSubmit failed"));
    }

    #[test]
    fn non_vulkan_errors_have_no_status() {
        assert_eq!(Error::NoSuitableDevice.vk_result(), None);
    }
}
