// Backend module - Vulkan abstraction layer
//
// Design: Thin RAII wrappers around ash. Children hold their parent in an
// Arc, so a parent can never be destroyed before its children.

pub mod device;
pub mod instance;
pub mod render_target;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::{Device, QueueFamilies};
pub use instance::Instance;
pub use render_target::RenderTargets;
pub use surface::{Surface, SurfaceDesc};
pub use swapchain::Swapchain;
pub use sync::{FrameResources, FrameSlot};
