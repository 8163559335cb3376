//! A minimal Vulkan rendering context.
//!
//! Takes a set of instance extensions and a surface callback and turns them
//! into a double-buffered present loop:
//!
//! ```text
//! Context
//! ├── Instance (+ validation messenger)
//! ├── Surface          <- caller's callback
//! ├── Device           first fit: graphics + present queue family
//! ├── Swapchain        format / present mode / extent negotiated
//! ├── RenderTargets    one render pass, one framebuffer per image
//! └── FrameLoop        F frame slots, per-image owner table
//! ```
//!
//! [`Context::draw_frame`] runs wait -> acquire -> submit -> present with an
//! empty render pass that only clears. Drawing into that pass, swapchain
//! recreation and headless rendering are out of scope.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod frame_loop;
pub mod logging;

pub use ash;
pub use backend::SurfaceDesc;
pub use context::{Context, ContextInfo};
pub use error::{Error, Result};
pub use frame_loop::{FrameBackend, FrameLoop, FrameStatus, FRAMES_IN_FLIGHT};
pub use logging::LogSettings;
