// =============================================================================
// SWAPLOOP DEMO - a window that clears and presents every frame
// =============================================================================
//
// The library never touches the window system. This binary does:
//
// 1. Load swaploop.toml (defaults if missing)
// 2. Open a winit window
// 3. Hand the library a surface callback built on ash-window
// 4. Call draw_frame on every redraw until the window closes
//
// Resizing is not handled: the swapchain is created once and an out-of-date
// report is only logged.
//
// =============================================================================

use anyhow::{Context as _, Result};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;
use swaploop::config::{self, Config};
use swaploop::{Context, FrameStatus, SurfaceDesc};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, load_error) = match Config::load_from_path(config::DEFAULT_PATH) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    swaploop::logging::try_init(&config.log_settings()).context("Failed to initialize logging")?;
    if let Some(e) = load_error {
        log::warn!("Failed to load {}: {:#}. Using defaults.", config::DEFAULT_PATH, e);
    }

    log::info!(
        "Starting {} {}: {}x{}, present mode {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: Field order matters for Drop! The context owns the surface and
/// must go before the window it was created from.
struct App {
    context: Option<Context>,
    window: Option<Arc<Window>>,
    config: Config,
    frames_presented: u64,
    reported_out_of_date: bool,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            context: None,
            window: None,
            config,
            frames_presented: 0,
            reported_out_of_date: false,
        }
    }

    /// Build the rendering context for `window`.
    fn create_context(&self, window: &Window) -> Result<Context> {
        let display_handle = window.raw_display_handle();
        let window_handle = window.raw_window_handle();

        let extensions = ash_window::enumerate_required_extensions(display_handle)
            .context("Failed to query required surface extensions")?
            .iter()
            .map(|&ext| unsafe { CStr::from_ptr(ext) }.to_owned())
            .collect::<Vec<CString>>();

        let info = self.config.context_info(extensions)?;
        let size = window.inner_size();

        let context = Context::new(&info, move |entry, instance| {
            let surface = unsafe {
                ash_window::create_surface(entry, instance, display_handle, window_handle, None)
            }
            .context("Failed to create window surface")?;

            Ok(SurfaceDesc {
                surface,
                width: size.width,
                height: size.height,
            })
        })?;

        let extent = context.extent();
        log::info!(
            "Context up: {}x{} swapchain, {} images, {:?}",
            extent.width,
            extent.height,
            context.image_count(),
            context.present_mode()
        );

        Ok(context)
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(context) = self.context.take() {
            log::info!("Presented {} frames, shutting down...", self.frames_presented);
            if let Err(e) = context.destroy() {
                log::error!("Context teardown failed: {}", e);
            }
        }
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(context) = self.context.as_mut() else {
            return;
        };

        match context.draw_frame() {
            Ok(FrameStatus::Presented { .. }) => self.frames_presented += 1,
            Ok(FrameStatus::OutOfDate) => {
                // No recreation path: keep looping, say so once
                if !self.reported_out_of_date {
                    log::warn!("Swapchain is out of date; frames are being skipped");
                    self.reported_out_of_date = true;
                }
            }
            Err(e) => {
                log::error!("Render error: {}", e);
                self.shutdown(event_loop);
            }
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_resizable(false)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        match self.create_context(&window) {
            Ok(context) => self.context = Some(context),
            Err(e) => {
                log::error!("Failed to create rendering context: {:#}", e);
                event_loop.exit();
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{} (swapchain kept)", size.width, size.height);
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
