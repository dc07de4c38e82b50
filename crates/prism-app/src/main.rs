// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use prism_core::{init_tracing, AppCfg, StalePolicyCfg};
use prism_platform::{drawable_size, window_attributes};
use prism_render::{RenderSize, Renderer};
use prism_render_vk::{ShaderSource, StaleSwapchainPolicy, VkOptions, VkRenderer};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

use prism_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "prism.toml")]
    config: PathBuf,

    /// Force the Vulkan validation layer on
    #[arg(long)]
    validation: bool,
}

fn vk_options(cfg: &AppCfg) -> VkOptions {
    let r = &cfg.render;
    VkOptions {
        validation: r.validation,
        stale_swapchain: match r.stale_swapchain {
            StalePolicyCfg::Rebuild => StaleSwapchainPolicy::Rebuild,
            StalePolicyCfg::Ignore => StaleSwapchainPolicy::Ignore,
        },
        present_wait_idle: r.present_wait_idle,
        clear_color: r.clear_color,
        vertex_shader: ShaderSource::from_path(r.vertex_shader.clone()),
        fragment_shader: ShaderSource::from_path(r.fragment_shader.clone()),
        ..VkOptions::default()
    }
}

struct App {
    cfg: AppCfg,
    // Field order matters: the renderer must drop before its window.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    render_size: RenderSize,
    failure: Option<anyhow::Error>,

    exiting: bool,
    paused: bool,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let w = &self.cfg.window;
        let window = event_loop
            .create_window(window_attributes(w.width, w.height, &w.title))
            .context("create_window")?;

        self.render_size = drawable_size(&window);
        let renderer =
            VkRenderer::with_options(&window, &window, self.render_size, vk_options(&self.cfg))?;

        self.paused = self.render_size.is_empty();
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        // full teardown runs in VkRenderer's Drop
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                error!("startup failed: {e:#}");
                self.failure = Some(e);
                self.shutdown(event_loop);
                return;
            }
            info!(
                "window {}x{} (paused={})",
                self.render_size.width, self.render_size.height, self.paused
            );
        }

        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = prism_platform::to_render_size(new_size);
                let now_paused = self.render_size.is_empty();
                if self.paused != now_paused {
                    self.paused = now_paused;
                    info!(
                        "Resized → {}x{} (paused={})",
                        self.render_size.width, self.render_size.height, self.paused
                    );
                }

                if let Some(r) = &mut self.renderer {
                    if let Err(e) = r.resize(self.render_size) {
                        error!("resize failed: {e:#}");
                    }
                }
                if !self.paused {
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                if let Some(r) = &mut self.renderer {
                    match r.render() {
                        Ok(()) => self.frames = self.frames.saturating_add(1),
                        Err(e) => {
                            error!("render failed: {e:#}");
                            self.failure = Some(e);
                            self.shutdown(event_loop);
                        }
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            // minimized: sleep until the next event
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (mut cfg, cfg_err) = match AppCfg::load(&args.config) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppCfg::default(), Some(e)),
    };
    init_tracing(&cfg.log.filter);
    if let Some(e) = cfg_err {
        warn!("{e}; using defaults");
    }
    if args.validation {
        cfg.render.validation = true;
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        cfg,
        renderer: None,
        window: None,
        render_size: RenderSize {
            width: 0,
            height: 0,
        },
        failure: None,
        exiting: false,
        paused: false,
        frames: 0,
        last_fps_instant: Instant::now(),
    };

    event_loop.run_app(&mut app)?;
    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
