// SPDX-License-Identifier: CEPL-1.0
use anyhow::{bail, Context, Result};
use ash::{vk, Entry, Instance};
use prism_render::{log_sink, DiagnosticSink, RenderSize, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod debug;
pub mod device;
pub mod error;
pub mod graph;
pub mod instance;
pub mod lifecycle;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod targets;

pub use error::VkError;
pub use graph::SwapchainGraph;
pub use lifecycle::{Kind, LifecycleError, ResourceLedger, Resources};
pub use shader::ShaderSource;
pub use swapchain::SwapchainConfig;
pub use sync::{FrameOutcome, StaleSwapchainPolicy};

use commands::DrawTarget;
use debug::DebugMessenger;
use device::DeviceCtx;
use instance::CreatedInstance;
use lifecycle::ResourceOwner;
use shader::ShaderModules;
use swapchain::SurfaceCtx;
use sync::{FrameSync, Reaction};

/// Knobs for [`VkRenderer::with_options`].
pub struct VkOptions {
    /// Enable the Khronos validation layer and route its messages to `sink`.
    pub validation: bool,
    pub stale_swapchain: StaleSwapchainPolicy,
    /// Wait for the present queue to drain after every present.
    pub present_wait_idle: bool,
    pub clear_color: [f32; 4],
    pub vertex_shader: ShaderSource,
    pub fragment_shader: ShaderSource,
    pub sink: DiagnosticSink,
}

impl Default for VkOptions {
    fn default() -> Self {
        VkOptions {
            validation: cfg!(debug_assertions),
            stale_swapchain: StaleSwapchainPolicy::default(),
            present_wait_idle: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_shader: ShaderSource::Builtin,
            fragment_shader: ShaderSource::Builtin,
            sink: log_sink(),
        }
    }
}

pub struct VkRenderer {
    _entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface: SurfaceCtx,
    dev: DeviceCtx,

    shaders: ShaderModules,
    graph: SwapchainGraph,
    cmd_pool: vk::CommandPool,
    sync: FrameSync,

    ledger: ResourceLedger,

    vertex_shader: ShaderSource,
    fragment_shader: ShaderSource,
    stale_swapchain: StaleSwapchainPolicy,
    present_wait_idle: bool,

    size: RenderSize,
    clear: vk::ClearValue,
    paused: bool,
}

/// What exists before the renderer struct can be assembled.
struct Core {
    entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    surface: SurfaceCtx,
    dev: DeviceCtx,
}

// Undo a partial core build: messenger, surface, instance.
unsafe fn abandon_core(
    instance: &Instance,
    debug: Option<&mut DebugMessenger>,
    surface: Option<&mut SurfaceCtx>,
) {
    if let Some(m) = debug {
        m.destroy();
    }
    if let Some(s) = surface {
        s.destroy();
    }
    instance.destroy_instance(None);
}

// STRICT ORDER:
// 1) VkInstance (platform WSI extensions + optional validation)
// 2) Debug messenger, if validation came up
// 3) VkSurfaceKHR FROM THIS INSTANCE
// 4) Adapter selection AGAINST THIS SURFACE (present support)
// 5) VkDevice + queues
// A failure here releases whatever this function already made.
unsafe fn init_core(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    validation: bool,
    sink: DiagnosticSink,
) -> Result<Core> {
    let entry = Entry::linked();

    let display_raw = display.display_handle().context("display_handle")?.as_raw();
    let window_raw = window.window_handle().context("window_handle")?.as_raw();

    let CreatedInstance {
        instance,
        debug_utils,
    } = instance::create_instance(&entry, display_raw, validation)?;

    let mut debug = if debug_utils {
        match DebugMessenger::new(&entry, &instance, sink) {
            Ok(m) => Some(m),
            Err(e) => {
                abandon_core(&instance, None, None);
                return Err(e);
            }
        }
    } else {
        None
    };

    let handle = match ash_window::create_surface(&entry, &instance, display_raw, window_raw, None)
    {
        Ok(s) => s,
        Err(e) => {
            abandon_core(&instance, debug.as_mut(), None);
            return Err(e).context("create_surface");
        }
    };
    let mut surface = SurfaceCtx {
        loader: ash::khr::surface::Instance::new(&entry, &instance),
        handle,
    };

    let dev = match device::select_adapter(&instance, &surface.loader, surface.handle)
        .and_then(|adapter| DeviceCtx::new(&instance, adapter))
    {
        Ok(d) => d,
        Err(e) => {
            abandon_core(&instance, debug.as_mut(), Some(&mut surface));
            return Err(e);
        }
    };

    Ok(Core {
        entry,
        instance,
        debug,
        surface,
        dev,
    })
}

impl VkRenderer {
    pub fn with_options(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        opts: VkOptions,
    ) -> Result<Self> {
        let VkOptions {
            validation,
            stale_swapchain,
            present_wait_idle,
            clear_color,
            vertex_shader,
            fragment_shader,
            sink,
        } = opts;

        let core = unsafe { init_core(window, display, validation, sink)? };

        let mut r = VkRenderer {
            _entry: core.entry,
            instance: core.instance,
            debug: core.debug,
            surface: core.surface,
            dev: core.dev,
            shaders: ShaderModules::default(),
            graph: SwapchainGraph::default(),
            cmd_pool: vk::CommandPool::null(),
            sync: FrameSync::default(),
            ledger: ResourceLedger::default(),
            vertex_shader,
            fragment_shader,
            stale_swapchain,
            present_wait_idle,
            size,
            clear: commands::clear_value(clear_color),
            paused: size.is_empty(),
        };

        // From here on a failure drops `r`, and Drop releases whatever the
        // ledger says is live.
        let core_kinds = [Kind::Instance, Kind::DebugMessenger, Kind::Surface, Kind::Device];
        for kind in core_kinds {
            if kind == Kind::DebugMessenger && r.debug.is_none() {
                continue;
            }
            r.ledger.acquire(kind)?;
        }

        // A zero-size window gets its graph on the first non-zero resize.
        for kind in lifecycle::startup_kinds(r.paused) {
            unsafe { r.create(kind)? };
        }

        if r.paused {
            info!("renderer ready (paused, swapchain deferred)");
        } else {
            info!(
                "renderer ready ({}x{}, {} images)",
                r.graph.extent().width,
                r.graph.extent().height,
                r.graph.image_count()
            );
        }
        Ok(r)
    }

    fn draw_target(&self) -> DrawTarget<'_> {
        DrawTarget {
            render_pass: self.graph.render_pass,
            pipeline: self.graph.pipeline,
            framebuffers: &self.graph.framebuffers,
            extent: self.graph.extent(),
            clear: self.clear,
        }
    }

    // STRICT ORDER (rebuild):
    // 1) device_wait_idle(): nothing may still reference the old graph
    // 2) Tear down the swapchain graph, dependents first
    // 3) Rebuild it from a fresh surface query
    // Semaphores, command pool, shader modules, device, surface and instance
    // are not touched. A failure leaves no graph at all; frames are skipped
    // until the next successful rebuild.
    unsafe fn rebuild(&mut self) -> Result<()> {
        self.dev
            .device
            .device_wait_idle()
            .context("device_wait_idle")?;

        lifecycle::rebuild_graph(self)?;

        let extent = self.graph.extent();
        info!(
            "swapchain graph rebuilt ({}x{}, {} images)",
            extent.width,
            extent.height,
            self.graph.image_count()
        );
        Ok(())
    }

    unsafe fn rerecord(&mut self) -> Result<()> {
        self.dev
            .device
            .device_wait_idle()
            .context("device_wait_idle")?;
        commands::record_all(
            &self.dev.device,
            &self.graph.command_buffers,
            &self.draw_target(),
        )
    }
}

impl ResourceOwner for VkRenderer {
    unsafe fn create(&mut self, kind: Kind) -> Result<()> {
        let device = &self.dev.device;
        match kind {
            Kind::Instance | Kind::DebugMessenger | Kind::Surface | Kind::Device => {
                bail!("{kind} is only created during core init")
            }
            Kind::Swapchain => {
                let sc = swapchain::create_swapchain(&self.dev, &self.surface, self.size)?;
                self.graph.swapchain = sc.handle;
                self.graph.config = sc.config;
                self.graph.images = sc.images;
            }
            Kind::ImageViews => {
                self.graph.views =
                    targets::create_image_views(device, &self.graph.images, self.graph.format())?;
            }
            Kind::RenderPass => {
                self.graph.render_pass = pipeline::create_render_pass(device, self.graph.format())?;
            }
            Kind::ShaderModules => {
                self.shaders =
                    ShaderModules::create(device, &self.vertex_shader, &self.fragment_shader)?;
            }
            Kind::PipelineLayout => {
                self.graph.layout = pipeline::create_layout(device)?;
            }
            Kind::Pipeline => {
                self.graph.pipeline = pipeline::create_pipeline(
                    device,
                    self.graph.layout,
                    self.graph.render_pass,
                    &self.shaders,
                    self.graph.extent(),
                )?;
            }
            Kind::Framebuffers => {
                self.graph.framebuffers = targets::create_framebuffers(
                    device,
                    self.graph.render_pass,
                    &self.graph.views,
                    self.graph.extent(),
                )?;
            }
            Kind::CommandPool => {
                self.cmd_pool = commands::create_pool(device, self.dev.families.graphics)?;
            }
            Kind::CommandBuffers => {
                let mut cmds =
                    commands::allocate(device, self.cmd_pool, self.graph.framebuffers.len())?;
                if let Err(e) = commands::record_all(device, &cmds, &self.draw_target()) {
                    commands::free(device, self.cmd_pool, &mut cmds);
                    return Err(e);
                }
                self.graph.command_buffers = cmds;
            }
            Kind::Semaphores => {
                self.sync = FrameSync::new(device)?;
            }
        }
        debug!("created {kind}");
        self.ledger.acquire(kind).map_err(|e| {
            error!("{e}");
            e
        })?;
        Ok(())
    }

    unsafe fn release(&mut self, kind: Kind) -> Result<(), LifecycleError> {
        if !self.ledger.is_live(kind.flag()) {
            return Ok(());
        }
        if let Err(e) = self.ledger.release(kind) {
            error!("{e}");
            return Err(e);
        }

        let device = &self.dev.device;
        match kind {
            Kind::Instance => self.instance.destroy_instance(None),
            Kind::DebugMessenger => {
                if let Some(m) = self.debug.as_mut() {
                    m.destroy();
                }
            }
            Kind::Surface => self.surface.destroy(),
            Kind::Device => self.dev.destroy(),
            Kind::Swapchain => {
                self.dev
                    .swapchain_loader
                    .destroy_swapchain(self.graph.swapchain, None);
                self.graph.swapchain = vk::SwapchainKHR::null();
                // owned by the swapchain
                self.graph.images.clear();
            }
            Kind::ImageViews => targets::destroy_image_views(device, &mut self.graph.views),
            Kind::RenderPass => {
                device.destroy_render_pass(self.graph.render_pass, None);
                self.graph.render_pass = vk::RenderPass::null();
            }
            Kind::ShaderModules => self.shaders.destroy(device),
            Kind::PipelineLayout => {
                device.destroy_pipeline_layout(self.graph.layout, None);
                self.graph.layout = vk::PipelineLayout::null();
            }
            Kind::Pipeline => {
                device.destroy_pipeline(self.graph.pipeline, None);
                self.graph.pipeline = vk::Pipeline::null();
            }
            Kind::Framebuffers => targets::destroy_framebuffers(device, &mut self.graph.framebuffers),
            Kind::CommandPool => {
                device.destroy_command_pool(self.cmd_pool, None);
                self.cmd_pool = vk::CommandPool::null();
            }
            Kind::CommandBuffers => {
                commands::free(device, self.cmd_pool, &mut self.graph.command_buffers)
            }
            Kind::Semaphores => self.sync.destroy(device),
        }
        debug!("destroyed {kind}");
        Ok(())
    }
}

/// What a new drawable size calls for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SizeChange {
    /// Zero area: stop drawing and leave the graph alone.
    Pause,
    /// First non-zero size after a pause; rebuilds.
    Resume,
    Rebuild,
}

fn size_change(paused: bool, size: RenderSize) -> SizeChange {
    if size.is_empty() {
        SizeChange::Pause
    } else if paused {
        SizeChange::Resume
    } else {
        SizeChange::Rebuild
    }
}

// A failed rebuild leaves no graph; frames are skipped until the next
// successful one.
fn can_draw(paused: bool, live: Resources) -> bool {
    !paused && live.contains(Resources::SWAPCHAIN_GRAPH | Resources::SEMAPHORES)
}

// STRICT TEARDOWN ORDER:
// - device_wait_idle()
// - Walk SHUTDOWN: semaphores, command buffers and pool, framebuffers,
//   shader modules, pipeline and layout, image views, render pass,
//   swapchain, device, debug messenger, surface, instance.
// Only live kinds are visited, so a half-built renderer tears down cleanly.
impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            if self.ledger.is_live(Resources::DEVICE) {
                if let Err(e) = self.dev.device.device_wait_idle() {
                    warn!("device_wait_idle during shutdown: {e:?}");
                }
            }
            lifecycle::shutdown(self);
        }
        debug!("renderer torn down");
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self> {
        Self::with_options(window, display, size, VkOptions::default())
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        match size_change(self.paused, size) {
            SizeChange::Pause => {
                if !self.paused {
                    info!("vk: resize to {}x{} → paused", size.width, size.height);
                }
                self.paused = true;
                return Ok(());
            }
            SizeChange::Resume => {
                info!("vk: resize to {}x{} → resumed", size.width, size.height);
            }
            SizeChange::Rebuild => {}
        }
        self.paused = false;
        self.size = size;

        unsafe { self.rebuild() }
    }

    fn render(&mut self) -> Result<()> {
        if !can_draw(self.paused, self.ledger.live()) {
            return Ok(());
        }

        let outcome = unsafe {
            self.sync.draw_frame(
                &self.dev,
                self.graph.swapchain,
                &self.graph.command_buffers,
                self.present_wait_idle,
            )?
        };

        match self.stale_swapchain.react(outcome) {
            Reaction::Continue => Ok(()),
            Reaction::Rebuild => {
                debug!("swapchain {outcome:?}; rebuilding");
                unsafe { self.rebuild() }
            }
            Reaction::SkipFrame => {
                warn!("swapchain out of date; frame skipped");
                Ok(())
            }
        }
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = commands::clear_value(rgba);
        if !self.ledger.is_live(Resources::COMMAND_BUFFERS) {
            // picked up by the next rebuild
            return;
        }
        if let Err(e) = unsafe { self.rerecord() } {
            error!("re-recording after clear color change failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(width: u32, height: u32) -> RenderSize {
        RenderSize { width, height }
    }

    #[test]
    fn zero_size_pauses_without_rebuild() {
        assert_eq!(size_change(false, size(0, 0)), SizeChange::Pause);
        assert_eq!(size_change(false, size(800, 0)), SizeChange::Pause);
        assert_eq!(size_change(true, size(0, 600)), SizeChange::Pause);
    }

    #[test]
    fn non_zero_size_resumes_or_rebuilds() {
        assert_eq!(size_change(true, size(800, 600)), SizeChange::Resume);
        assert_eq!(size_change(false, size(800, 600)), SizeChange::Rebuild);
    }

    #[test]
    fn drawing_needs_graph_and_semaphores() {
        let all = Resources::all();
        assert!(can_draw(false, all));
        assert!(!can_draw(true, all));

        // after a failed rebuild
        assert!(!can_draw(false, all - Resources::SWAPCHAIN_GRAPH));
        // any single missing member is enough
        assert!(!can_draw(false, all - Resources::FRAMEBUFFERS));
        assert!(!can_draw(false, all - Resources::SEMAPHORES));
    }

    #[test]
    fn deferred_startup_does_not_draw_until_rebuilt() {
        let mut ledger = ResourceLedger::default();
        for kind in [Kind::Instance, Kind::Surface, Kind::Device] {
            ledger.acquire(kind).unwrap();
        }
        for kind in lifecycle::startup_kinds(true) {
            ledger.acquire(kind).unwrap();
        }
        assert!(!can_draw(false, ledger.live()));

        for kind in lifecycle::REBUILD_CONSTRUCT {
            ledger.acquire(kind).unwrap();
        }
        assert!(can_draw(false, ledger.live()));
    }
}
