// SPDX-License-Identifier: CEPL-1.0
//! Resource kinds, the orders they are built and destroyed in, and a ledger
//! that refuses to destroy a kind while something that depends on it is
//! still alive.

use bitflags::bitflags;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Instance,
    DebugMessenger,
    Surface,
    Device,
    Swapchain,
    ImageViews,
    RenderPass,
    ShaderModules,
    PipelineLayout,
    Pipeline,
    Framebuffers,
    CommandPool,
    CommandBuffers,
    Semaphores,
}

bitflags! {
    /// A set of [`Kind`]s.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Resources: u32 {
        const INSTANCE        = 1 << Kind::Instance as u32;
        const DEBUG_MESSENGER = 1 << Kind::DebugMessenger as u32;
        const SURFACE         = 1 << Kind::Surface as u32;
        const DEVICE          = 1 << Kind::Device as u32;
        const SWAPCHAIN       = 1 << Kind::Swapchain as u32;
        const IMAGE_VIEWS     = 1 << Kind::ImageViews as u32;
        const RENDER_PASS     = 1 << Kind::RenderPass as u32;
        const SHADER_MODULES  = 1 << Kind::ShaderModules as u32;
        const PIPELINE_LAYOUT = 1 << Kind::PipelineLayout as u32;
        const PIPELINE        = 1 << Kind::Pipeline as u32;
        const FRAMEBUFFERS    = 1 << Kind::Framebuffers as u32;
        const COMMAND_POOL    = 1 << Kind::CommandPool as u32;
        const COMMAND_BUFFERS = 1 << Kind::CommandBuffers as u32;
        const SEMAPHORES      = 1 << Kind::Semaphores as u32;

        /// Everything created before the renderer struct exists.
        const CORE = Self::INSTANCE.bits()
            | Self::DEBUG_MESSENGER.bits()
            | Self::SURFACE.bits()
            | Self::DEVICE.bits();

        /// The subgraph torn down and rebuilt when the surface changes.
        const SWAPCHAIN_GRAPH = Self::SWAPCHAIN.bits()
            | Self::IMAGE_VIEWS.bits()
            | Self::RENDER_PASS.bits()
            | Self::PIPELINE_LAYOUT.bits()
            | Self::PIPELINE.bits()
            | Self::FRAMEBUFFERS.bits()
            | Self::COMMAND_BUFFERS.bits();
    }
}

pub const STARTUP: [Kind; 14] = [
    Kind::Instance,
    Kind::DebugMessenger,
    Kind::Surface,
    Kind::Device,
    Kind::Swapchain,
    Kind::ImageViews,
    Kind::RenderPass,
    Kind::ShaderModules,
    Kind::PipelineLayout,
    Kind::Pipeline,
    Kind::Framebuffers,
    Kind::CommandPool,
    Kind::CommandBuffers,
    Kind::Semaphores,
];

pub const REBUILD_TEARDOWN: [Kind; 7] = [
    Kind::CommandBuffers,
    Kind::Framebuffers,
    Kind::Pipeline,
    Kind::PipelineLayout,
    Kind::ImageViews,
    Kind::RenderPass,
    Kind::Swapchain,
];

pub const REBUILD_CONSTRUCT: [Kind; 7] = [
    Kind::Swapchain,
    Kind::ImageViews,
    Kind::RenderPass,
    Kind::PipelineLayout,
    Kind::Pipeline,
    Kind::Framebuffers,
    Kind::CommandBuffers,
];

// Command buffers go back to their pool right before the pool is destroyed.
pub const SHUTDOWN: [Kind; 14] = [
    Kind::Semaphores,
    Kind::CommandBuffers,
    Kind::CommandPool,
    Kind::Framebuffers,
    Kind::ShaderModules,
    Kind::Pipeline,
    Kind::PipelineLayout,
    Kind::ImageViews,
    Kind::RenderPass,
    Kind::Swapchain,
    Kind::Device,
    Kind::DebugMessenger,
    Kind::Surface,
    Kind::Instance,
];

impl Kind {
    pub const ALL: [Kind; 14] = STARTUP;

    pub fn flag(self) -> Resources {
        Resources::from_bits_retain(1 << self as u32)
    }

    /// Kinds that must stay alive for as long as `self` is alive.
    pub fn dependencies(self) -> Resources {
        type R = Resources;
        match self {
            Kind::Instance => R::empty(),
            Kind::DebugMessenger | Kind::Surface | Kind::Device => R::INSTANCE,
            Kind::Swapchain => R::DEVICE | R::SURFACE,
            Kind::ImageViews => R::DEVICE | R::SWAPCHAIN,
            Kind::RenderPass | Kind::ShaderModules | Kind::PipelineLayout => R::DEVICE,
            Kind::Pipeline => R::DEVICE | R::PIPELINE_LAYOUT | R::RENDER_PASS,
            Kind::Framebuffers => R::DEVICE | R::IMAGE_VIEWS | R::RENDER_PASS,
            Kind::CommandPool | Kind::Semaphores => R::DEVICE,
            Kind::CommandBuffers => {
                R::COMMAND_POOL | R::PIPELINE | R::FRAMEBUFFERS | R::RENDER_PASS
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Instance => "instance",
            Kind::DebugMessenger => "debug messenger",
            Kind::Surface => "surface",
            Kind::Device => "device",
            Kind::Swapchain => "swapchain",
            Kind::ImageViews => "image views",
            Kind::RenderPass => "render pass",
            Kind::ShaderModules => "shader modules",
            Kind::PipelineLayout => "pipeline layout",
            Kind::Pipeline => "pipeline",
            Kind::Framebuffers => "framebuffers",
            Kind::CommandPool => "command pool",
            Kind::CommandBuffers => "command buffers",
            Kind::Semaphores => "semaphores",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Resources {
    pub fn kinds(self) -> impl Iterator<Item = Kind> {
        Kind::ALL.into_iter().filter(move |k| self.contains(k.flag()))
    }

    /// Members of `self` that depend on `kind`.
    pub fn dependents_of(self, kind: Kind) -> Resources {
        self.kinds()
            .filter(|k| k.dependencies().contains(kind.flag()))
            .fold(Resources::empty(), |acc, k| acc | k.flag())
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for k in self.kinds() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(k.name())?;
            first = false;
        }
        if first {
            f.write_str("nothing")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("created {created} while {missing} not alive")]
    MissingDependency { created: Kind, missing: Resources },

    #[error("refusing to destroy {released} while {dependents} still alive")]
    OutOfOrder {
        released: Kind,
        dependents: Resources,
    },
}

/// Which kinds are currently alive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceLedger {
    live: Resources,
}

impl ResourceLedger {
    pub fn live(&self) -> Resources {
        self.live
    }

    pub fn is_live(&self, kinds: Resources) -> bool {
        self.live.contains(kinds)
    }

    /// Record `kind` as created. It is recorded even when a dependency is
    /// missing, so that teardown still visits it.
    pub fn acquire(&mut self, kind: Kind) -> Result<(), LifecycleError> {
        let missing = kind.dependencies() - self.live;
        self.live |= kind.flag();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::MissingDependency {
                created: kind,
                missing,
            })
        }
    }

    /// Check that `kind` may be destroyed now and, if so, forget it.
    /// A refused release leaves `kind` alive.
    pub fn release(&mut self, kind: Kind) -> Result<(), LifecycleError> {
        let dependents = self.live.dependents_of(kind);
        if !dependents.is_empty() {
            return Err(LifecycleError::OutOfOrder {
                released: kind,
                dependents,
            });
        }
        self.live -= kind.flag();
        Ok(())
    }
}

/// Owns the objects behind each [`Kind`] and keeps a ledger of them.
pub trait ResourceOwner {
    /// Build `kind` and record it as live.
    unsafe fn create(&mut self, kind: Kind) -> anyhow::Result<()>;

    /// Destroy `kind` if it is live. Refused while a dependent is live.
    unsafe fn release(&mut self, kind: Kind) -> Result<(), LifecycleError>;
}

/// The non-core startup kinds. With `defer_graph` the swapchain graph is
/// left for the first rebuild.
pub fn startup_kinds(defer_graph: bool) -> impl Iterator<Item = Kind> {
    let skip = if defer_graph {
        Resources::CORE | Resources::SWAPCHAIN_GRAPH
    } else {
        Resources::CORE
    };
    STARTUP.into_iter().filter(move |k| !skip.contains(k.flag()))
}

/// Tear the swapchain graph down and build it again. If construction fails
/// part-way, whatever it built is released again, so afterwards the graph
/// is either complete or entirely absent.
pub unsafe fn rebuild_graph<O: ResourceOwner>(owner: &mut O) -> anyhow::Result<()> {
    for kind in REBUILD_TEARDOWN {
        owner.release(kind)?;
    }
    for kind in REBUILD_CONSTRUCT {
        if let Err(e) = owner.create(kind) {
            for kind in REBUILD_TEARDOWN {
                // already logged by the owner
                let _ = owner.release(kind);
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Release every live kind in [`SHUTDOWN`] order, carrying on past refusals.
pub unsafe fn shutdown<O: ResourceOwner>(owner: &mut O) {
    for kind in SHUTDOWN {
        let _ = owner.release(kind);
    }
}
