use std::sync::Arc;

use ash::vk;

use crate::backend::{FramebufferDesc, GpuDevice};
use crate::error::GpuError;

use super::MAX_ATTACHMENT_COUNT;

/// Size and attachment views of a framebuffer; the framebuffer cache key.
///
/// Null views leave a slot empty. Identity includes the render pass handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferParam {
    pub render_pass: vk::RenderPass,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub colors: [vk::ImageView; MAX_ATTACHMENT_COUNT],
    pub resolves: [vk::ImageView; MAX_ATTACHMENT_COUNT],
    pub depth: vk::ImageView,
    pub depth_resolve: vk::ImageView,
}

impl FramebufferParam {
    pub fn new(render_pass: vk::RenderPass, width: u32, height: u32) -> Self {
        Self {
            render_pass,
            width,
            height,
            layers: 1,
            colors: [vk::ImageView::null(); MAX_ATTACHMENT_COUNT],
            resolves: [vk::ImageView::null(); MAX_ATTACHMENT_COUNT],
            depth: vk::ImageView::null(),
            depth_resolve: vk::ImageView::null(),
        }
    }

    /// Non-null views in render pass attachment order.
    pub fn attachments(&self) -> Vec<vk::ImageView> {
        self.colors
            .iter()
            .chain(&self.resolves)
            .chain([&self.depth, &self.depth_resolve])
            .copied()
            .filter(|view| *view != vk::ImageView::null())
            .collect()
    }
}

/// A native framebuffer.
pub struct Framebuffer {
    device: Arc<dyn GpuDevice>,
    handle: vk::Framebuffer,
    render_pass: vk::RenderPass,
}

impl Framebuffer {
    pub fn new(device: Arc<dyn GpuDevice>, param: &FramebufferParam) -> Result<Self, GpuError> {
        let attachments = param.attachments();
        let handle = device.create_framebuffer(&FramebufferDesc {
            render_pass: param.render_pass,
            attachments: &attachments,
            width: param.width,
            height: param.height,
            layers: param.layers,
        })?;
        Ok(Self {
            device,
            handle,
            render_pass: param.render_pass,
        })
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    /// Render pass this framebuffer was built against.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.handle);
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("handle", &self.handle)
            .field("render_pass", &self.render_pass)
            .finish()
    }
}
