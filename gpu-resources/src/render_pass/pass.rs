use std::sync::Arc;

use ash::vk;

use crate::backend::{AttachmentRef, GpuDevice, RenderPassDesc, SubpassDesc};
use crate::error::GpuError;

use super::{AttachmentFlags, MAX_ATTACHMENT_COUNT};

/// Attachment formats and load/store policy of a render pass; the render pass cache key.
///
/// A render pass has one subpass, or two when `input_attachment_mask` is set:
/// the first writes the input attachments, the second reads them and writes
/// every colour attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPassParam {
    /// `vk::Format::UNDEFINED` leaves a slot unused.
    pub color_formats: [vk::Format; MAX_ATTACHMENT_COUNT],
    pub depth_format: vk::Format,
    pub clear_mask: AttachmentFlags,
    /// Contents are not loaded.
    pub discard_start_mask: AttachmentFlags,
    /// Contents are not stored. Only honoured for depth.
    pub discard_end_mask: AttachmentFlags,
    pub samples: vk::SampleCountFlags,
    pub resolve_mask: u8,
    pub input_attachment_mask: u8,
    pub present_mask: u8,
    pub depth_resolve: bool,
}

impl Default for RenderPassParam {
    fn default() -> Self {
        Self {
            color_formats: [vk::Format::UNDEFINED; MAX_ATTACHMENT_COUNT],
            depth_format: vk::Format::UNDEFINED,
            clear_mask: AttachmentFlags::empty(),
            discard_start_mask: AttachmentFlags::empty(),
            discard_end_mask: AttachmentFlags::empty(),
            samples: vk::SampleCountFlags::TYPE_1,
            resolve_mask: 0,
            input_attachment_mask: 0,
            present_mask: 0,
            depth_resolve: false,
        }
    }
}

fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

fn color_ref(attachment: u32) -> AttachmentRef {
    AttachmentRef {
        attachment,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        aspect: vk::ImageAspectFlags::COLOR,
    }
}

fn attachment(
    format: vk::Format,
    samples: vk::SampleCountFlags,
    load_op: vk::AttachmentLoadOp,
    store_op: vk::AttachmentStoreOp,
    initial_layout: vk::ImageLayout,
    final_layout: vk::ImageLayout,
) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples,
        load_op,
        store_op,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout,
        final_layout,
        ..Default::default()
    }
}

impl RenderPassParam {
    pub fn has_depth(&self) -> bool {
        self.depth_format != vk::Format::UNDEFINED
    }

    fn slot_set(mask: u8, slot: usize) -> bool {
        mask & (1 << slot) != 0
    }

    /// Derive attachment descriptions, subpasses and dependencies.
    pub fn desc(&self) -> RenderPassDesc {
        let two_subpasses = self.input_attachment_mask != 0;
        let mut attachments = Vec::new();
        let mut first = SubpassDesc::default();
        let mut last = SubpassDesc::default();
        // Attachment index of each used colour slot.
        let mut color_index = [None; MAX_ATTACHMENT_COUNT];

        for (slot, &format) in self.color_formats.iter().enumerate() {
            if format == vk::Format::UNDEFINED {
                continue;
            }
            let index = attachments.len() as u32;
            color_index[slot] = Some(index);

            if two_subpasses && Self::slot_set(self.input_attachment_mask, slot) {
                first.color.push(color_ref(index));
                last.input.push(AttachmentRef {
                    attachment: index,
                    layout: if is_depth_format(format) {
                        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
                    } else {
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                    },
                    aspect: vk::ImageAspectFlags::COLOR,
                });
            }
            last.color.push(color_ref(index));

            let flag = AttachmentFlags::color(slot);
            let discard = self.discard_start_mask.contains(flag);
            attachments.push(attachment(
                format,
                self.samples,
                if self.clear_mask.contains(flag) {
                    vk::AttachmentLoadOp::CLEAR
                } else if discard {
                    vk::AttachmentLoadOp::DONT_CARE
                } else {
                    vk::AttachmentLoadOp::LOAD
                },
                if self.samples == vk::SampleCountFlags::TYPE_1 {
                    vk::AttachmentStoreOp::STORE
                } else {
                    vk::AttachmentStoreOp::DONT_CARE
                },
                if discard {
                    vk::ImageLayout::UNDEFINED
                } else {
                    vk::ImageLayout::GENERAL
                },
                if Self::slot_set(self.present_mask, slot) {
                    vk::ImageLayout::PRESENT_SRC_KHR
                } else {
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
                },
            ));
        }

        if self.resolve_mask != 0 {
            let mut resolve_index = [None; MAX_ATTACHMENT_COUNT];
            for (slot, &format) in self.color_formats.iter().enumerate() {
                if format == vk::Format::UNDEFINED || !Self::slot_set(self.resolve_mask, slot) {
                    continue;
                }
                resolve_index[slot] = Some(attachments.len() as u32);
                attachments.push(attachment(
                    format,
                    vk::SampleCountFlags::TYPE_1,
                    vk::AttachmentLoadOp::DONT_CARE,
                    vk::AttachmentStoreOp::STORE,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                ));
            }
            // Resolve references parallel the colour references of the last subpass.
            last.resolve = color_index
                .iter()
                .zip(resolve_index)
                .filter(|(color, _)| color.is_some())
                .map(|(_, resolve)| resolve.map_or(AttachmentRef::UNUSED, color_ref))
                .collect();
        }

        if self.has_depth() {
            let depth = AttachmentRef {
                attachment: attachments.len() as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                aspect: vk::ImageAspectFlags::DEPTH,
            };
            let discard_start = self.discard_start_mask.contains(AttachmentFlags::DEPTH);
            attachments.push(attachment(
                self.depth_format,
                self.samples,
                if self.clear_mask.contains(AttachmentFlags::DEPTH) {
                    vk::AttachmentLoadOp::CLEAR
                } else if discard_start {
                    vk::AttachmentLoadOp::DONT_CARE
                } else {
                    vk::AttachmentLoadOp::LOAD
                },
                if self.discard_end_mask.contains(AttachmentFlags::DEPTH) {
                    vk::AttachmentStoreOp::DONT_CARE
                } else {
                    vk::AttachmentStoreOp::STORE
                },
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ));
            first.depth = Some(depth);
            last.depth = Some(depth);

            if self.depth_resolve {
                last.depth_resolve = Some(AttachmentRef {
                    attachment: attachments.len() as u32,
                    ..depth
                });
                attachments.push(attachment(
                    self.depth_format,
                    vk::SampleCountFlags::TYPE_1,
                    vk::AttachmentLoadOp::DONT_CARE,
                    vk::AttachmentStoreOp::STORE,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ));
            }
        }

        let (subpasses, dependencies) = if two_subpasses {
            (
                vec![first, last],
                vec![vk::SubpassDependency {
                    src_subpass: 0,
                    dst_subpass: 1,
                    src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
                    src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    dst_access_mask: vk::AccessFlags::SHADER_READ,
                    dependency_flags: vk::DependencyFlags::BY_REGION,
                }],
            )
        } else {
            (vec![last], Vec::new())
        };

        RenderPassDesc {
            attachments,
            subpasses,
            dependencies,
        }
    }
}

/// A native render pass.
pub struct RenderPass {
    device: Arc<dyn GpuDevice>,
    handle: vk::RenderPass,
    param: RenderPassParam,
}

impl RenderPass {
    pub fn new(device: Arc<dyn GpuDevice>, param: &RenderPassParam) -> Result<Self, GpuError> {
        let desc = param.desc();
        if desc.attachments.is_empty() {
            return Err(GpuError::InvalidParameter(
                "render pass has no attachments".to_string(),
            ));
        }
        let handle = device.create_render_pass(&desc)?;
        Ok(Self {
            device,
            handle,
            param: *param,
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    pub fn param(&self) -> &RenderPassParam {
        &self.param
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.device.destroy_render_pass(self.handle);
    }
}

impl std::fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass")
            .field("handle", &self.handle)
            .field("param", &self.param)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_colors() -> RenderPassParam {
        let mut param = RenderPassParam::default();
        param.color_formats[0] = vk::Format::R8G8B8A8_UNORM;
        param.color_formats[2] = vk::Format::R16G16B16A16_SFLOAT;
        param
    }

    #[test]
    fn test_single_subpass() {
        let mut param = two_colors();
        param.clear_mask = AttachmentFlags::COLOR0;
        param.discard_start_mask = AttachmentFlags::COLOR2;
        param.present_mask = 0b1;

        let desc = param.desc();
        assert_eq!(desc.attachments.len(), 2);
        assert_eq!(desc.subpasses.len(), 1);
        assert!(desc.dependencies.is_empty());

        let color0 = &desc.attachments[0];
        assert_eq!(color0.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color0.initial_layout, vk::ImageLayout::GENERAL);
        assert_eq!(color0.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let color2 = &desc.attachments[1];
        assert_eq!(color2.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(color2.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(color2.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let refs: Vec<u32> = desc.subpasses[0].color.iter().map(|r| r.attachment).collect();
        assert_eq!(refs, vec![0, 1]);
    }

    #[test]
    fn test_input_attachments_split_subpasses() {
        let mut param = two_colors();
        param.input_attachment_mask = 0b1;

        let desc = param.desc();
        assert_eq!(desc.subpasses.len(), 2);
        assert_eq!(desc.subpasses[0].color.len(), 1);
        assert_eq!(desc.subpasses[1].input.len(), 1);
        assert_eq!(desc.subpasses[1].color.len(), 2);
        assert_eq!(
            desc.subpasses[1].input[0].layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
        assert_eq!(desc.dependencies.len(), 1);
        assert_eq!(
            desc.dependencies[0].dependency_flags,
            vk::DependencyFlags::BY_REGION
        );
    }

    #[test]
    fn test_attachment_order() {
        let mut param = two_colors();
        param.samples = vk::SampleCountFlags::TYPE_4;
        param.resolve_mask = 0b100;
        param.depth_format = vk::Format::D32_SFLOAT;
        param.discard_end_mask = AttachmentFlags::DEPTH;
        param.depth_resolve = true;

        let desc = param.desc();
        // colour 0, colour 2, resolve 2, depth, depth resolve
        assert_eq!(desc.attachments.len(), 5);
        assert_eq!(desc.attachments[0].store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(desc.attachments[2].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(desc.attachments[3].format, vk::Format::D32_SFLOAT);
        assert_eq!(desc.attachments[3].store_op, vk::AttachmentStoreOp::DONT_CARE);

        let subpass = &desc.subpasses[0];
        assert_eq!(subpass.resolve.len(), subpass.color.len());
        assert_eq!(subpass.resolve[0], AttachmentRef::UNUSED);
        assert_eq!(subpass.resolve[1].attachment, 2);
        assert_eq!(subpass.depth.map(|d| d.attachment), Some(3));
        assert_eq!(subpass.depth_resolve.map(|d| d.attachment), Some(4));
    }
}
