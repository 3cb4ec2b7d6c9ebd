//! Render passes, framebuffers and the cache that ties their lifetimes together.
//!
//! Attachments are laid out in a fixed order shared by the render pass and
//! every framebuffer built against it: colours by slot, then resolves by slot,
//! then depth, then depth resolve.

mod cache;
mod framebuffer;
mod pass;

use static_assertions::const_assert;

pub use cache::FboCache;
pub use framebuffer::{Framebuffer, FramebufferParam};
pub use pass::{RenderPass, RenderPassParam};

/// Colour attachment slots per render pass.
pub const MAX_ATTACHMENT_COUNT: usize = 8;

// Per-slot colour masks are `u8`.
const_assert!(MAX_ATTACHMENT_COUNT <= u8::BITS as usize);

bitflags::bitflags! {
    /// Selects colour slots and the depth attachment of a render pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttachmentFlags: u32 {
        const COLOR0 = 1 << 0;
        const COLOR1 = 1 << 1;
        const COLOR2 = 1 << 2;
        const COLOR3 = 1 << 3;
        const COLOR4 = 1 << 4;
        const COLOR5 = 1 << 5;
        const COLOR6 = 1 << 6;
        const COLOR7 = 1 << 7;
        const DEPTH = 1 << 8;
        const COLOR_ALL = Self::COLOR0.bits()
            | Self::COLOR1.bits()
            | Self::COLOR2.bits()
            | Self::COLOR3.bits()
            | Self::COLOR4.bits()
            | Self::COLOR5.bits()
            | Self::COLOR6.bits()
            | Self::COLOR7.bits();
        const ALL = Self::COLOR_ALL.bits() | Self::DEPTH.bits();
    }
}

impl AttachmentFlags {
    /// The flag of colour slot `slot`.
    pub fn color(slot: usize) -> Self {
        if slot < MAX_ATTACHMENT_COUNT {
            Self::from_bits_truncate(1 << slot)
        } else {
            Self::empty()
        }
    }
}

const_assert!(AttachmentFlags::COLOR_ALL.bits() == (1 << MAX_ATTACHMENT_COUNT) - 1);
