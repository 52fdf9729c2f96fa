//! 资源状态定义
//!
//! [`RgResourceState`] 是 pass 声明时使用的抽象状态，
//! [`RgAccessType`] 是它在具体 pass 中展开后的 pipeline stage 与 access mask。

use ash::vk;

/// pass 类型，决定 shader 访问发生在哪个 stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgPassKind {
    Graphics,
    Compute,
}

/// 资源在某次使用中所要求的状态
///
/// 图像的状态对应一个 layout；buffer 没有 layout，状态只决定 stage 与 access。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceState {
    /// 唯一的初始状态，内容未定义
    Uninitialized,
    TransferSrc,
    TransferDst,
    ColorAttachment,
    DepthAttachment,
    DepthReadOnly,
    /// 采样读取
    ShaderReadOnly,
    /// storage image
    General,
    VertexBuffer,
    IndexBuffer,
    UniformBuffer,
    StorageBuffer,
    IndirectBuffer,
    Present,
}

impl RgResourceState {
    /// 图像在这个状态下的 layout，buffer 状态返回 `UNDEFINED`
    pub fn layout(self) -> vk::ImageLayout {
        match self {
            Self::Uninitialized => vk::ImageLayout::UNDEFINED,
            Self::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::DepthReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::General => vk::ImageLayout::GENERAL,
            Self::Present => vk::ImageLayout::PRESENT_SRC_KHR,
            Self::VertexBuffer
            | Self::IndexBuffer
            | Self::UniformBuffer
            | Self::StorageBuffer
            | Self::IndirectBuffer => vk::ImageLayout::UNDEFINED,
        }
    }

    /// 外部资源当前的 layout 对应的状态
    ///
    /// 无法识别的 layout 视为 `General`
    pub fn from_layout(layout: vk::ImageLayout) -> Self {
        match layout {
            vk::ImageLayout::UNDEFINED | vk::ImageLayout::PREINITIALIZED => Self::Uninitialized,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => Self::TransferSrc,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => Self::TransferDst,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => Self::ColorAttachment,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => Self::DepthAttachment,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => Self::DepthReadOnly,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => Self::ShaderReadOnly,
            vk::ImageLayout::PRESENT_SRC_KHR => Self::Present,
            _ => Self::General,
        }
    }

    pub fn applies_to_image(self) -> bool {
        matches!(
            self,
            Self::Uninitialized
                | Self::TransferSrc
                | Self::TransferDst
                | Self::ColorAttachment
                | Self::DepthAttachment
                | Self::DepthReadOnly
                | Self::ShaderReadOnly
                | Self::General
                | Self::Present
        )
    }

    pub fn applies_to_buffer(self) -> bool {
        matches!(
            self,
            Self::Uninitialized
                | Self::TransferSrc
                | Self::TransferDst
                | Self::VertexBuffer
                | Self::IndexBuffer
                | Self::UniformBuffer
                | Self::StorageBuffer
                | Self::IndirectBuffer
        )
    }

    /// 在 `kind` 类型的 pass 中以这个状态读或写时的 stage 与 access
    ///
    /// 只读状态在 `write == true` 时返回 `None`
    pub fn access(self, kind: RgPassKind, write: bool) -> Option<RgAccessType> {
        let shader_stage = match kind {
            RgPassKind::Graphics => vk::PipelineStageFlags2::FRAGMENT_SHADER,
            RgPassKind::Compute => vk::PipelineStageFlags2::COMPUTE_SHADER,
        };
        let any_shader_stage = match kind {
            RgPassKind::Graphics => {
                vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER
            }
            RgPassKind::Compute => vk::PipelineStageFlags2::COMPUTE_SHADER,
        };
        let fragment_tests =
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;

        let (stage, read, written) = match self {
            Self::Uninitialized => (vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE, None),
            Self::TransferSrc => (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ, None),
            Self::TransferDst => (
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_READ,
                Some(vk::AccessFlags2::TRANSFER_WRITE),
            ),
            Self::ColorAttachment => (
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_READ,
                Some(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE),
            ),
            Self::DepthAttachment => (
                fragment_tests,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
                Some(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE),
            ),
            Self::DepthReadOnly => (
                fragment_tests | shader_stage,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::SHADER_SAMPLED_READ,
                None,
            ),
            Self::ShaderReadOnly => (shader_stage, vk::AccessFlags2::SHADER_SAMPLED_READ, None),
            Self::General => (
                shader_stage,
                vk::AccessFlags2::SHADER_STORAGE_READ,
                Some(vk::AccessFlags2::SHADER_STORAGE_WRITE),
            ),
            Self::VertexBuffer => (
                vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
                vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
                None,
            ),
            Self::IndexBuffer => (vk::PipelineStageFlags2::INDEX_INPUT, vk::AccessFlags2::INDEX_READ, None),
            Self::UniformBuffer => (any_shader_stage, vk::AccessFlags2::UNIFORM_READ, None),
            Self::StorageBuffer => (
                any_shader_stage,
                vk::AccessFlags2::SHADER_STORAGE_READ,
                Some(vk::AccessFlags2::SHADER_STORAGE_WRITE),
            ),
            Self::IndirectBuffer => (
                vk::PipelineStageFlags2::DRAW_INDIRECT,
                vk::AccessFlags2::INDIRECT_COMMAND_READ,
                None,
            ),
            Self::Present => (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE, None),
        };

        if write {
            written.map(|access| RgAccessType::new(stage, access))
        } else {
            Some(RgAccessType::new(stage, read))
        }
    }
}

/// 一次资源访问的 pipeline stage 与 access mask
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgAccessType {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl Default for RgAccessType {
    fn default() -> Self {
        Self::NONE
    }
}

impl RgAccessType {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Self { stage, access }
    }

    /// 资源还没有被任何 pass 访问过
    pub const NONE: Self = Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE);

    /// graph 之外的访问，包括上一帧对同一资源的使用
    pub const EXTERNAL: Self = Self::new(vk::PipelineStageFlags2::ALL_COMMANDS, vk::AccessFlags2::NONE);

    /// 所有写类型的 access
    const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_WRITE.as_raw()
            | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags2::HOST_WRITE.as_raw()
            | vk::AccessFlags2::MEMORY_WRITE.as_raw()
            | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR.as_raw(),
    );

    #[inline]
    pub fn is_write(&self) -> bool {
        self.access.intersects(Self::WRITE_ACCESS)
    }

    /// 作为 barrier 的 src 时只需要让写入可见
    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.access & Self::WRITE_ACCESS
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self::new(self.stage | other.stage, self.access | other.access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_states_reject_writes() {
        for state in [
            RgResourceState::ShaderReadOnly,
            RgResourceState::TransferSrc,
            RgResourceState::VertexBuffer,
            RgResourceState::UniformBuffer,
            RgResourceState::Present,
        ] {
            assert!(state.access(RgPassKind::Graphics, true).is_none(), "{state:?}");
            assert!(state.access(RgPassKind::Graphics, false).is_some(), "{state:?}");
        }

        let write = RgResourceState::ColorAttachment.access(RgPassKind::Graphics, true).unwrap();
        assert!(write.is_write());
        assert_eq!(write.src_access(), vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn test_shader_stage_follows_pass_kind() {
        let graphics = RgResourceState::ShaderReadOnly.access(RgPassKind::Graphics, false).unwrap();
        let compute = RgResourceState::ShaderReadOnly.access(RgPassKind::Compute, false).unwrap();
        assert_eq!(graphics.stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(compute.stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert!(!graphics.is_write());
        assert_eq!(graphics.src_access(), vk::AccessFlags2::NONE);
    }

    #[test]
    fn test_layout_round_trip() {
        for state in [
            RgResourceState::Uninitialized,
            RgResourceState::TransferDst,
            RgResourceState::ColorAttachment,
            RgResourceState::DepthAttachment,
            RgResourceState::ShaderReadOnly,
            RgResourceState::General,
            RgResourceState::Present,
        ] {
            assert!(state.applies_to_image());
            assert_eq!(RgResourceState::from_layout(state.layout()), state);
        }
        assert!(!RgResourceState::UniformBuffer.applies_to_image());
        assert!(!RgResourceState::ColorAttachment.applies_to_buffer());
    }
}
