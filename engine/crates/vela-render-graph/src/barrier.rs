//! Barrier 自动计算
//!
//! 按执行顺序模拟每个资源的状态变化，生成 pass 之前需要的 barrier。

use ash::vk;

use vela_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};

use crate::resource_state::{RgAccessType, RgResourceState};

/// 一次状态转换
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgBarrierDesc {
    /// 资源在编译结果中的索引
    pub resource: usize,
    pub src_state: RgResourceState,
    pub dst_state: RgResourceState,
    pub src: RgAccessType,
    pub dst: RgAccessType,
    /// 图像的 aspect，buffer 为空
    pub aspect: vk::ImageAspectFlags,
}

impl RgBarrierDesc {
    /// 图像：layout 不同，或者任意一侧有写入
    pub fn image_needs_barrier(&self) -> bool {
        if self.src_state.layout() != self.dst_state.layout() {
            return true;
        }
        self.src.is_write() || self.dst.is_write()
    }

    /// buffer 没有 layout，只有写入才形成 hazard；未初始化的 buffer 没有需要等待的访问
    pub fn buffer_needs_barrier(&self) -> bool {
        if self.src_state == RgResourceState::Uninitialized {
            return false;
        }
        self.src.is_write() || self.dst.is_write()
    }

    pub fn to_image_barrier(&self, image: vk::Image) -> GfxImageBarrier {
        GfxImageBarrier::new()
            .image(image)
            .layout_transfer(self.src_state.layout(), self.dst_state.layout())
            .src_mask(self.src.stage, self.src.src_access())
            .dst_mask(self.dst.stage, self.dst.access)
            .image_aspect_flag(self.aspect)
    }

    pub fn to_buffer_barrier(&self, buffer: vk::Buffer) -> GfxBufferBarrier {
        GfxBufferBarrier::new()
            .buffer(buffer, 0, vk::WHOLE_SIZE)
            .src_mask(self.src.stage, self.src.src_access())
            .dst_mask(self.dst.stage, self.dst.access)
    }
}

/// Pass 执行前需要的 Barrier 集合
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassBarriers {
    pub image_barriers: Vec<RgBarrierDesc>,
    pub buffer_barriers: Vec<RgBarrierDesc>,
}

impl PassBarriers {
    #[inline]
    pub fn has_barriers(&self) -> bool {
        !self.image_barriers.is_empty() || !self.buffer_barriers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.image_barriers.len() + self.buffer_barriers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.has_barriers()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RgBarrierDesc> {
        self.image_barriers.iter().chain(self.buffer_barriers.iter())
    }
}

/// 编译时某个资源被留下的状态
#[derive(Clone, Copy, Debug)]
struct RgTrackedState {
    state: RgResourceState,
    /// 上一次 barrier 之后所有的访问
    access: RgAccessType,
}

/// Barrier 计算器
///
/// 按照执行顺序依次喂入每个 pass 的资源使用，记录每个资源当前的状态。
pub struct BarrierCalculator {
    tracked: Vec<RgTrackedState>,
    aspects: Vec<vk::ImageAspectFlags>,
    is_buffer: Vec<bool>,
}

impl BarrierCalculator {
    /// `resources` 是 (初始状态, aspect, 是否 buffer)
    pub fn new(resources: impl IntoIterator<Item = (RgResourceState, vk::ImageAspectFlags, bool)>) -> Self {
        let mut tracked = Vec::new();
        let mut aspects = Vec::new();
        let mut is_buffer = Vec::new();
        for (state, aspect, buffer) in resources {
            tracked.push(RgTrackedState {
                state,
                access: RgAccessType::EXTERNAL,
            });
            aspects.push(aspect);
            is_buffer.push(buffer);
        }
        Self {
            tracked,
            aspects,
            is_buffer,
        }
    }

    /// 资源以 `state`、`access` 被使用之前是否需要 barrier
    ///
    /// 不需要 barrier 时把这次访问并入之前的访问，之后的写入需要等待所有这些读取
    pub fn transition(
        &mut self,
        resource: usize,
        state: RgResourceState,
        access: RgAccessType,
        barriers: &mut PassBarriers,
    ) {
        let current = self.tracked[resource];
        let desc = RgBarrierDesc {
            resource,
            src_state: current.state,
            dst_state: state,
            src: current.access,
            dst: access,
            aspect: self.aspects[resource],
        };

        let needed = if self.is_buffer[resource] {
            desc.buffer_needs_barrier()
        } else {
            desc.image_needs_barrier()
        };

        if needed {
            if self.is_buffer[resource] {
                barriers.buffer_barriers.push(desc);
            } else {
                barriers.image_barriers.push(desc);
            }
            self.tracked[resource] = RgTrackedState { state, access };
        } else {
            self.tracked[resource] = RgTrackedState {
                state,
                access: current.access.union(access),
            };
        }
    }

    #[inline]
    pub fn current_state(&self, resource: usize) -> RgResourceState {
        self.tracked[resource].state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_state::RgPassKind;

    fn access(state: RgResourceState, write: bool) -> RgAccessType {
        state.access(RgPassKind::Graphics, write).unwrap()
    }

    fn image_calculator() -> BarrierCalculator {
        BarrierCalculator::new([(RgResourceState::Uninitialized, vk::ImageAspectFlags::COLOR, false)])
    }

    #[test]
    fn test_image_barrier_layout_change() {
        let mut calc = image_calculator();
        let mut barriers = PassBarriers::default();
        calc.transition(0, RgResourceState::ColorAttachment, access(RgResourceState::ColorAttachment, true), &mut barriers);

        assert_eq!(barriers.image_barriers.len(), 1);
        let barrier = barriers.image_barriers[0];
        assert_eq!(barrier.src_state, RgResourceState::Uninitialized);
        assert_eq!(barrier.src, RgAccessType::EXTERNAL);
        assert_eq!(calc.current_state(0), RgResourceState::ColorAttachment);
    }

    #[test]
    fn test_image_barrier_read_to_read() {
        let mut calc = image_calculator();
        let mut barriers = PassBarriers::default();
        calc.transition(0, RgResourceState::ColorAttachment, access(RgResourceState::ColorAttachment, true), &mut barriers);

        let mut first = PassBarriers::default();
        calc.transition(0, RgResourceState::ShaderReadOnly, access(RgResourceState::ShaderReadOnly, false), &mut first);
        let mut second = PassBarriers::default();
        let compute_read = RgResourceState::ShaderReadOnly.access(RgPassKind::Compute, false).unwrap();
        calc.transition(0, RgResourceState::ShaderReadOnly, compute_read, &mut second);

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn test_write_after_reads_waits_for_all_readers() {
        let mut calc = BarrierCalculator::new([(RgResourceState::ShaderReadOnly, vk::ImageAspectFlags::COLOR, false)]);
        let mut reads = PassBarriers::default();
        calc.transition(0, RgResourceState::ShaderReadOnly, access(RgResourceState::ShaderReadOnly, false), &mut reads);
        let compute_read = RgResourceState::ShaderReadOnly.access(RgPassKind::Compute, false).unwrap();
        calc.transition(0, RgResourceState::ShaderReadOnly, compute_read, &mut reads);
        assert!(reads.is_empty());

        let mut write = PassBarriers::default();
        calc.transition(0, RgResourceState::ColorAttachment, access(RgResourceState::ColorAttachment, true), &mut write);
        assert_eq!(write.len(), 1);
        let barrier = write.image_barriers[0];
        assert!(barrier.src.stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(barrier.src.stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
        assert_eq!(barrier.src.src_access(), vk::AccessFlags2::NONE);
    }

    #[test]
    fn test_buffer_barriers() {
        let mut calc = BarrierCalculator::new([(RgResourceState::Uninitialized, vk::ImageAspectFlags::empty(), true)]);

        // 第一次写入不需要等待
        let mut upload = PassBarriers::default();
        calc.transition(0, RgResourceState::TransferDst, access(RgResourceState::TransferDst, true), &mut upload);
        assert!(upload.is_empty());

        let mut vertex = PassBarriers::default();
        calc.transition(0, RgResourceState::VertexBuffer, access(RgResourceState::VertexBuffer, false), &mut vertex);
        assert_eq!(vertex.buffer_barriers.len(), 1);
        assert_eq!(vertex.buffer_barriers[0].src.src_access(), vk::AccessFlags2::TRANSFER_WRITE);

        // 只读之间即使状态不同也没有 hazard
        let mut uniform = PassBarriers::default();
        calc.transition(0, RgResourceState::UniformBuffer, access(RgResourceState::UniformBuffer, false), &mut uniform);
        assert!(uniform.is_empty());
        assert_eq!(calc.current_state(0), RgResourceState::UniformBuffer);
    }
}
