use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::basic::color::LabelColor;
use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;
use crate::resources::buffer::GfxBuffer;
use crate::resources::layout::GfxIndexType;

/// 命令缓冲封装
///
/// 只负责录制，所有命令都转发给注入的 [`GfxDevice`]。drop 时释放回 command pool。
///
/// # 使用示例
/// ```ignore
/// let cmd = GfxCommandBuffer::new(device.clone(), "my-pass")?;
/// cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "my-pass")?;
/// cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline);
/// // 绘制命令...
/// cmd.end()?;
/// ```
pub struct GfxCommandBuffer {
    device: Rc<dyn GfxDevice>,
    handle: vk::CommandBuffer,
    name: String,
}
impl Drop for GfxCommandBuffer {
    fn drop(&mut self) {
        self.device.free_command_buffer(self.handle);
    }
}
// new & init
impl GfxCommandBuffer {
    pub fn new(device: Rc<dyn GfxDevice>, name: impl AsRef<str>) -> GfxResult<Self> {
        let handle = device.allocate_command_buffer(name.as_ref())?;
        Ok(Self {
            device,
            handle,
            name: name.as_ref().to_string(),
        })
    }

    /// 录制一个 command buffer 并立即提交，等待 queue idle 后返回
    ///
    /// 用于资源上传这种一次性的同步操作
    pub fn one_time_exec<R>(
        device: &Rc<dyn GfxDevice>,
        name: &str,
        func: impl FnOnce(&GfxCommandBuffer) -> GfxResult<R>,
    ) -> GfxResult<R> {
        vela_crate_tools::profile_function!();
        let cmd = Self::new(device.clone(), format!("one-time-{name}"))?;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, name)?;
        let result = func(&cmd)?;
        cmd.end()?;
        device.submit(&[cmd.handle], vk::Fence::null())?;
        device.queue_wait_idle()?;
        Ok(result)
    }
}
// basic 命令
impl GfxCommandBuffer {
    /// 开始录制 command，自动开始一个 debug label
    pub fn begin(&self, usage_flag: vk::CommandBufferUsageFlags, label: &str) -> GfxResult<()> {
        self.device.begin_command_buffer(self.handle, usage_flag)?;
        self.begin_label(label, LabelColor::COLOR_CMD);
        Ok(())
    }

    /// 结束 debug label，然后结束录制
    pub fn end(&self) -> GfxResult<()> {
        self.end_label();
        self.device.end_command_buffer(self.handle)
    }
}
// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn device(&self) -> &Rc<dyn GfxDevice> {
        &self.device
    }
}
// 数据传输类型
impl GfxCommandBuffer {
    /// - command type: action
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    pub fn cmd_copy_buffer(&self, src: &GfxBuffer, dst: &GfxBuffer, regions: &[vk::BufferCopy]) {
        self.device.cmd_copy_buffer(self.handle, src.handle(), dst.handle(), regions);
    }

    /// - command type: action
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    pub fn cmd_copy_buffer_to_image(
        &self,
        src: &GfxBuffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.device.cmd_copy_buffer_to_image(self.handle, src.handle(), dst, dst_layout, regions);
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_blit_image(&self, image: vk::Image, region: &vk::ImageBlit, filter: vk::Filter) {
        self.device.cmd_blit_image(
            self.handle,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(region),
            filter,
        );
    }
}
// 同步
impl GfxCommandBuffer {
    /// - command type: sync
    /// - supported queue types: transfer, graphics, compute
    pub fn image_memory_barrier(&self, barriers: &[GfxImageBarrier]) {
        let barriers = barriers.iter().map(GfxImageBarrier::to_vk).collect_vec();
        self.device.cmd_pipeline_barrier(self.handle, &barriers, &[]);
    }

    /// image 与 buffer 的 barrier 合并到一次调用中
    pub fn memory_barrier(&self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]) {
        if image_barriers.is_empty() && buffer_barriers.is_empty() {
            return;
        }
        let images = image_barriers.iter().map(GfxImageBarrier::to_vk).collect_vec();
        let buffers = buffer_barriers.iter().map(GfxBufferBarrier::to_vk).collect_vec();
        self.device.cmd_pipeline_barrier(self.handle, &images, &buffers);
    }
}
// 绑定与绘制
impl GfxCommandBuffer {
    /// - command type: state
    #[inline]
    pub fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.device.cmd_bind_pipeline(self.handle, bind_point, pipeline);
    }

    /// - command type: state
    #[inline]
    pub fn cmd_bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        self.device.cmd_bind_descriptor_sets(self.handle, bind_point, layout, first_set, sets, dynamic_offsets);
    }

    /// - command type: state
    pub fn cmd_bind_vertex_buffers(&self, first_binding: u32, buffers: &[&GfxBuffer], offsets: &[vk::DeviceSize]) {
        let buffers = buffers.iter().map(|b| b.handle()).collect_vec();
        self.device.cmd_bind_vertex_buffers(self.handle, first_binding, &buffers, offsets);
    }

    /// - command type: state
    #[inline]
    pub fn cmd_bind_index_buffer<T: GfxIndexType>(&self, buffer: &GfxBuffer, offset: vk::DeviceSize) {
        self.device.cmd_bind_index_buffer(self.handle, buffer.handle(), offset, T::VK_INDEX_TYPE);
    }

    /// - command type: state
    #[inline]
    pub fn cmd_push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.device.cmd_push_constants(self.handle, layout, stages, offset, data);
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.device.cmd_draw(self.handle, vertex_count, instance_count, first_vertex, first_instance);
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.device.cmd_draw_indexed(self.handle, index_count, instance_count, first_index, vertex_offset, first_instance);
    }

    /// - command type: action
    /// - supported queue types: compute
    #[inline]
    pub fn cmd_dispatch(&self, group_count: glam::UVec3) {
        self.device.cmd_dispatch(self.handle, group_count.to_array());
    }
}
// debug label
impl GfxCommandBuffer {
    #[inline]
    pub fn begin_label(&self, label: &str, color: glam::Vec4) {
        self.device.cmd_begin_label(self.handle, label, color.to_array());
    }

    #[inline]
    pub fn end_label(&self) {
        self.device.cmd_end_label(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::headless::{HeadlessCommand, HeadlessDevice, HeadlessDeviceDesc};

    #[test]
    fn test_one_time_exec_wraps_label() {
        let headless = Rc::new(HeadlessDevice::new(HeadlessDeviceDesc::default()));
        let device: Rc<dyn GfxDevice> = headless.clone();

        let value = GfxCommandBuffer::one_time_exec(&device, "upload", |cmd| {
            cmd.cmd_dispatch(glam::uvec3(2, 1, 1));
            Ok(42)
        })
        .unwrap();
        assert_eq!(value, 42);

        let commands = headless.submitted_commands();
        assert!(matches!(&commands[0], HeadlessCommand::BeginLabel(l) if l == "upload"));
        assert!(matches!(commands[1], HeadlessCommand::Dispatch { group_count: [2, 1, 1] }));
        assert!(matches!(commands[2], HeadlessCommand::EndLabel));

        // 临时 command buffer 已经释放
        assert_eq!(headless.live_count_of("CommandBuffer"), 0);
    }
}
