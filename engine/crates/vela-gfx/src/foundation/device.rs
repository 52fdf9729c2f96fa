use ash::vk;

use crate::descriptors::descriptor::GfxDescriptorUpdate;
use crate::error::GfxResult;

/// 上层关心的设备限制
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxDeviceLimits {
    /// 注：这个值一定是 power of 2
    pub min_uniform_buffer_offset_alignment: vk::DeviceSize,
    /// 注：这个值一定是 power of 2
    pub min_storage_buffer_offset_alignment: vk::DeviceSize,
    pub max_push_constants_size: u32,
    pub max_image_dimension_2d: u32,
    pub max_image_dimension_3d: u32,
}
impl Default for GfxDeviceLimits {
    /// 和大多数桌面 GPU 一致的保守值
    fn default() -> Self {
        Self {
            min_uniform_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 64,
            max_push_constants_size: 128,
            max_image_dimension_2d: 16384,
            max_image_dimension_3d: 2048,
        }
    }
}

/// 共享 descriptor pool 的容量
///
/// 整个设备只有一个固定大小的 pool，耗尽时直接报错，不会自动扩容
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GfxDescriptorPoolSizes {
    pub max_sets: u32,
    pub uniform_buffers: u32,
    pub uniform_buffers_dynamic: u32,
    pub storage_buffers: u32,
    pub combined_image_samplers: u32,
    pub sampled_images: u32,
    pub storage_images: u32,
    pub samplers: u32,
    /// 为 0 时 pool 中不包含 acceleration structure，避免要求设备开启光追扩展
    pub acceleration_structures: u32,
}
impl Default for GfxDescriptorPoolSizes {
    fn default() -> Self {
        Self {
            max_sets: 256,
            uniform_buffers: 256,
            uniform_buffers_dynamic: 64,
            storage_buffers: 256,
            combined_image_samplers: 512,
            sampled_images: 256,
            storage_images: 128,
            samplers: 64,
            acceleration_structures: 0,
        }
    }
}
impl GfxDescriptorPoolSizes {
    /// 某种 descriptor 类型在 pool 中的容量，未列出的类型容量为 0
    pub fn capacity_of(&self, ty: vk::DescriptorType) -> u32 {
        match ty {
            vk::DescriptorType::UNIFORM_BUFFER => self.uniform_buffers,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => self.uniform_buffers_dynamic,
            vk::DescriptorType::STORAGE_BUFFER => self.storage_buffers,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER => self.combined_image_samplers,
            vk::DescriptorType::SAMPLED_IMAGE => self.sampled_images,
            vk::DescriptorType::STORAGE_IMAGE => self.storage_images,
            vk::DescriptorType::SAMPLER => self.samplers,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR => self.acceleration_structures,
            _ => 0,
        }
    }

    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        [
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::DescriptorType::SAMPLED_IMAGE,
            vk::DescriptorType::STORAGE_IMAGE,
            vk::DescriptorType::SAMPLER,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        ]
        .into_iter()
        .map(|ty| vk::DescriptorPoolSize { ty, descriptor_count: self.capacity_of(ty) })
        .filter(|size| size.descriptor_count > 0)
        .collect()
    }
}

/// 创建 buffer 需要的底层参数
#[derive(Clone, Copy, Debug)]
pub struct GfxBufferDesc<'a> {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub memory_props: vk::MemoryPropertyFlags,
    /// buffer 起始地址的对齐
    pub alignment: vk::DeviceSize,
    /// 是否持久映射到 host
    pub mapped: bool,
    pub name: &'a str,
}

/// 设备与上下文对象
///
/// 内存分配、对象创建、命令录制和提交都经过这个 trait。
/// 核心层只通过 `Rc<dyn GfxDevice>` 使用它，具体实现由外部注入。
///
/// 所有 `cmd_*` 方法只负责录制，`submit` 之后才会在设备上执行。
pub trait GfxDevice {
    fn limits(&self) -> &GfxDeviceLimits;

    /// 后端名字，只用于日志
    fn backend_name(&self) -> &'static str;

    // buffer
    fn create_buffer(&self, desc: &GfxBufferDesc<'_>) -> GfxResult<vk::Buffer>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    /// 写入持久映射的 buffer，写完之后会自动 flush
    fn write_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()>;
    /// 读取持久映射的 buffer
    fn read_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, out: &mut [u8]) -> GfxResult<()>;

    // image
    fn create_image(&self, info: &vk::ImageCreateInfo<'_>, name: &str) -> GfxResult<vk::Image>;
    fn destroy_image(&self, image: vk::Image);
    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>, name: &str) -> GfxResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_sampler(&self, info: &vk::SamplerCreateInfo<'_>, name: &str) -> GfxResult<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);
    /// format 是否支持 linear filter 的 blit，生成 mipmap 时需要
    fn supports_linear_blit(&self, format: vk::Format) -> bool;

    // descriptor
    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
        name: &str,
    ) -> GfxResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    /// 从共享 pool 中分配一个 set；pool 耗尽时返回 [`GfxError::DescriptorPoolExhausted`]
    ///
    /// [`GfxError::DescriptorPoolExhausted`]: crate::error::GfxError::DescriptorPoolExhausted
    fn allocate_descriptor_set(&self, layout: vk::DescriptorSetLayout, name: &str) -> GfxResult<vk::DescriptorSet>;
    fn free_descriptor_set(&self, set: vk::DescriptorSet);
    fn update_descriptor_set(&self, set: vk::DescriptorSet, updates: &[GfxDescriptorUpdate]);

    // pipeline
    fn create_shader_module(&self, code: &[u32], name: &str) -> GfxResult<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
        name: &str,
    ) -> GfxResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
        name: &str,
    ) -> GfxResult<vk::Pipeline>;
    fn create_compute_pipeline(
        &self,
        info: &vk::ComputePipelineCreateInfo<'_>,
        name: &str,
    ) -> GfxResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // command buffer & queue
    fn allocate_command_buffer(&self, name: &str) -> GfxResult<vk::CommandBuffer>;
    fn free_command_buffer(&self, cmd: vk::CommandBuffer);
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, flags: vk::CommandBufferUsageFlags) -> GfxResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()>;
    /// `fence` 可以是 null
    fn submit(&self, cmds: &[vk::CommandBuffer], fence: vk::Fence) -> GfxResult<()>;
    fn queue_wait_idle(&self) -> GfxResult<()>;
    fn wait_idle(&self) -> GfxResult<()>;

    // fence
    fn create_fence(&self, signaled: bool, name: &str) -> GfxResult<vk::Fence>;
    fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()>;
    fn destroy_fence(&self, fence: vk::Fence);

    // 命令录制
    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );
    #[allow(clippy::too_many_arguments)]
    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    );
    fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        image_barriers: &[vk::ImageMemoryBarrier2<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier2<'_>],
    );
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );
    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );
    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, group_count: [u32; 3]);
    fn cmd_begin_label(&self, cmd: vk::CommandBuffer, label: &str, color: [f32; 4]);
    fn cmd_end_label(&self, cmd: vk::CommandBuffer);
}
