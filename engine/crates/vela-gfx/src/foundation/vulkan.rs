//! ash + vk-mem 实现的设备
//!
//! instance / device / queue 由外部创建后注入，这里只负责：
//! - vma allocator
//! - 一个 transient command pool
//! - 全局共享的 descriptor pool（固定大小，不会扩容）
//! - 可选的 debug utils（对象命名与 debug label）

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::CString;
use std::mem::ManuallyDrop;

use ash::vk;
use itertools::Itertools;
use vk_mem::Alloc;

use crate::descriptors::descriptor::{GfxDescriptorInfos, GfxDescriptorUpdate};
use crate::error::{GfxError, GfxResult};
use crate::foundation::device::{GfxBufferDesc, GfxDescriptorPoolSizes, GfxDevice, GfxDeviceLimits};

/// 创建 [`VulkanDevice`] 所需的外部对象
pub struct VulkanDeviceCreateInfo<'a> {
    pub instance: &'a ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: &'a ash::Device,
    pub queue_family_index: u32,
    pub queue: vk::Queue,
    pub descriptor_pool: GfxDescriptorPoolSizes,
    /// instance 开启了 VK_EXT_debug_utils 时才能设为 true
    pub enable_debug_utils: bool,
}

struct VulkanBufferAllocation {
    allocation: vk_mem::Allocation,
    mapped_ptr: Option<*mut u8>,
    size: vk::DeviceSize,
    name: String,
}

pub struct VulkanDevice {
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    allocator: ManuallyDrop<vk_mem::Allocator>,
    debug_utils: Option<ash::ext::debug_utils::Device>,

    queue: vk::Queue,
    command_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,

    limits: GfxDeviceLimits,

    buffers: RefCell<HashMap<vk::Buffer, VulkanBufferAllocation>>,
    images: RefCell<HashMap<vk::Image, vk_mem::Allocation>>,
}

// new & init
impl VulkanDevice {
    /// 由于 vma 的生命周期设定：需要引用 Instance 以及 Device，
    /// 因此外部必须保证在 VulkanDevice drop 之后才销毁 device 与 instance
    pub fn new(ci: VulkanDeviceCreateInfo<'_>) -> GfxResult<Self> {
        vela_crate_tools::profile_function!();

        let props = unsafe { ci.instance.get_physical_device_properties(ci.physical_device) };
        let limits = GfxDeviceLimits {
            min_uniform_buffer_offset_alignment: props.limits.min_uniform_buffer_offset_alignment,
            min_storage_buffer_offset_alignment: props.limits.min_storage_buffer_offset_alignment,
            max_push_constants_size: props.limits.max_push_constants_size,
            max_image_dimension_2d: props.limits.max_image_dimension2_d,
            max_image_dimension_3d: props.limits.max_image_dimension3_d,
        };
        log::info!(
            "vulkan device: {:?}, min ubo offset align = {}",
            props.device_name_as_c_str().unwrap_or_default(),
            limits.min_uniform_buffer_offset_alignment
        );

        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(ci.instance, ci.device, ci.physical_device);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        vma_ci.flags = vk_mem::AllocatorCreateFlags::BUFFER_DEVICE_ADDRESS;
        let allocator = unsafe { vk_mem::Allocator::new(vma_ci) }.map_err(|r| GfxError::vulkan("vmaCreateAllocator", r))?;

        let command_pool = unsafe {
            ci.device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(ci.queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )
        }
        .map_err(|r| GfxError::vulkan("vkCreateCommandPool", r))?;

        let pool_sizes = ci.descriptor_pool.pool_sizes();
        let descriptor_pool = unsafe {
            ci.device.create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::default()
                    .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
                    .max_sets(ci.descriptor_pool.max_sets)
                    .pool_sizes(&pool_sizes),
                None,
            )
        };
        let descriptor_pool = match descriptor_pool {
            Ok(pool) => pool,
            Err(r) => {
                unsafe { ci.device.destroy_command_pool(command_pool, None) };
                return Err(GfxError::vulkan("vkCreateDescriptorPool", r));
            }
        };

        let debug_utils = ci.enable_debug_utils.then(|| ash::ext::debug_utils::Device::new(ci.instance, ci.device));

        Ok(Self {
            instance: ci.instance.clone(),
            physical_device: ci.physical_device,
            device: ci.device.clone(),
            allocator: ManuallyDrop::new(allocator),
            debug_utils,
            queue: ci.queue,
            command_pool,
            descriptor_pool,
            limits,
            buffers: RefCell::new(HashMap::new()),
            images: RefCell::new(HashMap::new()),
        })
    }
}
impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("destroying vulkan device resources");
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("device_wait_idle failed during teardown: {e}");
            }

            for (buffer, mut alloc) in self.buffers.get_mut().drain() {
                log::warn!("buffer `{}` leaked until device teardown", alloc.name);
                if alloc.mapped_ptr.is_some() {
                    self.allocator.unmap_memory(&mut alloc.allocation);
                }
                self.allocator.destroy_buffer(buffer, &mut alloc.allocation);
            }
            for (image, mut alloc) in self.images.get_mut().drain() {
                log::warn!("image {image:?} leaked until device teardown");
                self.allocator.destroy_image(image, &mut alloc);
            }

            self.device.destroy_descriptor_pool(self.descriptor_pool, None);
            self.device.destroy_command_pool(self.command_pool, None);
            ManuallyDrop::drop(&mut self.allocator);
        }
    }
}
// tools
impl VulkanDevice {
    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }

    fn set_debug_name(&self, handle: impl vk::Handle, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name.replace('\0', "")) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default().object_handle(handle).object_name(&name);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&info) } {
            log::warn!("failed to set debug name {name:?}: {e}");
        }
    }

    fn allocation_info(memory_props: vk::MemoryPropertyFlags, mapped: bool) -> vk_mem::AllocationCreateInfo {
        let host_visible = memory_props.contains(vk::MemoryPropertyFlags::HOST_VISIBLE);
        vk_mem::AllocationCreateInfo {
            usage: if host_visible {
                vk_mem::MemoryUsage::AutoPreferHost
            } else {
                vk_mem::MemoryUsage::AutoPreferDevice
            },
            flags: if mapped || host_visible {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            required_flags: memory_props,
            ..Default::default()
        }
    }

    fn mapped_range(
        alloc: &VulkanBufferAllocation,
        offset: vk::DeviceSize,
        len: usize,
    ) -> GfxResult<*mut u8> {
        let ptr = alloc.mapped_ptr.ok_or_else(|| GfxError::NotMapped { name: alloc.name.clone() }.logged())?;
        let end = offset.checked_add(len as vk::DeviceSize);
        if end.map_or(true, |end| end > alloc.size) {
            return Err(GfxError::OutOfBounds {
                name: alloc.name.clone(),
                offset,
                len: len as vk::DeviceSize,
                size: alloc.size,
            }
            .logged());
        }
        // SAFETY: 上面已经检查过范围
        Ok(unsafe { ptr.add(offset as usize) })
    }
}

impl GfxDevice for VulkanDevice {
    fn limits(&self) -> &GfxDeviceLimits {
        &self.limits
    }

    fn backend_name(&self) -> &'static str {
        "vulkan"
    }

    fn create_buffer(&self, desc: &GfxBufferDesc<'_>) -> GfxResult<vk::Buffer> {
        vela_crate_tools::profile_function!();
        if desc.mapped && !desc.memory_props.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(GfxError::InvalidParameter(format!(
                "buffer `{}` requests mapping without HOST_VISIBLE memory",
                desc.name
            ))
            .logged());
        }

        let buffer_ci = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let alloc_ci = Self::allocation_info(desc.memory_props, desc.mapped);

        let (buffer, mut allocation) =
            unsafe { self.allocator.create_buffer_with_alignment(&buffer_ci, &alloc_ci, desc.alignment) }
                .map_err(|r| GfxError::from_alloc(desc.name, desc.size, r).logged())?;

        let mapped_ptr = if desc.mapped {
            match unsafe { self.allocator.map_memory(&mut allocation) } {
                Ok(ptr) => Some(ptr),
                Err(r) => {
                    unsafe { self.allocator.destroy_buffer(buffer, &mut allocation) };
                    return Err(GfxError::vulkan(format!("map `{}`", desc.name), r).logged());
                }
            }
        } else {
            None
        };

        self.set_debug_name(buffer, &format!("Buffer::{}", desc.name));
        self.buffers.borrow_mut().insert(
            buffer,
            VulkanBufferAllocation {
                allocation,
                mapped_ptr,
                size: desc.size,
                name: desc.name.to_string(),
            },
        );
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let Some(mut alloc) = self.buffers.borrow_mut().remove(&buffer) else {
            log::error!("destroy of unknown buffer {buffer:?}");
            return;
        };
        unsafe {
            if alloc.mapped_ptr.is_some() {
                self.allocator.unmap_memory(&mut alloc.allocation);
            }
            self.allocator.destroy_buffer(buffer, &mut alloc.allocation);
        }
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        let buffers = self.buffers.borrow();
        let alloc = buffers
            .get(&buffer)
            .ok_or_else(|| GfxError::InvalidParameter(format!("write to unknown buffer {buffer:?}")))?;
        let dst = Self::mapped_range(alloc, offset, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        self.allocator
            .flush_allocation(&alloc.allocation, offset, data.len() as vk::DeviceSize)
            .map_err(|r| GfxError::vulkan(format!("flush `{}`", alloc.name), r))
    }

    fn read_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, out: &mut [u8]) -> GfxResult<()> {
        let buffers = self.buffers.borrow();
        let alloc = buffers
            .get(&buffer)
            .ok_or_else(|| GfxError::InvalidParameter(format!("read from unknown buffer {buffer:?}")))?;
        let src = Self::mapped_range(alloc, offset, out.len())?;
        self.allocator
            .invalidate_allocation(&alloc.allocation, offset, out.len() as vk::DeviceSize)
            .map_err(|r| GfxError::vulkan(format!("invalidate `{}`", alloc.name), r))?;
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>, name: &str) -> GfxResult<vk::Image> {
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (image, allocation) = unsafe { self.allocator.create_image(info, &alloc_ci) }.map_err(|r| {
            let size = info.extent.width as vk::DeviceSize * info.extent.height as vk::DeviceSize;
            GfxError::from_alloc(name, size, r).logged()
        })?;
        self.set_debug_name(image, &format!("Image::{name}"));
        self.images.borrow_mut().insert(image, allocation);
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        let Some(mut allocation) = self.images.borrow_mut().remove(&image) else {
            log::error!("destroy of unknown image {image:?}");
            return;
        };
        unsafe { self.allocator.destroy_image(image, &mut allocation) };
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>, name: &str) -> GfxResult<vk::ImageView> {
        let view = unsafe { self.device.create_image_view(info, None) }
            .map_err(|r| GfxError::vulkan(format!("create image view `{name}`"), r).logged())?;
        self.set_debug_name(view, &format!("ImageView::{name}"));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_sampler(&self, info: &vk::SamplerCreateInfo<'_>, name: &str) -> GfxResult<vk::Sampler> {
        let sampler = unsafe { self.device.create_sampler(info, None) }
            .map_err(|r| GfxError::vulkan(format!("create sampler `{name}`"), r).logged())?;
        self.set_debug_name(sampler, &format!("Sampler::{name}"));
        Ok(sampler)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    fn supports_linear_blit(&self, format: vk::Format) -> bool {
        let props = unsafe { self.instance.get_physical_device_format_properties(self.physical_device, format) };
        props.optimal_tiling_features.contains(
            vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
                | vk::FormatFeatureFlags::BLIT_SRC
                | vk::FormatFeatureFlags::BLIT_DST,
        )
    }

    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
        name: &str,
    ) -> GfxResult<vk::DescriptorSetLayout> {
        let layout = unsafe { self.device.create_descriptor_set_layout(info, None) }
            .map_err(|r| GfxError::vulkan(format!("create descriptor set layout `{name}`"), r).logged())?;
        self.set_debug_name(layout, &format!("DescriptorSetLayout::{name}"));
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn allocate_descriptor_set(&self, layout: vk::DescriptorSetLayout, name: &str) -> GfxResult<vk::DescriptorSet> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(std::slice::from_ref(&layout));
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(|r| match r {
            vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                GfxError::DescriptorPoolExhausted { layout: name.to_string() }.logged()
            }
            r => GfxError::vulkan(format!("allocate descriptor set for `{name}`"), r).logged(),
        })?;
        let set = sets.into_iter().next().ok_or_else(|| {
            GfxError::vulkan(format!("allocate descriptor set for `{name}`"), vk::Result::ERROR_UNKNOWN)
        })?;
        self.set_debug_name(set, &format!("DescriptorSet::{name}"));
        Ok(set)
    }

    fn free_descriptor_set(&self, set: vk::DescriptorSet) {
        if let Err(e) = unsafe { self.device.free_descriptor_sets(self.descriptor_pool, &[set]) } {
            log::error!("failed to free descriptor set {set:?}: {e}");
        }
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, updates: &[GfxDescriptorUpdate]) {
        let mut accel_writes = updates
            .iter()
            .filter_map(|u| match &u.infos {
                GfxDescriptorInfos::AccelerationStructures(accels) => {
                    Some(vk::WriteDescriptorSetAccelerationStructureKHR::default().acceleration_structures(accels))
                }
                _ => None,
            })
            .collect_vec();
        let mut accel_iter = accel_writes.iter_mut();

        let writes = updates
            .iter()
            .map(|u| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(u.binding)
                    .dst_array_element(u.array_element)
                    .descriptor_type(u.descriptor_type);
                match &u.infos {
                    GfxDescriptorInfos::Buffers(infos) => write.buffer_info(infos),
                    GfxDescriptorInfos::Images(infos) => write.image_info(infos),
                    GfxDescriptorInfos::AccelerationStructures(accels) => match accel_iter.next() {
                        Some(ext) => {
                            // acceleration structure 的数量只能通过 descriptor_count 传递
                            let mut write = write.push_next(ext);
                            write.descriptor_count = accels.len() as u32;
                            write
                        }
                        None => write,
                    },
                }
            })
            .collect_vec();

        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
    }

    fn create_shader_module(&self, code: &[u32], name: &str) -> GfxResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { self.device.create_shader_module(&info, None) }.map_err(|r| match r {
            vk::Result::ERROR_INVALID_SHADER_NV => GfxError::InvalidShaderCode {
                name: name.to_string(),
                reason: "rejected by the driver",
            }
            .logged(),
            r => GfxError::vulkan(format!("create shader module `{name}`"), r).logged(),
        })?;
        self.set_debug_name(module, &format!("ShaderModule::{name}"));
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) };
    }

    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
        name: &str,
    ) -> GfxResult<vk::PipelineLayout> {
        let layout = unsafe { self.device.create_pipeline_layout(info, None) }
            .map_err(|r| GfxError::vulkan(format!("create pipeline layout `{name}`"), r).logged())?;
        self.set_debug_name(layout, &format!("PipelineLayout::{name}"));
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
        name: &str,
    ) -> GfxResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
        }
        .map_err(|(_, r)| GfxError::vulkan(format!("create graphics pipeline `{name}`"), r).logged())?;
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            GfxError::vulkan(format!("create graphics pipeline `{name}`"), vk::Result::ERROR_UNKNOWN)
        })?;
        self.set_debug_name(pipeline, &format!("Pipeline::{name}"));
        Ok(pipeline)
    }

    fn create_compute_pipeline(&self, info: &vk::ComputePipelineCreateInfo<'_>, name: &str) -> GfxResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
        }
        .map_err(|(_, r)| GfxError::vulkan(format!("create compute pipeline `{name}`"), r).logged())?;
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            GfxError::vulkan(format!("create compute pipeline `{name}`"), vk::Result::ERROR_UNKNOWN)
        })?;
        self.set_debug_name(pipeline, &format!("Pipeline::{name}"));
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn allocate_command_buffer(&self, name: &str) -> GfxResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmds = unsafe { self.device.allocate_command_buffers(&info) }
            .map_err(|r| GfxError::vulkan(format!("allocate command buffer `{name}`"), r).logged())?;
        let cmd = cmds.into_iter().next().ok_or_else(|| {
            GfxError::vulkan(format!("allocate command buffer `{name}`"), vk::Result::ERROR_UNKNOWN)
        })?;
        self.set_debug_name(cmd, &format!("CommandBuffer::{name}"));
        Ok(cmd)
    }

    fn free_command_buffer(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(self.command_pool, &[cmd]) };
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, flags: vk::CommandBufferUsageFlags) -> GfxResult<()> {
        unsafe { self.device.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default().flags(flags)) }
            .map_err(|r| GfxError::vulkan("vkBeginCommandBuffer", r).logged())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }.map_err(|r| GfxError::vulkan("vkEndCommandBuffer", r).logged())
    }

    fn submit(&self, cmds: &[vk::CommandBuffer], fence: vk::Fence) -> GfxResult<()> {
        let submit_info = vk::SubmitInfo::default().command_buffers(cmds);
        unsafe { self.device.queue_submit(self.queue, std::slice::from_ref(&submit_info), fence) }
            .map_err(|r| GfxError::vulkan("vkQueueSubmit", r).logged())
    }

    fn queue_wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.queue_wait_idle(self.queue) }.map_err(|r| GfxError::vulkan("vkQueueWaitIdle", r).logged())
    }

    fn wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(|r| GfxError::vulkan("vkDeviceWaitIdle", r).logged())
    }

    fn create_fence(&self, signaled: bool, name: &str) -> GfxResult<vk::Fence> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { self.device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
            .map_err(|r| GfxError::vulkan(format!("create fence `{name}`"), r).logged())?;
        self.set_debug_name(fence, &format!("Fence::{name}"));
        Ok(fence)
    }

    fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()> {
        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(GfxError::Timeout(timeout_ns).logged()),
            Err(r) => Err(GfxError::vulkan("vkWaitForFences", r).logged()),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }.map_err(|r| GfxError::vulkan("vkResetFences", r).logged())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, regions) };
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe { self.device.cmd_copy_buffer_to_image(cmd, src, dst, dst_layout, regions) };
    }

    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        unsafe { self.device.cmd_blit_image(cmd, src, src_layout, dst, dst_layout, regions, filter) };
    }

    fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        image_barriers: &[vk::ImageMemoryBarrier2<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier2<'_>],
    ) {
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(image_barriers)
            .buffer_memory_barriers(buffer_barriers)
            .dependency_flags(vk::DependencyFlags::BY_REGION);
        unsafe { self.device.cmd_pipeline_barrier2(cmd, &dependency_info) };
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(cmd, bind_point, pipeline) };
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(cmd, bind_point, layout, first_set, sets, dynamic_offsets);
        }
    }

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe { self.device.cmd_bind_vertex_buffers(cmd, first_binding, buffers, offsets) };
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe { self.device.cmd_bind_index_buffer(cmd, buffer, offset, index_type) };
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe { self.device.cmd_push_constants(cmd, layout, stages, offset, data) };
    }

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe { self.device.cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance) };
    }

    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(cmd, index_count, instance_count, first_index, vertex_offset, first_instance);
        }
    }

    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, group_count: [u32; 3]) {
        unsafe { self.device.cmd_dispatch(cmd, group_count[0], group_count[1], group_count[2]) };
    }

    fn cmd_begin_label(&self, cmd: vk::CommandBuffer, label: &str, color: [f32; 4]) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(label.replace('\0', "")) else {
            return;
        };
        unsafe {
            debug_utils
                .cmd_begin_debug_utils_label(cmd, &vk::DebugUtilsLabelEXT::default().label_name(&name).color(color));
        }
    }

    fn cmd_end_label(&self, cmd: vk::CommandBuffer) {
        if let Some(debug_utils) = &self.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(cmd) };
        }
    }
}
