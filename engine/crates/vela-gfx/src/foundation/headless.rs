//! 用主机内存模拟的设备
//!
//! 不依赖任何 GPU 与驱动：buffer 与 image 是字节数组，copy / blit 命令在 `submit` 时执行，
//! 其余命令（barrier、bind、draw、dispatch、label）只记录下来，测试可以检查提交过的命令序列。
//! fence 在 submit 时立即 signal。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use ash::vk;
use ash::vk::Handle;

use crate::descriptors::descriptor::GfxDescriptorUpdate;
use crate::error::{GfxError, GfxResult};
use crate::foundation::device::{GfxBufferDesc, GfxDescriptorPoolSizes, GfxDevice, GfxDeviceLimits};
use crate::pipelines::shader::SPIRV_MAGIC;
use crate::resources::image::VulkanFormatUtils;

/// headless 设备的配置
#[derive(Clone, Copy, Debug)]
pub struct HeadlessDeviceDesc {
    pub limits: GfxDeviceLimits,
    /// buffer 与 image 总共可以占用的字节数，超出后分配返回 OOM
    pub memory_budget: vk::DeviceSize,
    pub descriptor_pool: GfxDescriptorPoolSizes,
}
impl Default for HeadlessDeviceDesc {
    fn default() -> Self {
        Self {
            limits: GfxDeviceLimits::default(),
            memory_budget: 256 * 1024 * 1024,
            descriptor_pool: GfxDescriptorPoolSizes::default(),
        }
    }
}

/// 提交过的命令，按录制顺序保存
#[derive(Clone, Debug)]
pub enum HeadlessCommand {
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<vk::BufferCopy>,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: Vec<vk::BufferImageCopy>,
    },
    BlitImage {
        src: vk::Image,
        dst: vk::Image,
        src_mip: u32,
        dst_mip: u32,
    },
    ImageBarrier {
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_stage: vk::PipelineStageFlags2,
        dst_stage: vk::PipelineStageFlags2,
        base_mip: u32,
    },
    BufferBarrier {
        buffer: vk::Buffer,
        src_access: vk::AccessFlags2,
        dst_access: vk::AccessFlags2,
    },
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    },
    PushConstants {
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    Dispatch {
        group_count: [u32; 3],
    },
    BeginLabel(String),
    EndLabel,
}

struct HeadlessBuffer {
    data: Vec<u8>,
    mapped: bool,
    name: String,
}

struct HeadlessImage {
    extent: vk::Extent3D,
    texel_size: usize,
    /// 每个 mip level 一段内存
    levels: Vec<Vec<u8>>,
    size: vk::DeviceSize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum RecordingState {
    Initial,
    Recording,
    Executable,
}

struct HeadlessRecording {
    state: RecordingState,
    commands: Vec<HeadlessCommand>,
}

struct HeadlessDescriptorSet {
    layout: vk::DescriptorSetLayout,
    written_bindings: Vec<u32>,
}

pub struct HeadlessDevice {
    desc: HeadlessDeviceDesc,

    next_handle: Cell<u64>,
    memory_used: Cell<vk::DeviceSize>,

    /// 所有存活对象：raw handle -> 对象种类
    live: RefCell<HashMap<u64, &'static str>>,

    buffers: RefCell<HashMap<vk::Buffer, HeadlessBuffer>>,
    images: RefCell<HashMap<vk::Image, HeadlessImage>>,
    set_layouts: RefCell<HashMap<vk::DescriptorSetLayout, Vec<(vk::DescriptorType, u32)>>>,
    descriptor_sets: RefCell<HashMap<vk::DescriptorSet, HeadlessDescriptorSet>>,
    /// 共享 pool 中每种 descriptor 已经使用的数量
    pool_usage: RefCell<HashMap<vk::DescriptorType, u32>>,
    recordings: RefCell<HashMap<vk::CommandBuffer, HeadlessRecording>>,
    fences: RefCell<HashMap<vk::Fence, bool>>,

    submitted: RefCell<Vec<HeadlessCommand>>,
    submit_count: Cell<usize>,
}

// new & init
impl HeadlessDevice {
    pub fn new(desc: HeadlessDeviceDesc) -> Self {
        log::info!(
            "headless device created: budget = {} bytes, descriptor pool = {} sets",
            desc.memory_budget,
            desc.descriptor_pool.max_sets
        );
        Self {
            desc,
            next_handle: Cell::new(1),
            memory_used: Cell::new(0),
            live: RefCell::new(HashMap::new()),
            buffers: RefCell::new(HashMap::new()),
            images: RefCell::new(HashMap::new()),
            set_layouts: RefCell::new(HashMap::new()),
            descriptor_sets: RefCell::new(HashMap::new()),
            pool_usage: RefCell::new(HashMap::new()),
            recordings: RefCell::new(HashMap::new()),
            fences: RefCell::new(HashMap::new()),
            submitted: RefCell::new(Vec::new()),
            submit_count: Cell::new(0),
        }
    }
}
// 检查接口，主要给测试使用
impl HeadlessDevice {
    /// 还没有被销毁的对象数量
    pub fn live_object_count(&self) -> usize {
        self.live.borrow().len()
    }

    /// 某一种对象的存活数量，例如 `"Buffer"`、`"Image"`
    pub fn live_count_of(&self, kind: &str) -> usize {
        self.live.borrow().values().filter(|k| **k == kind).count()
    }

    pub fn memory_used(&self) -> vk::DeviceSize {
        self.memory_used.get()
    }

    pub fn allocated_descriptor_sets(&self) -> usize {
        self.descriptor_sets.borrow().len()
    }

    /// 某个 descriptor set 已经写入过的 binding
    pub fn written_bindings(&self, set: vk::DescriptorSet) -> Vec<u32> {
        self.descriptor_sets.borrow().get(&set).map(|s| s.written_bindings.clone()).unwrap_or_default()
    }

    /// 所有提交过的命令
    pub fn submitted_commands(&self) -> Vec<HeadlessCommand> {
        self.submitted.borrow().clone()
    }

    pub fn clear_submitted_commands(&self) {
        self.submitted.borrow_mut().clear();
    }

    pub fn submit_count(&self) -> usize {
        self.submit_count.get()
    }

    /// 读取 image 某个 mip level 的内容
    pub fn image_level_data(&self, image: vk::Image, mip: u32) -> Option<Vec<u8>> {
        self.images.borrow().get(&image).and_then(|img| img.levels.get(mip as usize).cloned())
    }

    /// 读取 buffer 的全部内容，不要求 buffer 被映射
    pub fn buffer_data(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        self.buffers.borrow().get(&buffer).map(|b| b.data.clone())
    }
}
// tools
impl HeadlessDevice {
    fn new_handle<H: Handle>(&self, kind: &'static str) -> H {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        self.live.borrow_mut().insert(raw, kind);
        H::from_raw(raw)
    }

    fn release_handle(&self, raw: u64, kind: &'static str) {
        match self.live.borrow_mut().remove(&raw) {
            Some(live_kind) if live_kind == kind => {}
            Some(live_kind) => log::error!("headless: destroying {live_kind} {raw:#x} as {kind}"),
            None => log::error!("headless: {kind} {raw:#x} destroyed twice or never created"),
        }
    }

    fn is_live(&self, raw: u64, kind: &'static str) -> bool {
        self.live.borrow().get(&raw).is_some_and(|k| *k == kind)
    }

    fn reserve_memory(&self, name: &str, size: vk::DeviceSize) -> GfxResult<()> {
        let used = self.memory_used.get();
        if used + size > self.desc.memory_budget {
            return Err(GfxError::OutOfMemory { name: name.to_string(), size }.logged());
        }
        self.memory_used.set(used + size);
        Ok(())
    }

    fn record(&self, cmd: vk::CommandBuffer, command: HeadlessCommand) {
        let mut recordings = self.recordings.borrow_mut();
        match recordings.get_mut(&cmd) {
            Some(rec) if rec.state == RecordingState::Recording => rec.commands.push(command),
            Some(rec) => log::error!("headless: {command:?} recorded while command buffer is {:?}", rec.state),
            None => log::error!("headless: {command:?} recorded into unknown command buffer"),
        }
    }

    fn execute(&self, command: &HeadlessCommand) -> GfxResult<()> {
        match command {
            HeadlessCommand::CopyBuffer { src, dst, regions } => {
                let mut buffers = self.buffers.borrow_mut();
                for region in regions {
                    let bytes = {
                        let src = buffers.get(src).ok_or_else(|| unknown("copy source buffer"))?;
                        slice_of(&src.data, region.src_offset, region.size, &src.name)?.to_vec()
                    };
                    let dst = buffers.get_mut(dst).ok_or_else(|| unknown("copy destination buffer"))?;
                    let range = checked_range(dst.data.len(), region.dst_offset, region.size, &dst.name)?;
                    dst.data[range].copy_from_slice(&bytes);
                }
            }
            HeadlessCommand::CopyBufferToImage { src, dst, regions, .. } => {
                let buffers = self.buffers.borrow();
                let mut images = self.images.borrow_mut();
                let src = buffers.get(src).ok_or_else(|| unknown("copy source buffer"))?;
                let dst = images.get_mut(dst).ok_or_else(|| unknown("copy destination image"))?;
                for region in regions {
                    let mip = region.image_subresource.mip_level as usize;
                    let level = dst.levels.get_mut(mip).ok_or_else(|| unknown("image mip level"))?;
                    if region.image_offset != vk::Offset3D::default() {
                        return Err(GfxError::InvalidParameter(
                            "headless device only copies whole mip levels".to_string(),
                        ));
                    }
                    let len = level.len() as vk::DeviceSize;
                    level.copy_from_slice(slice_of(&src.data, region.buffer_offset, len, &src.name)?);
                }
            }
            HeadlessCommand::BlitImage { src, dst, src_mip, dst_mip } => {
                let mut images = self.images.borrow_mut();
                let (src_extent, texel, src_level) = {
                    let img = images.get(src).ok_or_else(|| unknown("blit source image"))?;
                    let level = img.levels.get(*src_mip as usize).ok_or_else(|| unknown("blit source mip"))?;
                    (mip_extent(img.extent, *src_mip), img.texel_size, level.clone())
                };
                let img = images.get_mut(dst).ok_or_else(|| unknown("blit destination image"))?;
                let dst_extent = mip_extent(img.extent, *dst_mip);
                let level = img.levels.get_mut(*dst_mip as usize).ok_or_else(|| unknown("blit destination mip"))?;
                blit_nearest(&src_level, src_extent, level, dst_extent, texel);
            }
            _ => {}
        }
        Ok(())
    }
}

fn unknown(what: &str) -> GfxError {
    GfxError::InvalidParameter(format!("headless: unknown {what}")).logged()
}

fn checked_range(
    len: usize,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    name: &str,
) -> GfxResult<std::ops::Range<usize>> {
    let end = offset.checked_add(size).filter(|end| *end <= len as vk::DeviceSize);
    match end {
        Some(end) => Ok(offset as usize..end as usize),
        None => Err(GfxError::OutOfBounds {
            name: name.to_string(),
            offset,
            len: size,
            size: len as vk::DeviceSize,
        }
        .logged()),
    }
}

fn slice_of<'a>(data: &'a [u8], offset: vk::DeviceSize, size: vk::DeviceSize, name: &str) -> GfxResult<&'a [u8]> {
    let range = checked_range(data.len(), offset, size, name)?;
    Ok(&data[range])
}

fn mip_extent(extent: vk::Extent3D, mip: u32) -> vk::Extent3D {
    vk::Extent3D {
        width: (extent.width >> mip).max(1),
        height: (extent.height >> mip).max(1),
        depth: (extent.depth >> mip).max(1),
    }
}

fn texel_count(extent: vk::Extent3D) -> usize {
    extent.width as usize * extent.height as usize * extent.depth as usize
}

/// 最近邻缩放，足够验证 mip 链的每一级都被写入
fn blit_nearest(src: &[u8], src_extent: vk::Extent3D, dst: &mut [u8], dst_extent: vk::Extent3D, texel: usize) {
    for z in 0..dst_extent.depth {
        for y in 0..dst_extent.height {
            for x in 0..dst_extent.width {
                let sx = (x * src_extent.width / dst_extent.width) as usize;
                let sy = (y * src_extent.height / dst_extent.height) as usize;
                let sz = (z * src_extent.depth / dst_extent.depth) as usize;
                let src_index = (sz * src_extent.height as usize + sy) * src_extent.width as usize + sx;
                let dst_index =
                    (z as usize * dst_extent.height as usize + y as usize) * dst_extent.width as usize + x as usize;
                dst[dst_index * texel..(dst_index + 1) * texel]
                    .copy_from_slice(&src[src_index * texel..(src_index + 1) * texel]);
            }
        }
    }
}

impl GfxDevice for HeadlessDevice {
    fn limits(&self) -> &GfxDeviceLimits {
        &self.desc.limits
    }

    fn backend_name(&self) -> &'static str {
        "headless"
    }

    fn create_buffer(&self, desc: &GfxBufferDesc<'_>) -> GfxResult<vk::Buffer> {
        if desc.size == 0 {
            return Err(GfxError::InvalidParameter(format!("buffer `{}` has zero size", desc.name)).logged());
        }
        self.reserve_memory(desc.name, desc.size)?;
        let buffer: vk::Buffer = self.new_handle("Buffer");
        self.buffers.borrow_mut().insert(
            buffer,
            HeadlessBuffer {
                data: vec![0; desc.size as usize],
                mapped: desc.mapped,
                name: desc.name.to_string(),
            },
        );
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        if let Some(b) = self.buffers.borrow_mut().remove(&buffer) {
            self.memory_used.set(self.memory_used.get() - b.data.len() as vk::DeviceSize);
        }
        self.release_handle(buffer.as_raw(), "Buffer");
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        let mut buffers = self.buffers.borrow_mut();
        let b = buffers.get_mut(&buffer).ok_or_else(|| unknown("buffer"))?;
        if !b.mapped {
            return Err(GfxError::NotMapped { name: b.name.clone() }.logged());
        }
        let range = checked_range(b.data.len(), offset, data.len() as vk::DeviceSize, &b.name)?;
        b.data[range].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, out: &mut [u8]) -> GfxResult<()> {
        let buffers = self.buffers.borrow();
        let b = buffers.get(&buffer).ok_or_else(|| unknown("buffer"))?;
        if !b.mapped {
            return Err(GfxError::NotMapped { name: b.name.clone() }.logged());
        }
        out.copy_from_slice(slice_of(&b.data, offset, out.len() as vk::DeviceSize, &b.name)?);
        Ok(())
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>, name: &str) -> GfxResult<vk::Image> {
        let texel_size = VulkanFormatUtils::pixel_size_in_bytes(info.format).unwrap_or(4);
        let levels = (0..info.mip_levels.max(1))
            .map(|mip| vec![0u8; texel_count(mip_extent(info.extent, mip)) * texel_size])
            .collect::<Vec<_>>();
        let size: vk::DeviceSize = levels.iter().map(|l| l.len() as vk::DeviceSize).sum();
        self.reserve_memory(name, size)?;

        let image: vk::Image = self.new_handle("Image");
        self.images.borrow_mut().insert(
            image,
            HeadlessImage {
                extent: info.extent,
                texel_size,
                levels,
                size,
            },
        );
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        if let Some(img) = self.images.borrow_mut().remove(&image) {
            self.memory_used.set(self.memory_used.get() - img.size);
        }
        self.release_handle(image.as_raw(), "Image");
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>, name: &str) -> GfxResult<vk::ImageView> {
        if !self.images.borrow().contains_key(&info.image) {
            return Err(GfxError::InvalidParameter(format!("image view `{name}` targets an unknown image")).logged());
        }
        Ok(self.new_handle("ImageView"))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.release_handle(view.as_raw(), "ImageView");
    }

    fn create_sampler(&self, _info: &vk::SamplerCreateInfo<'_>, _name: &str) -> GfxResult<vk::Sampler> {
        Ok(self.new_handle("Sampler"))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.release_handle(sampler.as_raw(), "Sampler");
    }

    fn supports_linear_blit(&self, _format: vk::Format) -> bool {
        true
    }

    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
        _name: &str,
    ) -> GfxResult<vk::DescriptorSetLayout> {
        let bindings = if info.binding_count == 0 || info.p_bindings.is_null() {
            Vec::new()
        } else {
            // SAFETY: create info 由调用者基于存活的 slice 构造
            unsafe { std::slice::from_raw_parts(info.p_bindings, info.binding_count as usize) }
                .iter()
                .map(|b| (b.descriptor_type, b.descriptor_count))
                .collect()
        };
        let layout: vk::DescriptorSetLayout = self.new_handle("DescriptorSetLayout");
        self.set_layouts.borrow_mut().insert(layout, bindings);
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.set_layouts.borrow_mut().remove(&layout);
        self.release_handle(layout.as_raw(), "DescriptorSetLayout");
    }

    fn allocate_descriptor_set(&self, layout: vk::DescriptorSetLayout, name: &str) -> GfxResult<vk::DescriptorSet> {
        let layouts = self.set_layouts.borrow();
        let bindings = layouts.get(&layout).ok_or_else(|| unknown("descriptor set layout"))?;
        let pool = &self.desc.descriptor_pool;

        let exhausted = || GfxError::DescriptorPoolExhausted { layout: name.to_string() }.logged();
        if self.descriptor_sets.borrow().len() as u32 >= pool.max_sets {
            return Err(exhausted());
        }
        let mut usage = self.pool_usage.borrow_mut();
        for (ty, count) in bindings {
            if usage.get(ty).copied().unwrap_or(0) + count > pool.capacity_of(*ty) {
                return Err(exhausted());
            }
        }
        for (ty, count) in bindings {
            *usage.entry(*ty).or_insert(0) += count;
        }

        let set: vk::DescriptorSet = self.new_handle("DescriptorSet");
        self.descriptor_sets.borrow_mut().insert(
            set,
            HeadlessDescriptorSet {
                layout,
                written_bindings: Vec::new(),
            },
        );
        Ok(set)
    }

    fn free_descriptor_set(&self, set: vk::DescriptorSet) {
        if let Some(s) = self.descriptor_sets.borrow_mut().remove(&set) {
            let layouts = self.set_layouts.borrow();
            let mut usage = self.pool_usage.borrow_mut();
            for (ty, count) in layouts.get(&s.layout).into_iter().flatten() {
                if let Some(used) = usage.get_mut(ty) {
                    *used = used.saturating_sub(*count);
                }
            }
        }
        self.release_handle(set.as_raw(), "DescriptorSet");
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, updates: &[GfxDescriptorUpdate]) {
        let mut sets = self.descriptor_sets.borrow_mut();
        let Some(s) = sets.get_mut(&set) else {
            log::error!("headless: update of unknown descriptor set {:#x}", set.as_raw());
            return;
        };
        for update in updates {
            if !s.written_bindings.contains(&update.binding) {
                s.written_bindings.push(update.binding);
            }
        }
    }

    fn create_shader_module(&self, code: &[u32], name: &str) -> GfxResult<vk::ShaderModule> {
        if code.first() != Some(&SPIRV_MAGIC) {
            return Err(GfxError::InvalidShaderCode {
                name: name.to_string(),
                reason: "missing SPIR-V magic number",
            }
            .logged());
        }
        Ok(self.new_handle("ShaderModule"))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.release_handle(module.as_raw(), "ShaderModule");
    }

    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
        name: &str,
    ) -> GfxResult<vk::PipelineLayout> {
        if info.set_layout_count > 0 && !info.p_set_layouts.is_null() {
            // SAFETY: create info 由调用者基于存活的 slice 构造
            let set_layouts = unsafe { std::slice::from_raw_parts(info.p_set_layouts, info.set_layout_count as usize) };
            if let Some(missing) = set_layouts.iter().find(|l| !self.is_live(l.as_raw(), "DescriptorSetLayout")) {
                return Err(GfxError::InvalidParameter(format!(
                    "pipeline layout `{name}` references unknown set layout {:#x}",
                    missing.as_raw()
                ))
                .logged());
            }
        }
        Ok(self.new_handle("PipelineLayout"))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.release_handle(layout.as_raw(), "PipelineLayout");
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
        name: &str,
    ) -> GfxResult<vk::Pipeline> {
        if !self.is_live(info.layout.as_raw(), "PipelineLayout") {
            return Err(GfxError::InvalidParameter(format!("pipeline `{name}` has no valid layout")).logged());
        }
        Ok(self.new_handle("Pipeline"))
    }

    fn create_compute_pipeline(&self, info: &vk::ComputePipelineCreateInfo<'_>, name: &str) -> GfxResult<vk::Pipeline> {
        if !self.is_live(info.layout.as_raw(), "PipelineLayout") {
            return Err(GfxError::InvalidParameter(format!("pipeline `{name}` has no valid layout")).logged());
        }
        if !self.is_live(info.stage.module.as_raw(), "ShaderModule") {
            return Err(GfxError::InvalidParameter(format!("pipeline `{name}` uses an unknown module")).logged());
        }
        Ok(self.new_handle("Pipeline"))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.release_handle(pipeline.as_raw(), "Pipeline");
    }

    fn allocate_command_buffer(&self, _name: &str) -> GfxResult<vk::CommandBuffer> {
        let cmd: vk::CommandBuffer = self.new_handle("CommandBuffer");
        self.recordings.borrow_mut().insert(
            cmd,
            HeadlessRecording {
                state: RecordingState::Initial,
                commands: Vec::new(),
            },
        );
        Ok(cmd)
    }

    fn free_command_buffer(&self, cmd: vk::CommandBuffer) {
        self.recordings.borrow_mut().remove(&cmd);
        self.release_handle(cmd.as_raw(), "CommandBuffer");
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, _flags: vk::CommandBufferUsageFlags) -> GfxResult<()> {
        let mut recordings = self.recordings.borrow_mut();
        let rec = recordings.get_mut(&cmd).ok_or_else(|| unknown("command buffer"))?;
        rec.state = RecordingState::Recording;
        rec.commands.clear();
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> GfxResult<()> {
        let mut recordings = self.recordings.borrow_mut();
        let rec = recordings.get_mut(&cmd).ok_or_else(|| unknown("command buffer"))?;
        if rec.state != RecordingState::Recording {
            return Err(GfxError::InvalidParameter("end of a command buffer that is not recording".to_string()));
        }
        rec.state = RecordingState::Executable;
        Ok(())
    }

    fn submit(&self, cmds: &[vk::CommandBuffer], fence: vk::Fence) -> GfxResult<()> {
        for cmd in cmds {
            let commands = {
                let recordings = self.recordings.borrow();
                let rec = recordings.get(cmd).ok_or_else(|| unknown("command buffer"))?;
                if rec.state != RecordingState::Executable {
                    return Err(GfxError::InvalidParameter(format!(
                        "submit of command buffer in {:?} state",
                        rec.state
                    ))
                    .logged());
                }
                rec.commands.clone()
            };
            for command in &commands {
                self.execute(command)?;
            }
            self.submitted.borrow_mut().extend(commands);
        }
        if fence != vk::Fence::null() {
            let mut fences = self.fences.borrow_mut();
            let signaled = fences.get_mut(&fence).ok_or_else(|| unknown("fence"))?;
            *signaled = true;
        }
        self.submit_count.set(self.submit_count.get() + 1);
        Ok(())
    }

    fn queue_wait_idle(&self) -> GfxResult<()> {
        Ok(())
    }

    fn wait_idle(&self) -> GfxResult<()> {
        Ok(())
    }

    fn create_fence(&self, signaled: bool, _name: &str) -> GfxResult<vk::Fence> {
        let fence: vk::Fence = self.new_handle("Fence");
        self.fences.borrow_mut().insert(fence, signaled);
        Ok(fence)
    }

    fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> GfxResult<()> {
        match self.fences.borrow().get(&fence) {
            Some(true) => Ok(()),
            // 没有提交过的 fence 永远不会 signal
            Some(false) => Err(GfxError::Timeout(timeout_ns).logged()),
            None => Err(unknown("fence")),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        let mut fences = self.fences.borrow_mut();
        let signaled = fences.get_mut(&fence).ok_or_else(|| unknown("fence"))?;
        *signaled = false;
        Ok(())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.fences.borrow_mut().remove(&fence);
        self.release_handle(fence.as_raw(), "Fence");
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.record(
            cmd,
            HeadlessCommand::CopyBuffer {
                src,
                dst,
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.record(
            cmd,
            HeadlessCommand::CopyBufferToImage {
                src,
                dst,
                dst_layout,
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        _src_layout: vk::ImageLayout,
        dst: vk::Image,
        _dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        _filter: vk::Filter,
    ) {
        for region in regions {
            self.record(
                cmd,
                HeadlessCommand::BlitImage {
                    src,
                    dst,
                    src_mip: region.src_subresource.mip_level,
                    dst_mip: region.dst_subresource.mip_level,
                },
            );
        }
    }

    fn cmd_pipeline_barrier(
        &self,
        cmd: vk::CommandBuffer,
        image_barriers: &[vk::ImageMemoryBarrier2<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier2<'_>],
    ) {
        for barrier in image_barriers {
            self.record(
                cmd,
                HeadlessCommand::ImageBarrier {
                    image: barrier.image,
                    old_layout: barrier.old_layout,
                    new_layout: barrier.new_layout,
                    src_stage: barrier.src_stage_mask,
                    dst_stage: barrier.dst_stage_mask,
                    base_mip: barrier.subresource_range.base_mip_level,
                },
            );
        }
        for barrier in buffer_barriers {
            self.record(
                cmd,
                HeadlessCommand::BufferBarrier {
                    buffer: barrier.buffer,
                    src_access: barrier.src_access_mask,
                    dst_access: barrier.dst_access_mask,
                },
            );
        }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.record(cmd, HeadlessCommand::BindPipeline { bind_point, pipeline });
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        _dynamic_offsets: &[u32],
    ) {
        self.record(
            cmd,
            HeadlessCommand::BindDescriptorSets {
                first_set,
                sets: sets.to_vec(),
            },
        );
    }

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        _offsets: &[vk::DeviceSize],
    ) {
        self.record(
            cmd,
            HeadlessCommand::BindVertexBuffers {
                first_binding,
                buffers: buffers.to_vec(),
            },
        );
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        _offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        self.record(cmd, HeadlessCommand::BindIndexBuffer { buffer, index_type });
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.record(
            cmd,
            HeadlessCommand::PushConstants {
                stages,
                offset,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.record(cmd, HeadlessCommand::Draw { vertex_count, instance_count });
    }

    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.record(cmd, HeadlessCommand::DrawIndexed { index_count, instance_count });
    }

    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, group_count: [u32; 3]) {
        self.record(cmd, HeadlessCommand::Dispatch { group_count });
    }

    fn cmd_begin_label(&self, cmd: vk::CommandBuffer, label: &str, _color: [f32; 4]) {
        self.record(cmd, HeadlessCommand::BeginLabel(label.to_string()));
    }

    fn cmd_end_label(&self, cmd: vk::CommandBuffer) {
        self.record(cmd, HeadlessCommand::EndLabel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped_buffer(device: &HeadlessDevice, size: vk::DeviceSize, mapped: bool) -> vk::Buffer {
        device
            .create_buffer(&GfxBufferDesc {
                size,
                usage: vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
                memory_props: vk::MemoryPropertyFlags::HOST_VISIBLE,
                alignment: 8,
                mapped,
                name: "test",
            })
            .unwrap()
    }

    #[test]
    fn test_copy_executes_on_submit() {
        let device = HeadlessDevice::new(HeadlessDeviceDesc::default());
        let src = mapped_buffer(&device, 16, true);
        let dst = mapped_buffer(&device, 16, true);
        device.write_buffer(src, 0, &[7; 16]).unwrap();

        let cmd = device.allocate_command_buffer("copy").unwrap();
        device.begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT).unwrap();
        device.cmd_copy_buffer(cmd, src, dst, &[vk::BufferCopy { src_offset: 0, dst_offset: 0, size: 16 }]);
        device.end_command_buffer(cmd).unwrap();

        // 录制阶段不会执行
        assert_eq!(device.buffer_data(dst).unwrap(), vec![0; 16]);
        device.submit(&[cmd], vk::Fence::null()).unwrap();
        assert_eq!(device.buffer_data(dst).unwrap(), vec![7; 16]);
        assert_eq!(device.submit_count(), 1);
    }

    #[test]
    fn test_memory_budget() {
        let device = HeadlessDevice::new(HeadlessDeviceDesc {
            memory_budget: 100,
            ..Default::default()
        });
        let a = mapped_buffer(&device, 64, false);
        let err = device
            .create_buffer(&GfxBufferDesc {
                size: 64,
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                memory_props: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                alignment: 8,
                mapped: false,
                name: "too-big",
            })
            .unwrap_err();
        assert!(matches!(err, GfxError::OutOfMemory { ref name, size: 64 } if name == "too-big"));

        device.destroy_buffer(a);
        assert_eq!(device.memory_used(), 0);
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_unmapped_write_rejected() {
        let device = HeadlessDevice::new(HeadlessDeviceDesc::default());
        let buffer = mapped_buffer(&device, 8, false);
        assert!(matches!(device.write_buffer(buffer, 0, &[1, 2]), Err(GfxError::NotMapped { .. })));
    }

    #[test]
    fn test_fence_signaled_by_submit() {
        let device = HeadlessDevice::new(HeadlessDeviceDesc::default());
        let fence = device.create_fence(false, "f").unwrap();
        assert!(matches!(device.wait_fence(fence, 10), Err(GfxError::Timeout(10))));

        let cmd = device.allocate_command_buffer("c").unwrap();
        device.begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT).unwrap();
        device.end_command_buffer(cmd).unwrap();
        device.submit(&[cmd], fence).unwrap();
        assert!(device.wait_fence(fence, 10).is_ok());

        device.reset_fence(fence).unwrap();
        assert!(device.wait_fence(fence, 10).is_err());
    }

    #[test]
    fn test_submit_requires_ended_buffer() {
        let device = HeadlessDevice::new(HeadlessDeviceDesc::default());
        let cmd = device.allocate_command_buffer("c").unwrap();
        device.begin_command_buffer(cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT).unwrap();
        assert!(device.submit(&[cmd], vk::Fence::null()).is_err());
    }
}
