use ash::vk;

/// image 的 layout 转换与同步
///
/// 默认覆盖所有 mip level 的第 0 层 layer，不做 queue family 转移
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxImageBarrier {
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src: (vk::PipelineStageFlags2, vk::AccessFlags2),
    dst: (vk::PipelineStageFlags2, vk::AccessFlags2),
    aspect: vk::ImageAspectFlags,
    base_mip: u32,
    mip_count: u32,
}
impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            image: vk::Image::null(),
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::UNDEFINED,
            src: (vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE),
            dst: (vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE),
            aspect: vk::ImageAspectFlags::empty(),
            base_mip: 0,
            mip_count: vk::REMAINING_MIP_LEVELS,
        }
    }
}
// builder
impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn image(mut self, image: vk::Image) -> Self {
        self.image = image;
        self
    }

    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.old_layout = old_layout;
        self.new_layout = new_layout;
        self
    }

    #[inline]
    pub fn src_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.src = (stage, access);
        self
    }

    #[inline]
    pub fn dst_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.dst = (stage, access);
        self
    }

    #[inline]
    pub fn image_aspect_flag(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = aspect;
        self
    }

    /// 只作用于 `[base_mip, base_mip + mip_count)`
    #[inline]
    pub fn mip_range(mut self, base_mip: u32, mip_count: u32) -> Self {
        self.base_mip = base_mip;
        self.mip_count = mip_count;
        self
    }
}
// tools
impl GfxImageBarrier {
    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .image(self.image)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_stage_mask(self.src.0)
            .src_access_mask(self.src.1)
            .dst_stage_mask(self.dst.0)
            .dst_access_mask(self.dst.1)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: self.base_mip,
                level_count: self.mip_count,
                base_array_layer: 0,
                layer_count: 1,
            })
    }
}

/// 整个 buffer 或其中一段的同步
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxBufferBarrier {
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    src: (vk::PipelineStageFlags2, vk::AccessFlags2),
    dst: (vk::PipelineStageFlags2, vk::AccessFlags2),
}
impl Default for GfxBufferBarrier {
    fn default() -> Self {
        Self {
            buffer: vk::Buffer::null(),
            offset: 0,
            size: vk::WHOLE_SIZE,
            src: (vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE),
            dst: (vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE),
        }
    }
}
// builder
impl GfxBufferBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn buffer(mut self, buffer: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        self.buffer = buffer;
        self.offset = offset;
        self.size = size;
        self
    }

    #[inline]
    pub fn src_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.src = (stage, access);
        self
    }

    #[inline]
    pub fn dst_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.dst = (stage, access);
        self
    }
}
// tools
impl GfxBufferBarrier {
    pub fn to_vk(&self) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2::default()
            .buffer(self.buffer)
            .offset(self.offset)
            .size(self.size)
            .src_stage_mask(self.src.0)
            .src_access_mask(self.src.1)
            .dst_stage_mask(self.dst.0)
            .dst_access_mask(self.dst.1)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_barrier_defaults_cover_all_mips() {
        let barrier = GfxImageBarrier::new()
            .image_aspect_flag(vk::ImageAspectFlags::COLOR)
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .to_vk();
        assert_eq!(barrier.subresource_range.base_mip_level, 0);
        assert_eq!(barrier.subresource_range.level_count, vk::REMAINING_MIP_LEVELS);
        assert_eq!(barrier.subresource_range.layer_count, 1);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let level = GfxImageBarrier::new().mip_range(2, 1).to_vk();
        assert_eq!((level.subresource_range.base_mip_level, level.subresource_range.level_count), (2, 1));
    }

    #[test]
    fn test_buffer_barrier_defaults_to_whole_buffer() {
        let barrier = GfxBufferBarrier::new()
            .src_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_STORAGE_WRITE)
            .dst_mask(vk::PipelineStageFlags2::VERTEX_SHADER, vk::AccessFlags2::SHADER_STORAGE_READ)
            .to_vk();
        assert_eq!(barrier.size, vk::WHOLE_SIZE);
        assert_eq!(barrier.offset, 0);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::SHADER_STORAGE_WRITE);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::VERTEX_SHADER);
    }
}
