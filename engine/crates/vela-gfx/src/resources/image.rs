use std::rc::Rc;

use ash::vk;

use crate::commands::barrier::GfxImageBarrier;
use crate::commands::command_buffer::GfxCommandBuffer;
use crate::error::{GfxError, GfxResult};
use crate::foundation::device::GfxDevice;
use crate::resources::buffer::GfxBuffer;
use crate::sampler::{GfxSampler, GfxSamplerInfo};

/// Vulkan 格式相关的工具类
pub struct VulkanFormatUtils;
impl VulkanFormatUtils {
    /// (每个像素的字节数, 通道数)
    fn format_info(format: vk::Format) -> Option<(usize, u32)> {
        let info = match format {
            vk::Format::R8_UNORM | vk::Format::R8_SRGB | vk::Format::R8_UINT => (1, 1),
            vk::Format::R8G8_UNORM | vk::Format::R8G8_SRGB => (2, 2),
            vk::Format::R8G8B8_UNORM | vk::Format::R8G8B8_SRGB | vk::Format::B8G8R8_UNORM | vk::Format::B8G8R8_SRGB => {
                (3, 3)
            }
            vk::Format::R8G8B8A8_UNORM
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SRGB
            | vk::Format::A2B10G10R10_UNORM_PACK32 => (4, 4),
            vk::Format::B10G11R11_UFLOAT_PACK32 => (4, 3),
            vk::Format::R16_SFLOAT | vk::Format::R16_UNORM => (2, 1),
            vk::Format::R16G16_SFLOAT => (4, 2),
            vk::Format::R16G16B16A16_SFLOAT | vk::Format::R16G16B16A16_UNORM => (8, 4),
            vk::Format::R32_SFLOAT | vk::Format::R32_UINT => (4, 1),
            vk::Format::R32G32_SFLOAT => (8, 2),
            vk::Format::R32G32B32_SFLOAT => (12, 3),
            vk::Format::R32G32B32A32_SFLOAT => (16, 4),
            vk::Format::D16_UNORM => (2, 1),
            vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => (4, 1),
            vk::Format::D24_UNORM_S8_UINT => (4, 2),
            _ => return None,
        };
        Some(info)
    }

    /// 指定格式下每个像素需要的字节数
    pub fn pixel_size_in_bytes(format: vk::Format) -> GfxResult<usize> {
        Self::format_info(format).map(|(size, _)| size).ok_or(GfxError::UnsupportedFormat(format))
    }

    pub fn component_count(format: vk::Format) -> GfxResult<u32> {
        Self::format_info(format).map(|(_, count)| count).ok_or(GfxError::UnsupportedFormat(format))
    }

    #[inline]
    pub fn is_depth(format: vk::Format) -> bool {
        matches!(
            format,
            vk::Format::D16_UNORM
                | vk::Format::D32_SFLOAT
                | vk::Format::X8_D24_UNORM_PACK32
                | vk::Format::D24_UNORM_S8_UINT
                | vk::Format::D32_SFLOAT_S8_UINT
        )
    }

    pub fn aspect_flags(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            f if Self::is_depth(f) => vk::ImageAspectFlags::DEPTH,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

/// 完整 mip 链的层数：`floor(log2(max(w, h, d))) + 1`
pub fn mip_levels_for(extent: vk::Extent3D) -> u32 {
    let max = extent.width.max(extent.height).max(extent.depth).max(1);
    u32::BITS - max.leading_zeros()
}

/// 某个 layout 作为 barrier 目标时对应的 stage 与 access
fn layout_dst_mask(layout: vk::ImageLayout) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    match layout {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
        vk::ImageLayout::GENERAL => (
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
        ),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ),
        _ => (
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        ),
    }
}

/// 纹理上传参数
#[derive(Clone, Copy, Debug)]
pub struct GfxTextureCreateInfo<'a> {
    /// 紧密排列的像素数据，长度必须是 `width * height * depth * pixel_size`
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// 必须和 format 的通道数一致
    pub channels: u32,
    pub format: vk::Format,
    /// 上传完成之后 image 所处的 layout
    pub image_layout: vk::ImageLayout,
    pub sampler_info: GfxSamplerInfo,
}
impl<'a> GfxTextureCreateInfo<'a> {
    pub fn new_2d(data: &'a [u8], width: u32, height: u32, channels: u32, format: vk::Format) -> Self {
        Self {
            data,
            width,
            height,
            depth: 1,
            channels,
            format,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            sampler_info: GfxSamplerInfo::default(),
        }
    }

    pub fn new_3d(data: &'a [u8], extent: [u32; 3], channels: u32, format: vk::Format) -> Self {
        Self {
            depth: extent[2],
            ..Self::new_2d(data, extent[0], extent[1], channels, format)
        }
    }

    /// builder
    #[inline]
    pub fn image_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.image_layout = layout;
        self
    }

    /// builder
    #[inline]
    pub fn sampler_info(mut self, sampler_info: GfxSamplerInfo) -> Self {
        self.sampler_info = sampler_info;
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }

    /// 检查尺寸、通道数与数据长度
    pub fn validate(&self, image_type: vk::ImageType, name: &str) -> GfxResult<()> {
        let invalid = |msg: String| Err(GfxError::InvalidParameter(format!("texture `{name}`: {msg}")).logged());

        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return invalid(format!("zero extent {}x{}x{}", self.width, self.height, self.depth));
        }
        if image_type == vk::ImageType::TYPE_2D && self.depth != 1 {
            return invalid(format!("2D texture with depth {}", self.depth));
        }
        let components = VulkanFormatUtils::component_count(self.format).map_err(GfxError::logged)?;
        if components != self.channels {
            return invalid(format!("{} channels given, {:?} has {components}", self.channels, self.format));
        }
        let pixel_size = VulkanFormatUtils::pixel_size_in_bytes(self.format)?;
        let expected = [self.height as usize, self.depth as usize, pixel_size]
            .into_iter()
            .try_fold(self.width as usize, usize::checked_mul);
        let Some(expected) = expected else {
            return invalid(format!("extent {}x{}x{} overflows the data size", self.width, self.height, self.depth));
        };
        if self.data.len() != expected {
            return invalid(format!("{} bytes given, {expected} expected", self.data.len()));
        }
        Ok(())
    }
}

/// render graph 使用的 attachment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxAttachmentCreateInfo {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

/// image + view，纹理还带有可选的 sampler
///
/// drop 时依次销毁 sampler、view 与 image
pub struct GfxImage {
    device: Rc<dyn GfxDevice>,
    handle: vk::Image,
    view: vk::ImageView,
    sampler: Option<GfxSampler>,

    image_type: vk::ImageType,
    extent: vk::Extent3D,
    format: vk::Format,
    mip_levels: u32,
    aspect: vk::ImageAspectFlags,
    /// 创建完成后 image 所处的 layout
    layout: vk::ImageLayout,

    name: String,
}
impl Drop for GfxImage {
    fn drop(&mut self) {
        log::debug!("destroying image `{}`", self.name);
        self.sampler = None;
        if self.view != vk::ImageView::null() {
            self.device.destroy_image_view(self.view);
        }
        self.device.destroy_image(self.handle);
    }
}
// new & init
impl GfxImage {
    /// 通过 staging buffer 上传像素数据，按需生成 mip 链，最后转换到 `info.image_layout`
    ///
    /// 返回时上传已经完成
    pub fn new_texture(
        device: Rc<dyn GfxDevice>,
        info: &GfxTextureCreateInfo<'_>,
        image_type: vk::ImageType,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        vela_crate_tools::profile_function!();
        let name = name.as_ref();
        info.validate(image_type, name)?;

        let extent = info.extent();
        let limits = device.limits();
        let max_dim = if image_type == vk::ImageType::TYPE_3D {
            limits.max_image_dimension_3d
        } else {
            limits.max_image_dimension_2d
        };
        if extent.width.max(extent.height).max(extent.depth) > max_dim {
            return Err(GfxError::InvalidParameter(format!(
                "texture `{name}` extent {}x{}x{} exceeds device limit {max_dim}",
                extent.width, extent.height, extent.depth
            ))
            .logged());
        }

        let mip_levels = if info.sampler_info.wants_mipmaps() { mip_levels_for(extent) } else { 1 };
        if mip_levels > 1 && !device.supports_linear_blit(info.format) {
            return Err(GfxError::UnsupportedFormat(info.format).logged());
        }

        let mut usage = vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED;
        if mip_levels > 1 {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if info.image_layout == vk::ImageLayout::GENERAL {
            usage |= vk::ImageUsageFlags::STORAGE;
        }

        let mut image = Self::create(device, image_type, extent, info.format, mip_levels, usage, name)?;
        image.upload(info.data, info.image_layout)?;
        image.layout = info.image_layout;
        image.create_view()?;
        if info.sampler_info.create_sampler {
            image.sampler = Some(GfxSampler::new(image.device.clone(), &info.sampler_info, name)?);
        }

        log::debug!(
            "texture `{name}` created: {}x{}x{}, {:?}, {mip_levels} mips",
            extent.width,
            extent.height,
            extent.depth,
            info.format
        );
        Ok(image)
    }

    /// 内容未定义，layout 为 UNDEFINED
    pub fn new_attachment(
        device: Rc<dyn GfxDevice>,
        info: &GfxAttachmentCreateInfo,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let name = name.as_ref();
        let mut image =
            Self::create(device, vk::ImageType::TYPE_2D, info.extent.into(), info.format, 1, info.usage, name)?;
        image.create_view()?;
        log::debug!("attachment `{name}` created: {}x{}, {:?}", info.extent.width, info.extent.height, info.format);
        Ok(image)
    }

    fn create(
        device: Rc<dyn GfxDevice>,
        image_type: vk::ImageType,
        extent: vk::Extent3D,
        format: vk::Format,
        mip_levels: u32,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> GfxResult<Self> {
        let image_ci = vk::ImageCreateInfo {
            image_type,
            format,
            extent,
            mip_levels,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            // 这里只能是 UNDEFINED 或者 PREINITIALIZED
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let handle = device.create_image(&image_ci, name)?;
        Ok(Self {
            device,
            handle,
            view: vk::ImageView::null(),
            sampler: None,
            image_type,
            extent,
            format,
            mip_levels,
            aspect: VulkanFormatUtils::aspect_flags(format),
            layout: vk::ImageLayout::UNDEFINED,
            name: name.to_string(),
        })
    }

    fn create_view(&mut self) -> GfxResult<()> {
        let view_type = match self.image_type {
            vk::ImageType::TYPE_3D => vk::ImageViewType::TYPE_3D,
            _ => vk::ImageViewType::TYPE_2D,
        };
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(self.handle)
            .view_type(view_type)
            .format(self.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: 0,
                level_count: self.mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        self.view = self.device.create_image_view(&view_ci, &self.name)?;
        Ok(())
    }
}
// getters
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn sampler(&self) -> Option<vk::Sampler> {
        self.sampler.as_ref().map(GfxSampler::handle)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// sampler 为空时使用 null sampler
    #[inline]
    pub fn descriptor_image_info(&self, layout: vk::ImageLayout) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler().unwrap_or_default(),
            image_view: self.view,
            image_layout: layout,
        }
    }
}
// tools
impl GfxImage {
    /// # 实现步骤
    /// 1. 创建 staging buffer，写入数据
    /// 2. 整个 image 转换到 TRANSFER_DST
    /// 3. 将 staging buffer 的数据复制到 mip 0
    /// 4. 生成 mip 链（可选），所有 level 转换到 `final_layout`
    fn upload(&self, data: &[u8], final_layout: vk::ImageLayout) -> GfxResult<()> {
        let stage_buffer = GfxBuffer::new_stage_buffer(
            self.device.clone(),
            data.len() as vk::DeviceSize,
            format!("{}-stage-buffer", self.name),
        )?;
        stage_buffer.write_to_buffer(data, 0)?;

        GfxCommandBuffer::one_time_exec(&self.device, &format!("upload-{}", self.name), |cmd| {
            cmd.image_memory_barrier(&[GfxImageBarrier::new()
                .image(self.handle)
                .src_mask(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::empty())
                .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .image_aspect_flag(self.aspect)]);

            let copy = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: self.aspect,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: self.extent,
            };
            cmd.cmd_copy_buffer_to_image(
                &stage_buffer,
                self.handle,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&copy),
            );

            self.generate_mipmaps(cmd, final_layout);
            Ok(())
        })
    }

    /// 每一级由上一级 linear blit 得到：
    /// 上一级 TRANSFER_DST -> TRANSFER_SRC，blit 完成后转换到 `final_layout`。
    /// 最后一级在循环结束后从 TRANSFER_DST 转换到 `final_layout`。
    fn generate_mipmaps(&self, cmd: &GfxCommandBuffer, final_layout: vk::ImageLayout) {
        let (final_stage, final_access) = layout_dst_mask(final_layout);
        let level_barrier = |level: u32| {
            GfxImageBarrier::new().image(self.handle).image_aspect_flag(self.aspect).mip_range(level, 1)
        };

        let mut src_extent = self.extent;
        for level in 1..self.mip_levels {
            cmd.image_memory_barrier(&[level_barrier(level - 1)
                .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                .dst_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ)
                .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)]);

            let dst_extent = vk::Extent3D {
                width: (src_extent.width / 2).max(1),
                height: (src_extent.height / 2).max(1),
                depth: (src_extent.depth / 2).max(1),
            };
            let subresource = |mip_level| vk::ImageSubresourceLayers {
                aspect_mask: self.aspect,
                mip_level,
                base_array_layer: 0,
                layer_count: 1,
            };
            let corner = |e: vk::Extent3D| vk::Offset3D {
                x: e.width as i32,
                y: e.height as i32,
                z: e.depth as i32,
            };
            let blit = vk::ImageBlit {
                src_subresource: subresource(level - 1),
                src_offsets: [vk::Offset3D::default(), corner(src_extent)],
                dst_subresource: subresource(level),
                dst_offsets: [vk::Offset3D::default(), corner(dst_extent)],
            };
            cmd.cmd_blit_image(self.handle, &blit, vk::Filter::LINEAR);

            cmd.image_memory_barrier(&[level_barrier(level - 1)
                .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ)
                .dst_mask(final_stage, final_access)
                .layout_transfer(vk::ImageLayout::TRANSFER_SRC_OPTIMAL, final_layout)]);

            src_extent = dst_extent;
        }

        cmd.image_memory_barrier(&[level_barrier(self.mip_levels - 1)
            .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
            .dst_mask(final_stage, final_access)
            .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, final_layout)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::headless::{HeadlessCommand, HeadlessDevice, HeadlessDeviceDesc};

    fn headless() -> (Rc<HeadlessDevice>, Rc<dyn GfxDevice>) {
        let headless = Rc::new(HeadlessDevice::new(HeadlessDeviceDesc::default()));
        let device: Rc<dyn GfxDevice> = headless.clone();
        (headless, device)
    }

    #[test]
    fn test_mip_levels_for() {
        let e = |width, height, depth| vk::Extent3D { width, height, depth };
        assert_eq!(mip_levels_for(e(1, 1, 1)), 1);
        assert_eq!(mip_levels_for(e(256, 256, 1)), 9);
        assert_eq!(mip_levels_for(e(300, 17, 1)), 9);
        assert_eq!(mip_levels_for(e(4, 4, 32)), 6);
    }

    #[test]
    fn test_texture_validation() {
        let (_, device) = headless();
        let data = [0u8; 16];

        // 通道数与格式不一致
        let info = GfxTextureCreateInfo::new_2d(&data, 2, 2, 3, vk::Format::R8G8B8A8_UNORM);
        assert!(GfxImage::new_texture(device.clone(), &info, vk::ImageType::TYPE_2D, "t").is_err());

        // 数据长度不对
        let info = GfxTextureCreateInfo::new_2d(&data[..12], 2, 2, 4, vk::Format::R8G8B8A8_UNORM);
        assert!(GfxImage::new_texture(device.clone(), &info, vk::ImageType::TYPE_2D, "t").is_err());

        let info = GfxTextureCreateInfo::new_2d(&data, 2, 2, 4, vk::Format::ASTC_4X4_UNORM_BLOCK);
        assert!(GfxImage::new_texture(device, &info, vk::ImageType::TYPE_2D, "t").is_err());
    }

    #[test]
    fn test_oversized_texture_rejected() {
        let (headless, device) = headless();
        let data = [0u8; 4];

        let info = GfxTextureCreateInfo::new_2d(&data, u32::MAX, u32::MAX, 4, vk::Format::R8G8B8A8_UNORM);
        assert!(matches!(info.validate(vk::ImageType::TYPE_2D, "huge"), Err(GfxError::InvalidParameter(_))));
        assert!(GfxImage::new_texture(device, &info, vk::ImageType::TYPE_2D, "huge").is_err());
        assert_eq!(headless.live_count_of("Image"), 0);
        assert_eq!(headless.live_count_of("Buffer"), 0);
    }

    #[test]
    fn test_texture_upload_without_mips() {
        let (headless, device) = headless();
        let data = (0..16u8).collect::<Vec<_>>();
        let info = GfxTextureCreateInfo::new_2d(&data, 2, 2, 4, vk::Format::R8G8B8A8_UNORM);
        let image = GfxImage::new_texture(device, &info, vk::ImageType::TYPE_2D, "albedo").unwrap();

        assert_eq!(image.mip_levels(), 1);
        assert_eq!(image.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(image.sampler().is_some());
        assert_eq!(headless.image_level_data(image.handle(), 0).unwrap(), data);
        assert_eq!(headless.live_count_of("Buffer"), 0);
    }

    #[test]
    fn test_texture_mip_chain() {
        let (headless, device) = headless();
        let data = vec![9u8; 8 * 8 * 4];
        let info = GfxTextureCreateInfo::new_2d(&data, 8, 8, 4, vk::Format::R8G8B8A8_UNORM).sampler_info(
            GfxSamplerInfo {
                max_lod: 4.0,
                ..Default::default()
            },
        );
        let image = GfxImage::new_texture(device, &info, vk::ImageType::TYPE_2D, "mipped").unwrap();
        assert_eq!(image.mip_levels(), 4);

        let commands = headless.submitted_commands();
        let blits = commands.iter().filter(|c| matches!(c, HeadlessCommand::BlitImage { .. })).count();
        assert_eq!(blits, 3);

        // 每一级都最终转换到 SHADER_READ_ONLY
        for mip in 0..4 {
            assert!(commands.iter().any(|c| matches!(
                c,
                HeadlessCommand::ImageBarrier { base_mip, new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, .. }
                    if *base_mip == mip
            )));
            assert!(headless.image_level_data(image.handle(), mip).unwrap().iter().all(|b| *b == 9));
        }
    }

    #[test]
    fn test_texture_3d_without_sampler() {
        let (headless, device) = headless();
        let data = vec![1u8; 4 * 4 * 4];
        let info = GfxTextureCreateInfo::new_3d(&data, [4, 4, 4], 1, vk::Format::R8_UNORM).sampler_info(
            GfxSamplerInfo {
                create_sampler: false,
                ..Default::default()
            },
        );
        let image = GfxImage::new_texture(device, &info, vk::ImageType::TYPE_3D, "volume").unwrap();
        assert!(image.sampler().is_none());
        assert_eq!(image.extent().depth, 4);
        drop(image);
        assert_eq!(headless.live_object_count(), 0);
    }
}
