use std::rc::Rc;

use ash::vk;

use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;

/// 纹理附带的 sampler 配置
///
/// `max_lod > 1` 时，纹理创建会同时生成完整的 mip 链
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxSamplerInfo {
    /// 为 false 时只创建 image 与 view
    pub create_sampler: bool,
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub border_color: vk::BorderColor,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub min_lod: f32,
    pub max_lod: f32,
    pub lod_bias: f32,
}
impl Default for GfxSamplerInfo {
    /// 默认配置：linear，repeat
    fn default() -> Self {
        Self {
            create_sampler: true,
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            min_lod: 0.0,
            max_lod: 1.0,
            lod_bias: 0.0,
        }
    }
}
impl GfxSamplerInfo {
    #[inline]
    pub fn wants_mipmaps(&self) -> bool {
        self.max_lod > 1.0
    }

    pub fn vk_info(&self) -> vk::SamplerCreateInfo<'static> {
        vk::SamplerCreateInfo::default()
            .mag_filter(self.filter)
            .min_filter(self.filter)
            .address_mode_u(self.address_mode)
            .address_mode_v(self.address_mode)
            .address_mode_w(self.address_mode)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(self.border_color)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(self.mipmap_mode)
            .mip_lod_bias(self.lod_bias)
            .min_lod(self.min_lod)
            .max_lod(self.max_lod)
    }
}

pub struct GfxSampler {
    device: Rc<dyn GfxDevice>,
    handle: vk::Sampler,
}
impl Drop for GfxSampler {
    fn drop(&mut self) {
        self.device.destroy_sampler(self.handle);
    }
}
impl GfxSampler {
    pub fn new(device: Rc<dyn GfxDevice>, info: &GfxSamplerInfo, name: &str) -> GfxResult<Self> {
        let handle = device.create_sampler(&info.vk_info(), name)?;
        Ok(Self { device, handle })
    }

    /// getter
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}
