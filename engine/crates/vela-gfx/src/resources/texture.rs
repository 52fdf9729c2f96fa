use std::ops::Deref;
use std::rc::Rc;

use ash::vk;

use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;
use crate::resources::image::{GfxAttachmentCreateInfo, GfxImage, GfxTextureCreateInfo};

/// 2D 纹理：上传完成、带 view 与可选 sampler 的 image
pub struct GfxTexture2D(GfxImage);

impl GfxTexture2D {
    #[inline]
    pub fn new(device: Rc<dyn GfxDevice>, info: &GfxTextureCreateInfo<'_>, name: &str) -> GfxResult<Self> {
        GfxImage::new_texture(device, info, vk::ImageType::TYPE_2D, name).map(Self)
    }

    /// render graph 的 color/depth attachment，内容未定义
    #[inline]
    pub fn new_attachment(device: Rc<dyn GfxDevice>, info: &GfxAttachmentCreateInfo, name: &str) -> GfxResult<Self> {
        GfxImage::new_attachment(device, info, name).map(Self)
    }
}
impl Deref for GfxTexture2D {
    type Target = GfxImage;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// 3D 纹理
pub struct GfxTexture3D(GfxImage);

impl GfxTexture3D {
    #[inline]
    pub fn new(device: Rc<dyn GfxDevice>, info: &GfxTextureCreateInfo<'_>, name: &str) -> GfxResult<Self> {
        GfxImage::new_texture(device, info, vk::ImageType::TYPE_3D, name).map(Self)
    }
}
impl Deref for GfxTexture3D {
    type Target = GfxImage;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
