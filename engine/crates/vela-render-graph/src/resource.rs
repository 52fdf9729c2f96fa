//! render graph 中的资源
//!
//! pass 通过 [`RgResourceIdentity`] 引用资源：可以直接是 [`ResourceStorage`] 中的 handle，
//! 也可以是按名字声明的虚拟资源，由 graph 在编译时绑定到具体的 texture。

use std::fmt;

use ash::vk;

use vela_gfx::resources::image::{GfxAttachmentCreateInfo, VulkanFormatUtils};
use vela_render_interface::handles::{GfxBufferHandle, GfxTexture2DHandle, GfxTexture3DHandle};
use vela_render_interface::resource_storage::{GfxTextureRef, ResourceStorage};

use crate::error::{RgError, RgResult};
use crate::resource_state::RgResourceState;

/// pass 声明中引用资源的方式
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceIdentity {
    Buffer(GfxBufferHandle),
    Texture2D(GfxTexture2DHandle),
    Texture3D(GfxTexture3DHandle),
    /// 通过 [`declare_virtual`](crate::render_graph::RenderGraph::declare_virtual) 声明的名字
    Virtual(String),
}
impl RgResourceIdentity {
    #[inline]
    pub fn virtual_name(name: impl Into<String>) -> Self {
        Self::Virtual(name.into())
    }

    #[inline]
    pub fn is_buffer(&self) -> bool {
        matches!(self, Self::Buffer(_))
    }
}
impl fmt::Display for RgResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(h) => write!(f, "{h:?}"),
            Self::Texture2D(h) => write!(f, "{h:?}"),
            Self::Texture3D(h) => write!(f, "{h:?}"),
            Self::Virtual(name) => write!(f, "\"{name}\""),
        }
    }
}
impl From<GfxBufferHandle> for RgResourceIdentity {
    fn from(handle: GfxBufferHandle) -> Self {
        Self::Buffer(handle)
    }
}
impl From<GfxTexture2DHandle> for RgResourceIdentity {
    fn from(handle: GfxTexture2DHandle) -> Self {
        Self::Texture2D(handle)
    }
}
impl From<GfxTexture3DHandle> for RgResourceIdentity {
    fn from(handle: GfxTexture3DHandle) -> Self {
        Self::Texture3D(handle)
    }
}
impl From<&str> for RgResourceIdentity {
    fn from(name: &str) -> Self {
        Self::Virtual(name.to_string())
    }
}

/// graph 自己分配的 attachment 的描述
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgImageDesc {
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    /// `None` 表示跟随 present target 的尺寸
    pub extent: Option<vk::Extent2D>,
}
impl RgImageDesc {
    /// 颜色 attachment，之后可以被采样或者拷贝出去
    pub fn color(format: vk::Format) -> Self {
        Self {
            format,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC,
            extent: None,
        }
    }

    pub fn depth(format: vk::Format) -> Self {
        Self {
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            extent: None,
        }
    }

    /// builder
    #[inline]
    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    /// builder
    #[inline]
    pub fn with_extent(mut self, extent: vk::Extent2D) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn infer_aspect(&self) -> vk::ImageAspectFlags {
        VulkanFormatUtils::aspect_flags(self.format)
    }

    fn attachment_info(&self, present_extent: vk::Extent2D) -> GfxAttachmentCreateInfo {
        GfxAttachmentCreateInfo {
            extent: self.extent.unwrap_or(present_extent),
            format: self.format,
            usage: self.usage,
        }
    }
}

/// 虚拟资源的声明与绑定情况
pub(crate) struct RgVirtualResource {
    pub desc: Option<RgImageDesc>,
    /// 外部通过 `bind_virtual` 指定的 texture
    pub bound: Option<GfxTexture2DHandle>,
    /// graph 自己分配的 attachment，由 graph 负责销毁
    pub owned: Option<GfxTexture2DHandle>,
    /// desc 改变或者绑定了外部 texture，`owned` 在下次编译时销毁
    pub stale: bool,
}
impl RgVirtualResource {
    pub fn new(desc: Option<RgImageDesc>) -> Self {
        Self {
            desc,
            bound: None,
            owned: None,
            stale: false,
        }
    }

    /// 绑定优先于 graph 自己分配；都没有时按照 desc 分配一个 attachment
    pub fn realize(
        &mut self,
        name: &str,
        storage: &mut ResourceStorage,
        present_extent: vk::Extent2D,
    ) -> RgResult<GfxTexture2DHandle> {
        if let Some(handle) = self.bound {
            return Ok(handle);
        }
        if let Some(handle) = self.owned {
            return Ok(handle);
        }
        let desc = self.desc.ok_or_else(|| RgError::UnboundVirtualResource(name.to_string()).logged())?;
        let handle = storage.create_attachment(&desc.attachment_info(present_extent), format!("rg-{name}"))?;
        log::debug!("render graph allocated attachment {handle:?} for \"{name}\"");
        self.owned = Some(handle);
        Ok(handle)
    }

    pub fn release(&mut self, storage: &mut ResourceStorage) -> RgResult<()> {
        self.stale = false;
        if let Some(handle) = self.owned.take() {
            storage.destroy_texture_2d(handle)?;
        }
        Ok(())
    }

    /// 之后的 `realize` 不能再返回当前的 attachment
    #[inline]
    pub fn mark_stale(&mut self) {
        self.stale |= self.owned.is_some();
    }
}

/// identity 解析之后对应的 storage handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgPhysicalResource {
    Buffer(GfxBufferHandle),
    Texture2D(GfxTexture2DHandle),
    Texture3D(GfxTexture3DHandle),
}
impl RgPhysicalResource {
    #[inline]
    pub fn texture_ref(&self) -> Option<GfxTextureRef> {
        match *self {
            Self::Buffer(_) => None,
            Self::Texture2D(h) => Some(h.into()),
            Self::Texture3D(h) => Some(h.into()),
        }
    }

    #[inline]
    pub fn buffer(&self) -> Option<GfxBufferHandle> {
        match *self {
            Self::Buffer(h) => Some(h),
            _ => None,
        }
    }

    #[inline]
    pub fn texture_2d(&self) -> Option<GfxTexture2DHandle> {
        match *self {
            Self::Texture2D(h) => Some(h),
            _ => None,
        }
    }
}

/// 编译阶段每个被使用到的资源的信息
#[derive(Clone, Debug)]
pub struct RgResourceNode {
    pub identity: RgResourceIdentity,
    pub name: String,
    pub physical: RgPhysicalResource,
    /// 图像的 aspect，buffer 为空
    pub aspect: vk::ImageAspectFlags,
    /// 进入第一个 pass 之前的状态
    pub initial_state: RgResourceState,
    /// 最后一个 pass 之后需要转换到的状态
    pub final_state: Option<RgResourceState>,
    /// 按声明顺序最后一个写入它的 pass
    pub last_producer: Option<usize>,
}
impl RgResourceNode {
    #[inline]
    pub fn is_buffer(&self) -> bool {
        matches!(self.physical, RgPhysicalResource::Buffer(_))
    }
}
