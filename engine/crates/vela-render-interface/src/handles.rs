//! 指向 [`ResourceStorage`](crate::resource_storage::ResourceStorage) 中资源的轻量级 handle
//!
//! handle 只是一个 `i32`，不持有资源。资源种类是类型的一部分，不同种类的 handle 不能混用。

use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use vela_gfx::descriptors::descriptor::{GfxDescriptorSet, GfxDescriptorSetLayout};
use vela_gfx::pipelines::pipeline::GfxPipeline;
use vela_gfx::resources::buffer::GfxBuffer;
use vela_gfx::resources::texture::{GfxTexture2D, GfxTexture3D};

/// 资源种类的名字，出现在日志与错误信息中
pub trait GfxResourceKind {
    const KIND: &'static str;
}

impl GfxResourceKind for GfxBuffer {
    const KIND: &'static str = "Buffer";
}
impl GfxResourceKind for GfxTexture2D {
    const KIND: &'static str = "Texture2D";
}
impl GfxResourceKind for GfxTexture3D {
    const KIND: &'static str = "Texture3D";
}
impl GfxResourceKind for GfxDescriptorSetLayout {
    const KIND: &'static str = "DescriptorSetLayout";
}
impl GfxResourceKind for GfxDescriptorSet {
    const KIND: &'static str = "DescriptorSet";
}
impl GfxResourceKind for GfxPipeline {
    const KIND: &'static str = "Pipeline";
}

pub struct GfxHandle<T> {
    id: i32,
    _phantom: PhantomData<fn() -> T>,
}
impl<T> GfxHandle<T> {
    /// 不指向任何资源
    pub const INVALID: Self = Self::from_id(-1);

    #[inline]
    pub const fn from_id(id: i32) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    #[inline]
    pub const fn id(&self) -> i32 {
        self.id
    }

    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.id != Self::INVALID.id
    }
}
impl<T> Default for GfxHandle<T> {
    fn default() -> Self {
        Self::INVALID
    }
}
impl<T> Clone for GfxHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for GfxHandle<T> {}
impl<T> PartialEq for GfxHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T> Eq for GfxHandle<T> {}
impl<T> Hash for GfxHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl<T: GfxResourceKind> Debug for GfxHandle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}#{}", T::KIND, self.id)
        } else {
            write!(f, "{}#invalid", T::KIND)
        }
    }
}

pub type GfxBufferHandle = GfxHandle<GfxBuffer>;
pub type GfxTexture2DHandle = GfxHandle<GfxTexture2D>;
pub type GfxTexture3DHandle = GfxHandle<GfxTexture3D>;
pub type GfxDescriptorSetLayoutHandle = GfxHandle<GfxDescriptorSetLayout>;
pub type GfxDescriptorSetHandle = GfxHandle<GfxDescriptorSet>;
pub type GfxPipelineHandle = GfxHandle<GfxPipeline>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_handle() {
        let handle = GfxBufferHandle::default();
        assert!(!handle.is_valid());
        assert_eq!(handle, GfxBufferHandle::INVALID);
        assert_eq!(format!("{handle:?}"), "Buffer#invalid");

        let handle = GfxTexture2DHandle::from_id(0);
        assert!(handle.is_valid());
        assert_eq!(format!("{handle:?}"), "Texture2D#0");
    }
}
