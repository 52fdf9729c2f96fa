use ash::vk;

/// 最终画面的去处，通常由窗口系统的 swapchain 提供
///
/// 核心层只读取尺寸、image 数量与格式，从不自己创建它
pub trait PresentTarget {
    fn extent(&self) -> vk::Extent2D;

    fn image_count(&self) -> u32;

    fn format(&self) -> vk::Format;
}

/// 没有窗口时使用的离屏目标
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OffscreenTarget {
    extent: vk::Extent2D,
    format: vk::Format,
    image_count: u32,
}
impl OffscreenTarget {
    pub fn new(extent: vk::Extent2D, format: vk::Format, image_count: u32) -> Self {
        Self {
            extent,
            format,
            image_count,
        }
    }

    /// 返回尺寸是否真的改变
    pub fn resize(&mut self, extent: vk::Extent2D) -> bool {
        let changed = self.extent != extent;
        self.extent = extent;
        changed
    }
}
impl PresentTarget for OffscreenTarget {
    #[inline]
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    fn image_count(&self) -> u32 {
        self.image_count
    }

    #[inline]
    fn format(&self) -> vk::Format {
        self.format
    }
}
