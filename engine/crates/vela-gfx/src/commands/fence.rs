use std::rc::Rc;

use ash::vk;

use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;

/// drop 时销毁
pub struct GfxFence {
    device: Rc<dyn GfxDevice>,
    fence: vk::Fence,
}
impl Drop for GfxFence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
    }
}
// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: Rc<dyn GfxDevice>, signaled: bool, debug_name: &str) -> GfxResult<Self> {
        let fence = device.create_fence(signaled, debug_name)?;
        Ok(Self { device, fence })
    }
}
// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}
// tools
impl GfxFence {
    /// 阻塞等待 fence，超时返回 [`GfxError::Timeout`](crate::error::GfxError::Timeout)
    #[inline]
    pub fn wait(&self, timeout_ns: u64) -> GfxResult<()> {
        self.device.wait_fence(self.fence, timeout_ns)
    }

    #[inline]
    pub fn reset(&self) -> GfxResult<()> {
        self.device.reset_fence(self.fence)
    }
}
