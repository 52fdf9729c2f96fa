use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use vela_gfx::commands::command_buffer::GfxCommandBuffer;
use vela_gfx::commands::fence::GfxFence;
use vela_gfx::error::{GfxError, GfxResult};
use vela_gfx::foundation::device::GfxDevice;

use crate::frame_counter::{FrameCounter, FrameLabel};

/// 每个 frames-in-flight 槽位的同步对象
struct FrameSlot {
    /// 这个槽位上一次提交的所有命令执行完毕后 signal
    fence: GfxFence,
    /// 等 fence signal 之后才能释放
    submitted: Vec<GfxCommandBuffer>,
}

/// frames in flight 的同步
///
/// # 一帧的流程
/// 1. [`begin_frame`](Self::begin_frame)：等待当前槽位的 fence，之后这个槽位的 per-frame 资源可以安全地重写
/// 2. [`alloc_command_buffer`](Self::alloc_command_buffer) + [`submit`](Self::submit)：录制并提交命令
/// 3. [`end_frame`](Self::end_frame)：在所有提交之后 signal 当前槽位的 fence，进入下一帧
pub struct FrameContext {
    device: Rc<dyn GfxDevice>,
    counter: FrameCounter,
    slots: Vec<FrameSlot>,
    fence_timeout_ns: u64,
    in_frame: bool,
}
// new & init
impl FrameContext {
    pub const DEFAULT_FENCE_TIMEOUT_NS: u64 = 5_000_000_000;

    pub fn new(device: Rc<dyn GfxDevice>, fif_count: usize) -> GfxResult<Self> {
        let counter = FrameCounter::new(0, fif_count)?;
        // 初始为 signaled，第一次 begin_frame 不会阻塞
        let slots = counter
            .frame_labels()
            .iter()
            .map(|label| {
                Ok(FrameSlot {
                    fence: GfxFence::new(device.clone(), true, &format!("frame-fence-{label}"))?,
                    submitted: Vec::new(),
                })
            })
            .collect::<GfxResult<Vec<_>>>()?;
        log::info!("frame context created with {fif_count} frames in flight");

        Ok(Self {
            device,
            counter,
            slots,
            fence_timeout_ns: Self::DEFAULT_FENCE_TIMEOUT_NS,
            in_frame: false,
        })
    }

    /// builder
    #[inline]
    pub fn with_fence_timeout(mut self, timeout_ns: u64) -> Self {
        self.fence_timeout_ns = timeout_ns;
        self
    }
}
// destroy
impl FrameContext {
    /// 等待设备空闲，释放所有还在飞行中的 command buffer
    pub fn destroy(mut self) -> GfxResult<()> {
        self.release_all()
    }

    fn release_all(&mut self) -> GfxResult<()> {
        self.device.wait_idle()?;
        for slot in &mut self.slots {
            slot.submitted.clear();
        }
        Ok(())
    }
}
impl Drop for FrameContext {
    fn drop(&mut self) {
        if let Err(e) = self.release_all() {
            log::error!("failed to wait idle when dropping frame context: {e}");
        }
    }
}
// getters
impl FrameContext {
    #[inline]
    pub fn counter(&self) -> &FrameCounter {
        &self.counter
    }

    #[inline]
    pub fn frame_slot(&self) -> usize {
        self.counter.frame_slot()
    }

    #[inline]
    pub fn frame_label(&self) -> FrameLabel {
        self.counter.frame_label()
    }

    #[inline]
    pub fn fif_count(&self) -> usize {
        self.counter.fif_count()
    }

    #[inline]
    pub fn device(&self) -> &Rc<dyn GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn is_in_frame(&self) -> bool {
        self.in_frame
    }

    /// 当前槽位还没有确认执行完毕的 command buffer 数量
    #[inline]
    pub fn pending_command_buffers(&self) -> usize {
        self.slots.iter().map(|s| s.submitted.len()).sum()
    }
}
// phase
impl FrameContext {
    fn check_phase(&self, expect_in_frame: bool, what: &str) -> GfxResult<()> {
        if self.in_frame != expect_in_frame {
            let state = if self.in_frame { "inside" } else { "outside" };
            return Err(GfxError::InvalidParameter(format!(
                "{what} called {state} of frame {}",
                self.counter.frame_name()
            ))
            .logged());
        }
        Ok(())
    }

    /// 阻塞直到当前槽位上一次的 GPU 工作完成
    pub fn begin_frame(&mut self) -> GfxResult<usize> {
        vela_crate_tools::profile_function!();
        self.check_phase(false, "begin_frame")?;

        let slot_idx = self.counter.frame_slot();
        let slot = &mut self.slots[slot_idx];
        slot.fence.wait(self.fence_timeout_ns)?;
        if !slot.submitted.is_empty() {
            log::trace!(
                "{} release {} command buffers: {}",
                self.counter.frame_name(),
                slot.submitted.len(),
                slot.submitted.iter().map(GfxCommandBuffer::name).join(", ")
            );
        }
        slot.submitted.clear();

        self.in_frame = true;
        Ok(slot_idx)
    }

    /// command buffer 的名字带有帧序号
    pub fn alloc_command_buffer(&self, name: &str) -> GfxResult<GfxCommandBuffer> {
        self.check_phase(true, "alloc_command_buffer")?;
        GfxCommandBuffer::new(self.device.clone(), format!("{}{name}", self.counter.frame_name()))
    }

    /// 提交已经录制完成的 command buffer，它会一直存活到这个槽位的 fence signal
    pub fn submit(&mut self, cmd: GfxCommandBuffer) -> GfxResult<()> {
        self.check_phase(true, "submit")?;
        self.device.submit(&[cmd.handle()], vk::Fence::null())?;
        self.slots[self.counter.frame_slot()].submitted.push(cmd);
        Ok(())
    }

    /// fence 跟在这一帧所有提交之后 signal，即使这一帧没有提交任何命令
    pub fn end_frame(&mut self) -> GfxResult<()> {
        vela_crate_tools::profile_function!();
        self.check_phase(true, "end_frame")?;

        let fence = &self.slots[self.counter.frame_slot()].fence;
        fence.reset()?;
        self.device.submit(&[], fence.handle())?;

        self.in_frame = false;
        self.counter.next_frame();
        vela_crate_tools::frame_mark!();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use vela_gfx::foundation::headless::{HeadlessDevice, HeadlessDeviceDesc};

    use super::*;

    fn context(fif: usize) -> (Rc<HeadlessDevice>, FrameContext) {
        let headless = Rc::new(HeadlessDevice::new(HeadlessDeviceDesc::default()));
        let ctx = FrameContext::new(headless.clone(), fif).unwrap();
        (headless, ctx)
    }

    fn record_empty(ctx: &FrameContext, name: &str) -> GfxCommandBuffer {
        let cmd = ctx.alloc_command_buffer(name).unwrap();
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, name).unwrap();
        cmd.end().unwrap();
        cmd
    }

    #[test]
    fn test_slots_cycle_and_release() {
        let (headless, mut ctx) = context(2);
        for frame in 0..5 {
            let slot = ctx.begin_frame().unwrap();
            assert_eq!(slot, frame % 2);
            let cmd = record_empty(&ctx, "draw");
            ctx.submit(cmd).unwrap();
            ctx.end_frame().unwrap();
            // 最多同时保留 fif_count 帧的 command buffer
            assert!(ctx.pending_command_buffers() <= 2);
        }
        assert_eq!(ctx.counter().frame_id(), 5);

        ctx.destroy().unwrap();
        assert_eq!(headless.live_count_of("CommandBuffer"), 0);
        assert_eq!(headless.live_count_of("Fence"), 0);
    }

    #[test]
    fn test_empty_frame_does_not_block() {
        let (_, mut ctx) = context(3);
        for _ in 0..7 {
            ctx.begin_frame().unwrap();
            ctx.end_frame().unwrap();
        }
        assert_eq!(ctx.frame_label(), FrameLabel::B);
    }

    #[test]
    fn test_phase_checks() {
        let (_, mut ctx) = context(2);
        assert!(ctx.end_frame().is_err());
        assert!(ctx.alloc_command_buffer("early").is_err());
        ctx.begin_frame().unwrap();
        assert!(ctx.begin_frame().is_err());
        ctx.end_frame().unwrap();
    }
}
