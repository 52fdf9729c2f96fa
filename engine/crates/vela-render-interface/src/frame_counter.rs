use std::fmt::Display;

use vela_gfx::error::{GfxError, GfxResult};

/// 同时在 GPU 上执行的帧最多 3 个，每个槽位用一个字母标记
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameLabel {
    A,
    B,
    C,
}
impl Display for FrameLabel {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
        }
    }
}
impl FrameLabel {
    const ALL: [FrameLabel; 3] = [FrameLabel::A, FrameLabel::B, FrameLabel::C];

    #[inline]
    pub fn from_slot(slot: usize) -> Self {
        Self::ALL[slot % Self::ALL.len()]
    }

    #[inline]
    pub fn slot(self) -> usize {
        self as usize
    }
}

pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
    /// frames in flight 的数量，2 或 3
    fif_count: usize,
}
// new & init
impl FrameCounter {
    pub const MIN_FIF_COUNT: usize = 2;
    pub const MAX_FIF_COUNT: usize = 3;

    pub fn new(init_frame_id: u64, fif_count: usize) -> GfxResult<Self> {
        if !(Self::MIN_FIF_COUNT..=Self::MAX_FIF_COUNT).contains(&fif_count) {
            return Err(GfxError::InvalidParameter(format!(
                "frames in flight must be in {}..={}, got {fif_count}",
                Self::MIN_FIF_COUNT,
                Self::MAX_FIF_COUNT
            ))
            .logged());
        }
        Ok(Self {
            frame_id: init_frame_id,
            fif_count,
        })
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    #[inline]
    pub fn fif_count(&self) -> usize {
        self.fif_count
    }

    /// 当前帧使用的槽位，per-frame 资源按它索引
    #[inline]
    pub fn frame_slot(&self) -> usize {
        (self.frame_id % self.fif_count as u64) as usize
    }

    #[inline]
    pub fn frame_label(&self) -> FrameLabel {
        FrameLabel::from_slot(self.frame_slot())
    }

    #[inline]
    pub fn frame_labels(&self) -> &'static [FrameLabel] {
        &FrameLabel::ALL[..self.fif_count]
    }

    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_cycles() {
        let mut counter = FrameCounter::new(0, 2).unwrap();
        let mut labels = vec![];
        for _ in 0..5 {
            labels.push(counter.frame_label());
            counter.next_frame();
        }
        assert_eq!(labels, vec![FrameLabel::A, FrameLabel::B, FrameLabel::A, FrameLabel::B, FrameLabel::A]);
        assert_eq!(counter.frame_name(), "[F5B]");
        assert_eq!(counter.frame_labels().len(), 2);
    }

    #[test]
    fn test_fif_count_range() {
        assert!(FrameCounter::new(0, 1).is_err());
        assert!(FrameCounter::new(0, 4).is_err());
        assert_eq!(FrameCounter::new(7, 3).unwrap().frame_label(), FrameLabel::B);
    }
}
