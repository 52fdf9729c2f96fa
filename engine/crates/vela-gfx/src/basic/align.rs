use ash::vk;

/// 将 `size` 向上对齐到 `alignment`
///
/// `alignment` 必须是 2 的幂；`alignment == 0` 视为不需要对齐。
/// 结果超出 `vk::DeviceSize` 的范围时返回 `None`
#[inline]
pub const fn align_up(size: vk::DeviceSize, alignment: vk::DeviceSize) -> Option<vk::DeviceSize> {
    if alignment == 0 {
        return Some(size);
    }
    match size.checked_add(alignment - 1) {
        Some(padded) => Some(padded & !(alignment - 1)),
        None => None,
    }
}

/// 对齐值是否合法：必须是非零的 2 的幂
#[inline]
pub const fn is_valid_alignment(alignment: vk::DeviceSize) -> bool {
    alignment != 0 && alignment.is_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up_basic() {
        assert_eq!(align_up(64, 256), Some(256));
        assert_eq!(align_up(256, 256), Some(256));
        assert_eq!(align_up(257, 256), Some(512));
        assert_eq!(align_up(0, 16), Some(0));
        assert_eq!(align_up(13, 1), Some(13));
        assert_eq!(align_up(13, 0), Some(13));
    }

    #[test]
    fn test_align_up_overflow() {
        assert_eq!(align_up(u64::MAX - 10, 256), None);
        assert_eq!(align_up(u64::MAX, 2), None);
        assert_eq!(align_up(u64::MAX, 1), Some(u64::MAX));
        assert_eq!(align_up(u64::MAX - 255, 256), Some(u64::MAX - 255));
    }

    #[test]
    fn test_align_up_idempotent_and_monotonic() {
        for alignment in [1u64, 2, 4, 8, 16, 64, 256, 1024, 4096] {
            for size in 0..2048u64 {
                let aligned = align_up(size, alignment).unwrap();
                assert!(aligned >= size);
                assert_eq!(aligned % alignment, 0);
                assert_eq!(align_up(aligned, alignment), Some(aligned));
                assert!(aligned - size < alignment);
            }
        }
    }

    #[test]
    fn test_valid_alignment() {
        assert!(is_valid_alignment(1));
        assert!(is_valid_alignment(256));
        assert!(!is_valid_alignment(0));
        assert!(!is_valid_alignment(48));
    }
}
