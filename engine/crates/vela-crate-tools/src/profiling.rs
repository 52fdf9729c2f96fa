//! 基于 tracy 的性能分析宏
//!
//! 只有打开 `profiling` feature 时宏才会生成 span，否则展开为空。
//! 使用前需要调用一次 [`start`]，否则 tracy 的 span 宏会因为没有运行中的 client 而 panic。

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client, span};

/// 启动 tracy client，未开启 `profiling` 时什么也不做
#[inline]
pub fn start() {
    #[cfg(feature = "profiling")]
    {
        let _ = tracy_client::Client::start();
    }
}

/// 为当前作用域创建一个命名 span
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// 为整个函数创建 span，放在函数体第一行
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// 标记一帧结束
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_client::frame_mark()
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}
