//! 在各个 crates 之间共享的工具
//!
//! - [`init_log`]：带颜色与时间戳的日志初始化
//! - [`profiling`]：可选的 tracy 性能分析宏

pub mod init_log;
pub mod profiling;
