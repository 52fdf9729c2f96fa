//! 渲染核心与外部代码之间的接口层
//!
//! - [`ResourceStorage`](resource_storage::ResourceStorage)：所有 GPU 资源的唯一所有者，对外只给出 handle
//! - [`FrameContext`](frame_context::FrameContext)：frames in flight 的同步
//! - [`RenderSettings`](settings::RenderSettings)：TOML 配置

pub mod frame_context;
pub mod frame_counter;
pub mod handles;
pub mod per_frame_buffer;
pub mod present_target;
pub mod resource_pool;
pub mod resource_storage;
pub mod settings;
