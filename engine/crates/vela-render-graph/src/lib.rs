//! 声明式的 pass 调度
//!
//! - pass 声明读写的资源以及要求的状态
//! - [`RenderGraph`](render_graph::RenderGraph) 按生产者与消费者的关系排序 pass，推导最少的 barrier
//! - 声明不变时每帧重放同一份 [`CompiledRenderGraph`](compiled::CompiledRenderGraph)

pub mod barrier;
pub mod compiled;
pub mod error;
pub mod graph;
pub mod pass;
pub mod render_graph;
pub mod resource;
pub mod resource_state;
