//! Vela 的 GFX 层
//!
//! 所有 GPU 对象都通过注入的 [`GfxDevice`](foundation::device::GfxDevice) 创建与销毁，
//! 上层永远不直接接触 Vulkan 函数表。两个后端：
//! - [`VulkanDevice`](foundation::vulkan::VulkanDevice)：ash + vk-mem 的真实实现
//! - [`HeadlessDevice`](foundation::headless::HeadlessDevice)：用主机内存模拟的实现，用于测试与离线运行

pub mod basic;
pub mod commands;
pub mod descriptors;
pub mod error;
pub mod foundation;
pub mod pipelines;
pub mod resources;
pub mod sampler;
