pub mod device;
pub mod headless;
pub mod vulkan;
