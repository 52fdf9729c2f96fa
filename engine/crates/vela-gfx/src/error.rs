use ash::vk;

/// GFX 层的所有错误
///
/// 每个变体都带上出错资源的名字或 id，日志里可以直接定位是哪一个请求失败。
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("vulkan call `{what}` failed: {result}")]
    Vulkan { what: String, result: vk::Result },

    #[error("out of memory while allocating `{name}` ({size} bytes)")]
    OutOfMemory { name: String, size: vk::DeviceSize },

    #[error("shared descriptor pool exhausted while allocating a set for layout `{layout}`")]
    DescriptorPoolExhausted { layout: String },

    #[error("stale {kind} handle (id = {id})")]
    StaleHandle { kind: &'static str, id: i32 },

    #[error("descriptor set layout `{layout}` declares binding {binding} more than once")]
    DuplicateBinding { layout: String, binding: u32 },

    #[error("descriptor set `{set}` binding {binding}: {reason}")]
    BindingMismatch { set: String, binding: u32, reason: String },

    #[error("shader `{name}` is not valid SPIR-V: {reason}")]
    InvalidShaderCode { name: String, reason: &'static str },

    #[error("pipeline `{pipeline}` push constant range #{index}: {reason}")]
    PushConstantMismatch { pipeline: String, index: usize, reason: String },

    #[error("pipeline `{pipeline}` requires exactly one {stage:?} shader stage")]
    MissingShaderStage { pipeline: String, stage: vk::ShaderStageFlags },

    #[error("graphics pipeline `{pipeline}` has no vertex input description")]
    MissingVertexInput { pipeline: String },

    #[error("buffer `{name}` is not host mapped")]
    NotMapped { name: String },

    #[error("buffer `{name}`: {len} bytes at offset {offset} exceed its size {size}")]
    OutOfBounds { name: String, offset: vk::DeviceSize, len: vk::DeviceSize, size: vk::DeviceSize },

    #[error("unsupported format {0:?}")]
    UnsupportedFormat(vk::Format),

    #[error("fence wait timed out after {0} ns")]
    Timeout(u64),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type GfxResult<T> = Result<T, GfxError>;

impl GfxError {
    #[inline]
    pub fn vulkan(what: impl Into<String>, result: vk::Result) -> Self {
        Self::Vulkan { what: what.into(), result }
    }

    /// 分配失败时，把 OOM 类的结果归类为 [`GfxError::OutOfMemory`]
    pub fn from_alloc(name: &str, size: vk::DeviceSize, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                Self::OutOfMemory { name: name.to_string(), size }
            }
            _ => Self::vulkan(format!("allocate `{name}`"), result),
        }
    }

    /// 在错误被抛出的位置打印日志，然后原样返回
    #[inline]
    pub fn logged(self) -> Self {
        log::error!("{self}");
        self
    }
}
