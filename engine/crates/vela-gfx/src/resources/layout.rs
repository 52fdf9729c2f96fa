use ash::vk;

/// 索引类型 (u16 或 u32)
pub trait GfxIndexType: bytemuck::Pod {
    const VK_INDEX_TYPE: vk::IndexType;

    fn byte_size() -> usize {
        size_of::<Self>()
    }
}

impl GfxIndexType for u16 {
    const VK_INDEX_TYPE: vk::IndexType = vk::IndexType::UINT16;
}

impl GfxIndexType for u32 {
    const VK_INDEX_TYPE: vk::IndexType = vk::IndexType::UINT32;
}

/// 顶点在 vertex buffer 中的布局
///
/// 图形管线通过它得到 vertex input 的 binding 与 attribute 描述
pub trait GfxVertexLayout: bytemuck::Pod {
    fn vertex_input_bindings() -> Vec<vk::VertexInputBindingDescription>;

    fn vertex_input_attributes() -> Vec<vk::VertexInputAttributeDescription>;
}

/// 位置 + 颜色，测试与示例程序使用
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VertexPosColor {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}
impl GfxVertexLayout for VertexPosColor {
    fn vertex_input_bindings() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    fn vertex_input_attributes() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: size_of::<[f32; 3]>() as u32,
            },
        ]
    }
}
