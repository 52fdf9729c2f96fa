use std::convert::identity;
use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::error::{GfxError, GfxResult};
use crate::foundation::device::GfxDevice;
use crate::pipelines::shader::{GfxShaderModule, GfxShaderStage};
use crate::resources::layout::GfxVertexLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxPipelineKind {
    /// vertex + fragment，必须提供 vertex input
    Graphics,
    /// 只有一个 compute stage，不需要 vertex input 与 blend
    Compute,
}
impl GfxPipelineKind {
    #[inline]
    pub fn bind_point(self) -> vk::PipelineBindPoint {
        match self {
            GfxPipelineKind::Graphics => vk::PipelineBindPoint::GRAPHICS,
            GfxPipelineKind::Compute => vk::PipelineBindPoint::COMPUTE,
        }
    }
}

/// 顶点输入描述
#[derive(Clone, Debug, Default)]
pub struct GfxVertexInput {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}
impl GfxVertexInput {
    pub fn from_layout<V: GfxVertexLayout>() -> Self {
        Self {
            bindings: V::vertex_input_bindings(),
            attributes: V::vertex_input_attributes(),
        }
    }

    /// 顶点由 shader 自己生成（例如全屏三角形）
    #[inline]
    pub fn none() -> Self {
        Self::default()
    }
}

/// pipeline 的完整配置
///
/// 只是一个值，不持有任何 GPU 对象；[`GfxPipeline::new`] 才会真正创建。
#[derive(Clone)]
pub struct GfxPipelineCreateInfo {
    kind: GfxPipelineKind,
    stages: Vec<GfxShaderStage>,
    vertex_input: Option<GfxVertexInput>,

    set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constant_ranges: Vec<vk::PushConstantRange>,

    /// dynamic render 需要的 framebuffer 信息
    color_attach_formats: Vec<vk::Format>,
    /// format = undefined 表示不使用这个 attachment
    depth_attach_format: vk::Format,
    stencil_attach_format: vk::Format,

    primitive_topology: vk::PrimitiveTopology,
    rasterize_state_info: vk::PipelineRasterizationStateCreateInfo<'static>,
    msaa_sample: vk::SampleCountFlags,

    /// 为空时每个 color attachment 使用不混合的默认状态
    color_attach_blend_states: Vec<vk::PipelineColorBlendAttachmentState>,
    blend_constants: [f32; 4],

    depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo<'static>,
    dynamic_states: Vec<vk::DynamicState>,
}
// new & init
impl GfxPipelineCreateInfo {
    pub fn graphics() -> Self {
        Self {
            kind: GfxPipelineKind::Graphics,
            stages: vec![],
            vertex_input: None,

            set_layouts: vec![],
            push_constant_ranges: vec![],

            color_attach_formats: vec![],
            depth_attach_format: vk::Format::UNDEFINED,
            stencil_attach_format: vk::Format::UNDEFINED,

            primitive_topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            rasterize_state_info: vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(vk::CullModeFlags::BACK)
                // CCW 视为 front face
                .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
                .depth_bias_enable(false),
            msaa_sample: vk::SampleCountFlags::TYPE_1,

            color_attach_blend_states: vec![],
            blend_constants: [0.0; 4],

            depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(true)
                .depth_write_enable(true)
                .depth_compare_op(vk::CompareOp::LESS)
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false),
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    pub fn compute(stage: GfxShaderStage) -> Self {
        Self {
            kind: GfxPipelineKind::Compute,
            stages: vec![stage],
            dynamic_states: vec![],
            ..Self::graphics()
        }
    }
}
// builder
impl GfxPipelineCreateInfo {
    #[inline]
    pub fn shader_stage(mut self, stage: GfxShaderStage) -> Self {
        self.stages.push(stage);
        self
    }

    #[inline]
    pub fn vertex_input(mut self, vertex_input: GfxVertexInput) -> Self {
        self.vertex_input = Some(vertex_input);
        self
    }

    #[inline]
    pub fn set_layouts(mut self, set_layouts: &[vk::DescriptorSetLayout]) -> Self {
        self.set_layouts = set_layouts.to_vec();
        self
    }

    #[inline]
    pub fn push_constant_range(mut self, stage_flags: vk::ShaderStageFlags, offset: u32, size: u32) -> Self {
        self.push_constant_ranges.push(vk::PushConstantRange { stage_flags, offset, size });
        self
    }

    #[inline]
    pub fn attach_info(
        mut self,
        color_attach_formats: Vec<vk::Format>,
        depth_format: Option<vk::Format>,
        stencil_format: Option<vk::Format>,
    ) -> Self {
        self.color_attach_formats = color_attach_formats;
        self.depth_attach_format = depth_format.unwrap_or(vk::Format::UNDEFINED);
        self.stencil_attach_format = stencil_format.unwrap_or(vk::Format::UNDEFINED);
        self
    }

    #[inline]
    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.primitive_topology = topology;
        self
    }

    #[inline]
    pub fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.rasterize_state_info.polygon_mode = mode;
        self
    }

    #[inline]
    pub fn cull_mode(mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.rasterize_state_info.cull_mode = mode;
        self.rasterize_state_info.front_face = front_face;
        self
    }

    #[inline]
    pub fn msaa(mut self, samples: vk::SampleCountFlags) -> Self {
        self.msaa_sample = samples;
        self
    }

    /// 为每个 color attachment 指定 blend 操作
    #[inline]
    pub fn color_blend(mut self, states: Vec<vk::PipelineColorBlendAttachmentState>, constants: [f32; 4]) -> Self {
        self.color_attach_blend_states = states;
        self.blend_constants = constants;
        self
    }

    #[inline]
    pub fn depth_test(mut self, depth_test_op: Option<vk::CompareOp>, depth_write: bool) -> Self {
        self.depth_stencil_info.depth_test_enable = depth_test_op.map_or(vk::FALSE, |_| vk::TRUE);
        self.depth_stencil_info.depth_compare_op = depth_test_op.map_or(vk::CompareOp::NEVER, identity);
        self.depth_stencil_info.depth_write_enable = if depth_write { vk::TRUE } else { vk::FALSE };
        self
    }

    #[inline]
    pub fn stencil_test(mut self, enable: bool) -> Self {
        self.depth_stencil_info.stencil_test_enable = if enable { vk::TRUE } else { vk::FALSE };
        self
    }

    #[inline]
    pub fn dynamic_states(mut self, states: Vec<vk::DynamicState>) -> Self {
        self.dynamic_states = states;
        self
    }
}
// getters
impl GfxPipelineCreateInfo {
    #[inline]
    pub fn kind(&self) -> GfxPipelineKind {
        self.kind
    }

    /// 所有 stage 的并集
    pub fn stage_flags(&self) -> vk::ShaderStageFlags {
        self.stages.iter().fold(vk::ShaderStageFlags::empty(), |acc, s| acc | s.stage)
    }
}
// validate
impl GfxPipelineCreateInfo {
    /// 创建之前的全部检查，不接触设备
    pub fn validate(&self, name: &str, max_push_constants_size: u32) -> GfxResult<()> {
        let count_of = |stage: vk::ShaderStageFlags| self.stages.iter().filter(|s| s.stage == stage).count();
        let missing = |stage| GfxError::MissingShaderStage {
            pipeline: name.to_string(),
            stage,
        };

        match self.kind {
            GfxPipelineKind::Graphics => {
                for stage in [vk::ShaderStageFlags::VERTEX, vk::ShaderStageFlags::FRAGMENT] {
                    if count_of(stage) != 1 {
                        return Err(missing(stage).logged());
                    }
                }
                if let Some(extra) = self
                    .stages
                    .iter()
                    .find(|s| s.stage != vk::ShaderStageFlags::VERTEX && s.stage != vk::ShaderStageFlags::FRAGMENT)
                {
                    return Err(GfxError::InvalidParameter(format!(
                        "graphics pipeline `{name}` does not accept {:?} stage",
                        extra.stage
                    ))
                    .logged());
                }
                if self.vertex_input.is_none() {
                    return Err(GfxError::MissingVertexInput { pipeline: name.to_string() }.logged());
                }
                if !self.color_attach_blend_states.is_empty()
                    && self.color_attach_blend_states.len() != self.color_attach_formats.len()
                {
                    return Err(GfxError::InvalidParameter(format!(
                        "pipeline `{name}`: {} blend states for {} color attachments",
                        self.color_attach_blend_states.len(),
                        self.color_attach_formats.len()
                    ))
                    .logged());
                }
            }
            GfxPipelineKind::Compute => {
                if self.stages.len() != 1 || count_of(vk::ShaderStageFlags::COMPUTE) != 1 {
                    return Err(missing(vk::ShaderStageFlags::COMPUTE).logged());
                }
            }
        }

        for stage in &self.stages {
            stage.validate()?;
        }
        self.validate_push_constants(name, max_push_constants_size)
    }

    fn validate_push_constants(&self, name: &str, max_size: u32) -> GfxResult<()> {
        let pipeline_stages = self.stage_flags();
        let mismatch = |index, reason: String| {
            Err(GfxError::PushConstantMismatch {
                pipeline: name.to_string(),
                index,
                reason,
            }
            .logged())
        };

        for (index, range) in self.push_constant_ranges.iter().enumerate() {
            if range.size == 0 {
                return mismatch(index, "size is zero".to_string());
            }
            if range.offset % 4 != 0 || range.size % 4 != 0 {
                return mismatch(index, format!("offset {} / size {} not 4-byte aligned", range.offset, range.size));
            }
            if range.offset + range.size > max_size {
                return mismatch(index, format!("ends at {}, device limit is {max_size}", range.offset + range.size));
            }
            if range.stage_flags.is_empty() || !pipeline_stages.contains(range.stage_flags) {
                return mismatch(
                    index,
                    format!("stages {:?} not within pipeline stages {pipeline_stages:?}", range.stage_flags),
                );
            }
            // 任意两个 range 不能包含相同的 stage
            if let Some(other) =
                self.push_constant_ranges[..index].iter().position(|r| r.stage_flags.intersects(range.stage_flags))
            {
                return mismatch(index, format!("shares stages with range #{other}"));
            }
        }
        Ok(())
    }
}

pub struct GfxPipelineLayout {
    device: Rc<dyn GfxDevice>,
    handle: vk::PipelineLayout,
}
impl Drop for GfxPipelineLayout {
    fn drop(&mut self) {
        self.device.destroy_pipeline_layout(self.handle);
    }
}
impl GfxPipelineLayout {
    pub fn new(
        device: Rc<dyn GfxDevice>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        name: &str,
    ) -> GfxResult<Self> {
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let handle = device.create_pipeline_layout(&info, name)?;
        Ok(Self { device, handle })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }
}

/// 编译完成的 pipeline，创建后不可变
///
/// 持有自己的 layout；shader module 在创建完成后就已经释放
pub struct GfxPipeline {
    device: Rc<dyn GfxDevice>,
    handle: vk::Pipeline,
    layout: GfxPipelineLayout,
    kind: GfxPipelineKind,
    push_constant_ranges: Vec<vk::PushConstantRange>,
    name: String,
}
impl Drop for GfxPipeline {
    fn drop(&mut self) {
        log::debug!("destroying pipeline `{}`", self.name);
        self.device.destroy_pipeline(self.handle);
    }
}
// new & init
impl GfxPipeline {
    /// 要么完整创建成功，要么返回错误并释放所有已经创建的对象
    pub fn new(device: Rc<dyn GfxDevice>, info: &GfxPipelineCreateInfo, name: impl AsRef<str>) -> GfxResult<Self> {
        vela_crate_tools::profile_function!();
        let name = name.as_ref();
        info.validate(name, device.limits().max_push_constants_size)?;

        // layout 与 module 在出错时随 drop 释放
        let layout = GfxPipelineLayout::new(device.clone(), &info.set_layouts, &info.push_constant_ranges, name)?;
        let modules = info
            .stages
            .iter()
            .map(|stage| GfxShaderModule::new(device.clone(), stage))
            .collect::<GfxResult<Vec<_>>>()?;
        let stage_infos = info
            .stages
            .iter()
            .zip(&modules)
            .map(|(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(module.handle())
                    .name(&stage.entry_point)
            })
            .collect_vec();

        let handle = match info.kind {
            GfxPipelineKind::Compute => {
                let compute_info = vk::ComputePipelineCreateInfo::default().stage(stage_infos[0]).layout(layout.handle());
                device.create_compute_pipeline(&compute_info, name)?
            }
            GfxPipelineKind::Graphics => Self::create_graphics(&*device, info, &stage_infos, layout.handle(), name)?,
        };
        log::info!("pipeline `{name}` created ({:?}, {} stages)", info.kind, modules.len());

        Ok(Self {
            device,
            handle,
            layout,
            kind: info.kind,
            push_constant_ranges: info.push_constant_ranges.clone(),
            name: name.to_string(),
        })
    }

    fn create_graphics(
        device: &dyn GfxDevice,
        info: &GfxPipelineCreateInfo,
        stage_infos: &[vk::PipelineShaderStageCreateInfo<'_>],
        layout: vk::PipelineLayout,
        name: &str,
    ) -> GfxResult<vk::Pipeline> {
        // dynamic rendering 需要的 framebuffer 信息
        let mut attach_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&info.color_attach_formats)
            .depth_attachment_format(info.depth_attach_format)
            .stencil_attachment_format(info.stencil_attach_format);

        let vertex_input = info.vertex_input.as_ref().map(|v| (&v.bindings[..], &v.attributes[..])).unwrap_or_default();
        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(vertex_input.0)
            .vertex_attribute_descriptions(vertex_input.1);

        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(info.primitive_topology)
            .primitive_restart_enable(false);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        let msaa_info = vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(info.msaa_sample);

        let blend_states = if info.color_attach_blend_states.is_empty() {
            let opaque = vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(false)
                .color_write_mask(vk::ColorComponentFlags::RGBA);
            vec![opaque; info.color_attach_formats.len()]
        } else {
            info.color_attach_blend_states.clone()
        };
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_states)
            .blend_constants(info.blend_constants);

        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&info.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(stage_infos)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&info.rasterize_state_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&info.depth_stencil_info)
            .layout(layout)
            .dynamic_state(&dynamic_state_info)
            .push_next(&mut attach_info);

        device.create_graphics_pipeline(&pipeline_info, name)
    }
}
// getters
impl GfxPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    #[inline]
    pub fn kind(&self) -> GfxPipelineKind {
        self.kind
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.kind.bind_point()
    }

    #[inline]
    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.push_constant_ranges
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::headless::{HeadlessDevice, HeadlessDeviceDesc};
    use crate::pipelines::shader::dummy_spirv;
    use crate::resources::layout::VertexPosColor;

    fn headless() -> (Rc<HeadlessDevice>, Rc<dyn GfxDevice>) {
        let headless = Rc::new(HeadlessDevice::new(HeadlessDeviceDesc::default()));
        let device: Rc<dyn GfxDevice> = headless.clone();
        (headless, device)
    }

    fn stage(stage: vk::ShaderStageFlags) -> GfxShaderStage {
        GfxShaderStage::from_spirv(stage, dummy_spirv(), format!("{stage:?}"))
    }

    fn triangle() -> GfxPipelineCreateInfo {
        GfxPipelineCreateInfo::graphics()
            .shader_stage(stage(vk::ShaderStageFlags::VERTEX))
            .shader_stage(stage(vk::ShaderStageFlags::FRAGMENT))
            .vertex_input(GfxVertexInput::from_layout::<VertexPosColor>())
            .attach_info(vec![vk::Format::R8G8B8A8_UNORM], None, None)
    }

    #[test]
    fn test_graphics_pipeline() {
        let (headless, device) = headless();
        let pipeline = GfxPipeline::new(device, &triangle(), "triangle").unwrap();
        assert_eq!(pipeline.bind_point(), vk::PipelineBindPoint::GRAPHICS);
        // module 在创建完成后就释放了
        assert_eq!(headless.live_count_of("ShaderModule"), 0);
        assert_eq!(headless.live_count_of("Pipeline"), 1);

        drop(pipeline);
        assert_eq!(headless.live_object_count(), 0);
    }

    #[test]
    fn test_compute_pipeline() {
        let (_, device) = headless();
        let info = GfxPipelineCreateInfo::compute(stage(vk::ShaderStageFlags::COMPUTE)).push_constant_range(
            vk::ShaderStageFlags::COMPUTE,
            0,
            16,
        );
        let pipeline = GfxPipeline::new(device, &info, "blur").unwrap();
        assert_eq!(pipeline.kind(), GfxPipelineKind::Compute);
        assert_eq!(pipeline.push_constant_ranges().len(), 1);
    }

    #[test]
    fn test_missing_vertex_input() {
        let (headless, device) = headless();
        let info = GfxPipelineCreateInfo::graphics()
            .shader_stage(stage(vk::ShaderStageFlags::VERTEX))
            .shader_stage(stage(vk::ShaderStageFlags::FRAGMENT));
        assert!(matches!(GfxPipeline::new(device, &info, "p"), Err(GfxError::MissingVertexInput { .. })));
        assert_eq!(headless.live_object_count(), 0);
    }

    #[test]
    fn test_missing_fragment_stage() {
        let (_, device) = headless();
        let info = GfxPipelineCreateInfo::graphics()
            .shader_stage(stage(vk::ShaderStageFlags::VERTEX))
            .vertex_input(GfxVertexInput::none());
        assert!(matches!(
            GfxPipeline::new(device, &info, "p"),
            Err(GfxError::MissingShaderStage { stage: vk::ShaderStageFlags::FRAGMENT, .. })
        ));
    }

    #[test]
    fn test_compute_rejects_graphics_stage() {
        let (_, device) = headless();
        let info = GfxPipelineCreateInfo::compute(stage(vk::ShaderStageFlags::VERTEX));
        assert!(matches!(GfxPipeline::new(device, &info, "p"), Err(GfxError::MissingShaderStage { .. })));
    }

    #[test]
    fn test_bad_bytecode_leaves_nothing_behind() {
        let (headless, device) = headless();
        let info = GfxPipelineCreateInfo::graphics()
            .shader_stage(stage(vk::ShaderStageFlags::VERTEX))
            .shader_stage(GfxShaderStage::from_spirv(vk::ShaderStageFlags::FRAGMENT, vec![0xdead_beef], "bad"))
            .vertex_input(GfxVertexInput::none());
        assert!(matches!(GfxPipeline::new(device, &info, "p"), Err(GfxError::InvalidShaderCode { .. })));
        assert_eq!(headless.live_object_count(), 0);
    }

    #[test]
    fn test_push_constant_validation() {
        let (_, device) = headless();
        let cases = [
            triangle().push_constant_range(vk::ShaderStageFlags::VERTEX, 0, 0),
            triangle().push_constant_range(vk::ShaderStageFlags::VERTEX, 2, 8),
            triangle().push_constant_range(vk::ShaderStageFlags::VERTEX, 0, 256),
            triangle().push_constant_range(vk::ShaderStageFlags::COMPUTE, 0, 16),
            triangle()
                .push_constant_range(vk::ShaderStageFlags::VERTEX, 0, 16)
                .push_constant_range(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT, 16, 16),
        ];
        for info in &cases {
            assert!(matches!(
                GfxPipeline::new(device.clone(), info, "p"),
                Err(GfxError::PushConstantMismatch { .. })
            ));
        }

        let ok = triangle()
            .push_constant_range(vk::ShaderStageFlags::VERTEX, 0, 16)
            .push_constant_range(vk::ShaderStageFlags::FRAGMENT, 16, 16);
        assert!(GfxPipeline::new(device, &ok, "p").is_ok());
    }
}
