//! 示例场景：一个三角形画到 HDR attachment，再由 compute pass tonemap 到 LDR

use std::fs;
use std::path::Path;

use anyhow::Context;
use ash::vk;

use vela_gfx::descriptors::descriptor::GfxDescriptorBinding;
use vela_gfx::pipelines::pipeline::{GfxPipelineCreateInfo, GfxVertexInput};
use vela_gfx::pipelines::shader::{GfxShaderStage, dummy_spirv};
use vela_gfx::resources::layout::VertexPosColor;
use vela_render_graph::render_graph::RenderGraph;
use vela_render_graph::resource::RgImageDesc;
use vela_render_graph::resource_state::{RgPassKind, RgResourceState};
use vela_render_interface::handles::{
    GfxBufferHandle, GfxDescriptorSetHandle, GfxDescriptorSetLayoutHandle, GfxPipelineHandle,
};
use vela_render_interface::per_frame_buffer::PerFrameBuffer;
use vela_render_interface::resource_storage::ResourceStorage;
use vela_render_interface::settings::RenderSettings;

pub const HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// 每帧更新的 uniform
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneUniform {
    pub time: f32,
    pub frame_id: u32,
    pub extent: [u32; 2],
}

/// tonemap 的 push constant
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct TonemapConstants {
    extent: [u32; 2],
    exposure: f32,
    _padding: f32,
}

const TRIANGLE: [VertexPosColor; 3] = [
    VertexPosColor {
        pos: [0.0, -0.5, 0.0],
        color: [1.0, 0.0, 0.0],
    },
    VertexPosColor {
        pos: [0.5, 0.5, 0.0],
        color: [0.0, 1.0, 0.0],
    },
    VertexPosColor {
        pos: [-0.5, 0.5, 0.0],
        color: [0.0, 0.0, 1.0],
    },
];

pub struct DemoScene {
    vertex_buffer: GfxBufferHandle,
    uniform: PerFrameBuffer<SceneUniform>,
    scene_layout: GfxDescriptorSetLayoutHandle,
    /// 每个 frame slot 一份，分别指向 uniform 中对应的实例
    scene_sets: Vec<GfxDescriptorSetHandle>,
    triangle_pipeline: GfxPipelineHandle,
    tonemap_pipeline: GfxPipelineHandle,

    color_format: vk::Format,
    depth_format: vk::Format,
}

// new & init
impl DemoScene {
    /// `shader_dir` 中需要有 `triangle.vert.spv`、`triangle.frag.spv` 与 `tonemap.comp.spv`；
    /// 没有提供时使用只有 header 的 SPIR-V，只能在 headless 设备上创建 pipeline
    pub fn new(
        storage: &mut ResourceStorage,
        settings: &RenderSettings,
        shader_dir: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let color_format = settings.frame.color_format()?;
        let depth_format = settings.frame.depth_format()?;

        let vertex_buffer = storage.create_vertex_buffer_from(&TRIANGLE, "triangle-vertices")?;
        let uniform = PerFrameBuffer::<SceneUniform>::new(
            storage,
            settings.frames_in_flight,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "scene-uniform",
        )?;

        let scene_layout = storage.create_descriptor_set_layout(
            &[GfxDescriptorBinding::uniform_buffer(
                0,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )],
            "scene",
        )?;
        let scene_sets = (0..settings.frames_in_flight)
            .map(|slot| {
                storage.create_descriptor_set(
                    scene_layout,
                    &[uniform.descriptor_write(0, vk::DescriptorType::UNIFORM_BUFFER, slot)],
                    format!("scene-{slot}"),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let triangle_info = GfxPipelineCreateInfo::graphics()
            .shader_stage(load_stage(shader_dir, "triangle.vert.spv", vk::ShaderStageFlags::VERTEX)?)
            .shader_stage(load_stage(shader_dir, "triangle.frag.spv", vk::ShaderStageFlags::FRAGMENT)?)
            .vertex_input(GfxVertexInput::from_layout::<VertexPosColor>())
            .attach_info(vec![HDR_FORMAT], Some(depth_format), None)
            .cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::COUNTER_CLOCKWISE);
        let triangle_pipeline = storage.create_pipeline(triangle_info, &[scene_layout], "triangle")?;

        let tonemap_info = GfxPipelineCreateInfo::compute(load_stage(
            shader_dir,
            "tonemap.comp.spv",
            vk::ShaderStageFlags::COMPUTE,
        )?)
        .push_constant_range(vk::ShaderStageFlags::COMPUTE, 0, size_of::<TonemapConstants>() as u32);
        let tonemap_pipeline = storage.create_pipeline(tonemap_info, &[], "tonemap")?;

        log::info!("demo scene created: {} frame slots", scene_sets.len());
        Ok(Self {
            vertex_buffer,
            uniform,
            scene_layout,
            scene_sets,
            triangle_pipeline,
            tonemap_pipeline,
            color_format,
            depth_format,
        })
    }

    /// triangle -> tonemap，最后把 LDR 结果转换到 present 状态
    pub fn build_graph(&self, graph: &mut RenderGraph<'_>) -> anyhow::Result<()> {
        graph.declare_virtual("hdr", RgImageDesc::color(HDR_FORMAT));
        graph.declare_virtual("depth", RgImageDesc::depth(self.depth_format));
        graph.declare_virtual(
            "ldr",
            RgImageDesc::color(self.color_format).with_usage(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC),
        );

        let vertex_buffer = self.vertex_buffer;
        let uniform = self.uniform.handle();
        let pipeline = self.triangle_pipeline;
        let sets = self.scene_sets.clone();
        graph.add_pass(
            "triangle",
            RgPassKind::Graphics,
            |b| {
                b.read(vertex_buffer, RgResourceState::VertexBuffer)
                    .read(uniform, RgResourceState::UniformBuffer)
                    .write("hdr", RgResourceState::ColorAttachment)
                    .write("depth", RgResourceState::DepthAttachment);
            },
            move |ctx| {
                let pipeline = ctx.storage.get_pipeline(pipeline)?;
                let set = ctx.storage.get_descriptor_set(sets[ctx.frame_slot])?;
                ctx.cmd.cmd_bind_pipeline(pipeline.bind_point(), pipeline.handle());
                ctx.cmd.cmd_bind_descriptor_sets(pipeline.bind_point(), pipeline.layout(), 0, &[set.handle()], &[]);
                ctx.cmd.cmd_bind_vertex_buffers(0, &[ctx.buffer(vertex_buffer)?], &[0]);
                ctx.cmd.cmd_draw(TRIANGLE.len() as u32, 1, 0, 0);
                Ok(())
            },
        )?;

        let pipeline = self.tonemap_pipeline;
        graph.add_pass(
            "tonemap",
            RgPassKind::Compute,
            |b| {
                b.read("hdr", RgResourceState::ShaderReadOnly).write("ldr", RgResourceState::General);
            },
            move |ctx| {
                let pipeline = ctx.storage.get_pipeline(pipeline)?;
                let extent = ctx.image("ldr")?.extent();
                let constants = TonemapConstants {
                    extent: [extent.width, extent.height],
                    exposure: 1.0,
                    _padding: 0.0,
                };
                ctx.cmd.cmd_bind_pipeline(pipeline.bind_point(), pipeline.handle());
                ctx.cmd.cmd_push_constants(
                    pipeline.layout(),
                    vk::ShaderStageFlags::COMPUTE,
                    0,
                    bytemuck::bytes_of(&constants),
                );
                ctx.cmd.cmd_dispatch(glam::uvec3(extent.width.div_ceil(8), extent.height.div_ceil(8), 1));
                Ok(())
            },
        )?;

        graph.set_final_state("ldr", RgResourceState::Present)?;
        Ok(())
    }
}

// getters
impl DemoScene {
    #[inline]
    pub fn uniform(&self) -> &PerFrameBuffer<SceneUniform> {
        &self.uniform
    }
}

// destroy
impl DemoScene {
    pub fn destroy(self, storage: &mut ResourceStorage) -> anyhow::Result<()> {
        storage.destroy_pipeline(self.tonemap_pipeline)?;
        storage.destroy_pipeline(self.triangle_pipeline)?;
        for set in self.scene_sets {
            storage.destroy_descriptor_set(set)?;
        }
        storage.destroy_descriptor_set_layout(self.scene_layout)?;
        self.uniform.destroy(storage)?;
        storage.destroy_buffer(self.vertex_buffer)?;
        Ok(())
    }
}

fn load_stage(dir: Option<&Path>, file: &str, stage: vk::ShaderStageFlags) -> anyhow::Result<GfxShaderStage> {
    match dir {
        Some(dir) => {
            let path = dir.join(file);
            let bytes = fs::read(&path).with_context(|| format!("failed to read shader {path:?}"))?;
            Ok(GfxShaderStage::from_bytes(stage, &bytes, file)?)
        }
        None => Ok(GfxShaderStage::from_spirv(stage, dummy_spirv(), file)),
    }
}
