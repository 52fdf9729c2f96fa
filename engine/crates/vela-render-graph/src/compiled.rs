//! 编译结果：执行顺序、每个 pass 的 barrier 与资源解析表
//!
//! 结构不变时每帧重放同一份编译结果。

use ash::vk;
use itertools::Itertools;

use vela_gfx::commands::command_buffer::GfxCommandBuffer;
use vela_gfx::error::GfxResult;
use vela_render_interface::resource_storage::ResourceStorage;

use crate::barrier::PassBarriers;
use crate::graph::DependencyGraph;
use crate::pass::{RgPassId, RgResourceUse};
use crate::resource::{RgPhysicalResource, RgResourceIdentity, RgResourceNode};
use crate::resource_state::RgPassKind;

/// 编译后的单个 pass
#[derive(Clone, Debug)]
pub struct RgCompiledPass {
    pub id: RgPassId,
    pub name: String,
    pub kind: RgPassKind,
    pub uses: Vec<RgResourceUse>,
    /// 执行前的 barrier
    pub barriers: PassBarriers,
    /// 传给回调的资源解析表
    pub resources: Vec<(RgResourceIdentity, RgPhysicalResource)>,
}

/// 编译后的渲染图
///
/// pass 按声明顺序存放，`execution_order` 是拓扑排序之后的下标。
#[derive(Clone, Debug)]
pub struct CompiledRenderGraph {
    pub(crate) passes: Vec<RgCompiledPass>,
    pub(crate) execution_order: Vec<usize>,
    pub(crate) resources: Vec<RgResourceNode>,
    /// 最后一个 pass 之后的 barrier
    pub(crate) final_barriers: PassBarriers,
    pub(crate) dep_graph: DependencyGraph,
}

// getters
impl CompiledRenderGraph {
    #[inline]
    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    /// 按执行顺序排列的 pass 名字
    pub fn execution_order_names(&self) -> Vec<&str> {
        self.execution_order.iter().map(|&i| self.passes[i].name.as_str()).collect()
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn passes(&self) -> &[RgCompiledPass] {
        &self.passes
    }

    pub fn pass(&self, name: &str) -> Option<&RgCompiledPass> {
        self.passes.iter().find(|p| p.name == name)
    }

    /// 某个 pass 之前的 barrier
    pub fn barriers_before(&self, name: &str) -> Option<&PassBarriers> {
        self.pass(name).map(|p| &p.barriers)
    }

    #[inline]
    pub fn final_barriers(&self) -> &PassBarriers {
        &self.final_barriers
    }

    #[inline]
    pub fn resources(&self) -> &[RgResourceNode] {
        &self.resources
    }

    pub fn resource_index(&self, identity: &RgResourceIdentity) -> Option<usize> {
        self.resources.iter().position(|r| &r.identity == identity)
    }

    #[inline]
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dep_graph
    }

    /// 所有 barrier 的数量，包括最后的 barrier
    pub fn barrier_count(&self) -> usize {
        self.passes.iter().map(|p| p.barriers.len()).sum::<usize>() + self.final_barriers.len()
    }
}

// 录制
impl CompiledRenderGraph {
    /// 把 barrier 解析到物理资源并录制到 command buffer 中
    pub(crate) fn record_barriers(
        &self,
        cmd: &GfxCommandBuffer,
        barriers: &PassBarriers,
        storage: &ResourceStorage,
    ) -> GfxResult<()> {
        if !barriers.has_barriers() {
            return Ok(());
        }

        let image_barriers = barriers
            .image_barriers
            .iter()
            .filter_map(|desc| {
                let texture = self.resources[desc.resource].physical.texture_ref()?;
                Some(storage.get_image(texture).map(|image| desc.to_image_barrier(image.handle())))
            })
            .collect::<GfxResult<Vec<_>>>()?;
        let buffer_barriers = barriers
            .buffer_barriers
            .iter()
            .filter_map(|desc| {
                let buffer = self.resources[desc.resource].physical.buffer()?;
                Some(storage.get_buffer(buffer).map(|buffer| desc.to_buffer_barrier(buffer.handle())))
            })
            .collect::<GfxResult<Vec<_>>>()?;

        cmd.memory_barrier(&image_barriers, &buffer_barriers);
        Ok(())
    }
}

// 调试方法
impl CompiledRenderGraph {
    /// 打印执行计划（用于调试）
    ///
    /// 包括执行顺序、每个 pass 读写的资源，以及 pass 之前的 barrier
    pub fn print_execution_plan(&self) {
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan                          ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Total Passes: {}  |  Execution Order: [{}]",
            self.passes.len(),
            self.execution_order_names().join(" → ")
        );
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (order, &pass_idx) in self.execution_order.iter().enumerate() {
            let pass = &self.passes[pass_idx];

            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ [{}/{}] {:?} Pass: \"{}\"", order + 1, self.execution_order.len(), pass.kind, pass.name);
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            for (title, is_write) in [("Reads", false), ("Writes", true)] {
                let uses = pass.uses.iter().filter(|u| u.is_write == is_write).collect_vec();
                if uses.is_empty() {
                    continue;
                }
                log::info!("│ {title}:");
                for u in uses {
                    log::info!(
                        "│   \"{}\" @ {:?} (stage: {}, access: {})",
                        self.resource_name(&u.resource),
                        u.state,
                        format_pipeline_stage(u.access.stage),
                        format_access_flags(u.access.access)
                    );
                }
            }

            self.print_barriers(&pass.barriers);
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        if self.final_barriers.has_barriers() {
            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ After last pass");
            self.print_barriers(&self.final_barriers);
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        log::info!("");
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }

    fn print_barriers(&self, barriers: &PassBarriers) {
        if !barriers.has_barriers() {
            log::info!("│ No barriers required");
            return;
        }

        log::info!("├─────────────────────────────────────────────────────────────────┤");
        log::info!(
            "│ Barriers: {} image, {} buffer",
            barriers.image_barriers.len(),
            barriers.buffer_barriers.len()
        );
        for barrier in barriers.iter() {
            let resource = &self.resources[barrier.resource];
            let kind = if resource.is_buffer() { "Buffer" } else { "Image" };
            log::info!("│   {kind} \"{}\":", resource.name);
            if barrier.src_state != barrier.dst_state {
                log::info!("│       State:  {:?} → {:?}", barrier.src_state, barrier.dst_state);
            } else {
                log::info!("│       State:  {:?} (unchanged)", barrier.src_state);
            }
            log::info!(
                "│       Stage:  {} → {}",
                format_pipeline_stage(barrier.src.stage),
                format_pipeline_stage(barrier.dst.stage)
            );
            log::info!(
                "│       Access: {} → {}",
                format_access_flags(barrier.src.src_access()),
                format_access_flags(barrier.dst.access)
            );
        }
    }

    fn resource_name(&self, identity: &RgResourceIdentity) -> &str {
        self.resources.iter().find(|r| &r.identity == identity).map(|r| r.name.as_str()).unwrap_or("<unknown>")
    }
}

const STAGE_NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
    (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
    (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
    (vk::PipelineStageFlags2::INDEX_INPUT, "INDEX_INPUT"),
    (vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT, "VERTEX_ATTRIBUTE_INPUT"),
    (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
    (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
    (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
    (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
    (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
    (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
    (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
    (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
    (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
];

const ACCESS_NAMES: &[(vk::AccessFlags2, &str)] = &[
    (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
    (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
    (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
    (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
    (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
    (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
    (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
    (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
    (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
    (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
    (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
    (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
    (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
    (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
    (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
];

/// 格式化 PipelineStageFlags2 为可读字符串
pub fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    let names = STAGE_NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if names.is_empty() { format!("{stage:?}") } else { names.join(" | ") }
}

/// 格式化 AccessFlags2 为可读字符串
pub fn format_access_flags(access: vk::AccessFlags2) -> String {
    if access == vk::AccessFlags2::NONE {
        return "NONE".to_string();
    }
    let names = ACCESS_NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if names.is_empty() { format!("{access:?}") } else { names.join(" | ") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_flags() {
        let stage = vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
        assert_eq!(format_pipeline_stage(stage), "EARLY_FRAGMENT_TESTS | LATE_FRAGMENT_TESTS");
        assert_eq!(format_access_flags(vk::AccessFlags2::NONE), "NONE");
        assert_eq!(format_access_flags(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE), "COLOR_ATTACH_WRITE");
    }
}
