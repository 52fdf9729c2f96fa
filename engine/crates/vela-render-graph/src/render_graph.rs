//! RenderGraph：收集 pass 声明，按需编译，每帧重放
//!
//! # 使用流程
//!
//! 1. 创建 graph: `RenderGraph::new(&present_target)`
//! 2. 声明虚拟资源: `graph.declare_virtual("color", desc)`
//! 3. 添加 Pass: `graph.add_pass("name", kind, |b| { ... }, |ctx| { ... })`
//! 4. 每帧执行: `graph.execute(&mut storage, &mut frame)`
//!
//! 只有 pass 或资源的声明发生变化时才会重新编译。

use ash::vk;
use indexmap::IndexMap;
use itertools::Itertools;
use slotmap::SlotMap;

use vela_gfx::basic::color::LabelColor;
use vela_gfx::commands::command_buffer::GfxCommandBuffer;
use vela_gfx::error::GfxResult;
use vela_render_interface::frame_context::FrameContext;
use vela_render_interface::handles::GfxTexture2DHandle;
use vela_render_interface::present_target::PresentTarget;
use vela_render_interface::resource_storage::{GfxTextureRef, ResourceStorage};

use crate::barrier::{BarrierCalculator, PassBarriers};
use crate::compiled::{CompiledRenderGraph, RgCompiledPass};
use crate::error::{RgError, RgResult};
use crate::graph::DependencyAnalyzer;
use crate::pass::{RgPassBuilder, RgPassContext, RgPassId, RgPassNode};
use crate::resource::{RgImageDesc, RgPhysicalResource, RgResourceIdentity, RgResourceNode, RgVirtualResource};
use crate::resource_state::{RgPassKind, RgResourceState};

/// 声明式渲染图
///
/// `'a` 是 pass 回调可以借用的外部数据的生命周期，
/// 回调可以直接引用外部的 pipeline、geometry 等，而不需要 Rc 包装。
///
/// graph 分配的 attachment 放在外部的 [`ResourceStorage`] 中，drop graph 不会释放它们，
/// 不再使用 graph 时需要调用 [`destroy`](Self::destroy)。
pub struct RenderGraph<'a> {
    passes: SlotMap<RgPassId, RgPassNode<'a>>,
    /// 声明顺序，拓扑排序时用来打破平局
    pass_order: Vec<RgPassId>,

    virtuals: IndexMap<String, RgVirtualResource>,
    final_states: IndexMap<RgResourceIdentity, RgResourceState>,
    present_extent: vk::Extent2D,

    compiled: Option<CompiledRenderGraph>,
    /// 声明发生变化，下次执行前需要重新编译
    dirty: bool,
    compile_count: usize,
}

// new & init
impl<'a> RenderGraph<'a> {
    pub fn new(present: &dyn PresentTarget) -> Self {
        Self {
            passes: SlotMap::with_key(),
            pass_order: Vec::new(),
            virtuals: IndexMap::new(),
            final_states: IndexMap::new(),
            present_extent: present.extent(),
            compiled: None,
            dirty: true,
            compile_count: 0,
        }
    }

    /// 添加 Pass
    ///
    /// - `setup`: 通过 [`RgPassBuilder`] 声明读写的资源
    /// - `callback`: 每帧执行时录制命令
    ///
    /// 名字重复或者声明不合法时返回错误，graph 保持不变
    pub fn add_pass(
        &mut self,
        name: impl Into<String>,
        kind: RgPassKind,
        setup: impl FnOnce(&mut RgPassBuilder),
        callback: impl FnMut(&RgPassContext<'_>) -> GfxResult<()> + 'a,
    ) -> RgResult<RgPassId> {
        let name = name.into();
        if self.passes.values().any(|p| p.name == name) {
            return Err(RgError::DuplicatePassName(name).logged());
        }

        let mut builder = RgPassBuilder::new(kind);
        setup(&mut builder);
        let uses = builder.finish(&name)?;
        if uses.is_empty() {
            log::warn!("pass `{name}` declares no resources, it will be ordered by declaration only");
        }

        let id = self.passes.insert(RgPassNode {
            name,
            kind,
            uses,
            callback: Box::new(callback),
        });
        self.pass_order.push(id);
        self.dirty = true;
        Ok(id)
    }

    /// 移除 pass，返回是否存在
    pub fn remove_pass(&mut self, id: RgPassId) -> bool {
        if self.passes.remove(id).is_none() {
            return false;
        }
        self.pass_order.retain(|p| *p != id);
        self.dirty = true;
        true
    }

    /// 声明一个由 graph 分配的虚拟 attachment，也可以之后用 `bind_virtual` 绑定到已有的 texture
    pub fn declare_virtual(&mut self, name: impl Into<String>, desc: RgImageDesc) {
        self.declare(name.into(), Some(desc));
    }

    /// 声明一个必须由外部绑定的虚拟资源，例如每帧不同的 swapchain image
    pub fn declare_external(&mut self, name: impl Into<String>) {
        self.declare(name.into(), None);
    }

    fn declare(&mut self, name: String, desc: Option<RgImageDesc>) {
        if let Some(old) = self.virtuals.get_mut(&name) {
            if old.desc != desc {
                log::warn!("virtual resource \"{name}\" redeclared with a different desc");
                old.desc = desc;
                old.mark_stale();
                self.dirty = true;
            }
            return;
        }
        self.virtuals.insert(name, RgVirtualResource::new(desc));
        self.dirty = true;
    }

    /// 把虚拟资源绑定到 storage 中已有的 texture，`None` 表示解除绑定
    pub fn bind_virtual(&mut self, name: &str, texture: Option<GfxTexture2DHandle>) -> RgResult<()> {
        let resource = self.virtuals.get_mut(name).ok_or_else(|| {
            RgError::UndeclaredResource {
                pass: "<bind_virtual>".to_string(),
                resource: name.to_string(),
            }
            .logged()
        })?;
        if resource.bound != texture {
            if texture.is_some() {
                resource.mark_stale();
            }
            resource.bound = texture;
            self.dirty = true;
        }
        Ok(())
    }

    /// 最后一个 pass 之后把资源转换到 `state`，例如 `Present`
    pub fn set_final_state(
        &mut self,
        resource: impl Into<RgResourceIdentity>,
        state: RgResourceState,
    ) -> RgResult<()> {
        let resource = resource.into();
        let applies = if resource.is_buffer() { state.applies_to_buffer() } else { state.applies_to_image() };
        if !applies || state == RgResourceState::Uninitialized {
            return Err(RgError::InvalidUse {
                pass: "<final>".to_string(),
                resource: resource.to_string(),
                state,
                reason: "not a valid final state for this resource",
            }
            .logged());
        }
        if self.final_states.insert(resource, state) != Some(state) {
            self.dirty = true;
        }
        Ok(())
    }
}

// destroy
impl RenderGraph<'_> {
    /// 销毁 graph 分配的所有 attachment，下次执行时按新的尺寸重新分配
    ///
    /// 调用者需要保证这些 attachment 不再被 GPU 使用
    pub fn invalidate_virtual_resources(&mut self, storage: &mut ResourceStorage) -> RgResult<()> {
        for (name, resource) in &mut self.virtuals {
            if resource.owned.is_some() {
                log::debug!("render graph releases attachment of \"{name}\"");
            }
            resource.release(storage)?;
        }
        self.dirty = true;
        Ok(())
    }

    /// 释放 graph 分配的所有 attachment，调用者需要保证 GPU 已经不再使用它们
    pub fn destroy(mut self, storage: &mut ResourceStorage) -> RgResult<()> {
        self.invalidate_virtual_resources(storage)
    }

    /// present target 的尺寸改变时调用，返回尺寸是否真的变化
    pub fn resize(&mut self, present: &dyn PresentTarget, storage: &mut ResourceStorage) -> RgResult<bool> {
        let extent = present.extent();
        if extent == self.present_extent {
            return Ok(false);
        }
        log::info!(
            "render graph resized: {}x{} -> {}x{}",
            self.present_extent.width,
            self.present_extent.height,
            extent.width,
            extent.height
        );
        self.present_extent = extent;
        self.invalidate_virtual_resources(storage)?;
        Ok(true)
    }
}

// getters
impl RenderGraph<'_> {
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 到目前为止编译的次数
    #[inline]
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    #[inline]
    pub fn compiled(&self) -> Option<&CompiledRenderGraph> {
        self.compiled.as_ref()
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.pass_order.len()
    }

    /// 虚拟资源当前对应的 texture（绑定的或者 graph 分配的）
    pub fn virtual_texture(&self, name: &str) -> Option<GfxTexture2DHandle> {
        self.virtuals.get(name).and_then(|r| r.bound.or(r.owned))
    }
}

// 编译
impl RenderGraph<'_> {
    /// 声明有变化时重新编译，否则直接返回上一次的结果
    pub fn compile(&mut self, storage: &mut ResourceStorage) -> RgResult<&CompiledRenderGraph> {
        let compiled = self.take_compiled(storage)?;
        let compiled: &CompiledRenderGraph = self.compiled.insert(compiled);
        Ok(compiled)
    }

    fn take_compiled(&mut self, storage: &mut ResourceStorage) -> RgResult<CompiledRenderGraph> {
        match self.compiled.take() {
            Some(compiled) if !self.dirty => Ok(compiled),
            _ => {
                let compiled = self.compile_inner(storage)?;
                self.dirty = false;
                self.compile_count += 1;
                Ok(compiled)
            }
        }
    }

    fn compile_inner(&mut self, storage: &mut ResourceStorage) -> RgResult<CompiledRenderGraph> {
        vela_crate_tools::profile_function!();

        // 0. 旧 desc 分配的 attachment 不再可用，调用者需要保证 GPU 已经不再使用它们
        for (name, resource) in self.virtuals.iter_mut().filter(|(_, r)| r.stale) {
            log::debug!("render graph releases stale attachment of \"{name}\"");
            resource.release(storage)?;
        }

        // 1. 解析每个 pass 用到的资源，按第一次出现的顺序编号
        let mut resources: IndexMap<RgResourceIdentity, RgResourceNode> = IndexMap::new();
        let mut use_indices: Vec<Vec<usize>> = Vec::with_capacity(self.pass_order.len());
        for id in &self.pass_order {
            let pass = &self.passes[*id];
            let mut indices = Vec::with_capacity(pass.uses.len());
            for u in &pass.uses {
                let index = match resources.get_index_of(&u.resource) {
                    Some(index) => index,
                    None => {
                        let node = Self::resolve_resource(
                            &u.resource,
                            &pass.name,
                            &mut self.virtuals,
                            storage,
                            self.present_extent,
                        )?;
                        resources.insert_full(u.resource.clone(), node).0
                    }
                };
                indices.push(index);
            }
            use_indices.push(indices);
        }

        for (identity, state) in &self.final_states {
            match resources.get_mut(identity) {
                Some(node) => node.final_state = Some(*state),
                None => log::warn!("final state {state:?} requested for {identity}, which no pass uses"),
            }
        }
        let mut resources = resources.into_values().collect_vec();

        // 2. 依赖分析与拓扑排序
        let mut reads = Vec::with_capacity(self.pass_order.len());
        let mut writes = Vec::with_capacity(self.pass_order.len());
        for (id, indices) in self.pass_order.iter().zip(&use_indices) {
            let (pass_writes, pass_reads): (Vec<_>, Vec<_>) =
                self.passes[*id].uses.iter().zip(indices).partition(|(u, _)| u.is_write);
            reads.push(pass_reads.into_iter().map(|(_, &i)| i).collect_vec());
            writes.push(pass_writes.into_iter().map(|(_, &i)| i).collect_vec());
        }

        let analysis = DependencyAnalyzer::analyze(resources.len(), &reads, &writes);
        let execution_order = analysis.graph.topological_sort().map_err(|cycle| {
            RgError::CyclicDependency {
                passes: cycle.iter().map(|&i| self.passes[self.pass_order[i]].name.clone()).collect(),
            }
            .logged()
        })?;
        for (node, producer) in resources.iter_mut().zip(&analysis.last_producer) {
            node.last_producer = *producer;
        }

        // 3. 按执行顺序推导 barrier
        let mut calculator =
            BarrierCalculator::new(resources.iter().map(|r| (r.initial_state, r.aspect, r.is_buffer())));
        let mut pass_barriers = vec![PassBarriers::default(); self.pass_order.len()];
        for &pass_idx in &execution_order {
            let pass = &self.passes[self.pass_order[pass_idx]];
            for (u, &res) in pass.uses.iter().zip(&use_indices[pass_idx]) {
                if !u.is_write && calculator.current_state(res) == RgResourceState::Uninitialized {
                    log::warn!("pass `{}` reads \"{}\" before anything writes it", pass.name, resources[res].name);
                }
                calculator.transition(res, u.state, u.access, &mut pass_barriers[pass_idx]);
            }
        }

        // 外部 texture 没有指定最终状态时，恢复到进入 graph 之前的 layout
        let mut final_barriers = PassBarriers::default();
        for (res, node) in resources.iter().enumerate() {
            let target = match node.final_state {
                Some(state) => state,
                None if !node.is_buffer() && node.initial_state != RgResourceState::Uninitialized => {
                    node.initial_state
                }
                None => continue,
            };
            if let Some(access) = target.access(RgPassKind::Graphics, false) {
                calculator.transition(res, target, access, &mut final_barriers);
            }
        }

        let passes = self
            .pass_order
            .iter()
            .zip(pass_barriers)
            .zip(&use_indices)
            .map(|((id, barriers), indices)| {
                let pass = &self.passes[*id];
                RgCompiledPass {
                    id: *id,
                    name: pass.name.clone(),
                    kind: pass.kind,
                    uses: pass.uses.clone(),
                    barriers,
                    resources: pass
                        .uses
                        .iter()
                        .zip(indices)
                        .map(|(u, &res)| (u.resource.clone(), resources[res].physical))
                        .collect(),
                }
            })
            .collect_vec();

        let compiled = CompiledRenderGraph {
            passes,
            execution_order,
            resources,
            final_barriers,
            dep_graph: analysis.graph,
        };
        log::info!(
            "render graph compiled: {} passes, {} resources, {} barriers, order [{}]",
            compiled.pass_count(),
            compiled.resources().len(),
            compiled.barrier_count(),
            compiled.execution_order_names().join(", ")
        );
        Ok(compiled)
    }

    fn resolve_resource(
        identity: &RgResourceIdentity,
        pass: &str,
        virtuals: &mut IndexMap<String, RgVirtualResource>,
        storage: &mut ResourceStorage,
        present_extent: vk::Extent2D,
    ) -> RgResult<RgResourceNode> {
        let undeclared = || {
            RgError::UndeclaredResource {
                pass: pass.to_string(),
                resource: identity.to_string(),
            }
            .logged()
        };

        let (physical, texture) = match identity {
            RgResourceIdentity::Buffer(handle) => {
                let buffer = storage.get_buffer(*handle).map_err(|_| undeclared())?;
                return Ok(RgResourceNode {
                    identity: identity.clone(),
                    name: buffer.name().to_string(),
                    physical: RgPhysicalResource::Buffer(*handle),
                    aspect: vk::ImageAspectFlags::empty(),
                    initial_state: RgResourceState::Uninitialized,
                    final_state: None,
                    last_producer: None,
                });
            }
            RgResourceIdentity::Texture2D(handle) => (RgPhysicalResource::Texture2D(*handle), GfxTextureRef::from(*handle)),
            RgResourceIdentity::Texture3D(handle) => (RgPhysicalResource::Texture3D(*handle), GfxTextureRef::from(*handle)),
            RgResourceIdentity::Virtual(name) => {
                let resource = virtuals.get_mut(name).ok_or_else(undeclared)?;
                let handle = resource.realize(name, storage, present_extent)?;
                (RgPhysicalResource::Texture2D(handle), GfxTextureRef::from(handle))
            }
        };

        let image = storage.get_image(texture).map_err(|_| undeclared())?;
        let name = match identity {
            RgResourceIdentity::Virtual(name) => name.clone(),
            _ => image.name().to_string(),
        };
        Ok(RgResourceNode {
            identity: identity.clone(),
            name,
            physical,
            aspect: image.aspect(),
            initial_state: RgResourceState::from_layout(image.layout()),
            final_state: None,
            last_producer: None,
        })
    }
}

// 执行
impl RenderGraph<'_> {
    /// 在当前帧中录制并提交整个 graph
    pub fn execute(&mut self, storage: &mut ResourceStorage, frame: &mut FrameContext) -> RgResult<()> {
        vela_crate_tools::profile_function!();

        let cmd = frame.alloc_command_buffer("render-graph")?;
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "render-graph")?;
        self.record(storage, &cmd, frame.frame_slot())?;
        cmd.end()?;
        frame.submit(cmd)?;
        Ok(())
    }

    /// 录制到一个已经 begin 的 command buffer 中
    pub fn record(&mut self, storage: &mut ResourceStorage, cmd: &GfxCommandBuffer, frame_slot: usize) -> RgResult<()> {
        let compiled = self.take_compiled(storage)?;
        let result = self.record_compiled(&compiled, storage, cmd, frame_slot);
        self.compiled = Some(compiled);
        result
    }

    fn record_compiled(
        &mut self,
        compiled: &CompiledRenderGraph,
        storage: &ResourceStorage,
        cmd: &GfxCommandBuffer,
        frame_slot: usize,
    ) -> RgResult<()> {
        for &pass_idx in compiled.execution_order() {
            let compiled_pass = &compiled.passes()[pass_idx];
            compiled.record_barriers(cmd, &compiled_pass.barriers, storage)?;

            vela_crate_tools::profile_scope!("rg-pass");
            cmd.begin_label(&compiled_pass.name, LabelColor::COLOR_PASS);
            let ctx = RgPassContext {
                cmd,
                storage,
                frame_slot,
                pass_name: &compiled_pass.name,
                resources: &compiled_pass.resources,
            };
            let result = (self.passes[compiled_pass.id].callback)(&ctx);
            cmd.end_label();
            if let Err(e) = result {
                log::error!("pass `{}` failed: {e}", compiled_pass.name);
                return Err(e.into());
            }
        }

        compiled.record_barriers(cmd, compiled.final_barriers(), storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use vela_gfx::foundation::headless::{HeadlessCommand, HeadlessDevice, HeadlessDeviceDesc};
    use vela_gfx::resources::buffer::GfxBufferCreateInfo;
    use vela_gfx::resources::image::GfxTextureCreateInfo;
    use vela_render_interface::present_target::OffscreenTarget;

    use super::*;

    const COLOR: vk::Format = vk::Format::R8G8B8A8_UNORM;

    fn setup() -> (Rc<HeadlessDevice>, ResourceStorage, OffscreenTarget) {
        let headless = Rc::new(HeadlessDevice::new(HeadlessDeviceDesc::default()));
        let storage = ResourceStorage::new(headless.clone());
        let target = OffscreenTarget::new(vk::Extent2D { width: 64, height: 32 }, COLOR, 3);
        (headless, storage, target)
    }

    fn draw(ctx: &RgPassContext<'_>) -> GfxResult<()> {
        ctx.cmd.cmd_draw(3, 1, 0, 0);
        Ok(())
    }

    fn image_of(graph: &RenderGraph<'_>, storage: &ResourceStorage, name: &str) -> vk::Image {
        let handle = graph.virtual_texture(name).unwrap();
        storage.get_image(GfxTextureRef::from(handle)).unwrap().handle()
    }

    /// P1 写 colorA，P2 读 colorA 写 colorB
    fn scenario_a(graph: &mut RenderGraph<'_>) {
        graph.declare_virtual("colorA", RgImageDesc::color(COLOR));
        graph.declare_virtual("colorB", RgImageDesc::color(COLOR));
        graph
            .add_pass(
                "P1",
                RgPassKind::Graphics,
                |b| {
                    b.write("colorA", RgResourceState::ColorAttachment);
                },
                draw,
            )
            .unwrap();
        graph
            .add_pass(
                "P2",
                RgPassKind::Graphics,
                |b| {
                    b.read("colorA", RgResourceState::ShaderReadOnly).write("colorB", RgResourceState::ColorAttachment);
                },
                draw,
            )
            .unwrap();
    }

    #[test]
    fn test_scenario_a_order_and_barriers() {
        let (_headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        scenario_a(&mut graph);

        let compiled = graph.compile(&mut storage).unwrap();
        assert_eq!(compiled.execution_order_names(), vec!["P1", "P2"]);

        let color_a = compiled.resource_index(&RgResourceIdentity::virtual_name("colorA")).unwrap();
        let before_p2 = compiled.barriers_before("P2").unwrap();
        let on_color_a = before_p2.iter().filter(|b| b.resource == color_a).collect_vec();
        assert_eq!(on_color_a.len(), 1);
        assert_eq!(on_color_a[0].src_state, RgResourceState::ColorAttachment);
        assert_eq!(on_color_a[0].dst_state, RgResourceState::ShaderReadOnly);
        assert_eq!(compiled.resources()[color_a].last_producer, Some(0));
    }

    #[test]
    fn test_scenario_a_recorded_between_passes() {
        let (headless, mut storage, target) = setup();
        let mut frame = FrameContext::new(headless.clone(), 2).unwrap();
        let mut graph = RenderGraph::new(&target);
        scenario_a(&mut graph);

        frame.begin_frame().unwrap();
        graph.execute(&mut storage, &mut frame).unwrap();
        frame.end_frame().unwrap();

        let color_a = image_of(&graph, &storage, "colorA");
        let commands = headless.submitted_commands();
        let p1_end = commands
            .iter()
            .position(|c| matches!(c, HeadlessCommand::BeginLabel(l) if l == "P1"))
            .and_then(|begin| commands[begin..].iter().position(|c| matches!(c, HeadlessCommand::EndLabel)).map(|i| begin + i))
            .unwrap();
        let p2_begin = commands.iter().position(|c| matches!(c, HeadlessCommand::BeginLabel(l) if l == "P2")).unwrap();
        assert!(p1_end < p2_begin);

        let between = &commands[p1_end + 1..p2_begin];
        let transitions = between
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    HeadlessCommand::ImageBarrier {
                        image,
                        old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        ..
                    } if *image == color_a
                )
            })
            .count();
        assert_eq!(transitions, 1);

        let draws = commands.iter().filter(|c| matches!(c, HeadlessCommand::Draw { vertex_count: 3, .. })).count();
        assert_eq!(draws, 2);
    }

    #[test]
    fn test_read_after_read_emits_nothing() {
        let (_headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        graph.declare_virtual("color", RgImageDesc::color(COLOR));
        graph
            .add_pass(
                "write",
                RgPassKind::Graphics,
                |b| {
                    b.write("color", RgResourceState::ColorAttachment);
                },
                draw,
            )
            .unwrap();
        graph
            .add_pass(
                "blur",
                RgPassKind::Graphics,
                |b| {
                    b.read("color", RgResourceState::ShaderReadOnly);
                },
                draw,
            )
            .unwrap();
        graph
            .add_pass(
                "histogram",
                RgPassKind::Compute,
                |b| {
                    b.read("color", RgResourceState::ShaderReadOnly);
                },
                draw,
            )
            .unwrap();

        let compiled = graph.compile(&mut storage).unwrap();
        assert_eq!(compiled.execution_order_names(), vec!["write", "blur", "histogram"]);
        assert_eq!(compiled.barriers_before("blur").unwrap().len(), 1);
        assert!(compiled.barriers_before("histogram").unwrap().is_empty());
    }

    #[test]
    fn test_write_after_read_emits_one_transition() {
        let (_headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        graph.declare_virtual("color", RgImageDesc::color(COLOR));
        graph
            .add_pass(
                "write",
                RgPassKind::Graphics,
                |b| {
                    b.write("color", RgResourceState::ColorAttachment);
                },
                draw,
            )
            .unwrap();
        graph
            .add_pass(
                "sample",
                RgPassKind::Compute,
                |b| {
                    b.read("color", RgResourceState::ShaderReadOnly);
                },
                draw,
            )
            .unwrap();
        graph
            .add_pass(
                "overlay",
                RgPassKind::Graphics,
                |b| {
                    b.write("color", RgResourceState::ColorAttachment);
                },
                draw,
            )
            .unwrap();

        let compiled = graph.compile(&mut storage).unwrap();
        assert_eq!(compiled.execution_order_names(), vec!["write", "sample", "overlay"]);
        let before = compiled.barriers_before("overlay").unwrap();
        assert_eq!(before.len(), 1);
        let barrier = before.image_barriers[0];
        assert_eq!(barrier.src_state, RgResourceState::ShaderReadOnly);
        assert_eq!(barrier.dst_state, RgResourceState::ColorAttachment);
        assert!(barrier.src.stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let (headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        graph.declare_virtual("a", RgImageDesc::color(COLOR));
        graph.declare_virtual("b", RgImageDesc::color(COLOR));
        graph
            .add_pass(
                "P1",
                RgPassKind::Graphics,
                |b| {
                    b.read("b", RgResourceState::ShaderReadOnly).write("a", RgResourceState::ColorAttachment);
                },
                draw,
            )
            .unwrap();
        graph
            .add_pass(
                "P2",
                RgPassKind::Graphics,
                |b| {
                    b.read("a", RgResourceState::ShaderReadOnly).write("b", RgResourceState::ColorAttachment);
                },
                draw,
            )
            .unwrap();

        match graph.compile(&mut storage) {
            Err(RgError::CyclicDependency { passes }) => assert_eq!(passes, vec!["P1", "P2"]),
            other => panic!("expected a cycle, got {:?}", other.map(|c| c.execution_order_names().join(","))),
        }

        // 从未执行
        let mut frame = FrameContext::new(headless.clone(), 2).unwrap();
        frame.begin_frame().unwrap();
        assert!(graph.execute(&mut storage, &mut frame).is_err());
        frame.end_frame().unwrap();
        assert!(!headless.submitted_commands().iter().any(|c| matches!(c, HeadlessCommand::Draw { .. })));
    }

    #[test]
    fn test_independent_passes_keep_declaration_order() {
        let (_headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        for name in ["shadow", "gbuffer", "ssao"] {
            graph.declare_virtual(name, RgImageDesc::color(COLOR));
        }
        graph.declare_virtual("final", RgImageDesc::color(COLOR));
        graph
            .add_pass(
                "compose",
                RgPassKind::Graphics,
                |b| {
                    b.read("ssao", RgResourceState::ShaderReadOnly)
                        .read("shadow", RgResourceState::ShaderReadOnly)
                        .read("gbuffer", RgResourceState::ShaderReadOnly)
                        .write("final", RgResourceState::ColorAttachment);
                },
                draw,
            )
            .unwrap();
        for name in ["shadow", "gbuffer", "ssao"] {
            graph
                .add_pass(
                    name,
                    RgPassKind::Graphics,
                    |b| {
                        b.write(name, RgResourceState::ColorAttachment);
                    },
                    draw,
                )
                .unwrap();
        }

        let compiled = graph.compile(&mut storage).unwrap();
        assert_eq!(compiled.execution_order_names(), vec!["shadow", "gbuffer", "ssao", "compose"]);
    }

    #[test]
    fn test_compile_is_lazy_and_idempotent() {
        let (_headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        scenario_a(&mut graph);

        let first = graph.compile(&mut storage).unwrap().passes().iter().map(|p| p.barriers.clone()).collect_vec();
        let second = graph.compile(&mut storage).unwrap().passes().iter().map(|p| p.barriers.clone()).collect_vec();
        assert_eq!(first, second);
        assert_eq!(graph.compile_count(), 1);
        assert!(!graph.is_dirty());

        // 重复绑定同一个值不会触发重新编译
        graph.bind_virtual("colorB", None).unwrap();
        graph.compile(&mut storage).unwrap();
        assert_eq!(graph.compile_count(), 1);

        let id = graph
            .add_pass(
                "P3",
                RgPassKind::Graphics,
                |b| {
                    b.read("colorB", RgResourceState::ShaderReadOnly);
                },
                draw,
            )
            .unwrap();
        assert!(graph.is_dirty());
        assert_eq!(graph.compile(&mut storage).unwrap().execution_order_names(), vec!["P1", "P2", "P3"]);
        assert_eq!(graph.compile_count(), 2);

        assert!(graph.remove_pass(id));
        assert!(!graph.remove_pass(id));
        assert_eq!(graph.compile(&mut storage).unwrap().pass_count(), 2);
        assert_eq!(graph.compile_count(), 3);
    }

    #[test]
    fn test_execute_replays_without_recompiling() {
        let (headless, mut storage, target) = setup();
        let mut frame = FrameContext::new(headless.clone(), 2).unwrap();
        let mut graph = RenderGraph::new(&target);
        scenario_a(&mut graph);

        for _ in 0..4 {
            frame.begin_frame().unwrap();
            graph.execute(&mut storage, &mut frame).unwrap();
            frame.end_frame().unwrap();
        }
        assert_eq!(graph.compile_count(), 1);
        let draws = headless.submitted_commands().iter().filter(|c| matches!(c, HeadlessCommand::Draw { .. })).count();
        assert_eq!(draws, 8);
    }

    #[test]
    fn test_configuration_errors() {
        let (_headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        graph.declare_virtual("color", RgImageDesc::color(COLOR));
        graph
            .add_pass(
                "main",
                RgPassKind::Graphics,
                |b| {
                    b.write("color", RgResourceState::ColorAttachment);
                },
                draw,
            )
            .unwrap();

        let duplicate = graph.add_pass("main", RgPassKind::Graphics, |_| {}, draw);
        assert!(matches!(duplicate, Err(RgError::DuplicatePassName(name)) if name == "main"));
        assert_eq!(graph.pass_count(), 1);

        assert!(matches!(graph.bind_virtual("missing", None), Err(RgError::UndeclaredResource { .. })));
        assert!(matches!(
            graph.set_final_state("color", RgResourceState::VertexBuffer),
            Err(RgError::InvalidUse { .. })
        ));

        graph
            .add_pass(
                "post",
                RgPassKind::Graphics,
                |b| {
                    b.read("nowhere", RgResourceState::ShaderReadOnly);
                },
                draw,
            )
            .unwrap();
        assert!(matches!(
            graph.compile(&mut storage),
            Err(RgError::UndeclaredResource { pass, resource }) if pass == "post" && resource.contains("nowhere")
        ));
    }

    #[test]
    fn test_external_resource_must_be_bound() {
        let (_headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        graph.declare_external("swapchain");
        graph
            .add_pass(
                "blit",
                RgPassKind::Graphics,
                |b| {
                    b.write("swapchain", RgResourceState::TransferDst);
                },
                draw,
            )
            .unwrap();
        assert!(matches!(graph.compile(&mut storage), Err(RgError::UnboundVirtualResource(name)) if name == "swapchain"));

        let info = vela_gfx::resources::image::GfxAttachmentCreateInfo {
            extent: vk::Extent2D { width: 64, height: 32 },
            format: COLOR,
            usage: vk::ImageUsageFlags::TRANSFER_DST,
        };
        let image = storage.create_attachment(&info, "swapchain-0").unwrap();
        graph.bind_virtual("swapchain", Some(image)).unwrap();
        graph.set_final_state("swapchain", RgResourceState::Present).unwrap();

        let compiled = graph.compile(&mut storage).unwrap();
        let finals = compiled.final_barriers();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals.image_barriers[0].src_state, RgResourceState::TransferDst);
        assert_eq!(finals.image_barriers[0].dst_state, RgResourceState::Present);
        assert_eq!(graph.virtual_texture("swapchain"), Some(image));
    }

    #[test]
    fn test_virtual_attachments_follow_present_extent() {
        let (headless, mut storage, mut target) = setup();
        let mut graph = RenderGraph::new(&target);
        scenario_a(&mut graph);
        graph.compile(&mut storage).unwrap();

        let handle = graph.virtual_texture("colorA").unwrap();
        let extent = storage.get_image(GfxTextureRef::from(handle)).unwrap().extent();
        assert_eq!((extent.width, extent.height), (64, 32));
        assert_eq!(headless.live_count_of("Image"), 2);

        // 尺寸不变
        assert!(!graph.resize(&target, &mut storage).unwrap());

        target.resize(vk::Extent2D { width: 128, height: 128 });
        assert!(graph.resize(&target, &mut storage).unwrap());
        assert_eq!(graph.virtual_texture("colorA"), None);
        assert!(storage.get_texture_2d(handle).is_err());
        assert_eq!(headless.live_count_of("Image"), 0);

        graph.compile(&mut storage).unwrap();
        let resized = graph.virtual_texture("colorA").unwrap();
        assert_ne!(resized, handle);
        let extent = storage.get_image(GfxTextureRef::from(resized)).unwrap().extent();
        assert_eq!((extent.width, extent.height), (128, 128));
        assert_eq!(graph.compile_count(), 2);
    }

    #[test]
    fn test_redeclare_replaces_attachment() {
        let (headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        scenario_a(&mut graph);
        graph.compile(&mut storage).unwrap();
        let old = graph.virtual_texture("colorA").unwrap();

        // 相同的 desc 不会触发重新编译
        graph.declare_virtual("colorA", RgImageDesc::color(COLOR));
        assert!(!graph.is_dirty());

        let hdr = vk::Format::R16G16B16A16_SFLOAT;
        graph.declare_virtual("colorA", RgImageDesc::color(hdr).with_extent(vk::Extent2D { width: 8, height: 8 }));
        assert!(graph.is_dirty());
        graph.compile(&mut storage).unwrap();
        assert_eq!(graph.compile_count(), 2);

        let new = graph.virtual_texture("colorA").unwrap();
        assert_ne!(new, old);
        assert!(storage.get_texture_2d(old).is_err());
        let image = storage.get_image(GfxTextureRef::from(new)).unwrap();
        assert_eq!(image.format(), hdr);
        assert_eq!((image.extent().width, image.extent().height), (8, 8));
        assert_eq!(headless.live_count_of("Image"), 2);
    }

    #[test]
    fn test_binding_releases_owned_attachment() {
        let (headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        scenario_a(&mut graph);
        graph.compile(&mut storage).unwrap();
        let owned = graph.virtual_texture("colorA").unwrap();

        let pixels = [0u8; 4 * 4 * 4];
        let texture = storage.create_texture_2d(&GfxTextureCreateInfo::new_2d(&pixels, 4, 4, 4, COLOR), "canvas").unwrap();
        graph.bind_virtual("colorA", Some(texture)).unwrap();
        assert_eq!(headless.live_count_of("Image"), 3);

        graph.compile(&mut storage).unwrap();
        assert_eq!(graph.virtual_texture("colorA"), Some(texture));
        assert!(storage.get_texture_2d(owned).is_err());
        assert_eq!(headless.live_count_of("Image"), 2);

        // 解除绑定后重新由 graph 分配
        graph.bind_virtual("colorA", None).unwrap();
        graph.compile(&mut storage).unwrap();
        let reallocated = graph.virtual_texture("colorA").unwrap();
        assert_ne!(reallocated, texture);
        assert!(storage.get_texture_2d(texture).is_ok());
        assert_eq!(headless.live_count_of("Image"), 3);
    }

    #[test]
    fn test_destroy_releases_attachments() {
        let (headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        scenario_a(&mut graph);
        graph.compile(&mut storage).unwrap();
        assert_eq!(headless.live_count_of("Image"), 2);

        graph.destroy(&mut storage).unwrap();
        assert_eq!(headless.live_count_of("Image"), 0);
        assert_eq!(storage.live_count(), 0);
    }

    #[test]
    fn test_imported_texture_is_restored() {
        let (_headless, mut storage, target) = setup();
        let pixels = [255u8; 4 * 4 * 4];
        let texture = storage.create_texture_2d(&GfxTextureCreateInfo::new_2d(&pixels, 4, 4, 4, COLOR), "albedo").unwrap();

        let mut graph = RenderGraph::new(&target);
        graph
            .add_pass(
                "paint",
                RgPassKind::Compute,
                |b| {
                    b.write(texture, RgResourceState::General);
                },
                draw,
            )
            .unwrap();

        let compiled = graph.compile(&mut storage).unwrap();
        let node = &compiled.resources()[0];
        assert_eq!(node.name, "albedo");
        assert_eq!(node.initial_state, RgResourceState::ShaderReadOnly);

        let before = compiled.barriers_before("paint").unwrap();
        assert_eq!(before.image_barriers[0].src_state, RgResourceState::ShaderReadOnly);
        assert_eq!(before.image_barriers[0].dst_state, RgResourceState::General);

        let finals = compiled.final_barriers();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals.image_barriers[0].src_state, RgResourceState::General);
        assert_eq!(finals.image_barriers[0].dst_state, RgResourceState::ShaderReadOnly);
    }

    #[test]
    fn test_buffer_hazards() {
        let (headless, mut storage, target) = setup();
        let info = GfxBufferCreateInfo::new(64, 4, vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::VERTEX_BUFFER);
        let particles = storage.create_buffer(&info, "particles").unwrap();
        let particle_buffer = storage.get_buffer(particles).unwrap().handle();

        let mut graph = RenderGraph::new(&target);
        graph.declare_virtual("color", RgImageDesc::color(COLOR));
        graph
            .add_pass(
                "simulate",
                RgPassKind::Compute,
                |b| {
                    b.write(particles, RgResourceState::StorageBuffer);
                },
                draw,
            )
            .unwrap();
        graph
            .add_pass(
                "render",
                RgPassKind::Graphics,
                |b| {
                    b.read(particles, RgResourceState::VertexBuffer).write("color", RgResourceState::ColorAttachment);
                },
                draw,
            )
            .unwrap();

        let compiled = graph.compile(&mut storage).unwrap();
        assert!(compiled.barriers_before("simulate").unwrap().is_empty());
        let before_render = compiled.barriers_before("render").unwrap();
        assert_eq!(before_render.buffer_barriers.len(), 1);
        assert_eq!(before_render.buffer_barriers[0].src.src_access(), vk::AccessFlags2::SHADER_STORAGE_WRITE);
        assert!(compiled.final_barriers().is_empty());

        let mut frame = FrameContext::new(headless.clone(), 2).unwrap();
        frame.begin_frame().unwrap();
        graph.execute(&mut storage, &mut frame).unwrap();
        frame.end_frame().unwrap();
        let buffer_barriers = headless
            .submitted_commands()
            .iter()
            .filter(|c| matches!(c, HeadlessCommand::BufferBarrier { buffer, .. } if *buffer == particle_buffer))
            .count();
        assert_eq!(buffer_barriers, 1);
    }

    #[test]
    fn test_callbacks_see_resolved_resources() {
        let (headless, mut storage, target) = setup();
        let seen = RefCell::new(Vec::new());
        let slots = Cell::new(0usize);
        let mut frame = FrameContext::new(headless.clone(), 2).unwrap();

        {
            let mut graph = RenderGraph::new(&target);
            graph.declare_virtual("hdr", RgImageDesc::color(vk::Format::R16G16B16A16_SFLOAT));
            graph
                .add_pass(
                    "lighting",
                    RgPassKind::Graphics,
                    |b| {
                        b.write("hdr", RgResourceState::ColorAttachment);
                    },
                    |ctx| {
                        let image = ctx.image("hdr")?;
                        seen.borrow_mut().push((ctx.pass_name.to_string(), image.handle()));
                        slots.set(slots.get() + ctx.frame_slot);
                        // 没有声明过的资源
                        assert!(ctx.image("other").is_err());
                        Ok(())
                    },
                )
                .unwrap();

            for _ in 0..2 {
                frame.begin_frame().unwrap();
                graph.execute(&mut storage, &mut frame).unwrap();
                frame.end_frame().unwrap();
            }

            let hdr = image_of(&graph, &storage, "hdr");
            assert_eq!(*seen.borrow(), vec![("lighting".to_string(), hdr), ("lighting".to_string(), hdr)]);
        }
        assert_eq!(slots.get(), 1);
    }

    #[test]
    fn test_failing_callback_aborts_recording() {
        let (headless, mut storage, target) = setup();
        let mut graph = RenderGraph::new(&target);
        scenario_a(&mut graph);
        graph
            .add_pass(
                "broken",
                RgPassKind::Graphics,
                |b| {
                    b.read("colorB", RgResourceState::ShaderReadOnly);
                },
                |_| Err(vela_gfx::error::GfxError::InvalidParameter("missing pipeline".to_string())),
            )
            .unwrap();

        let cmd = GfxCommandBuffer::new(headless.clone(), "test").unwrap();
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "test").unwrap();
        assert!(matches!(graph.record(&mut storage, &cmd, 0), Err(RgError::Gfx(_))));
        // 编译结果保留下来
        assert!(graph.compiled().is_some());
        assert_eq!(graph.compile_count(), 1);
    }
}
