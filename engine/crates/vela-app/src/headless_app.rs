//! 在 headless 设备上跑若干帧的驱动程序
//!
//! 负责把配置、ResourceStorage、FrameContext、present target 与 RenderGraph 串起来，
//! 运行结束后根据设备记录的命令生成一份报告。

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use ash::vk;

use vela_gfx::foundation::device::GfxDevice;
use vela_gfx::foundation::headless::{HeadlessCommand, HeadlessDevice, HeadlessDeviceDesc};
use vela_render_graph::render_graph::RenderGraph;
use vela_render_interface::frame_context::FrameContext;
use vela_render_interface::present_target::{OffscreenTarget, PresentTarget};
use vela_render_interface::resource_storage::ResourceStorage;
use vela_render_interface::settings::RenderSettings;

use crate::demo_scene::{DemoScene, SceneUniform};

#[derive(Clone, Debug, Default)]
pub struct HeadlessRunOptions {
    pub frames: u64,
    /// 在这一帧开始前把 present target 缩小一半
    pub resize_at: Option<u64>,
    pub shader_dir: Option<PathBuf>,
    pub print_plan: bool,
}

/// 一次运行的统计
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeadlessRunReport {
    pub frames: u64,
    pub compile_count: usize,
    pub execution_order: Vec<String>,
    pub draw_count: usize,
    pub dispatch_count: usize,
    pub barrier_count: usize,
    /// 运行结束并销毁所有资源后仍然存活的设备对象
    pub leaked_objects: usize,
}

pub struct HeadlessApp {
    settings: RenderSettings,
    device: Rc<HeadlessDevice>,
    target: OffscreenTarget,
    frame: FrameContext,
    storage: ResourceStorage,
}

// new & init
impl HeadlessApp {
    pub fn new(settings: RenderSettings) -> anyhow::Result<Self> {
        settings.validate()?;

        let device = Rc::new(HeadlessDevice::new(HeadlessDeviceDesc {
            descriptor_pool: settings.descriptor_pool,
            ..Default::default()
        }));
        let target = OffscreenTarget::new(settings.frame.extent(), settings.frame.color_format()?, 3);
        let frame = FrameContext::new(device.clone(), settings.frames_in_flight)?;
        let storage = ResourceStorage::new(device.clone());
        log::info!(
            "headless app: {}x{}, {} frames in flight, backend `{}`",
            settings.frame.width,
            settings.frame.height,
            settings.frames_in_flight,
            device.backend_name()
        );

        Ok(Self {
            settings,
            device,
            target,
            frame,
            storage,
        })
    }
}

// tools
impl HeadlessApp {
    pub fn run(&mut self, options: &HeadlessRunOptions) -> anyhow::Result<HeadlessRunReport> {
        vela_crate_tools::profile_function!();

        let scene = DemoScene::new(&mut self.storage, &self.settings, options.shader_dir.as_deref())?;
        let mut graph = RenderGraph::new(&self.target);
        scene.build_graph(&mut graph)?;

        // 只统计渲染循环中的命令
        self.device.clear_submitted_commands();
        let start = Instant::now();
        for frame_idx in 0..options.frames {
            if options.resize_at == Some(frame_idx) {
                self.shrink_target(&mut graph)?;
            }

            let slot = self.frame.begin_frame()?;
            let extent = self.target.extent();
            let uniform = SceneUniform {
                time: start.elapsed().as_secs_f32(),
                frame_id: self.frame.counter().frame_id() as u32,
                extent: [extent.width, extent.height],
            };
            scene.uniform().write(&self.storage, slot, &uniform)?;

            graph.execute(&mut self.storage, &mut self.frame)?;
            self.frame.end_frame()?;
        }

        let mut report = self.collect_report(&graph, options.frames);
        if options.print_plan
            && let Some(compiled) = graph.compiled()
        {
            compiled.print_execution_plan();
        }

        self.device.wait_idle()?;
        graph.destroy(&mut self.storage)?;
        scene.destroy(&mut self.storage)?;
        report.leaked_objects = self.storage.live_count();
        if report.leaked_objects > 0 {
            log::warn!("{} resources are still alive after the run", report.leaked_objects);
        }
        Ok(report)
    }

    fn shrink_target(&mut self, graph: &mut RenderGraph<'_>) -> anyhow::Result<()> {
        let extent = self.target.extent();
        let half = vk::Extent2D {
            width: (extent.width / 2).max(1),
            height: (extent.height / 2).max(1),
        };
        // 旧的 attachment 可能还在被上一帧使用
        self.device.wait_idle()?;
        self.target.resize(half);
        graph.resize(&self.target, &mut self.storage)?;
        Ok(())
    }

    fn collect_report(&self, graph: &RenderGraph<'_>, frames: u64) -> HeadlessRunReport {
        let commands = self.device.submitted_commands();
        let count = |pred: fn(&HeadlessCommand) -> bool| commands.iter().filter(|c| pred(c)).count();

        HeadlessRunReport {
            frames,
            compile_count: graph.compile_count(),
            execution_order: graph
                .compiled()
                .map(|c| c.execution_order_names().into_iter().map(str::to_string).collect())
                .unwrap_or_default(),
            draw_count: count(|c| matches!(c, HeadlessCommand::Draw { .. } | HeadlessCommand::DrawIndexed { .. })),
            dispatch_count: count(|c| matches!(c, HeadlessCommand::Dispatch { .. })),
            barrier_count: count(|c| {
                matches!(c, HeadlessCommand::ImageBarrier { .. } | HeadlessCommand::BufferBarrier { .. })
            }),
            leaked_objects: 0,
        }
    }
}

// getters
impl HeadlessApp {
    #[inline]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    #[inline]
    pub fn device(&self) -> &Rc<HeadlessDevice> {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_settings() -> RenderSettings {
        RenderSettings::from_toml_str(
            r#"
            frames_in_flight = 2

            [frame]
            width = 64
            height = 32
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_run_replays_compiled_graph() {
        let mut app = HeadlessApp::new(small_settings()).unwrap();
        let report = app
            .run(&HeadlessRunOptions {
                frames: 4,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(report.execution_order, vec!["triangle", "tonemap"]);
        assert_eq!(report.compile_count, 1);
        assert_eq!(report.draw_count, 4);
        assert_eq!(report.dispatch_count, 4);
        assert!(report.barrier_count > 0);
        assert_eq!(report.leaked_objects, 0);
    }

    #[test]
    fn test_resize_recompiles_once() {
        let mut app = HeadlessApp::new(small_settings()).unwrap();
        let report = app
            .run(&HeadlessRunOptions {
                frames: 4,
                resize_at: Some(2),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(report.compile_count, 2);
        assert_eq!(report.draw_count, 4);
        assert_eq!(app.device().live_count_of("Image"), 0);
    }

    #[test]
    fn test_missing_shader_dir_is_an_error() {
        let mut app = HeadlessApp::new(small_settings()).unwrap();
        let options = HeadlessRunOptions {
            frames: 1,
            shader_dir: Some(PathBuf::from("/nonexistent/vela-shaders")),
            ..Default::default()
        };
        assert!(app.run(&options).is_err());
    }
}
