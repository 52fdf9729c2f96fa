use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use vela_app::headless_app::{HeadlessApp, HeadlessRunOptions};
use vela_render_interface::settings::RenderSettings;

/// 在 headless 设备上运行示例 render graph
#[derive(Parser, Debug)]
#[command(name = "vela-headless", version, about)]
struct Args {
    /// 渲染配置（TOML），不提供时使用默认配置
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// 运行的帧数
    #[arg(short, long, default_value_t = 3)]
    frames: u64,

    /// 在第 N 帧之前把渲染目标缩小一半
    #[arg(long)]
    resize_at: Option<u64>,

    /// 存放 triangle.vert.spv / triangle.frag.spv / tonemap.comp.spv 的目录
    #[arg(long)]
    shader_dir: Option<PathBuf>,

    /// 覆盖配置中的日志等级
    #[arg(long)]
    log_level: Option<String>,

    /// 打印最终使用的配置后退出
    #[arg(long)]
    dump_settings: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => RenderSettings::from_file(path).with_context(|| format!("loading {path:?}"))?,
        None => RenderSettings::default(),
    };
    let level = match &args.log_level {
        Some(level) => vela_crate_tools::init_log::parse_level(level),
        None => settings.log_level(),
    };
    vela_crate_tools::init_log::init_log(level);
    vela_crate_tools::profiling::start();

    if args.dump_settings {
        println!("{}", settings.to_toml_string()?);
        return Ok(());
    }

    let mut app = HeadlessApp::new(settings).context("creating headless app")?;
    let report = app.run(&HeadlessRunOptions {
        frames: args.frames,
        resize_at: args.resize_at,
        shader_dir: args.shader_dir,
        print_plan: true,
    })?;

    log::info!(
        "{} frames, {} compiles, order [{}], {} draws, {} dispatches, {} barriers",
        report.frames,
        report.compile_count,
        report.execution_order.join(", "),
        report.draw_count,
        report.dispatch_count,
        report.barrier_count
    );
    if report.leaked_objects > 0 {
        anyhow::bail!("{} resources leaked", report.leaked_objects);
    }
    Ok(())
}
