use std::io::Write;

/// 安装全局 logger
///
/// `default_level` 作为默认过滤等级；如果设置了 `RUST_LOG` 环境变量，则以环境变量为准。
/// 重复调用是安全的，第二次调用会被忽略。
pub fn init_log(default_level: log::LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));
            let target_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(90, 120, 160))));

            let line = record.line().unwrap_or(0);
            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();
            // 只保留 crate 名，模块路径太长会把日志挤乱
            let target = record.target().split("::").next().unwrap_or("");

            writeln!(
                buf,
                "{level_style}[{time}] {level:<5}{level_style:#} {target_style}{target}{target_style:#} \
                 {grey_style}[{file}:{line}]{grey_style:#} {}",
                record.args()
            )
        })
        .filter(None, default_level);

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    // 测试中多个用例会重复初始化
    let _ = builder.try_init();
}

/// 解析配置文件里的日志等级字符串，无法识别时返回 `Info`
pub fn parse_level(level: &str) -> log::LevelFilter {
    level.parse().unwrap_or(log::LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), log::LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), log::LevelFilter::Warn);
        assert_eq!(parse_level("off"), log::LevelFilter::Off);
        assert_eq!(parse_level("loud"), log::LevelFilter::Info);
    }

    #[test]
    fn test_init_twice() {
        init_log(log::LevelFilter::Debug);
        init_log(log::LevelFilter::Info);
        log::debug!("logger installed");
    }
}
