//! Linebot 主入口
//!
//! 巡线小车控制器：固定频率控制循环 + TCP 命令通道 + 状态显示。

mod daemon;

use anyhow::{Context, Result};
use clap::Parser;
use daemon::{Daemon, DaemonConfig};
use linebot_control::RobotConfig;
use linebot_hal::mock::parse_sensor_script;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

/// 巡线小车控制器
///
/// 在 `0.0.0.0:5042` 等待手机端连接，按收到的模式自动巡线或遥控行驶
#[derive(Parser, Debug)]
#[command(name = "linebot")]
#[command(about = "Line-following robot controller", long_about = None)]
struct Args {
    /// 配置文件路径（TOML）
    ///
    /// 默认: 全部使用内置默认值
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// 命令通道监听地址，覆盖配置文件
    ///
    /// 格式: IP:PORT (例如: 0.0.0.0:5042)
    #[arg(long)]
    bind: Option<String>,

    /// 控制频率（Hz），覆盖配置文件
    #[arg(long)]
    frequency: Option<f64>,

    /// 运行指定周期数后退出（默认一直运行到 Ctrl+C）
    #[arg(long)]
    max_ticks: Option<u64>,

    /// 模拟传感器脚本，循环播放
    ///
    /// 例如: "010,011,001,000,000"
    #[arg(long)]
    sensor_script: Option<String>,

    /// 发送给客户端的快照图片（BMP）
    #[arg(long)]
    image: Option<PathBuf>,

    /// 状态打印间隔（秒）
    #[arg(long, default_value = "5")]
    status_interval: u64,

    /// 打印生效的配置（TOML）后退出
    #[arg(long)]
    print_config: bool,
}

impl Args {
    /// 加载配置文件并应用命令行覆盖
    fn robot_config(&self) -> Result<RobotConfig> {
        let mut config = match &self.config {
            Some(path) => RobotConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => RobotConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.channel.bind_addr = bind.clone();
        }
        if let Some(frequency) = self.frequency {
            config.control_loop.frequency_hz = frequency;
        }
        if let Some(max_ticks) = self.max_ticks {
            config.control_loop.max_iterations = Some(max_ticks);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn daemon_config(&self, robot: RobotConfig) -> Result<DaemonConfig> {
        let sensor_script = match &self.sensor_script {
            Some(script) => parse_sensor_script(script).context("Invalid --sensor-script")?,
            None => Vec::new(),
        };

        let image_path = self
            .image
            .clone()
            .or_else(|| robot.camera.placeholder_image.as_ref().map(PathBuf::from));
        let snapshot_image = match image_path {
            Some(path) => Some(
                std::fs::read(&path)
                    .with_context(|| format!("Failed to read image {}", path.display()))?,
            ),
            None => None,
        };

        Ok(DaemonConfig {
            robot,
            sensor_script,
            snapshot_image,
            status_interval: Duration::from_secs(self.status_interval.max(1)),
        })
    }
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(
                    "linebot=info"
                        .parse::<tracing_subscriber::filter::Directive>()
                        .context("Invalid log directive")?,
                ),
        )
        .init();

    let args = Args::parse();
    let robot = args.robot_config()?;

    if args.print_config {
        print!("{}", robot.to_toml_string()?);
        return Ok(());
    }

    let config = args.daemon_config(robot)?;

    // 设置信号处理（Ctrl+C 优雅退出：控制循环在下一个周期停车并返回）
    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::Release);
    })
    .context("Failed to set signal handler")?;

    info!(
        "Linebot starting: channel {}, {} Hz, gains kp={} kd={} ki={}",
        config.robot.channel.bind_addr,
        config.robot.control_loop.frequency_hz,
        config.robot.pid.gains.kp,
        config.robot.pid.gains.kd,
        config.robot.pid.gains.ki,
    );

    let summary = Daemon::new(config, running).run()?;
    info!(
        "Ran {} ticks ({} overruns, {} motor failures)",
        summary.ticks, summary.overruns, summary.drive_failures
    );
    Ok(())
}
