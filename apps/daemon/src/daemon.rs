//! 守护进程核心逻辑
//!
//! 线程布局：
//!
//! | 线程               | 职责                                   |
//! |--------------------|----------------------------------------|
//! | main               | 固定频率控制循环（独占传感器和电机）   |
//! | `command_listener` | TCP 会话、摄像头快照、写 `ModeSlot`    |
//! | `display_worker`   | 状态图片                               |
//! | `status_print`     | 定期打印遥测快照                       |

use anyhow::{Context, Result};
use linebot_control::{ControlLoop, LoopSummary, RobotConfig, Telemetry, run_session};
use linebot_driver::{CommandListener, DisplayWorker, DriveHandle, ListenerStats, ModeSlot};
use linebot_hal::SensorReading;
use linebot_hal::mock::{MockCamera, MockDisplay, MockDrive, MockSensors};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 守护进程中模拟电机保留的指令条数
const DRIVE_HISTORY: usize = 256;

/// 守护进程配置
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// 控制器配置（文件 + 命令行覆盖）
    pub robot: RobotConfig,

    /// 模拟传感器脚本（循环播放）；为空时一直读到线在正中
    pub sensor_script: Vec<SensorReading>,

    /// 发送给客户端的快照图片（None 使用内置占位图）
    pub snapshot_image: Option<Vec<u8>>,

    /// 状态打印间隔
    pub status_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            robot: RobotConfig::default(),
            sensor_script: Vec::new(),
            snapshot_image: None,
            status_interval: Duration::from_secs(5),
        }
    }
}

/// 守护进程
pub struct Daemon {
    config: DaemonConfig,
    running: Arc<AtomicBool>,
}

impl Daemon {
    /// 创建守护进程实例
    ///
    /// `running` 由信号处理器和断线策略共同控制。
    pub fn new(config: DaemonConfig, running: Arc<AtomicBool>) -> Self {
        Self { config, running }
    }

    /// 启动所有线程并在当前线程运行控制循环，直到退出
    pub fn run(&self) -> Result<LoopSummary> {
        let robot = &self.config.robot;
        robot.validate().context("Invalid configuration")?;

        let mode = Arc::new(ModeSlot::default());
        let telemetry = Arc::new(Telemetry::new());

        let sensors = if self.config.sensor_script.is_empty() {
            MockSensors::constant(SensorReading::new(false, true, false))
        } else {
            MockSensors::looping(self.config.sensor_script.clone())
        };
        let camera = match &self.config.snapshot_image {
            Some(image) => MockCamera::new(image.clone()),
            None => MockCamera::placeholder(),
        };

        // 1. 显示线程
        let display = DisplayWorker::spawn(MockDisplay::new(), robot.display.clone())
            .context("Failed to start display worker")?;

        // 2. 命令通道（绑定失败是致命错误）
        let listener = CommandListener::spawn(
            robot.channel.clone(),
            camera,
            Arc::clone(&mode),
            Arc::clone(&self.running),
        )
        .context("Failed to start command channel")?;

        // 3. 状态打印线程
        let status = match spawn_status_printer(
            Arc::clone(&telemetry),
            listener.stats(),
            Arc::clone(&self.running),
            self.config.status_interval,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                let _ = listener.join();
                return Err(e);
            },
        };

        // 4. 控制循环（阻塞直到退出）
        let mut control = ControlLoop::new(
            robot.session(),
            sensors,
            DriveHandle::new(daemon_drive(), robot.throttle.limits()),
            Arc::clone(&mode),
            Arc::clone(&telemetry),
        )
        .with_notifier(display.notifier());

        let result = run_session(&mut control, &robot.control_loop, &self.running);

        // 先停电机，再收尾其他线程
        drop(control);
        self.running.store(false, Ordering::Release);

        if let Err(e) = listener.join() {
            warn!("Command listener exited abnormally: {}", e);
        }
        if status.join().is_err() {
            warn!("Status printer panicked");
        }
        drop(display);

        let summary = result.context("Control loop failed")?;
        info!("Linebot stopped");
        Ok(summary)
    }
}

/// 守护进程长期运行，模拟电机只保留最近的指令
fn daemon_drive() -> MockDrive {
    MockDrive::with_history(DRIVE_HISTORY)
}

fn spawn_status_printer(
    telemetry: Arc<Telemetry>,
    listener: Arc<ListenerStats>,
    running: Arc<AtomicBool>,
    interval: Duration,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("status_print".into())
        .spawn(move || status_print_loop(&telemetry, &listener, &running, interval))
        .context("Failed to spawn status print thread")
}

fn status_print_loop(
    telemetry: &Telemetry,
    listener: &ListenerStats,
    running: &AtomicBool,
    interval: Duration,
) {
    let mut next_print = Instant::now() + interval;
    while running.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(50));
        if Instant::now() < next_print {
            continue;
        }
        next_print += interval;

        let snapshot = telemetry.latest();
        let applied = snapshot
            .applied
            .map(|t| t.to_string())
            .unwrap_or_else(|| "failed".to_string());
        let reading = snapshot
            .reading
            .map(|r| r.to_string())
            .unwrap_or_else(|| "---".to_string());

        info!(
            "[Status] tick={} mode={} sensors={} error={:+.2} lost={} throttle={} | client={} conns={} msgs={}/{} rejected | overruns={} motor_failures={}",
            snapshot.tick,
            snapshot.mode,
            reading,
            snapshot.error,
            snapshot.lost_line_count,
            applied,
            listener.client_connected.load(Ordering::Relaxed),
            listener.connections.load(Ordering::Relaxed),
            listener.messages_accepted.load(Ordering::Relaxed),
            listener.messages_rejected.load(Ordering::Relaxed),
            telemetry.overruns(),
            telemetry.drive_failures(),
        );
    }
}
