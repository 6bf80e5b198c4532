//! Loop Runner - 固定频率控制循环
//!
//! # 核心功能
//!
//! - **精确定时**: `spin_sleep` 低抖动延时，按截止时间调度（不累积漂移）
//! - **超时处理**: 周期耗时超过标称周期时记录 overrun，并以当前时间重新对齐
//! - **非阻塞**: 每周期只做一次 `ModeSlot` 原子读取，显示通知用 `try_send`
//! - **安全退出**: 运行标志清除或达到 `max_iterations` 后下发 (0, 0)
//!
//! # 示例
//!
//! ```rust,ignore
//! let mut control = ControlLoop::new(session, sensors, drive, mode, telemetry);
//! let summary = run_session(&mut control, &LoopConfig::default(), &running)?;
//! ```

use crate::error::ControlError;
use crate::session::{SessionController, SessionEvent, Throttle, TickOutcome};
use crate::telemetry::Telemetry;
use linebot_driver::{DriveHandle, ModeSlot, StatusImage, StatusNotifier};
use linebot_hal::{DriveActuator, SensorReader};
use serde::{Deserialize, Serialize};
use spin_sleep::SpinSleeper;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 控制循环配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// 控制频率（Hz）
    ///
    /// 例如：50.0 表示 50Hz（20ms 周期）
    pub frequency_hz: f64,

    /// 最大周期数（None 表示运行到退出标志清除）
    ///
    /// 用于测试或定时运行。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            frequency_hz: 50.0,
            max_iterations: None,
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<(), ControlError> {
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(ControlError::Config(format!(
                "Invalid frequency_hz: {} (must be > 0)",
                self.frequency_hz
            )));
        }
        if let Err(e) = Duration::try_from_secs_f64(1.0 / self.frequency_hz) {
            return Err(ControlError::Config(format!(
                "Invalid frequency_hz: {} (period not representable: {})",
                self.frequency_hz, e
            )));
        }
        if self.frequency_hz > 1000.0 {
            warn!(
                "Very high control frequency: {} Hz. Sensors and motor driver may not keep up.",
                self.frequency_hz
            );
        }
        Ok(())
    }

    /// 标称周期
    ///
    /// 未通过 `validate()` 的频率返回 `Duration::MAX`。
    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.frequency_hz).unwrap_or(Duration::MAX)
    }
}

/// 循环结束时的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopSummary {
    pub ticks: u64,
    pub overruns: u64,
    pub drive_failures: u64,
}

/// 控制周期需要的全部资源（控制线程独占）
pub struct ControlLoop<S: SensorReader, A: DriveActuator> {
    session: SessionController,
    sensors: S,
    drive: DriveHandle<A>,
    mode: Arc<ModeSlot>,
    notifier: Option<StatusNotifier>,
    telemetry: Arc<Telemetry>,
}

impl<S: SensorReader, A: DriveActuator> ControlLoop<S, A> {
    pub fn new(
        session: SessionController,
        sensors: S,
        drive: DriveHandle<A>,
        mode: Arc<ModeSlot>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            session,
            sensors,
            drive,
            mode,
            notifier: None,
            telemetry,
        }
    }

    /// 会话事件转发到显示线程
    pub fn with_notifier(mut self, notifier: StatusNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// 执行一个周期：读取模式 → 决策 → 下发油门 → 通知 → 发布遥测
    pub fn step(&mut self, tick: u64) -> TickOutcome {
        let mode = self.mode.get();
        let outcome = self.session.tick(mode, &mut self.sensors);

        // 失败已由 DriveHandle 按连续次数记录，循环继续
        let applied = self
            .drive
            .command(outcome.throttle.left, outcome.throttle.right)
            .ok()
            .map(|(left, right)| Throttle::new(left, right));

        if let Some(event) = outcome.event
            && let Some(notifier) = &self.notifier
        {
            notifier.notify(status_image(event));
        }

        let state = self.session.state();
        self.telemetry
            .publish(tick, &outcome, applied, state.error, state.lost_line_count);
        outcome
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn drive(&self) -> &DriveHandle<A> {
        &self.drive
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }
}

/// 会话事件对应的状态图片
pub fn status_image(event: SessionEvent) -> StatusImage {
    match event {
        SessionEvent::Engaged => StatusImage::FirstGear,
        SessionEvent::LineLost => StatusImage::StopGear,
    }
}

/// 运行控制循环
///
/// 这是一个阻塞函数，会持续运行直到：
/// - `running` 被清除（Ctrl+C 或断线策略）
/// - 达到 `max_iterations`（如果设置）
///
/// 退出前下发 (0, 0)；`DriveHandle` 的 Drop 也会再停一次，覆盖 panic 路径。
pub fn run_session<S, A>(
    control: &mut ControlLoop<S, A>,
    config: &LoopConfig,
    running: &AtomicBool,
) -> Result<LoopSummary, ControlError>
where
    S: SensorReader,
    A: DriveActuator,
{
    config.validate()?;

    let period = config.period();
    let sleeper = SpinSleeper::default();
    let telemetry = control.telemetry();

    info!(
        "Control loop started at {} Hz ({:?} period)",
        config.frequency_hz, period
    );

    let mut tick: u64 = 0;
    let mut overrun_streak: u32 = 0;
    let mut deadline = Instant::now();

    loop {
        if !running.load(Ordering::Acquire) {
            info!("Shutdown requested, leaving control loop");
            break;
        }
        if let Some(max_iter) = config.max_iterations
            && tick >= max_iter
        {
            info!("Reached {} ticks, leaving control loop", max_iter);
            break;
        }

        tick += 1;
        control.step(tick);

        deadline += period;
        let now = Instant::now();
        if now > deadline {
            telemetry.record_overrun();
            overrun_streak += 1;
            if overrun_streak == 1 {
                warn!(
                    "Tick {} overran its period by {:?}",
                    tick,
                    now - deadline
                );
            } else {
                debug!("Tick {} overran ({} in a row)", tick, overrun_streak);
            }
            deadline = now;
        } else {
            overrun_streak = 0;
            sleeper.sleep(deadline - now);
        }
    }

    if let Err(e) = control.drive.stop() {
        warn!("Failed to stop motors at loop exit: {}", e);
    }

    let summary = LoopSummary {
        ticks: tick,
        overruns: telemetry.overruns(),
        drive_failures: telemetry.drive_failures(),
    };
    info!(
        "Control loop stopped after {} ticks ({} overruns, {} motor failures)",
        summary.ticks, summary.overruns, summary.drive_failures
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use linebot_driver::ThrottleLimits;
    use linebot_hal::SensorReading;
    use linebot_hal::mock::{MockDrive, MockSensors};
    use linebot_protocol::{Mode, RemoteDirection};

    fn make_loop(
        sensors: MockSensors,
        drive: MockDrive,
        mode: Mode,
    ) -> ControlLoop<MockSensors, MockDrive> {
        ControlLoop::new(
            SessionController::default(),
            sensors,
            DriveHandle::new(drive, ThrottleLimits::default()),
            Arc::new(ModeSlot::new(mode)),
            Arc::new(Telemetry::new()),
        )
    }

    fn fast(ticks: u64) -> LoopConfig {
        LoopConfig {
            frequency_hz: 1000.0,
            max_iterations: Some(ticks),
        }
    }

    #[test]
    fn test_loop_config_validation() {
        assert!(LoopConfig::default().validate().is_ok());
        assert_eq!(LoopConfig::default().period(), Duration::from_millis(20));

        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let config = LoopConfig {
                frequency_hz: bad,
                max_iterations: None,
            };
            assert!(matches!(config.validate(), Err(ControlError::Config(_))));
        }
    }

    #[test]
    fn test_tiny_frequency_rejected_without_panic() {
        let config = LoopConfig {
            frequency_hz: 1e-20,
            max_iterations: Some(1),
        };
        assert!(matches!(config.validate(), Err(ControlError::Config(_))));
        assert_eq!(config.period(), Duration::MAX);

        let mut control = make_loop(MockSensors::default(), MockDrive::new(), Mode::Stop);
        let running = AtomicBool::new(true);
        assert!(run_session(&mut control, &config, &running).is_err());

        // 低频但可表示的周期仍然合法
        let slow = LoopConfig {
            frequency_hz: 0.1,
            max_iterations: None,
        };
        assert!(slow.validate().is_ok());
        assert_eq!(slow.period(), Duration::from_secs(10));
    }

    #[test]
    fn test_run_stops_after_max_iterations() {
        let drive = MockDrive::new();
        let mut control = make_loop(
            MockSensors::constant(SensorReading::from_bits([0, 1, 0])),
            drive.clone(),
            Mode::Remote(RemoteDirection::Forward),
        );
        let running = AtomicBool::new(true);

        let summary = run_session(&mut control, &fast(10), &running).unwrap();
        assert_eq!(summary.ticks, 10);

        let commands = drive.commands();
        assert_eq!(commands.len(), 11);
        assert!(commands[..10].iter().all(|&c| c == (0.35, 0.40)));
        assert_eq!(commands[10], (0.0, 0.0));
        assert_eq!(control.telemetry().latest().tick, 10);
    }

    #[test]
    fn test_run_exits_when_flag_cleared() {
        let drive = MockDrive::new();
        let mut control = make_loop(MockSensors::default(), drive.clone(), Mode::Stop);
        let running = AtomicBool::new(false);

        let summary = run_session(&mut control, &fast(100), &running).unwrap();
        assert_eq!(summary.ticks, 0);
        assert_eq!(drive.last(), Some((0.0, 0.0)));
    }

    #[test]
    fn test_invalid_frequency_rejected() {
        let mut control = make_loop(MockSensors::default(), MockDrive::new(), Mode::Stop);
        let running = AtomicBool::new(true);
        let config = LoopConfig {
            frequency_hz: 0.0,
            max_iterations: Some(1),
        };
        assert!(run_session(&mut control, &config, &running).is_err());
    }

    #[test]
    fn test_drive_failure_keeps_loop_running() {
        let drive = MockDrive::new();
        drive.set_fail(true);
        let mut control = make_loop(
            MockSensors::default(),
            drive.clone(),
            Mode::Remote(RemoteDirection::Left),
        );
        let running = AtomicBool::new(true);

        let summary = run_session(&mut control, &fast(5), &running).unwrap();
        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.drive_failures, 5);
        assert_eq!(control.telemetry().latest().applied, None);
    }

    #[test]
    fn test_step_forwards_events_to_notifier() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut control = make_loop(
            MockSensors::constant(SensorReading::from_bits([0, 1, 0])),
            MockDrive::new(),
            Mode::Autonomous,
        )
        .with_notifier(StatusNotifier::from_sender(tx));

        let outcome = control.step(1);
        assert_eq!(outcome.event, Some(SessionEvent::Engaged));
        assert_eq!(rx.try_recv().unwrap(), StatusImage::FirstGear);

        control.step(2);
        assert!(rx.try_recv().is_err());
    }
}
