//! 会话控制器
//!
//! 每个控制周期根据当前模式决定电机油门：
//!
//! - `Autonomous`: 读传感器 → 分类 → PID → 油门
//! - `Remote(dir)`: 固定油门对
//! - `Stop`: (0, 0)
//!
//! `tick()` 只返回决策（`TickOutcome`），不直接驱动电机或显示屏，
//! 因此可以在没有硬件的情况下测试。

use crate::classifier::{Classification, ClassifierConfig, ErrorClassifier};
use crate::pid::PidController;
use crate::state::ControllerState;
use linebot_driver::ThrottleLimits;
use linebot_hal::{SensorReader, SensorReading};
use linebot_protocol::{Mode, RemoteDirection};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// 一对电机油门（left = motor1，right = motor2）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Throttle {
    pub left: f64,
    pub right: f64,
}

impl Throttle {
    pub const STOP: Throttle = Throttle::new(0.0, 0.0);

    pub const fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn is_stopped(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

impl fmt::Display for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.left, self.right)
    }
}

/// 油门配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// 修正量为 0 时的巡航油门
    pub cruise: Throttle,

    /// 有修正时的基础油门（左 = base + c，右 = base - c）
    pub base: f64,

    /// 自动模式油门下限
    pub min: f64,

    /// 自动模式油门上限
    pub max: f64,

    pub remote_forward: Throttle,
    pub remote_left: Throttle,
    pub remote_right: Throttle,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            cruise: Throttle::new(0.40, 0.40),
            base: 0.25,
            min: -1.0,
            max: 1.0,
            remote_forward: Throttle::new(0.35, 0.40),
            remote_left: Throttle::new(0.15, 0.50),
            remote_right: Throttle::new(0.50, 0.15),
        }
    }
}

impl ThrottleConfig {
    /// 自动模式的钳位范围
    pub fn limits(&self) -> ThrottleLimits {
        ThrottleLimits {
            min: self.min,
            max: self.max,
        }
    }

    /// 检查所有油门值
    pub fn validate(&self) -> Result<(), String> {
        self.limits().validate().map_err(|e| e.to_string())?;

        let named = [
            ("cruise", self.cruise),
            ("remote_forward", self.remote_forward),
            ("remote_left", self.remote_left),
            ("remote_right", self.remote_right),
        ];
        for (name, pair) in named {
            for value in [pair.left, pair.right] {
                if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
                    return Err(format!("throttle.{} value {} outside [-1, 1]", name, value));
                }
            }
        }
        if !self.base.is_finite() || !(-1.0..=1.0).contains(&self.base) {
            return Err(format!("throttle.base {} outside [-1, 1]", self.base));
        }
        Ok(())
    }

    /// 遥控方向对应的油门
    pub fn remote(&self, direction: RemoteDirection) -> Throttle {
        match direction {
            RemoteDirection::Forward => self.remote_forward,
            RemoteDirection::Left => self.remote_left,
            RemoteDirection::Right => self.remote_right,
            RemoteDirection::Stop => Throttle::STOP,
        }
    }

    /// 根据修正量计算自动模式油门
    pub fn steer(&self, correction: f64) -> Throttle {
        if correction == 0.0 {
            return self.cruise;
        }
        let limits = self.limits();
        Throttle::new(
            limits.clamp(self.base + correction),
            limits.clamp(self.base - correction),
        )
    }
}

/// 会话事件（驱动显示屏）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// 进入自动巡线
    Engaged,
    /// 连续丢线达到阈值，停车
    LineLost,
}

/// 单个周期的决策结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub mode: Mode,
    pub throttle: Throttle,
    /// 自动模式下本周期的读数（读取失败或非自动模式为 None）
    pub reading: Option<SensorReading>,
    pub classification: Option<Classification>,
    pub correction: Option<f64>,
    /// 本周期的事件
    ///
    /// 同一周期既进入自动模式又达到丢线阈值时（阈值为 1 且首个读数全白），
    /// 只报告 `LineLost`：停车图片覆盖首档图片。
    pub event: Option<SessionEvent>,
}

impl TickOutcome {
    fn idle(mode: Mode, throttle: Throttle) -> Self {
        Self {
            mode,
            throttle,
            reading: None,
            classification: None,
            correction: None,
            event: None,
        }
    }
}

/// 会话控制器（控制线程独占）
#[derive(Debug)]
pub struct SessionController {
    state: ControllerState,
    classifier: ErrorClassifier,
    pid: PidController,
    throttle: ThrottleConfig,
    lost_line_threshold: u32,
    last_mode: Mode,
    sensor_fault_streak: u32,
}

impl SessionController {
    pub fn new(pid: PidController, classifier: ClassifierConfig, throttle: ThrottleConfig) -> Self {
        // 阈值为 0 会在第一个周期就停车，至少取 1
        let lost_line_threshold = classifier.lost_line_threshold.max(1);
        Self {
            state: ControllerState::new(),
            classifier: ErrorClassifier::new(classifier),
            pid,
            throttle,
            lost_line_threshold,
            last_mode: Mode::Stop,
            sensor_fault_streak: 0,
        }
    }

    /// 执行一个周期
    ///
    /// 只有 `Autonomous` 模式才会读取传感器。读取失败时本周期输出 (0, 0)，
    /// 分类器和 PID 状态保持不变。
    pub fn tick<S: SensorReader + ?Sized>(&mut self, mode: Mode, sensors: &mut S) -> TickOutcome {
        let engaged = self.transition(mode);

        let mut outcome = match mode {
            Mode::Autonomous => match sensors.read() {
                Ok(reading) => {
                    if self.sensor_fault_streak > 0 {
                        info!(
                            "Sensors recovered after {} failed reads",
                            self.sensor_fault_streak
                        );
                        self.sensor_fault_streak = 0;
                    }
                    self.follow(reading)
                },
                Err(e) => {
                    self.sensor_fault_streak += 1;
                    if self.sensor_fault_streak == 1 {
                        warn!("Sensor read failed, holding motors: {}", e);
                    } else {
                        debug!("Sensor read failed ({} in a row): {}", self.sensor_fault_streak, e);
                    }
                    TickOutcome::idle(mode, Throttle::STOP)
                },
            },
            Mode::Remote(direction) => TickOutcome::idle(mode, self.throttle.remote(direction)),
            Mode::Stop => TickOutcome::idle(mode, Throttle::STOP),
        };

        // LineLost 优先于 Engaged
        if engaged && outcome.event.is_none() {
            outcome.event = Some(SessionEvent::Engaged);
        }
        outcome
    }

    /// 自动模式的一步：分类 → PID → 油门
    pub fn follow(&mut self, reading: SensorReading) -> TickOutcome {
        let classification = self.classifier.classify(reading, &mut self.state);
        let correction = self.pid.update(&mut self.state);

        let (throttle, event) = if self.state.is_lost(self.lost_line_threshold) {
            let event = if self.state.lost_line_count == self.lost_line_threshold {
                warn!(
                    "Line lost for {} consecutive ticks, stopping motors",
                    self.state.lost_line_count
                );
                Some(SessionEvent::LineLost)
            } else {
                None
            };
            (Throttle::STOP, event)
        } else {
            (self.throttle.steer(correction), None)
        };

        debug!(
            "sensors={} error={:+.2} correction={:+.4} throttle={}",
            reading, self.state.error, correction, throttle
        );

        TickOutcome {
            mode: Mode::Autonomous,
            throttle,
            reading: Some(reading),
            classification: Some(classification),
            correction: Some(correction),
            event,
        }
    }

    /// 记录模式切换，返回是否刚进入自动模式
    fn transition(&mut self, mode: Mode) -> bool {
        if mode == self.last_mode {
            return false;
        }
        info!("Mode: {} -> {}", self.last_mode, mode);
        let engaged = mode.is_autonomous() && !self.last_mode.is_autonomous();
        self.last_mode = mode;
        engaged
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    pub fn throttle_config(&self) -> &ThrottleConfig {
        &self.throttle
    }

    pub fn lost_line_threshold(&self) -> u32 {
        self.lost_line_threshold
    }

    pub fn last_mode(&self) -> Mode {
        self.last_mode
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(
            PidController::default(),
            ClassifierConfig::default(),
            ThrottleConfig::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linebot_hal::mock::MockSensors;

    const EPS: f64 = 1e-9;

    fn close(a: Throttle, b: Throttle) -> bool {
        (a.left - b.left).abs() < EPS && (a.right - b.right).abs() < EPS
    }

    #[test]
    fn test_remote_and_stop_throttles() {
        let mut session = SessionController::default();
        let mut sensors = MockSensors::constant(SensorReading::from_bits([0, 1, 0]));

        let cases = [
            (Mode::Remote(RemoteDirection::Forward), Throttle::new(0.35, 0.40)),
            (Mode::Remote(RemoteDirection::Left), Throttle::new(0.15, 0.50)),
            (Mode::Remote(RemoteDirection::Right), Throttle::new(0.50, 0.15)),
            (Mode::Remote(RemoteDirection::Stop), Throttle::STOP),
            (Mode::Stop, Throttle::STOP),
        ];
        for (mode, expected) in cases {
            let outcome = session.tick(mode, &mut sensors);
            assert_eq!(outcome.throttle, expected, "{}", mode);
            assert!(outcome.classification.is_none());
            assert!(outcome.event.is_none());
        }

        // 非自动模式不读传感器
        assert_eq!(sensors.reads(), 0);
    }

    #[test]
    fn test_centered_cruises() {
        let mut session = SessionController::default();
        let mut sensors = MockSensors::constant(SensorReading::from_bits([0, 1, 0]));

        let outcome = session.tick(Mode::Autonomous, &mut sensors);
        assert_eq!(outcome.throttle, Throttle::new(0.40, 0.40));
        assert_eq!(outcome.correction, Some(0.0));
        assert_eq!(outcome.event, Some(SessionEvent::Engaged));

        let outcome = session.tick(Mode::Autonomous, &mut sensors);
        assert_eq!(outcome.event, None);
    }

    #[test]
    fn test_steer_formula() {
        let config = ThrottleConfig::default();
        assert!(close(config.steer(0.1), Throttle::new(0.35, 0.15)));
        assert!(close(config.steer(-0.2), Throttle::new(0.05, 0.45)));
        assert_eq!(config.steer(0.0), config.cruise);

        // 钳位
        let clamped = config.steer(5.0);
        assert_eq!(clamped, Throttle::new(1.0, -1.0));
    }

    #[test]
    fn test_engaged_only_on_entry() {
        let mut session = SessionController::default();
        let mut sensors = MockSensors::constant(SensorReading::from_bits([0, 1, 0]));

        assert_eq!(session.tick(Mode::Autonomous, &mut sensors).event, Some(SessionEvent::Engaged));
        assert_eq!(session.tick(Mode::Autonomous, &mut sensors).event, None);
        session.tick(Mode::Remote(RemoteDirection::Left), &mut sensors);
        assert_eq!(session.tick(Mode::Autonomous, &mut sensors).event, Some(SessionEvent::Engaged));
        assert_eq!(session.last_mode(), Mode::Autonomous);
    }

    #[test]
    fn test_sensor_failure_holds_motors_and_state() {
        let mut session = SessionController::default();
        let mut sensors = MockSensors::constant(SensorReading::from_bits([1, 0, 0]));

        session.tick(Mode::Autonomous, &mut sensors);
        let before = *session.state();

        sensors.fail_next(3);
        for _ in 0..3 {
            let outcome = session.tick(Mode::Autonomous, &mut sensors);
            assert_eq!(outcome.throttle, Throttle::STOP);
            assert!(outcome.reading.is_none());
            assert!(outcome.correction.is_none());
        }
        assert_eq!(*session.state(), before);
        assert_eq!(session.sensor_fault_streak, 3);

        let outcome = session.tick(Mode::Autonomous, &mut sensors);
        assert!(outcome.correction.is_some());
        assert_eq!(session.sensor_fault_streak, 0);
    }

    #[test]
    fn test_lost_line_stops_and_fires_once() {
        let mut session = SessionController::default();
        let threshold = session.lost_line_threshold();

        session.follow(SensorReading::from_bits([0, 1, 0]));

        let blank = SensorReading::from_bits([0, 0, 0]);
        let mut events = 0;
        for tick in 1..=threshold + 10 {
            let outcome = session.follow(blank);
            if outcome.event == Some(SessionEvent::LineLost) {
                events += 1;
                assert_eq!(tick, threshold);
            }
            if tick >= threshold {
                assert_eq!(outcome.throttle, Throttle::STOP, "tick {}", tick);
            } else {
                assert!(!outcome.throttle.is_stopped(), "tick {}", tick);
            }
        }
        assert_eq!(events, 1);

        // 重新看到线后恢复
        let outcome = session.follow(SensorReading::from_bits([0, 1, 0]));
        assert_eq!(outcome.throttle, Throttle::new(0.40, 0.40));
        assert_eq!(session.state().lost_line_count, 0);

        // 第二次丢线是新的一轮，再报告一次
        let mut second = Vec::new();
        for tick in 1..=threshold + 10 {
            if session.follow(blank).event == Some(SessionEvent::LineLost) {
                second.push(tick);
            }
        }
        assert_eq!(second, vec![threshold]);
    }

    #[test]
    fn test_line_lost_wins_over_engaged_on_same_tick() {
        let classifier = ClassifierConfig {
            lost_line_threshold: 1,
            ..Default::default()
        };
        let mut session =
            SessionController::new(PidController::default(), classifier, ThrottleConfig::default());
        let mut sensors = MockSensors::constant(SensorReading::from_bits([0, 0, 0]));

        let outcome = session.tick(Mode::Autonomous, &mut sensors);
        assert_eq!(outcome.event, Some(SessionEvent::LineLost));
        assert_eq!(outcome.throttle, Throttle::STOP);
        assert_eq!(session.last_mode(), Mode::Autonomous);

        let outcome = session.tick(Mode::Autonomous, &mut sensors);
        assert_eq!(outcome.event, None);
    }

    #[test]
    fn test_throttle_config_validate() {
        assert!(ThrottleConfig::default().validate().is_ok());

        let bad = ThrottleConfig {
            min: 0.5,
            max: -0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = ThrottleConfig {
            remote_left: Throttle::new(0.15, 1.5),
            ..Default::default()
        };
        let err = bad.validate().unwrap_err();
        assert!(err.contains("remote_left"), "{}", err);
    }
}
