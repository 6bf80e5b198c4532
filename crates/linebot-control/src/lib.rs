//! # Linebot Control
//!
//! 巡线控制核心：
//!
//! - 误差分类器（`ErrorClassifier`）：三路读数 → 控制误差 + 丢线计数
//! - PID 控制器（`PidController`）：误差 → 转向修正量
//! - 会话控制器（`SessionController`）：按模式选择油门，产生显示事件
//! - 控制循环（`run_session`）：固定频率调度，驱动电机并发布遥测
//! - 配置（`RobotConfig`）：TOML 文件 + 默认值
//!
//! # 数据流
//!
//! ```text
//! SensorReader ─> ErrorClassifier ─> PidController ─> SessionController ─> DriveHandle
//!                                                             ▲
//!                                                      ModeSlot (listener)
//! ```

pub mod classifier;
pub mod config;
mod error;
pub mod loop_runner;
pub mod pid;
pub mod session;
pub mod state;
pub mod telemetry;

pub use classifier::{Classification, ClassifierConfig, ErrorClassifier, GapPolicy, pattern_total};
pub use config::{CameraConfig, PidConfig, RobotConfig};
pub use error::ControlError;
pub use loop_runner::{ControlLoop, LoopConfig, LoopSummary, run_session, status_image};
pub use pid::{PidController, PidGains, pid_output};
pub use session::{SessionController, SessionEvent, Throttle, ThrottleConfig, TickOutcome};
pub use state::ControllerState;
pub use telemetry::{Telemetry, TickSnapshot};

#[cfg(test)]
mod proptests {
    use super::*;
    use linebot_hal::SensorReading;
    use proptest::prelude::*;

    fn any_reading() -> impl Strategy<Value = SensorReading> {
        prop::array::uniform3(0u8..2).prop_map(SensorReading::from_bits)
    }

    fn finite() -> impl Strategy<Value = f64> {
        -10.0f64..10.0
    }

    proptest! {
        #[test]
        fn pid_output_is_pure(
            error in finite(),
            previous in finite(),
            integral in finite(),
            kp in 0.0f64..1.0,
            kd in 0.0f64..1.0,
            ki in 0.0f64..1.0,
        ) {
            let gains = PidGains { kp, kd, ki };
            let a = pid_output(error, previous, integral, &gains);
            let b = pid_output(error, previous, integral, &gains);
            prop_assert_eq!(a.to_bits(), b.to_bits());
        }

        #[test]
        fn derivative_uses_prior_tick_error(readings in prop::collection::vec(any_reading(), 1..40)) {
            let pid = PidController::default();
            let mut classifier = ErrorClassifier::default();
            let mut state = ControllerState::new();

            let mut prior_error = 0.0;
            for reading in readings {
                classifier.classify(reading, &mut state);
                prop_assert_eq!(state.previous_error, prior_error);
                pid.update(&mut state);
                prop_assert_eq!(state.previous_error, state.error);
                prior_error = state.error;
            }
        }

        #[test]
        fn lost_counter_tracks_blank_runs(readings in prop::collection::vec(any_reading(), 1..60)) {
            let mut classifier = ErrorClassifier::default();
            let mut state = ControllerState::new();

            let mut expected = 0u32;
            for reading in readings {
                let before_error = state.error;
                classifier.classify(reading, &mut state);
                match pattern_total(reading) {
                    0 => {
                        expected += 1;
                        prop_assert_eq!(state.error, before_error);
                    },
                    101 => prop_assert_eq!(state.error, before_error),
                    _ => expected = 0,
                }
                prop_assert_eq!(state.lost_line_count, expected);
            }
        }

        #[test]
        fn autonomous_throttle_within_limits(readings in prop::collection::vec(any_reading(), 1..80)) {
            let mut session = SessionController::default();
            for reading in readings {
                let outcome = session.follow(reading);
                prop_assert!((-1.0..=1.0).contains(&outcome.throttle.left));
                prop_assert!((-1.0..=1.0).contains(&outcome.throttle.right));
            }
        }
    }
}
