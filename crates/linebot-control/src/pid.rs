//! PID Controller - 比例-积分-微分控制器
//!
//! # 算法
//!
//! 每个周期按固定顺序执行：
//!
//! ```text
//! integral  += error
//! correction = Kp * error + Kd * (error - previous_error) + Ki * integral
//! previous_error = error
//! ```
//!
//! 周期固定，`dt` 被并入增益，因此公式里没有时间项。
//!
//! # 示例
//!
//! ```rust
//! use linebot_control::{ControllerState, PidController};
//!
//! let pid = PidController::default().with_integral_limit(50.0);
//! let mut state = ControllerState::new();
//!
//! state.error = 1.0;
//! let correction = pid.update(&mut state);
//! assert!((correction - (0.08 + 0.13)).abs() < 1e-12);
//! assert_eq!(state.previous_error, 1.0);
//! ```

use crate::state::ControllerState;
use serde::{Deserialize, Serialize};

/// PID 增益
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidGains {
    /// 比例增益 (Kp)
    pub kp: f64,
    /// 微分增益 (Kd)
    pub kd: f64,
    /// 积分增益 (Ki)
    pub ki: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.08,
            kd: 0.13,
            ki: 0.0,
        }
    }
}

/// PID 输出（纯函数）
///
/// 相同输入总是得到相同输出，不读写任何状态。
#[inline]
pub fn pid_output(error: f64, previous_error: f64, integral: f64, gains: &PidGains) -> f64 {
    gains.kp * error + gains.kd * (error - previous_error) + gains.ki * integral
}

/// PID 控制器
///
/// 增益在构造后固定；动态状态保存在 `ControllerState` 中，由调用方持有。
#[derive(Debug, Clone, Default)]
pub struct PidController {
    gains: PidGains,

    /// 积分项限制（防止积分饱和），`None` 表示不限制
    integral_limit: Option<f64>,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral_limit: None,
        }
    }

    /// 设置 PID 增益
    pub fn with_gains(mut self, kp: f64, ki: f64, kd: f64) -> Self {
        self.gains = PidGains { kp, kd, ki };
        self
    }

    /// 设置积分项限制
    ///
    /// 积分累加后钳位到 `[-limit, +limit]`。非有限值（NaN、无穷）表示不限制。
    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit.is_finite().then(|| limit.abs());
        self
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    pub fn integral_limit(&self) -> Option<f64> {
        self.integral_limit
    }

    /// 执行一个周期，返回修正量
    ///
    /// 读取 `state.error`，更新 `state.integral` 和 `state.previous_error`。
    pub fn update(&self, state: &mut ControllerState) -> f64 {
        state.integral += state.error;
        if let Some(limit) = self.integral_limit {
            state.integral = state.integral.clamp(-limit, limit);
        }

        let correction = pid_output(state.error, state.previous_error, state.integral, &self.gains);
        state.previous_error = state.error;
        correction
    }
}
