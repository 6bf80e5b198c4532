//! 电机句柄
//!
//! 包装 `DriveActuator`：
//! - 油门钳位到 `[min, max]`，NaN 视为 0
//! - 连续故障只在第一次记 `error!`，恢复时记一次 `info!`
//! - Drop 时下发 (0, 0)，覆盖正常退出、错误返回和 panic 展开

use crate::error::DriverError;
use linebot_hal::DriveActuator;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// 油门范围
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrottleLimits {
    pub min: f64,
    pub max: f64,
}

impl ThrottleLimits {
    pub fn new(min: f64, max: f64) -> Result<Self, DriverError> {
        let limits = Self { min, max };
        limits.validate()?;
        Ok(limits)
    }

    /// 检查上下限
    pub fn validate(&self) -> Result<(), DriverError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(DriverError::InvalidInput(format!(
                "invalid throttle range [{}, {}]",
                self.min, self.max
            )));
        }
        if self.min < -1.0 || self.max > 1.0 {
            return Err(DriverError::InvalidInput(format!(
                "throttle range [{}, {}] exceeds actuator range [-1, 1]",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// 钳位单个油门值
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return 0.0;
        }
        value.max(self.min).min(self.max)
    }
}

impl Default for ThrottleLimits {
    fn default() -> Self {
        Self {
            min: -1.0,
            max: 1.0,
        }
    }
}

/// 电机句柄（控制线程独占）
pub struct DriveHandle<A: DriveActuator> {
    actuator: A,
    limits: ThrottleLimits,
    /// 最后一次成功下发的油门
    last: Option<(f64, f64)>,
    /// 连续失败次数
    failure_streak: u32,
    /// 累计失败次数
    failures_total: u64,
}

impl<A: DriveActuator> DriveHandle<A> {
    pub fn new(actuator: A, limits: ThrottleLimits) -> Self {
        Self {
            actuator,
            limits,
            last: None,
            failure_streak: 0,
            failures_total: 0,
        }
    }

    /// 下发油门（先钳位）
    ///
    /// 返回实际下发的 (左, 右)。
    pub fn command(&mut self, left: f64, right: f64) -> Result<(f64, f64), DriverError> {
        let left = self.limits.clamp(left);
        let right = self.limits.clamp(right);

        match self.actuator.set_throttle(left, right) {
            Ok(()) => {
                if self.failure_streak > 0 {
                    info!(
                        "Motor commands recovered after {} consecutive failures",
                        self.failure_streak
                    );
                    self.failure_streak = 0;
                }
                self.last = Some((left, right));
                Ok((left, right))
            },
            Err(e) => {
                self.failure_streak += 1;
                self.failures_total += 1;
                if self.failure_streak == 1 {
                    error!("Motor command failed: {}", e);
                } else {
                    debug!("Motor command failed ({} in a row): {}", self.failure_streak, e);
                }
                Err(e.into())
            },
        }
    }

    /// 两个电机置零
    pub fn stop(&mut self) -> Result<(), DriverError> {
        self.command(0.0, 0.0).map(|_| ())
    }

    pub fn limits(&self) -> ThrottleLimits {
        self.limits
    }

    pub fn last_command(&self) -> Option<(f64, f64)> {
        self.last
    }

    pub fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    pub fn failures_total(&self) -> u64 {
        self.failures_total
    }
}

impl<A: DriveActuator> Drop for DriveHandle<A> {
    fn drop(&mut self) {
        match self.actuator.set_throttle(0.0, 0.0) {
            Ok(()) => info!("Motors stopped"),
            Err(e) => warn!("Failed to stop motors during shutdown: {}", e),
        }
    }
}
