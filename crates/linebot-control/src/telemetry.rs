//! 遥测快照
//!
//! 控制线程每个周期发布一份 `TickSnapshot`，状态线程随时无锁读取最新一份。

use crate::session::{Throttle, TickOutcome};
use arc_swap::ArcSwap;
use linebot_hal::SensorReading;
use linebot_protocol::Mode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 单个周期的快照
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickSnapshot {
    /// 周期序号（从 1 开始，0 表示尚未运行）
    pub tick: u64,
    pub mode: Mode,
    /// 实际下发的油门（电机失败时为 None）
    pub applied: Option<Throttle>,
    pub reading: Option<SensorReading>,
    pub error: f64,
    pub correction: Option<f64>,
    pub lost_line_count: u32,
}

/// 遥测发布器（控制线程写，其他线程读）
#[derive(Debug)]
pub struct Telemetry {
    latest: ArcSwap<TickSnapshot>,
    /// 周期超时次数
    overruns: AtomicU64,
    /// 电机指令失败次数
    drive_failures: AtomicU64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            latest: ArcSwap::from_pointee(TickSnapshot::default()),
            overruns: AtomicU64::new(0),
            drive_failures: AtomicU64::new(0),
        }
    }

    /// 发布一个周期的结果
    pub(crate) fn publish(
        &self,
        tick: u64,
        outcome: &TickOutcome,
        applied: Option<Throttle>,
        error: f64,
        lost_line_count: u32,
    ) {
        if applied.is_none() {
            self.drive_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.latest.store(Arc::new(TickSnapshot {
            tick,
            mode: outcome.mode,
            applied,
            reading: outcome.reading,
            error,
            correction: outcome.correction,
            lost_line_count,
        }));
    }

    pub(crate) fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取最新快照（无锁，ArcSwap::load）
    pub fn latest(&self) -> TickSnapshot {
        self.latest.load().as_ref().clone()
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn drive_failures(&self) -> u64 {
        self.drive_failures.load(Ordering::Relaxed)
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;

    #[test]
    fn test_publish_and_read() {
        let telemetry = Telemetry::new();
        assert_eq!(telemetry.latest().tick, 0);
        assert_eq!(telemetry.latest().mode, Mode::Stop);

        let outcome = TickOutcome {
            mode: Mode::Autonomous,
            throttle: Throttle::new(0.4, 0.4),
            reading: Some(SensorReading::from_bits([0, 1, 0])),
            classification: Some(Classification::Line { error: 0.0 }),
            correction: Some(0.0),
            event: None,
        };
        telemetry.publish(7, &outcome, Some(outcome.throttle), 0.0, 0);

        let snapshot = telemetry.latest();
        assert_eq!(snapshot.tick, 7);
        assert_eq!(snapshot.mode, Mode::Autonomous);
        assert_eq!(snapshot.applied, Some(Throttle::new(0.4, 0.4)));
        assert_eq!(telemetry.drive_failures(), 0);

        telemetry.publish(8, &outcome, None, 0.0, 0);
        assert_eq!(telemetry.drive_failures(), 1);
        assert_eq!(telemetry.latest().applied, None);
    }
}
