//! 误差分类器
//!
//! 把三路传感器读数映射为控制误差，并维护连续丢线计数。
//!
//! # 映射表
//!
//! 组合值 `T = 左*100 + 中*10 + 右`：
//!
//! | L M R | T   | error   | 丢线计数 |
//! |-------|-----|---------|----------|
//! | 0 0 1 | 1   | -outer  | 清零     |
//! | 0 1 1 | 11  | -inner  | 清零     |
//! | 0 1 0 | 10  | 0       | 清零     |
//! | 1 1 0 | 110 | +inner  | 清零     |
//! | 1 0 0 | 100 | +outer  | 清零     |
//! | 1 1 1 | 111 | 0       | 清零     |
//! | 0 0 0 | 0   | 不变    | +1       |
//! | 1 0 1 | 101 | 见 `GapPolicy` | 不变 |
//!
//! 默认 inner = 1.0，outer = 1.7。正误差表示线在左侧。

use crate::state::ControllerState;
use linebot_hal::SensorReading;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// (1,0,1) 读数的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// 保持上一个有效误差（默认）
    #[default]
    HoldLast,
    /// 误差置 0，按直行处理
    Straight,
}

/// 分类器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// 两个相邻传感器触发时的误差幅值
    pub inner_error: f64,

    /// 只有边缘传感器触发时的误差幅值
    pub outer_error: f64,

    /// (1,0,1) 处理方式
    pub gap_policy: GapPolicy,

    /// 连续丢线多少个周期后停车
    pub lost_line_threshold: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            inner_error: 1.0,
            outer_error: 1.7,
            gap_policy: GapPolicy::HoldLast,
            lost_line_threshold: 25,
        }
    }
}

/// 单次分类结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// 看到线，误差已更新，丢线计数已清零
    Line { error: f64 },
    /// 全空读数，误差不变，丢线计数 +1
    Lost { count: u32 },
    /// (1,0,1) 读数，丢线计数不变
    Gap,
}

/// 传感器组合值 `T = 左*100 + 中*10 + 右`
#[inline]
pub fn pattern_total(reading: SensorReading) -> u8 {
    let [l, m, r] = reading.bits();
    l * 100 + m * 10 + r
}

/// 误差分类器
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    config: ClassifierConfig,
    /// 当前是否处于连续的 (1,0,1) 读数中
    in_gap: bool,
    gaps_total: u64,
}

impl ErrorClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            in_gap: false,
            gaps_total: 0,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// 分类一次读数，更新 `state.error` 和 `state.lost_line_count`
    pub fn classify(
        &mut self,
        reading: SensorReading,
        state: &mut ControllerState,
    ) -> Classification {
        let inner = self.config.inner_error;
        let outer = self.config.outer_error;

        let line_error = match (reading.left, reading.middle, reading.right) {
            (false, false, true) => Some(-outer),
            (false, true, true) => Some(-inner),
            (false, true, false) => Some(0.0),
            (true, true, false) => Some(inner),
            (true, false, false) => Some(outer),
            (true, true, true) => Some(0.0),
            (false, false, false) => None,
            (true, false, true) => return self.gap(reading, state),
        };
        self.in_gap = false;

        let classification = match line_error {
            Some(error) => {
                state.error = error;
                state.lost_line_count = 0;
                Classification::Line { error }
            },
            None => {
                state.lost_line_count = state.lost_line_count.saturating_add(1);
                Classification::Lost {
                    count: state.lost_line_count,
                }
            },
        };

        trace!(
            "T={:>3} -> {:?} (error={})",
            pattern_total(reading),
            classification,
            state.error
        );
        classification
    }

    fn gap(&mut self, reading: SensorReading, state: &mut ControllerState) -> Classification {
        self.gaps_total += 1;
        if self.config.gap_policy == GapPolicy::Straight {
            state.error = 0.0;
        }

        if !self.in_gap {
            warn!(
                "Unclassified sensor pattern {} (outer sensors only), applying {:?}",
                reading, self.config.gap_policy
            );
            self.in_gap = true;
        } else {
            debug!("Sensor pattern {} persists", reading);
        }
        Classification::Gap
    }

    /// 累计 (1,0,1) 读数次数
    pub fn gaps_total(&self) -> u64 {
        self.gaps_total
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
