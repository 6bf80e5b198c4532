//! 控制器状态
//!
//! 只由控制线程持有和修改，不跨线程共享。

/// 控制器动态状态
///
/// - `error`: 本周期的控制误差（由分类器写入）
/// - `previous_error`: 上一周期的误差（PID 计算微分项后更新）
/// - `integral`: 误差累加值
/// - `lost_line_count`: 连续全空读数的次数
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    pub error: f64,
    pub previous_error: f64,
    pub integral: f64,
    pub lost_line_count: u32,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清零全部动态状态
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 连续丢线次数是否达到阈值
    #[inline]
    pub fn is_lost(&self, threshold: u32) -> bool {
        self.lost_line_count >= threshold
    }
}
