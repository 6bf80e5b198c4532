//! 控制层错误类型定义

use linebot_driver::DriverError;
use linebot_hal::HalError;
use thiserror::Error;

/// 控制层错误类型
#[derive(Error, Debug)]
pub enum ControlError {
    /// 配置无效（频率、油门范围、阈值等）
    #[error("Configuration error: {0}")]
    Config(String),

    /// 硬件错误
    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    /// 驱动层错误
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 文件 IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML 解析错误
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}
