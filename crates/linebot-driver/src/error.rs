//! 驱动层错误类型定义

use linebot_hal::HalError;
use linebot_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 硬件错误（传感器、电机、显示屏、摄像头）
    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 网络 IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 客户端断开连接
    #[error("Command channel disconnected")]
    ChannelDisconnected,

    /// 工作线程创建失败
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    /// 工作线程 panic
    #[error("Worker thread panicked: {0}")]
    ThreadPanicked(String),

    /// 无效输入（如油门上下限颠倒）
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
