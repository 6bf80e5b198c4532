//! # Linebot Protocol
//!
//! 手机端与小车之间命令通道的协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `mode`: 运行模式（自动巡线 / 遥控 / 停止）
//! - `message`: 命令消息解析（JSON，兼容单引号）
//! - `framing`: 换行分帧与图像帧编码
//!
//! ## 线路格式
//!
//! ```text
//! server -> client : [u32 BE 长度][BMP 图像字节]        （连接建立后一次）
//! client -> server : {"Mode":"Remote","Type":"Left"}\n  （之后任意条）
//! ```

pub mod framing;
pub mod message;
pub mod mode;

pub use framing::{
    IMAGE_HEADER_LEN, LineDecoder, decode_image_header, encode_image_frame, encode_message_line,
};
pub use message::CommandMessage;
pub use mode::{Mode, RemoteDirection};

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 消息无法解析为 JSON 对象
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// 缺少必需字段（如 `Mode`）
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// 单条消息超过最大长度
    #[error("Message too long: {len} bytes (max {max})")]
    MessageTooLong { len: usize, max: usize },

    /// 消息不是合法 UTF-8
    #[error("Invalid UTF-8 in message")]
    InvalidUtf8,

    /// 图像帧超过 u32 长度前缀的表示范围
    #[error("Image frame too large: {0} bytes")]
    FrameTooLarge(usize),
}
