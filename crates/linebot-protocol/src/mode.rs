//! 运行模式定义
//!
//! 模式由命令通道上最近一条合法消息决定，控制循环每个周期读取一次。

use std::fmt;

/// 遥控方向
///
/// 对应消息中的 `Type` 字段。未识别或缺失的 `Type` 视为 `Stop`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteDirection {
    /// 直行
    Forward,
    /// 左转（左轮慢于右轮）
    Left,
    /// 右转（右轮慢于左轮）
    Right,
    /// 停车
    #[default]
    Stop,
}

impl RemoteDirection {
    /// 从消息 `Type` 字段解析
    pub fn from_type(value: Option<&str>) -> Self {
        match value {
            Some("Forward") => Self::Forward,
            Some("Left") => Self::Left,
            Some("Right") => Self::Right,
            _ => Self::Stop,
        }
    }
}

/// 运行模式
///
/// 默认为 `Stop`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// 自动巡线（传感器 -> 误差 -> PID -> 电机）
    Autonomous,
    /// 遥控模式，带最近一次的方向
    Remote(RemoteDirection),
    /// 停止（默认）
    #[default]
    Stop,
}

impl Mode {
    /// 从消息字段解析模式
    ///
    /// 未识别的 `Mode` 字符串按 `Stop` 处理。
    pub fn from_fields(mode: &str, kind: Option<&str>) -> Self {
        match mode {
            "Autonomous" => Self::Autonomous,
            "Remote" => Self::Remote(RemoteDirection::from_type(kind)),
            _ => Self::Stop,
        }
    }

    /// 编码为单字节（用于原子槽位）
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Stop => 0,
            Self::Autonomous => 1,
            Self::Remote(RemoteDirection::Forward) => 2,
            Self::Remote(RemoteDirection::Left) => 3,
            Self::Remote(RemoteDirection::Right) => 4,
            Self::Remote(RemoteDirection::Stop) => 5,
        }
    }

    /// 从单字节解码
    ///
    /// 无效值返回 `Stop`。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Autonomous,
            2 => Self::Remote(RemoteDirection::Forward),
            3 => Self::Remote(RemoteDirection::Left),
            4 => Self::Remote(RemoteDirection::Right),
            5 => Self::Remote(RemoteDirection::Stop),
            _ => Self::Stop,
        }
    }

    pub fn is_autonomous(self) -> bool {
        self == Self::Autonomous
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Autonomous => write!(f, "Autonomous"),
            Mode::Remote(dir) => write!(f, "Remote({:?})", dir),
            Mode::Stop => write!(f, "Stop"),
        }
    }
}
