//! # Linebot HAL
//!
//! 硬件抽象层：三路光电传感器、双电机驱动、状态显示屏、摄像头。
//!
//! 控制核心只依赖这里的 trait，具体硬件（GPIO、电机扩展板、SPI 屏幕、
//! 摄像头）由外部实现。`mock` feature 提供无硬件的脚本化实现。

use std::fmt;
use thiserror::Error;

#[cfg(feature = "mock")]
pub mod mock;

/// 一次传感器采样
///
/// 三个独立的二值读数，下标 0 = 左，1 = 中，2 = 右（俯视）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SensorReading {
    pub left: bool,
    pub middle: bool,
    pub right: bool,
}

impl SensorReading {
    pub const fn new(left: bool, middle: bool, right: bool) -> Self {
        Self {
            left,
            middle,
            right,
        }
    }

    /// 从 `[左, 中, 右]` 的 0/1 值构造（非零视为触发）
    pub const fn from_bits(bits: [u8; 3]) -> Self {
        Self::new(bits[0] != 0, bits[1] != 0, bits[2] != 0)
    }

    /// 转换为 `[左, 中, 右]` 的 0/1 值
    pub const fn bits(self) -> [u8; 3] {
        [self.left as u8, self.middle as u8, self.right as u8]
    }

    /// 是否没有任何传感器触发
    pub const fn is_blank(self) -> bool {
        !self.left && !self.middle && !self.right
    }

    /// 全部 8 种组合，按 LMR 二进制顺序
    pub fn all() -> impl Iterator<Item = SensorReading> {
        (0u8..8).map(|n| Self::new(n & 0b100 != 0, n & 0b010 != 0, n & 0b001 != 0))
    }
}

impl fmt::Display for SensorReading {
    /// 格式化为 `LMR` 三位，例如 `010`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [l, m, r] = self.bits();
        write!(f, "{}{}{}", l, m, r)
    }
}

/// 硬件错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalErrorKind {
    /// 传感器读取失败
    SensorRead,
    /// 电机指令下发失败
    Actuator,
    /// 显示屏失败
    Display,
    /// 摄像头失败
    Camera,
    /// 硬件初始化失败（启动时致命）
    Init,
    /// 其他 IO 错误
    Io,
}

/// 结构化硬件错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct HalError {
    pub kind: HalErrorKind,
    pub message: String,
}

impl HalError {
    pub fn new(kind: HalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 是否为致命错误（只有初始化失败是致命的）
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, HalErrorKind::Init)
    }
}

impl From<std::io::Error> for HalError {
    fn from(e: std::io::Error) -> Self {
        Self::new(HalErrorKind::Io, e.to_string())
    }
}

/// 光电传感器
///
/// 非阻塞，返回瞬时数字状态。
pub trait SensorReader {
    fn read(&mut self) -> Result<SensorReading, HalError>;
}

/// 双电机驱动
///
/// 油门范围 `[-1.0, 1.0]`，调用方负责钳位。
pub trait DriveActuator {
    fn set_throttle(&mut self, left: f64, right: f64) -> Result<(), HalError>;
}

/// 状态显示屏
pub trait Display {
    /// 显示指定名称的静态图片
    fn show_image(&mut self, name: &str) -> Result<(), HalError>;
}

/// 摄像头
pub trait Camera {
    /// 拍摄一帧，返回 BMP 字节
    fn capture(&mut self) -> Result<Vec<u8>, HalError>;

    /// 预热（默认无操作）
    fn warm_up(&mut self) -> Result<(), HalError> {
        Ok(())
    }
}

impl<T: SensorReader + ?Sized> SensorReader for Box<T> {
    fn read(&mut self) -> Result<SensorReading, HalError> {
        (**self).read()
    }
}

impl<T: DriveActuator + ?Sized> DriveActuator for Box<T> {
    fn set_throttle(&mut self, left: f64, right: f64) -> Result<(), HalError> {
        (**self).set_throttle(left, right)
    }
}

impl<T: Display + ?Sized> Display for Box<T> {
    fn show_image(&mut self, name: &str) -> Result<(), HalError> {
        (**self).show_image(name)
    }
}

impl<T: Camera + ?Sized> Camera for Box<T> {
    fn capture(&mut self) -> Result<Vec<u8>, HalError> {
        (**self).capture()
    }

    fn warm_up(&mut self) -> Result<(), HalError> {
        (**self).warm_up()
    }
}
