//! Mock 硬件实现
//!
//! 所有 mock 类型内部使用 `Arc<Mutex<..>>` 共享状态，`clone()` 得到的副本
//! 就是观察/注入句柄：一份交给控制循环，一份留在测试或主线程中检查。

use crate::{Camera, Display, DriveActuator, HalError, HalErrorKind, SensorReader, SensorReading};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

/// 解析传感器脚本
///
/// 格式：逗号或空白分隔的 `LMR` 三位 0/1，例如 `"010,011 001"`。
pub fn parse_sensor_script(script: &str) -> Result<Vec<SensorReading>, HalError> {
    script
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|token| {
            let bytes = token.as_bytes();
            if bytes.len() != 3 || !bytes.iter().all(|b| *b == b'0' || *b == b'1') {
                return Err(HalError::new(
                    HalErrorKind::Init,
                    format!("invalid sensor pattern '{}', expected three 0/1 digits", token),
                ));
            }
            Ok(SensorReading::from_bits([
                bytes[0] - b'0',
                bytes[1] - b'0',
                bytes[2] - b'0',
            ]))
        })
        .collect()
}

#[derive(Debug, Default)]
struct SensorState {
    current: SensorReading,
    script: VecDeque<SensorReading>,
    looped: Option<Vec<SensorReading>>,
    fail_next: usize,
    reads: u64,
}

/// 脚本化传感器
///
/// 依次返回脚本中的读数；脚本耗尽后保持最后一个读数（或循环播放）。
#[derive(Debug, Clone, Default)]
pub struct MockSensors {
    state: Arc<Mutex<SensorState>>,
}

impl MockSensors {
    /// 固定读数
    pub fn constant(reading: SensorReading) -> Self {
        let sensors = Self::default();
        sensors.set(reading);
        sensors
    }

    /// 按顺序播放一次，之后保持最后一个读数
    pub fn scripted(readings: impl IntoIterator<Item = SensorReading>) -> Self {
        let sensors = Self::default();
        sensors.state.lock().script.extend(readings);
        sensors
    }

    /// 循环播放
    pub fn looping(readings: Vec<SensorReading>) -> Self {
        let sensors = Self::default();
        {
            let mut state = sensors.state.lock();
            state.script.extend(readings.iter().copied());
            if !readings.is_empty() {
                state.looped = Some(readings);
            }
        }
        sensors
    }

    /// 立即设置当前读数（清空剩余脚本）
    pub fn set(&self, reading: SensorReading) {
        let mut state = self.state.lock();
        state.script.clear();
        state.looped = None;
        state.current = reading;
    }

    /// 追加脚本读数
    pub fn push(&self, reading: SensorReading) {
        self.state.lock().script.push_back(reading);
    }

    /// 让接下来 `n` 次读取失败
    pub fn fail_next(&self, n: usize) {
        self.state.lock().fail_next = n;
    }

    /// 累计读取次数（含失败）
    pub fn reads(&self) -> u64 {
        self.state.lock().reads
    }
}

impl SensorReader for MockSensors {
    fn read(&mut self) -> Result<SensorReading, HalError> {
        let mut state = self.state.lock();
        state.reads += 1;

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(HalError::new(HalErrorKind::SensorRead, "mock sensor failure"));
        }

        if state.script.is_empty()
            && let Some(looped) = state.looped.clone()
        {
            state.script.extend(looped);
        }
        if let Some(next) = state.script.pop_front() {
            state.current = next;
        }

        trace!("mock sensors -> {}", state.current);
        Ok(state.current)
    }
}

#[derive(Debug, Default)]
struct DriveState {
    commands: VecDeque<(f64, f64)>,
    /// 最多保留的指令条数（None 表示不限）
    history: Option<usize>,
    total: u64,
    fail: bool,
}

/// 记录型电机驱动
///
/// `new()` 记录全部指令，适合测试；长时间运行时用 `with_history` 只保留最近的指令。
#[derive(Debug, Clone, Default)]
pub struct MockDrive {
    state: Arc<Mutex<DriveState>>,
}

impl MockDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只保留最近 `cap` 条指令（至少 1 条）
    pub fn with_history(cap: usize) -> Self {
        let drive = Self::default();
        drive.state.lock().history = Some(cap.max(1));
        drive
    }

    /// 保留的成功下发的 (左, 右) 油门（按时间顺序）
    pub fn commands(&self) -> Vec<(f64, f64)> {
        self.state.lock().commands.iter().copied().collect()
    }

    /// 最后一次成功下发的油门
    pub fn last(&self) -> Option<(f64, f64)> {
        self.state.lock().commands.back().copied()
    }

    /// 累计成功下发的指令数（包括已被丢弃的历史）
    pub fn total(&self) -> u64 {
        self.state.lock().total
    }

    pub fn set_fail(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    pub fn clear(&self) {
        self.state.lock().commands.clear();
    }
}

impl DriveActuator for MockDrive {
    fn set_throttle(&mut self, left: f64, right: f64) -> Result<(), HalError> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(HalError::new(HalErrorKind::Actuator, "mock motor failure"));
        }
        trace!("mock drive <- left={:.3} right={:.3}", left, right);
        if let Some(cap) = state.history
            && state.commands.len() >= cap
        {
            state.commands.pop_front();
        }
        state.commands.push_back((left, right));
        state.total += 1;
        Ok(())
    }
}

/// 记录型显示屏
#[derive(Debug, Clone, Default)]
pub struct MockDisplay {
    shown: Arc<Mutex<Vec<String>>>,
}

impl MockDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已显示过的图片名（按顺序）
    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().clone()
    }
}

impl Display for MockDisplay {
    fn show_image(&mut self, name: &str) -> Result<(), HalError> {
        debug!("mock display <- {}", name);
        self.shown.lock().push(name.to_owned());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CameraState {
    captures: u64,
    warmups: u64,
    fail: bool,
}

/// 返回固定图像的摄像头
#[derive(Debug, Clone)]
pub struct MockCamera {
    image: Arc<Vec<u8>>,
    state: Arc<Mutex<CameraState>>,
}

impl MockCamera {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image: Arc::new(image),
            state: Arc::new(Mutex::new(CameraState::default())),
        }
    }

    /// 使用纯色占位图
    pub fn placeholder() -> Self {
        Self::new(placeholder_bmp(32, 24))
    }

    pub fn set_fail(&self, fail: bool) {
        self.state.lock().fail = fail;
    }

    pub fn captures(&self) -> u64 {
        self.state.lock().captures
    }

    pub fn warmups(&self) -> u64 {
        self.state.lock().warmups
    }
}

impl Camera for MockCamera {
    fn capture(&mut self) -> Result<Vec<u8>, HalError> {
        let mut state = self.state.lock();
        if state.fail {
            return Err(HalError::new(HalErrorKind::Camera, "mock camera failure"));
        }
        state.captures += 1;
        Ok(self.image.as_ref().clone())
    }

    fn warm_up(&mut self) -> Result<(), HalError> {
        self.state.lock().warmups += 1;
        Ok(())
    }
}

/// 生成 24 位 BMP 占位图（灰色）
pub fn placeholder_bmp(width: u32, height: u32) -> Vec<u8> {
    const HEADER_LEN: u32 = 14 + 40;
    // 每行按 4 字节对齐
    let row_len = (width * 3).div_ceil(4) * 4;
    let pixel_len = row_len * height;
    let file_len = HEADER_LEN + pixel_len;

    let mut bmp = Vec::with_capacity(file_len as usize);
    // BITMAPFILEHEADER
    bmp.extend_from_slice(b"BM");
    bmp.extend_from_slice(&file_len.to_le_bytes());
    bmp.extend_from_slice(&[0u8; 4]);
    bmp.extend_from_slice(&HEADER_LEN.to_le_bytes());
    // BITMAPINFOHEADER
    bmp.extend_from_slice(&40u32.to_le_bytes());
    bmp.extend_from_slice(&(width as i32).to_le_bytes());
    bmp.extend_from_slice(&(height as i32).to_le_bytes());
    bmp.extend_from_slice(&1u16.to_le_bytes());
    bmp.extend_from_slice(&24u16.to_le_bytes());
    bmp.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
    bmp.extend_from_slice(&pixel_len.to_le_bytes());
    bmp.extend_from_slice(&2835i32.to_le_bytes()); // 72 DPI
    bmp.extend_from_slice(&2835i32.to_le_bytes());
    bmp.extend_from_slice(&0u32.to_le_bytes());
    bmp.extend_from_slice(&0u32.to_le_bytes());
    bmp.resize(file_len as usize, 0x80);
    bmp
}
