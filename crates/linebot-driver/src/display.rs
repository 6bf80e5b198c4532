//! 状态显示线程
//!
//! 显示屏刷新（SPI 传输、图片缩放）可能耗时几十毫秒，不能放在控制周期里。
//! 控制线程通过 `StatusNotifier::notify()` 做非阻塞 `try_send`，队列满时丢弃。

use crate::error::DriverError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use linebot_hal::Display;
use serde::{Deserialize, Serialize};
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 状态图片
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusImage {
    /// 进入自动巡线
    FirstGear,
    /// 丢线停车
    StopGear,
}

/// 状态图片文件名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayImages {
    pub first_gear: String,
    pub stop_gear: String,
}

impl DisplayImages {
    pub fn name(&self, image: StatusImage) -> &str {
        match image {
            StatusImage::FirstGear => &self.first_gear,
            StatusImage::StopGear => &self.stop_gear,
        }
    }
}

impl Default for DisplayImages {
    fn default() -> Self {
        Self {
            first_gear: "firstGear.jpg".to_string(),
            stop_gear: "stopGear.jpg".to_string(),
        }
    }
}

/// 状态通知端（可克隆）
#[derive(Debug, Clone)]
pub struct StatusNotifier {
    tx: Sender<StatusImage>,
}

impl StatusNotifier {
    /// 从任意发送端构造（测试中可直接接一个 channel 观察事件）
    pub fn from_sender(tx: Sender<StatusImage>) -> Self {
        Self { tx }
    }

    /// 非阻塞发送，返回是否已入队
    pub fn notify(&self, image: StatusImage) -> bool {
        match self.tx.try_send(image) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Display queue full, dropping {:?}", image);
                false
            },
            Err(TrySendError::Disconnected(_)) => {
                debug!("Display worker gone, dropping {:?}", image);
                false
            },
        }
    }
}

/// 显示工作线程
///
/// Drop 时停止线程并 join。
pub struct DisplayWorker {
    /// 需要在 join 之前关闭
    tx: ManuallyDrop<Sender<StatusImage>>,
    is_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DisplayWorker {
    /// 队列容量
    pub const QUEUE_CAPACITY: usize = 4;

    /// 启动显示线程
    pub fn spawn<D>(display: D, images: DisplayImages) -> Result<Self, DriverError>
    where
        D: Display + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(Self::QUEUE_CAPACITY);
        let is_running = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&is_running);

        let thread = thread::Builder::new()
            .name("display_worker".into())
            .spawn(move || display_loop(display, images, rx, running))
            .map_err(|e| DriverError::ThreadSpawn(format!("display worker: {}", e)))?;

        Ok(Self {
            tx: ManuallyDrop::new(tx),
            is_running,
            thread: Some(thread),
        })
    }

    /// 获取通知端
    pub fn notifier(&self) -> StatusNotifier {
        StatusNotifier::from_sender((*self.tx).clone())
    }
}

impl Drop for DisplayWorker {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        // SAFETY: tx 只在这里被 drop 一次，之后不再使用
        unsafe { ManuallyDrop::drop(&mut self.tx) };
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Display worker panicked");
        }
    }
}

fn display_loop<D: Display>(
    mut display: D,
    images: DisplayImages,
    rx: Receiver<StatusImage>,
    is_running: Arc<AtomicBool>,
) {
    info!("Display worker started");
    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(image) => {
                let name = images.name(image);
                if let Err(e) = display.show_image(name) {
                    warn!("Failed to show {}: {}", name, e);
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                if !is_running.load(Ordering::Acquire) {
                    break;
                }
            },
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("Display worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use linebot_hal::mock::MockDisplay;
    use std::time::Instant;

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_worker_shows_images_in_order() {
        let display = MockDisplay::new();
        let worker = DisplayWorker::spawn(display.clone(), DisplayImages::default()).unwrap();
        let notifier = worker.notifier();

        assert!(notifier.notify(StatusImage::FirstGear));
        assert!(notifier.notify(StatusImage::StopGear));

        assert!(wait_for(|| display.shown().len() == 2));
        assert_eq!(display.shown(), vec!["firstGear.jpg", "stopGear.jpg"]);
        drop(worker);
    }

    #[test]
    fn test_drop_joins_even_with_live_notifier() {
        let worker = DisplayWorker::spawn(MockDisplay::new(), DisplayImages::default()).unwrap();
        let notifier = worker.notifier();
        drop(worker);
        // 线程已退出，发送被丢弃而不是阻塞
        assert!(!notifier.notify(StatusImage::FirstGear));
    }

    #[test]
    fn test_notifier_full_queue_drops() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let notifier = StatusNotifier::from_sender(tx);
        assert!(notifier.notify(StatusImage::FirstGear));
        assert!(!notifier.notify(StatusImage::StopGear));
        assert_eq!(rx.try_recv().unwrap(), StatusImage::FirstGear);
    }

    #[test]
    fn test_custom_image_names() {
        let images = DisplayImages {
            first_gear: "go.png".into(),
            stop_gear: "halt.png".into(),
        };
        assert_eq!(images.name(StatusImage::FirstGear), "go.png");
        assert_eq!(images.name(StatusImage::StopGear), "halt.png");
    }
}
