//! 模式槽位
//!
//! 命令监听线程是唯一的写者，控制线程是唯一的读者。槽位中永远只保存最新
//! 的模式，控制线程每个周期做一次原子读取，不会因网络而阻塞。

use linebot_protocol::Mode;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// 运行模式（原子版本，用于线程间共享）
///
/// # 示例
///
/// ```rust
/// use linebot_driver::ModeSlot;
/// use linebot_protocol::{Mode, RemoteDirection};
///
/// let slot = ModeSlot::default();
/// assert_eq!(slot.get(), Mode::Stop);
///
/// slot.set(Mode::Remote(RemoteDirection::Left));
/// assert_eq!(slot.get(), Mode::Remote(RemoteDirection::Left));
/// ```
#[derive(Debug)]
pub struct ModeSlot {
    inner: AtomicU8,
    /// 写入次数（用于状态监控）
    updates: AtomicU64,
}

impl ModeSlot {
    pub fn new(mode: Mode) -> Self {
        Self {
            inner: AtomicU8::new(mode.as_u8()),
            updates: AtomicU64::new(0),
        }
    }

    /// 获取当前模式
    #[inline]
    pub fn get(&self) -> Mode {
        Mode::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// 设置模式
    pub fn set(&self, mode: Mode) {
        self.inner.store(mode.as_u8(), Ordering::Release);
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// 设置模式并返回旧值
    pub fn swap(&self, mode: Mode) -> Mode {
        self.updates.fetch_add(1, Ordering::Relaxed);
        Mode::from_u8(self.inner.swap(mode.as_u8(), Ordering::AcqRel))
    }

    /// 累计写入次数
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl Default for ModeSlot {
    fn default() -> Self {
        Self::new(Mode::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linebot_protocol::RemoteDirection;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_mode_slot_set_get() {
        let slot = ModeSlot::default();
        assert_eq!(slot.get(), Mode::Stop);
        assert_eq!(slot.updates(), 0);

        slot.set(Mode::Autonomous);
        assert_eq!(slot.get(), Mode::Autonomous);

        let old = slot.swap(Mode::Remote(RemoteDirection::Right));
        assert_eq!(old, Mode::Autonomous);
        assert_eq!(slot.get(), Mode::Remote(RemoteDirection::Right));
        assert_eq!(slot.updates(), 2);
    }

    #[test]
    fn test_mode_slot_latest_wins_across_threads() {
        let slot = Arc::new(ModeSlot::default());
        let writer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for _ in 0..1000 {
                    slot.set(Mode::Remote(RemoteDirection::Forward));
                    slot.set(Mode::Autonomous);
                }
            })
        };

        // 读者只会看到合法模式
        for _ in 0..1000 {
            let mode = slot.get();
            assert!(matches!(
                mode,
                Mode::Stop | Mode::Autonomous | Mode::Remote(RemoteDirection::Forward)
            ));
        }

        writer.join().unwrap();
        assert_eq!(slot.get(), Mode::Autonomous);
        assert_eq!(slot.updates(), 2000);
    }
}
