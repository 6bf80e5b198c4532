//! 驱动层模块
//!
//! 本模块把硬件 trait 包装成控制循环可以安全使用的运行时组件：
//! - 模式槽位（`ModeSlot`）：命令监听线程写、控制线程读的单字节原子交接
//! - 电机句柄（`DriveHandle`）：油门钳位、故障日志、Drop 时强制停车
//! - 显示线程（`DisplayWorker`）：状态图片异步显示，控制线程只做 `try_send`
//! - 命令监听（`CommandListener`）：TCP 单客户端会话，发送快照并解析模式消息
//!
//! # 线程模型
//!
//! ```text
//! command_listener ──(ModeSlot)──> control tick ──(bounded channel)──> display_worker
//!        │                               │
//!     Camera                        DriveHandle
//! ```

pub mod display;
pub mod drive;
mod error;
pub mod listener;
pub mod mode;

pub use display::{DisplayImages, DisplayWorker, StatusImage, StatusNotifier};
pub use drive::{DriveHandle, ThrottleLimits};
pub use error::DriverError;
pub use listener::{CommandListener, DisconnectPolicy, ListenerConfig, ListenerStats};
pub use mode::ModeSlot;
