//! 命令监听线程
//!
//! 单客户端 TCP 会话：
//! 1. 接受连接后立即发送一帧摄像头快照（u32 大端长度 + BMP）
//! 2. 之后按行读取命令消息，合法消息写入 `ModeSlot`
//! 3. 客户端断开后模式回到 `Stop`，再按 `DisconnectPolicy` 继续监听或请求退出
//!
//! 监听线程是唯一会因网络 IO 阻塞的线程；accept 用非阻塞轮询、读取带超时，
//! 以便及时响应退出标志。

use crate::error::DriverError;
use crate::mode::ModeSlot;
use linebot_hal::Camera;
use linebot_protocol::{CommandMessage, LineDecoder, Mode, encode_image_frame};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 客户端断开后的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// 回到 Stop 并继续等待新连接（默认）
    #[default]
    Listen,
    /// 回到 Stop 并请求整个进程退出
    Shutdown,
}

/// 监听配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// 监听地址
    pub bind_addr: String,

    /// 是否接受单引号 JSON（旧版手机端）
    pub accept_single_quotes: bool,

    /// 单条消息最大字节数
    pub max_message_len: usize,

    /// 读取超时（毫秒），决定退出标志的响应速度
    pub read_timeout_ms: u64,

    /// accept 轮询间隔（毫秒）
    pub accept_poll_ms: u64,

    /// 摄像头预热时间（毫秒）
    pub camera_warmup_ms: u64,

    /// 断开策略
    pub on_disconnect: DisconnectPolicy,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5042".to_string(),
            accept_single_quotes: true,
            max_message_len: 1024,
            read_timeout_ms: 100,
            accept_poll_ms: 50,
            camera_warmup_ms: 2000,
            on_disconnect: DisconnectPolicy::Listen,
        }
    }
}

/// 监听统计（无锁计数器）
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// 累计连接数
    pub connections: AtomicU64,
    /// 已应用的合法消息数
    pub messages_accepted: AtomicU64,
    /// 被丢弃的非法消息数
    pub messages_rejected: AtomicU64,
    /// 已发送的快照数
    pub snapshots_sent: AtomicU64,
    /// 当前是否有客户端
    pub client_connected: AtomicBool,
}

/// 会话结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// 对端关闭连接
    PeerClosed,
    /// 本地退出标志
    Shutdown,
}

/// 命令监听器
pub struct CommandListener {
    local_addr: SocketAddr,
    stats: Arc<ListenerStats>,
    thread: Option<JoinHandle<Result<(), DriverError>>>,
}

impl CommandListener {
    /// 绑定端口并启动监听线程
    ///
    /// 绑定失败是启动期致命错误，直接返回。
    ///
    /// # 参数
    ///
    /// - `config`: 监听配置
    /// - `camera`: 摄像头（移动到监听线程）
    /// - `mode`: 模式槽位（监听线程是唯一写者）
    /// - `running`: 全局运行标志；`Shutdown` 策略下由本线程清除
    pub fn spawn<C>(
        config: ListenerConfig,
        camera: C,
        mode: Arc<ModeSlot>,
        running: Arc<AtomicBool>,
    ) -> Result<Self, DriverError>
    where
        C: Camera + Send + 'static,
    {
        let listener = TcpListener::bind(&config.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!("Command channel listening on {}", local_addr);

        let stats = Arc::new(ListenerStats::default());
        let stats_clone = Arc::clone(&stats);

        let thread = thread::Builder::new()
            .name("command_listener".into())
            .spawn(move || listen_loop(listener, camera, config, mode, running, stats_clone))
            .map_err(|e| DriverError::ThreadSpawn(format!("command listener: {}", e)))?;

        Ok(Self {
            local_addr,
            stats,
            thread: Some(thread),
        })
    }

    /// 实际监听地址（绑定端口 0 时用于获取分配的端口）
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// 等待监听线程退出（需先清除运行标志）
    pub fn join(mut self) -> Result<(), DriverError> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| DriverError::ThreadPanicked("command_listener".into()))?,
            None => Ok(()),
        }
    }
}

fn listen_loop<C: Camera>(
    listener: TcpListener,
    mut camera: C,
    config: ListenerConfig,
    mode: Arc<ModeSlot>,
    running: Arc<AtomicBool>,
    stats: Arc<ListenerStats>,
) -> Result<(), DriverError> {
    if let Err(e) = camera.warm_up() {
        warn!("Camera warm-up failed: {}", e);
    }
    sleep_while_running(Duration::from_millis(config.camera_warmup_ms), &running);

    let accept_poll = Duration::from_millis(config.accept_poll_ms.max(1));

    while running.load(Ordering::Acquire) {
        let (stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(accept_poll);
                continue;
            },
            Err(e) => {
                warn!("Accept failed: {}", e);
                thread::sleep(accept_poll);
                continue;
            },
        };

        info!("Client connected: {}", peer);
        stats.connections.fetch_add(1, Ordering::Relaxed);
        stats.client_connected.store(true, Ordering::Relaxed);

        let result = serve_client(stream, &mut camera, &config, &mode, &running, &stats);

        stats.client_connected.store(false, Ordering::Relaxed);
        let previous = mode.swap(Mode::Stop);
        if previous != Mode::Stop {
            info!("Mode changed: {} -> {} (client gone)", previous, Mode::Stop);
        }

        match result {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::PeerClosed) => info!("Client {} disconnected", peer),
            Err(e) => warn!("Client {} session ended: {}", peer, e),
        }

        if config.on_disconnect == DisconnectPolicy::Shutdown {
            info!("Disconnect policy is 'shutdown', requesting exit");
            running.store(false, Ordering::Release);
            break;
        }
    }

    info!("Command listener stopped");
    Ok(())
}

fn serve_client<C: Camera>(
    mut stream: TcpStream,
    camera: &mut C,
    config: &ListenerConfig,
    mode: &ModeSlot,
    running: &AtomicBool,
    stats: &ListenerStats,
) -> Result<SessionEnd, DriverError> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms.max(1))))?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed: {}", e);
    }

    send_snapshot(&mut stream, camera, stats)?;

    let mut decoder = LineDecoder::new(config.max_message_len);
    let mut buf = [0u8; 1024];

    while running.load(Ordering::Acquire) {
        let n = match stream.read(&mut buf) {
            Ok(0) => return Ok(SessionEnd::PeerClosed),
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                continue;
            },
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                return Err(DriverError::ChannelDisconnected);
            },
            Err(e) => return Err(e.into()),
        };

        decoder.extend(&buf[..n]);
        while let Some(line) = decoder.next_line() {
            let decoded = line.and_then(|bytes| {
                CommandMessage::decode(&bytes, config.accept_single_quotes)
            });
            match decoded {
                Ok(message) => {
                    stats.messages_accepted.fetch_add(1, Ordering::Relaxed);
                    let new_mode = message.to_mode();
                    let previous = mode.swap(new_mode);
                    if previous != new_mode {
                        info!("Mode changed: {} -> {}", previous, new_mode);
                    } else {
                        debug!("Mode unchanged: {}", new_mode);
                    }
                },
                Err(e) => {
                    stats.messages_rejected.fetch_add(1, Ordering::Relaxed);
                    warn!("Ignoring malformed message: {}", e);
                },
            }
        }
    }

    Ok(SessionEnd::Shutdown)
}

fn send_snapshot<C: Camera>(
    stream: &mut TcpStream,
    camera: &mut C,
    stats: &ListenerStats,
) -> Result<(), DriverError> {
    let started = Instant::now();
    let image = camera.capture().unwrap_or_else(|e| {
        error!("Camera capture failed, sending empty snapshot: {}", e);
        Vec::new()
    });
    let frame = encode_image_frame(&image)?;
    stream.write_all(&frame)?;
    stream.flush()?;
    stats.snapshots_sent.fetch_add(1, Ordering::Relaxed);
    info!(
        "Sent {} byte snapshot in {:?}",
        image.len(),
        started.elapsed()
    );
    Ok(())
}

fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_config_default() {
        let config = ListenerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:5042");
        assert!(config.accept_single_quotes);
        assert_eq!(config.max_message_len, 1024);
        assert_eq!(config.camera_warmup_ms, 2000);
        assert_eq!(config.on_disconnect, DisconnectPolicy::Listen);
    }

    #[test]
    fn test_sleep_while_running_returns_early() {
        let running = AtomicBool::new(false);
        let started = Instant::now();
        sleep_while_running(Duration::from_secs(5), &running);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
