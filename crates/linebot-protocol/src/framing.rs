//! 分帧
//!
//! - 客户端 -> 小车：每条命令消息以 `\n` 结尾（兼容 `\r\n`）
//! - 小车 -> 客户端：图像帧 = 4 字节大端长度 + 图像字节

use crate::ProtocolError;
use crate::message::CommandMessage;
use bytes::{Bytes, BytesMut};

/// 图像帧头长度（u32 大端长度前缀）
pub const IMAGE_HEADER_LEN: usize = 4;

/// 编码图像帧
pub fn encode_image_frame(image: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u32::try_from(image.len()).map_err(|_| ProtocolError::FrameTooLarge(image.len()))?;
    let mut frame = Vec::with_capacity(IMAGE_HEADER_LEN + image.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(image);
    Ok(frame)
}

/// 解析图像帧头，返回图像字节数
pub fn decode_image_header(header: [u8; IMAGE_HEADER_LEN]) -> usize {
    u32::from_be_bytes(header) as usize
}

/// 编码一条命令消息（带结尾换行）
pub fn encode_message_line(message: &CommandMessage) -> Vec<u8> {
    let mut line = message.to_json().into_bytes();
    line.push(b'\n');
    line
}

/// 换行分帧解码器
///
/// 从字节流中切出完整的一行。超过 `max_len` 的行会被整行丢弃，并在遇到
/// 下一个换行符时报告一次 `MessageTooLong`，之后恢复正常解析。空行被忽略。
///
/// # 示例
///
/// ```rust
/// use linebot_protocol::LineDecoder;
///
/// let mut decoder = LineDecoder::new(1024);
/// decoder.extend(b"{\"Mode\":\"Stop\"}\n{\"Mo");
/// assert_eq!(&decoder.next_line().unwrap().unwrap()[..], b"{\"Mode\":\"Stop\"}");
/// assert!(decoder.next_line().is_none()); // 第二条尚不完整
/// ```
#[derive(Debug)]
pub struct LineDecoder {
    buf: BytesMut,
    max_len: usize,
    /// 正在丢弃的超长行已丢弃的字节数
    discarded: Option<usize>,
}

impl LineDecoder {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_len.min(4096)),
            max_len,
            discarded: None,
        }
    }

    /// 追加收到的字节
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// 取出下一行（不含换行符）
    ///
    /// 返回 `None` 表示缓冲区中没有完整的行。
    pub fn next_line(&mut self) -> Option<Result<Bytes, ProtocolError>> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                // 结尾的 `\r` 可能属于尚未到达的 `\r\n`，不计入长度
                let pending = match self.buf.last() {
                    Some(b'\r') => self.buf.len() - 1,
                    _ => self.buf.len(),
                };
                if pending > self.max_len {
                    // 保留结尾的 `\r`，与后续 `\n` 一起结束被丢弃的行
                    drop(self.buf.split_to(pending));
                    *self.discarded.get_or_insert(0) += pending;
                }
                return None;
            };

            let mut line = self.buf.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            if let Some(dropped) = self.discarded.take() {
                return Some(Err(ProtocolError::MessageTooLong {
                    len: dropped + line.len(),
                    max: self.max_len,
                }));
            }

            if line.len() > self.max_len {
                return Some(Err(ProtocolError::MessageTooLong {
                    len: line.len(),
                    max: self.max_len,
                }));
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return Some(Ok(line.freeze()));
        }
    }

    /// 缓冲区中尚未成行的字节数
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// 清空缓冲区（连接断开时调用）
    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarded = None;
    }
}
