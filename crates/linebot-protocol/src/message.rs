//! 命令消息解析
//!
//! 手机端发送的消息形如 `{"Mode":"Remote","Type":"Left"}`。旧版客户端使用
//! Python 风格的单引号（`{'Mode': 'Autonomous'}`），开启 `lenient` 时会先按
//! 标准 JSON 解析，失败后再把单引号替换成双引号重试。

use crate::ProtocolError;
use crate::mode::Mode;
use serde::{Deserialize, Serialize};

/// 命令消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// 模式字符串：`Autonomous` / `Remote` / `Stop` ...
    #[serde(rename = "Mode", default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// 遥控方向：`Forward` / `Left` / `Right` / 其他（视为停车）
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl CommandMessage {
    /// 构造消息（主要用于测试和客户端）
    pub fn new(mode: impl Into<String>, kind: Option<&str>) -> Self {
        Self {
            mode: Some(mode.into()),
            kind: kind.map(str::to_owned),
        }
    }

    /// 解析一条消息（不含换行符）
    ///
    /// # 错误
    ///
    /// - `InvalidUtf8`: 非 UTF-8 字节
    /// - `MalformedMessage`: 无法解析为 JSON 对象
    /// - `MissingField("Mode")`: 缺少 `Mode` 字段
    pub fn decode(bytes: &[u8], lenient: bool) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
        let text = text.trim();

        let message = match serde_json::from_str::<CommandMessage>(text) {
            Ok(msg) => msg,
            Err(e) if lenient && text.contains('\'') => {
                serde_json::from_str::<CommandMessage>(&text.replace('\'', "\""))
                    .map_err(|_| ProtocolError::MalformedMessage(e.to_string()))?
            },
            Err(e) => return Err(ProtocolError::MalformedMessage(e.to_string())),
        };

        if message.mode.is_none() {
            return Err(ProtocolError::MissingField("Mode"));
        }

        Ok(message)
    }

    /// 转换为运行模式
    pub fn to_mode(&self) -> Mode {
        match self.mode.as_deref() {
            Some(mode) => Mode::from_fields(mode, self.kind.as_deref()),
            None => Mode::Stop,
        }
    }

    /// 编码为紧凑 JSON（不含换行）
    pub fn to_json(&self) -> String {
        // 两个字段都是字符串，序列化不会失败
        serde_json::to_string(self).unwrap_or_default()
    }
}
