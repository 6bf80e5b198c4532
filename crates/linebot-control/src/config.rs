//! # 机器人配置
//!
//! TOML 配置文件，所有字段都有默认值，缺失的节或字段使用默认值：
//!
//! ```toml
//! [pid]
//! kp = 0.08
//! kd = 0.13
//! ki = 0.0
//!
//! [classifier]
//! gap_policy = "hold_last"
//! lost_line_threshold = 25
//!
//! [loop]
//! frequency_hz = 50.0
//!
//! [channel]
//! bind_addr = "0.0.0.0:5042"
//! on_disconnect = "listen"
//! ```

use crate::classifier::ClassifierConfig;
use crate::error::ControlError;
use crate::loop_runner::LoopConfig;
use crate::pid::{PidController, PidGains};
use crate::session::{SessionController, ThrottleConfig};
use linebot_driver::{DisplayImages, ListenerConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// PID 配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    #[serde(flatten)]
    pub gains: PidGains,

    /// 积分项限制（不设置表示不限制）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integral_limit: Option<f64>,
}

impl PidConfig {
    pub fn controller(&self) -> PidController {
        let pid = PidController::new(self.gains);
        match self.integral_limit {
            Some(limit) => pid.with_integral_limit(limit),
            None => pid,
        }
    }
}

/// 摄像头配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// 无硬件时发送的占位图片路径（BMP）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder_image: Option<String>,
}

/// 完整配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub pid: PidConfig,
    pub classifier: ClassifierConfig,
    pub throttle: ThrottleConfig,
    #[serde(rename = "loop")]
    pub control_loop: LoopConfig,
    pub channel: ListenerConfig,
    pub display: DisplayImages,
    pub camera: CameraConfig,
}

impl RobotConfig {
    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ControlError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: RobotConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ControlError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, ControlError> {
        toml::to_string_pretty(self)
            .map_err(|e| ControlError::Config(format!("failed to serialize config: {}", e)))
    }

    /// 检查配置
    pub fn validate(&self) -> Result<(), ControlError> {
        let gains = &self.pid.gains;
        if ![gains.kp, gains.kd, gains.ki].iter().all(|g| g.is_finite()) {
            return Err(ControlError::Config("PID gains must be finite".into()));
        }
        if let Some(limit) = self.pid.integral_limit
            && (!limit.is_finite() || limit <= 0.0)
        {
            return Err(ControlError::Config(format!(
                "pid.integral_limit must be > 0, got {}",
                limit
            )));
        }

        let classifier = &self.classifier;
        if !classifier.inner_error.is_finite() || !classifier.outer_error.is_finite() {
            return Err(ControlError::Config(
                "classifier error magnitudes must be finite".into(),
            ));
        }
        if classifier.lost_line_threshold == 0 {
            return Err(ControlError::Config(
                "classifier.lost_line_threshold must be >= 1".into(),
            ));
        }

        self.throttle.validate().map_err(ControlError::Config)?;
        self.control_loop.validate()?;

        if self.channel.max_message_len == 0 {
            return Err(ControlError::Config(
                "channel.max_message_len must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// 按配置构造会话控制器
    pub fn session(&self) -> SessionController {
        SessionController::new(
            self.pid.controller(),
            self.classifier.clone(),
            self.throttle.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::GapPolicy;
    use linebot_driver::DisconnectPolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = RobotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pid.gains.kp, 0.08);
        assert_eq!(config.classifier.lost_line_threshold, 25);
        assert_eq!(config.control_loop.frequency_hz, 50.0);
        assert_eq!(config.channel.bind_addr, "0.0.0.0:5042");
        assert_eq!(config.display.first_gear, "firstGear.jpg");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[pid]
kd = 0.2

[classifier]
gap_policy = "straight"

[loop]
frequency_hz = 100.0

[channel]
on_disconnect = "shutdown"
"#
        )
        .unwrap();

        let config = RobotConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.pid.gains.kp, 0.08);
        assert_eq!(config.pid.gains.kd, 0.2);
        assert_eq!(config.classifier.gap_policy, GapPolicy::Straight);
        assert_eq!(config.control_loop.frequency_hz, 100.0);
        assert_eq!(config.channel.on_disconnect, DisconnectPolicy::Shutdown);
        assert_eq!(config.throttle, ThrottleConfig::default());
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let config = RobotConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config, RobotConfig::default());
    }

    #[test]
    fn test_round_trip_through_file() {
        let mut config = RobotConfig::default();
        config.pid.integral_limit = Some(10.0);
        config.control_loop.max_iterations = Some(500);

        let file = NamedTempFile::new().unwrap();
        config.save_to_file(file.path()).unwrap();
        let loaded = RobotConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = RobotConfig::default();
        config.control_loop.frequency_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = RobotConfig::default();
        config.classifier.lost_line_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = RobotConfig::default();
        config.throttle.max = 2.0;
        assert!(config.validate().is_err());

        let mut config = RobotConfig::default();
        config.pid.integral_limit = Some(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = RobotConfig::load_from_file("/nonexistent/linebot.toml");
        assert!(matches!(result, Err(ControlError::Io(_))));
    }

    #[test]
    fn test_malformed_file_is_toml_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[pid\nkp = ").unwrap();
        let result = RobotConfig::load_from_file(file.path());
        assert!(matches!(result, Err(ControlError::Toml(_))));
    }

    #[test]
    fn test_session_from_config() {
        let mut config = RobotConfig::default();
        config.classifier.lost_line_threshold = 3;
        config.pid.integral_limit = Some(4.0);

        let session = config.session();
        assert_eq!(session.lost_line_threshold(), 3);
        assert_eq!(session.pid().integral_limit(), Some(4.0));
    }
}
