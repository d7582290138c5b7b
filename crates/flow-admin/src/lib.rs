//! # 患者流转管理模块
//!
//! 提供配置管理与队列运行指标监控等运维功能

pub mod config;
pub mod monitoring;

pub use config::{ConfigManager, FlowConfig, LoggingConfig, ServerConfig};
pub use monitoring::QueueMonitor;
