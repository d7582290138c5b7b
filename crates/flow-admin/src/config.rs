//! 配置管理
//!
//! 从配置文件与环境变量加载队列服务配置，支持验证、保存与重新加载

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use flow_core::FacilityState;
use flow_queue::{AdvisorConfig, EstimatorConfig, PageLimits, QueueSettings, SymptomPriorityTable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<FlowConfig>>,
    /// 配置文件路径
    config_path: String,
    /// 配置验证器
    validator: ConfigValidator,
}

/// 患者流转系统完整配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlowConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 等待估算配置
    pub estimator: EstimatorConfig,
    /// 症状优先级表
    pub classifier: SymptomPriorityTable,
    /// 资源建议配置
    pub advisor: AdvisorConfig,
    /// 队列分页配置
    pub worklist: PageLimits,
    /// 初始院区状态
    pub facility: FacilityState,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务器名称
    pub name: String,
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 请求超时时间（秒）
    pub request_timeout_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 日志格式: "text" 或 "json"
    pub format: String,
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl FlowConfig {
    /// 转换为队列服务参数
    pub fn to_queue_settings(&self) -> QueueSettings {
        QueueSettings {
            facility: self.facility.clone(),
            symptom_table: self.classifier.clone(),
            estimator: self.estimator.clone(),
            advisor: self.advisor.clone(),
            page_limits: self.worklist,
        }
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&FlowConfig) -> Result<()>,
    /// 错误消息
    error_message: &'static str,
}

impl ConfigManager {
    /// 创建新的配置管理器，加载后立即验证
    pub fn new(config_path: &str) -> Result<Self> {
        let config = Self::load_config(config_path)?;
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: config_path.to_string(),
            validator,
        })
    }

    /// 从文件加载配置，环境变量 `FLOW_<SECTION>__<KEY>` 覆盖文件中的值
    fn load_config(config_path: &str) -> Result<FlowConfig> {
        let settings = Config::builder()
            .add_source(File::with_name(config_path))
            .add_source(
                Environment::with_prefix("FLOW")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", config_path))?;

        let config: FlowConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        info!("Configuration loaded successfully from: {}", config_path);
        Ok(config)
    }

    /// 获取配置
    pub async fn get_config(&self) -> FlowConfig {
        let config = self.config.read().await;
        config.clone()
    }

    /// 配置文件路径
    pub fn config_path(&self) -> &str {
        &self.config_path
    }

    /// 更新配置
    pub async fn update_config(&self, new_config: FlowConfig) -> Result<()> {
        // 验证新配置
        self.validator.validate(&new_config)?;

        {
            let mut config = self.config.write().await;
            *config = new_config;
        }

        self.save_config().await?;

        info!("Configuration updated successfully");
        Ok(())
    }

    /// 保存配置到文件
    async fn save_config(&self) -> Result<()> {
        let config = self.config.read().await;
        let config_str =
            toml::to_string_pretty(&*config).context("Failed to serialize configuration")?;

        tokio::fs::write(&self.config_path, config_str)
            .await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {}", self.config_path);
        Ok(())
    }

    /// 重新加载配置
    pub async fn reload_config(&self) -> Result<()> {
        let new_config = Self::load_config(&self.config_path)?;
        self.validator.validate(&new_config)?;

        let mut config = self.config.write().await;
        *config = new_config;

        info!("Configuration reloaded from: {}", self.config_path);
        Ok(())
    }

    /// 验证当前配置
    pub async fn validate_config(&self) -> Result<()> {
        let config = self.config.read().await;
        self.validator.validate(&config)
    }
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| {
                    if config.server.port == 0 {
                        Err(anyhow::anyhow!("Server port cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid server port",
            },
            ValidationRule {
                field_path: "estimator",
                validator: |config| Ok(config.estimator.validate()?),
                error_message: "Invalid estimator settings",
            },
            ValidationRule {
                field_path: "classifier",
                validator: |config| Ok(config.classifier.validate()?),
                error_message: "Invalid symptom priority table",
            },
            ValidationRule {
                field_path: "advisor",
                validator: |config| Ok(config.advisor.validate()?),
                error_message: "Invalid advisor settings",
            },
            ValidationRule {
                field_path: "facility",
                validator: |config| Ok(config.facility.validate()?),
                error_message: "Invalid facility state",
            },
            ValidationRule {
                field_path: "worklist",
                validator: |config| {
                    let limits = &config.worklist;
                    if limits.default_page_size == 0 || limits.max_page_size == 0 {
                        Err(anyhow::anyhow!("Page sizes cannot be 0"))
                    } else if limits.default_page_size > limits.max_page_size {
                        Err(anyhow::anyhow!(
                            "Default page size {} exceeds max page size {}",
                            limits.default_page_size,
                            limits.max_page_size
                        ))
                    } else {
                        Ok(())
                    }
                },
                error_message: "Invalid worklist page limits",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &FlowConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.error_message, e));
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Patient-Flow".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::Department;
    use std::path::PathBuf;

    fn temp_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "flow-config-{}-{}.toml",
            name,
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = FlowConfig::default();
        assert!(ConfigValidator::new().validate(&config).is_ok());
        assert_eq!(config.estimator.baseline.low, 60.0);
        assert_eq!(config.worklist.default_page_size, 50);
    }

    #[test]
    fn test_validation_rules() {
        let validator = ConfigValidator::new();

        let mut config = FlowConfig::default();
        config.server.port = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = FlowConfig::default();
        config.estimator.jitter_max = 0.5;
        assert!(validator.validate(&config).is_err());

        let mut config = FlowConfig::default();
        config.worklist.default_page_size = 500;
        assert!(validator.validate(&config).is_err());

        let mut config = FlowConfig::default();
        config.facility.department_loads.insert(Department::Radiology, -1.0);
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_queue_settings_conversion() {
        let mut config = FlowConfig::default();
        config.worklist.max_page_size = 120;
        config.facility.department_loads.insert(Department::General, 1.7);

        let settings = config.to_queue_settings();
        assert_eq!(settings.page_limits.max_page_size, 120);
        assert_eq!(settings.facility.department_load(Department::General), 1.7);
        assert_eq!(settings.symptom_table.version, config.classifier.version);
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let path = temp_config(
            "partial",
            r#"
[server]
port = 9100

[estimator.baseline]
critical = 3.0

[facility.department_loads]
emergency = 2.0
"#,
        );

        let manager = ConfigManager::new(path.to_str().unwrap()).unwrap();
        let config = manager.get_config().await;

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.estimator.baseline.critical, 3.0);
        assert_eq!(config.estimator.baseline.low, 60.0);
        assert_eq!(config.facility.department_load(Department::Emergency), 2.0);
        assert!(manager.validate_config().await.is_ok());

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_invalid_file_rejected() {
        let path = temp_config("invalid", "[server]\nport = 0\n");
        assert!(ConfigManager::new(path.to_str().unwrap()).is_err());
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_update_saves_and_reloads() {
        let path = temp_config("update", "[server]\nport = 8081\n");
        let manager = ConfigManager::new(path.to_str().unwrap()).unwrap();

        let mut config = manager.get_config().await;
        config.server.port = 8200;
        config.logging.format = "json".to_string();
        manager.update_config(config).await.unwrap();

        manager.reload_config().await.unwrap();
        let reloaded = manager.get_config().await;
        assert_eq!(reloaded.server.port, 8200);
        assert!(reloaded.logging.is_json());

        let mut bad = reloaded.clone();
        bad.server.port = 0;
        assert!(manager.update_config(bad).await.is_err());
        assert_eq!(manager.get_config().await.server.port, 8200);

        std::fs::remove_file(path).ok();
    }
}
