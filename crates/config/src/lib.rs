//! 统一配置中心
//!
//! 配置按以下顺序叠加，后者覆盖前者：
//! - 内置默认值
//! - `CHATROOM_CONFIG` 指向的 YAML 文件（可选）
//! - `CHATROOM_` 前缀的环境变量，嵌套字段用 `__` 分隔，例如 `CHATROOM_JWT__SECRET`

use std::env;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_ENV: &str = "CHATROOM_CONFIG";
pub const ENV_PREFIX: &str = "CHATROOM_";

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 服务配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// JWT认证配置
    pub jwt: JwtConfig,
    /// 消息代理配置
    pub kafka: KafkaConfig,
    /// 流式连接会话配置
    pub session: SessionConfig,
    /// 主题广播配置
    pub broadcast: BroadcastConfig,
    /// 消费者组配置
    pub consumers: ConsumersConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub bcrypt_cost: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            bcrypt_cost: None,
        }
    }
}

/// 数据库配置。未设置 url 时使用内存仓储。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
    /// 携带访问令牌的 Cookie 名称
    pub cookie_name: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expiration_hours: 24,
            cookie_name: "access_token".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub messages: String,
    pub room_events: String,
    pub notifications: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            messages: "chat-messages".to_string(),
            room_events: "chat-room-events".to_string(),
            notifications: "chat-notifications".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerGroupsConfig {
    pub delivery: String,
    pub persistence: String,
    pub notification: String,
    pub analytics: String,
}

impl Default for ConsumerGroupsConfig {
    fn default() -> Self {
        Self {
            delivery: "chat-delivery".to_string(),
            persistence: "chat-persistence-verify".to_string(),
            notification: "chat-notification".to_string(),
            analytics: "chat-analytics".to_string(),
        }
    }
}

/// 消息代理配置。`enabled = false` 时使用进程内代理。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub enabled: bool,
    /// 逗号分隔的 broker 地址
    pub brokers: String,
    pub topics: TopicsConfig,
    pub groups: ConsumerGroupsConfig,
    /// 进程内代理每个主题的分区数
    pub partitions: u32,
    pub send_timeout_ms: u64,
    pub retry_count: u32,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: "127.0.0.1:9092".to_string(),
            topics: TopicsConfig::default(),
            groups: ConsumerGroupsConfig::default(),
            partitions: 8,
            send_timeout_ms: 5000,
            retry_count: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 过期会话属性的清理间隔
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
        }
    }
}

/// 广播器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// 每个主题的缓冲容量，慢订阅者超过后会丢失最旧的推送
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumersConfig {
    /// 在 HTTP 服务进程内同时运行持久化核对、通知与统计消费者
    pub embedded: bool,
    pub analytics_report_secs: u64,
}

impl Default for ConsumersConfig {
    fn default() -> Self {
        Self {
            embedded: true,
            analytics_report_secs: 60,
        }
    }
}

impl AppConfig {
    /// 按默认值、配置文件、环境变量的顺序加载
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = env::var(CONFIG_FILE_ENV) {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|err| ConfigError::Load(Box::new(err)))
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证JWT密钥长度（至少256位/32字节）
        if self.jwt.secret.len() < 32 {
            return Err(ConfigError::InvalidJwtSecret(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }
        if self.jwt.expiration_hours <= 0 {
            return Err(ConfigError::InvalidJwtSecret(
                "token expiration must be positive".to_string(),
            ));
        }
        if self.jwt.cookie_name.trim().is_empty() {
            return Err(ConfigError::InvalidServerConfig(
                "cookie name cannot be empty".to_string(),
            ));
        }

        if let Some(url) = &self.database.url {
            if url.trim().is_empty() {
                return Err(ConfigError::InvalidDatabaseUrl(
                    "Database URL cannot be empty".to_string(),
                ));
            }
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidDatabaseConfig(
                "Max connections must be greater than 0".to_string(),
            ));
        }

        if self.kafka.enabled && self.kafka.brokers.trim().is_empty() {
            return Err(ConfigError::InvalidBrokerConfig(
                "brokers cannot be empty when kafka is enabled".to_string(),
            ));
        }
        if self.kafka.partitions == 0 {
            return Err(ConfigError::InvalidBrokerConfig(
                "partition count must be at least 1".to_string(),
            ));
        }

        if self.broadcast.capacity == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "broadcast capacity must be greater than 0".to_string(),
            ));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "session sweep interval must be greater than 0".to_string(),
            ));
        }

        // 验证bcrypt cost（如果设置）
        if let Some(cost) = self.server.bcrypt_cost {
            if !(4..=31).contains(&cost) {
                return Err(ConfigError::InvalidServerConfig(
                    "bcrypt cost must be between 4 and 31".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(Box<figment::Error>),
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Invalid JWT configuration: {0}")]
    InvalidJwtSecret(String),
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid broker configuration: {0}")]
    InvalidBrokerConfig(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    const SECRET: &str = "production-grade-secret-key-with-sufficient-length";

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.jwt.secret = SECRET.to_string();
        config
    }

    #[test]
    fn defaults_need_a_secret() {
        let config = AppConfig::default();
        assert!(config.database.url.is_none());
        assert!(!config.kafka.enabled);
        assert_eq!(config.jwt.cookie_name, "access_token");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidJwtSecret(_))
        ));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn env_overrides_nested_fields() {
        Jail::expect_with(|jail| {
            jail.set_env("CHATROOM_JWT__SECRET", SECRET);
            jail.set_env("CHATROOM_SERVER__PORT", "9001");
            jail.set_env("CHATROOM_KAFKA__TOPICS__MESSAGES", "msgs");

            let config = AppConfig::load().map_err(|err| err.to_string())?;
            assert_eq!(config.server.port, 9001);
            assert_eq!(config.jwt.secret, SECRET);
            assert_eq!(config.kafka.topics.messages, "msgs");
            assert_eq!(config.kafka.topics.room_events, "chat-room-events");
            Ok(())
        });
    }

    #[test]
    fn yaml_file_is_layered_under_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "chatroom.yaml",
                r#"
server:
  port: 7000
database:
  url: postgres://chat@db/chat
kafka:
  enabled: true
  brokers: kafka-1:9092,kafka-2:9092
"#,
            )?;
            jail.set_env(CONFIG_FILE_ENV, "chatroom.yaml");
            jail.set_env("CHATROOM_SERVER__PORT", "7100");

            let config = AppConfig::load().map_err(|err| err.to_string())?;
            assert_eq!(config.server.port, 7100);
            assert_eq!(config.database.url.as_deref(), Some("postgres://chat@db/chat"));
            assert!(config.kafka.enabled);
            assert_eq!(config.kafka.brokers, "kafka-1:9092,kafka-2:9092");
            Ok(())
        });
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = valid_config();
        config.jwt.secret = "short".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.database.max_connections = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDatabaseConfig(_))
        ));

        let mut config = valid_config();
        config.kafka.partitions = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBrokerConfig(_))
        ));

        let mut config = valid_config();
        config.kafka.enabled = true;
        config.kafka.brokers = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.server.bcrypt_cost = Some(2);
        assert!(config.validate().is_err());
    }
}
