use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::fs;
use toml::Value;

use crate::info;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    // WebSocket 监听地址
    #[serde(default = "default_listen")]
    pub listen: String,

    // 可选的连接鉴权 Token (Authorization: Bearer <token>)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    // 主人 QQ 号，master_only 插件只响应该用户
    #[serde(default = "default_master_id")]
    pub master_id: i64,

    // 插件配置表（顶层任意键均视为插件名）
    #[serde(flatten)]
    pub plugins: HashMap<String, Value>,
}

fn default_listen() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_master_id() -> i64 {
    10000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            access_token: None,
            master_id: default_master_id(),
            plugins: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// 加载配置文件；不存在时写入默认配置
    pub async fn load(path: &str) -> anyhow::Result<Self> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            info!(target: "System", "未找到配置文件，已生成默认配置: {}", path);
            let config = AppConfig::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub async fn save(&self, path: &str) -> anyhow::Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string).await?;
        Ok(())
    }

    /// 取指定插件的配置表；缺省视为启用、无覆盖
    pub fn plugin_settings(&self, name: &str) -> PluginSettings {
        self.plugins
            .get(name)
            .and_then(|v| PluginSettings::deserialize(v.clone()).ok())
            .unwrap_or_default()
    }

    /// 取指定插件的自定义配置（插件自身的强类型配置）
    pub fn plugin_config<T>(&self, name: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.plugins
            .get(name)
            .and_then(|v| T::deserialize(v.clone()).ok())
    }
}

/// 每个插件表中总线关心的路由键
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PluginSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub master_only: Option<bool>,
    #[serde(default)]
    pub allowed_groups: Option<Vec<i64>>,
}

fn default_true() -> bool {
    true
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: None,
            master_only: None,
            allowed_groups: None,
        }
    }
}
