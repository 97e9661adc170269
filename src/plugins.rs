use std::sync::Arc;

use crate::config::AppConfig;
use crate::info;
use crate::plugin::{Plugin, RegisteredPlugin};

pub mod echo;
pub mod whoareu;

/// 显式注册表：新插件在此登记
fn builtin() -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(echo::Echo), Arc::new(whoareu::WhoAreU)]
}

/// 按配置实例化启用的插件并合并路由兴趣
pub fn build(config: &AppConfig) -> Vec<RegisteredPlugin> {
    let mut registry = Vec::new();
    for plugin in builtin() {
        let settings = config.plugin_settings(plugin.name());
        if !settings.enabled {
            info!(target: "System", "插件 [{}] 已禁用，跳过", plugin.name());
            continue;
        }
        let binding = plugin.binding().apply(&settings);
        info!(
            target: "System",
            "插件 [{}] 已注册 (prefix={:?}, master_only={})",
            plugin.name(), binding.prefix, binding.master_only
        );
        registry.push(RegisteredPlugin { plugin, binding });
    }
    info!(target: "System", "共加载 {} 个插件", registry.len());
    registry
}
