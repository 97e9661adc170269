use async_trait::async_trait;
use simd_json::OwnedValue;
use simd_json::derived::{ValueObjectAccess, ValueObjectAccessAsScalar};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::action::{self, Action, LoginInfo};
use crate::config::PluginSettings;
use crate::error::{BusError, PluginError};
use crate::event::{GroupMessage, PrivateMessage};
use crate::matcher::Matcher;
use crate::message::Message;
use crate::outbound::Outbound;

pub type PluginResult = Result<(), PluginError>;

/// 关联调用的默认截止时间
pub const API_TIMEOUT: Duration = Duration::from_secs(60);

/// 插件声明的路由兴趣；配置表可逐项覆盖
#[derive(Debug, Clone, Default)]
pub struct PluginBinding {
    /// 有值时额外接收剥离前缀后的消息
    pub prefix: Option<String>,
    /// 只响应主人
    pub master_only: bool,
    /// 有值时只接收名单内群的消息；None 表示不限
    pub allowed_groups: Option<HashSet<i64>>,
}

impl PluginBinding {
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn master_only(mut self) -> Self {
        self.master_only = true;
        self
    }

    pub fn allow_groups(mut self, groups: impl IntoIterator<Item = i64>) -> Self {
        self.allowed_groups = Some(groups.into_iter().collect());
        self
    }

    /// 配置表中的路由键覆盖编译期默认值
    pub fn apply(mut self, settings: &PluginSettings) -> Self {
        if let Some(prefix) = &settings.prefix {
            self.prefix = Some(prefix.clone());
        }
        if let Some(master_only) = settings.master_only {
            self.master_only = master_only;
        }
        if let Some(groups) = &settings.allowed_groups {
            self.allowed_groups = Some(groups.iter().copied().collect());
        }
        self
    }
}

/// 插件接口
///
/// 处理函数默认空实现，插件只需覆写自己关心的入口。
/// 带 prefix 入口收到的消息链已剥离前缀。
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// 默认路由兴趣
    fn binding(&self) -> PluginBinding {
        PluginBinding::default()
    }

    async fn on_group(&self, _ctx: &PluginContext, _msg: &GroupMessage) -> PluginResult {
        Ok(())
    }

    async fn on_group_prefix(&self, _ctx: &PluginContext, _msg: &GroupMessage) -> PluginResult {
        Ok(())
    }

    async fn on_private(&self, _ctx: &PluginContext, _msg: &PrivateMessage) -> PluginResult {
        Ok(())
    }

    async fn on_private_prefix(&self, _ctx: &PluginContext, _msg: &PrivateMessage) -> PluginResult {
        Ok(())
    }
}

/// 注册表项：插件实例加上生效的路由兴趣
#[derive(Clone)]
pub struct RegisteredPlugin {
    pub plugin: Arc<dyn Plugin>,
    pub binding: PluginBinding,
}

impl RegisteredPlugin {
    pub fn name(&self) -> &'static str {
        self.plugin.name()
    }
}

/// 单次分发的上下文：出站入口、关联器和主人号
#[derive(Clone)]
pub struct PluginContext {
    outbound: Outbound,
    matcher: Arc<Matcher>,
    pub master_id: i64,
    plugin_name: &'static str,
}

impl PluginContext {
    pub fn new(
        outbound: Outbound,
        matcher: Arc<Matcher>,
        master_id: i64,
        plugin_name: &'static str,
    ) -> Self {
        Self {
            outbound,
            matcher,
            master_id,
            plugin_name,
        }
    }

    pub fn plugin_name(&self) -> &'static str {
        self.plugin_name
    }

    /// 入队一个出站动作，不等待响应
    pub async fn enqueue(&self, action: Action) -> Result<(), BusError> {
        self.outbound.enqueue(action).await
    }

    /// 发送带关联令牌的动作并等待响应帧
    pub async fn call(&self, action: Action, timeout: Duration) -> Result<OwnedValue, BusError> {
        let pending = self.matcher.issue();
        let action = action.with_echo(pending.token());
        // 入队失败说明动作从未发出，登记项必须跟着撤销
        if let Err(e) = self.outbound.enqueue(action).await {
            self.matcher.cancel(&pending);
            return Err(e);
        }
        self.matcher.wait(pending, timeout).await
    }

    /// call 的封装：校验响应 retcode 并取出 data
    pub async fn call_action(&self, action: Action, timeout: Duration) -> Result<OwnedValue, BusError> {
        let resp = self.call(action, timeout).await?;
        let retcode = resp
            .get_i64("retcode")
            .or_else(|| resp.get_u64("retcode").map(|v| v as i64))
            .unwrap_or(-1);
        if retcode != 0 {
            let message = resp
                .get_str("msg")
                .or_else(|| resp.get_str("wording"))
                .unwrap_or("Unknown Error")
                .to_string();
            return Err(BusError::ActionFailed { retcode, message });
        }
        Ok(resp
            .get("data")
            .cloned()
            .unwrap_or_else(|| OwnedValue::from(())))
    }

    // ================== 常用动作 ==================

    pub async fn send_group_message(
        &self,
        group_id: i64,
        message: impl Into<Message> + Send,
    ) -> Result<(), BusError> {
        self.enqueue(action::send_group_msg(group_id, message.into())).await
    }

    pub async fn send_private_message(
        &self,
        user_id: i64,
        message: impl Into<Message> + Send,
    ) -> Result<(), BusError> {
        self.enqueue(action::send_private_msg(user_id, message.into())).await
    }

    /// 回复群消息，自动带上对原消息的引用
    pub async fn reply_group(
        &self,
        msg: &GroupMessage,
        message: impl Into<Message> + Send,
    ) -> Result<(), BusError> {
        let content = Message::new().reply(msg.message_id).extend(message.into());
        self.send_group_message(msg.group_id, content).await
    }

    /// 回复私聊消息
    pub async fn reply_private(
        &self,
        msg: &PrivateMessage,
        message: impl Into<Message> + Send,
    ) -> Result<(), BusError> {
        self.send_private_message(msg.user_id, message).await
    }

    /// 查询当前登录账号
    pub async fn get_login_info(&self) -> Result<LoginInfo, BusError> {
        let data = self.call_action(action::get_login_info(), API_TIMEOUT).await?;
        simd_json::serde::from_owned_value(data)
            .map_err(|e| BusError::UnknownType(format!("登录信息解析失败: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_override_compiled_defaults() {
        let binding = PluginBinding::default().prefix("#old").master_only();
        let settings = PluginSettings {
            enabled: true,
            prefix: Some("#new".to_string()),
            master_only: Some(false),
            allowed_groups: Some(vec![1, 2]),
        };
        let merged = binding.apply(&settings);
        assert_eq!(merged.prefix.as_deref(), Some("#new"));
        assert!(!merged.master_only);
        assert_eq!(merged.allowed_groups, Some(HashSet::from([1, 2])));
    }

    #[tokio::test]
    async fn failed_enqueue_leaves_no_pending_entry() {
        use crate::outbound::{self, Transports};

        let transports = Arc::new(Transports::new());
        let (outbound, fanout) = outbound::start(transports);
        // 停掉扇出任务，队列随之关闭
        fanout.abort();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let matcher = Arc::new(Matcher::new());
        let ctx = PluginContext::new(outbound, matcher.clone(), 10000, "test");

        let err = ctx
            .call(action::get_login_info(), Duration::from_secs(1))
            .await;
        assert!(matches!(err, Err(BusError::QueueClosed)));
        assert_eq!(matcher.pending_count(), 0);
    }

    #[test]
    fn absent_settings_keep_defaults() {
        let binding = PluginBinding::default().prefix("#keep").master_only();
        let merged = binding.apply(&PluginSettings::default());
        assert_eq!(merged.prefix.as_deref(), Some("#keep"));
        assert!(merged.master_only);
        assert_eq!(merged.allowed_groups, None);
    }
}
