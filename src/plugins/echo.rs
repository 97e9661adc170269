use async_trait::async_trait;

use crate::event::{GroupMessage, PrivateMessage};
use crate::plugin::{Plugin, PluginBinding, PluginContext, PluginResult};

/// 回声插件：把前缀后的内容原样发回，富文本段一并保留
pub struct Echo;

#[async_trait]
impl Plugin for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn binding(&self) -> PluginBinding {
        PluginBinding::default().prefix("#echo").master_only()
    }

    async fn on_group_prefix(&self, ctx: &PluginContext, msg: &GroupMessage) -> PluginResult {
        ctx.reply_group(msg, msg.message.clone()).await?;
        Ok(())
    }

    async fn on_private_prefix(&self, ctx: &PluginContext, msg: &PrivateMessage) -> PluginResult {
        ctx.reply_private(msg, msg.message.clone()).await?;
        Ok(())
    }
}
