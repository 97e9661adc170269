use async_trait::async_trait;

use crate::event::{GroupMessage, PrivateMessage};
use crate::plugin::{Plugin, PluginBinding, PluginContext, PluginResult};

/// 身份插件：查询当前登录账号并自报家门，演示关联调用
pub struct WhoAreU;

impl WhoAreU {
    async fn introduce(&self, ctx: &PluginContext) -> Result<String, crate::error::BusError> {
        let login = ctx.get_login_info().await?;
        Ok(format!("Hello, I'm {}.", login.nickname))
    }
}

#[async_trait]
impl Plugin for WhoAreU {
    fn name(&self) -> &'static str {
        "whoareu"
    }

    fn binding(&self) -> PluginBinding {
        PluginBinding::default().prefix("#whoareu").master_only()
    }

    async fn on_group_prefix(&self, ctx: &PluginContext, msg: &GroupMessage) -> PluginResult {
        let intro = self.introduce(ctx).await?;
        ctx.reply_group(msg, intro).await?;
        Ok(())
    }

    async fn on_private_prefix(&self, ctx: &PluginContext, msg: &PrivateMessage) -> PluginResult {
        let intro = self.introduce(ctx).await?;
        ctx.reply_private(msg, intro).await?;
        Ok(())
    }
}
