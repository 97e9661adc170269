use crate::error;
use crate::event::{GroupMessage, PrivateMessage};
use crate::plugin::{PluginContext, RegisteredPlugin};

/// 一次分发触发的处理器入口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// 无条件入口，收到原始消息链
    Unconditional,
    /// 前缀入口，收到剥离前缀后的消息链
    Prefix,
}

/// 纯路由决策：给出一条群消息应触发的 (插件, 入口, 生效消息) 列表
///
/// 过滤顺序：master_only 整个插件跳过，allowed_groups 整个插件跳过，
/// 然后无条件入口必触发，声明了前缀且命中的再触发前缀入口。
pub fn route_group(
    msg: &GroupMessage,
    plugins: &[RegisteredPlugin],
    master_id: i64,
) -> Vec<(RegisteredPlugin, HandlerKind, GroupMessage)> {
    let mut scheduled = Vec::new();
    for reg in plugins {
        let binding = &reg.binding;
        if binding.master_only && msg.user_id != master_id {
            continue;
        }
        if let Some(allowed) = &binding.allowed_groups
            && !allowed.contains(&msg.group_id)
        {
            continue;
        }

        scheduled.push((reg.clone(), HandlerKind::Unconditional, msg.clone()));

        if let Some(prefix) = &binding.prefix
            && !prefix.is_empty()
            && msg.message.starts_with(prefix)
        {
            let mut stripped = msg.clone();
            stripped.message = msg.message.strip_prefix(prefix);
            scheduled.push((reg.clone(), HandlerKind::Prefix, stripped));
        }
    }
    scheduled
}

/// route_group 的私聊版本，无群过滤
pub fn route_private(
    msg: &PrivateMessage,
    plugins: &[RegisteredPlugin],
    master_id: i64,
) -> Vec<(RegisteredPlugin, HandlerKind, PrivateMessage)> {
    let mut scheduled = Vec::new();
    for reg in plugins {
        let binding = &reg.binding;
        if binding.master_only && msg.user_id != master_id {
            continue;
        }

        scheduled.push((reg.clone(), HandlerKind::Unconditional, msg.clone()));

        if let Some(prefix) = &binding.prefix
            && !prefix.is_empty()
            && msg.message.starts_with(prefix)
        {
            let mut stripped = msg.clone();
            stripped.message = msg.message.strip_prefix(prefix);
            scheduled.push((reg.clone(), HandlerKind::Prefix, stripped));
        }
    }
    scheduled
}

/// 派发一个群消息处理任务
///
/// 内层任务跑处理函数，外层任务收尸：Err 和 panic 都只记录，
/// 不影响其他处理器和读循环。
pub fn spawn_group_handler(
    ctx: PluginContext,
    reg: RegisteredPlugin,
    kind: HandlerKind,
    msg: GroupMessage,
) {
    tokio::spawn(async move {
        let name = reg.name();
        let frame = simd_json::to_string(&msg.raw).unwrap_or_default();
        let task = tokio::spawn(async move {
            match kind {
                HandlerKind::Unconditional => reg.plugin.on_group(&ctx, &msg).await,
                HandlerKind::Prefix => reg.plugin.on_group_prefix(&ctx, &msg).await,
            }
        });
        report(name, task.await, &frame);
    });
}

/// 派发一个私聊消息处理任务
pub fn spawn_private_handler(
    ctx: PluginContext,
    reg: RegisteredPlugin,
    kind: HandlerKind,
    msg: PrivateMessage,
) {
    tokio::spawn(async move {
        let name = reg.name();
        let frame = simd_json::to_string(&msg.raw).unwrap_or_default();
        let task = tokio::spawn(async move {
            match kind {
                HandlerKind::Unconditional => reg.plugin.on_private(&ctx, &msg).await,
                HandlerKind::Prefix => reg.plugin.on_private_prefix(&ctx, &msg).await,
            }
        });
        report(name, task.await, &frame);
    });
}

fn report(
    name: &str,
    outcome: Result<Result<(), crate::error::PluginError>, tokio::task::JoinError>,
    frame: &str,
) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(target: "Plugin", "[{}] 处理失败: {} | 事件: {}", name, e, frame);
        }
        Err(e) if e.is_panic() => {
            error!(target: "Plugin", "[{}] 发生 panic | 事件: {}", name, frame);
        }
        // 停机时的任务取消
        Err(_) => {}
    }
}
