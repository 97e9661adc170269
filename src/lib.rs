//! Sora — 事件-动作总线机器人运行时
//!
//! 实现端通过 WebSocket 接入后形成双工传输端：入站帧按接收顺序
//! 分类为消息或普通事件，消息经前缀/主人/群名单过滤后并发分发给
//! 插件；插件产生的出站动作经单一队列扇出到所有在线传输端，带
//! echo 令牌的动作由关联器与响应帧配对。

pub mod action;
pub mod config;
pub mod error;
pub mod event;
pub mod log;
pub mod matcher;
pub mod message;
pub mod outbound;
pub mod plugin;
pub mod plugins;
pub mod router;
pub mod server;

pub use action::Action;
pub use config::AppConfig;
pub use error::{BusError, PluginError};
pub use event::{GroupMessage, Inbound, PrivateMessage};
pub use message::{Message, Segment};
pub use plugin::{Plugin, PluginBinding, PluginContext, PluginResult};
pub use server::Bus;
