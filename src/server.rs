use futures_util::{SinkExt, StreamExt};
use simd_json::OwnedValue;
use simd_json::derived::ValueObjectAccessAsScalar;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use crate::config::AppConfig;
use crate::event::{self, Inbound};
use crate::matcher::Matcher;
use crate::outbound::{self, Outbound, Transports};
use crate::plugin::{PluginContext, RegisteredPlugin};
use crate::router;
use crate::{debug, error, info, warn};

type ConnError = Box<dyn std::error::Error + Send + Sync>;

/// 事件-动作总线
///
/// 接收实现端的 WebSocket 接入；入站帧按接收顺序分类，
/// 消息经过滤后并发分发给插件，出站动作扇出到所有在线传输端。
pub struct Bus {
    state: Arc<BusState>,
}

struct BusState {
    config: AppConfig,
    plugins: Vec<RegisteredPlugin>,
    matcher: Arc<Matcher>,
    outbound: Outbound,
    transports: Arc<Transports>,
}

impl Bus {
    pub fn new(config: AppConfig, plugins: Vec<RegisteredPlugin>) -> Self {
        let transports = Arc::new(Transports::new());
        let (outbound, _fanout) = outbound::start(transports.clone());
        Self {
            state: Arc::new(BusState {
                config,
                plugins,
                matcher: Arc::new(Matcher::new()),
                outbound,
                transports,
            }),
        }
    }

    /// 绑定配置地址并开始服务；绑定失败是唯一致命错误
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.state.config.listen).await?;
        info!(target: "Server", "WebSocket 服务已启动: ws://{}", self.state.config.listen);
        self.serve(listener).await
    }

    /// 在给定监听器上服务，每个连接一个独立任务
    ///
    /// 单次 accept 失败（对端提前复位、瞬时 FD 耗尽等）只记录并继续，
    /// 已接入的传输端不受影响
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(target: "Server", "接受连接失败: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            let state = self.state.clone();
            tokio::spawn(async move {
                let peer = addr.to_string();
                if let Err(e) = handle_connection(state, stream, &peer).await {
                    warn!(target: "Server", "连接 {} 异常关闭: {}", peer, e);
                }
            });
        }
    }
}

/// 握手鉴权：配置了 access_token 时校验 Authorization 头
fn check_auth(
    request: &Request,
    response: Response,
    token: Option<&str>,
) -> Result<Response, ErrorResponse> {
    let Some(token) = token else {
        return Ok(response);
    };

    let authorized = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {token}"));

    if authorized {
        Ok(response)
    } else {
        let mut reject = ErrorResponse::new(None);
        *reject.status_mut() = http::StatusCode::UNAUTHORIZED;
        Err(reject)
    }
}

async fn handle_connection(
    state: Arc<BusState>,
    stream: TcpStream,
    peer: &str,
) -> Result<(), ConnError> {
    let token = state.config.access_token.clone();
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, move |req: &Request, resp| {
        check_auth(req, resp, token.as_deref())
    })
    .await?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (conn_id, mut frame_rx) = state.transports.register();
    info!(target: "Server", "客户端 {} 已接入 (传输端 #{})", peer, conn_id);

    // 写任务独占写半边，逐帧写出；失败即注销自己
    let transports = state.transports.clone();
    let writer_peer = peer.to_string();
    let write_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(e) = ws_tx.send(WsMessage::Text(frame.into())).await {
                warn!(target: "Server", "向 {} 写入失败: {}", writer_peer, e);
                transports.deregister(conn_id);
                break;
            }
        }
    });

    // 读循环：分类在循环内完成，处理任务派发后立即读下一帧
    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(WsMessage::Text(text)) => handle_frame(&state, text.as_str()),
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(target: "Server", "读取 {} 失败: {}", peer, e);
                break;
            }
        }
    }

    // 注销后写通道关闭，写任务自然退出
    state.transports.deregister(conn_id);
    let _ = write_task.await;
    info!(target: "Server", "客户端 {} 已断开 (传输端 #{})", peer, conn_id);
    Ok(())
}

/// 单帧入口：解码失败只丢弃该帧，连接保持
fn handle_frame(state: &Arc<BusState>, text: &str) {
    let mut bytes = text.as_bytes().to_vec();
    let value = match simd_json::to_owned_value(&mut bytes) {
        Ok(value) => value,
        Err(e) => {
            warn!(target: "Bus", "丢弃无法解析的帧: {} | {}", e, truncate(text, 200));
            return;
        }
    };

    if value.get_str("post_type").is_some() {
        dispatch_event(state, value);
    } else if let Some(echo) = value.get_str("echo") {
        let token = echo.to_string();
        if value.get_str("status") == Some("failed") {
            error!(target: "Bus", "API 响应失败 (echo={}): {}", token, truncate(text, 200));
        }
        state.matcher.resolve(&token, value);
    } else {
        debug!(target: "Bus", "丢弃既无 post_type 也无 echo 的帧");
    }
}

/// 分类并派发一个事件帧
fn dispatch_event(state: &Arc<BusState>, value: OwnedValue) {
    match event::classify(value) {
        Ok(Inbound::Group(msg)) => {
            info!(
                target: "Bus",
                "[群 {}] {}({}): {}",
                msg.group_id, msg.sender.nickname, msg.user_id, msg.plain_text()
            );
            for (reg, kind, effective) in
                router::route_group(&msg, &state.plugins, state.config.master_id)
            {
                let ctx = context(state, reg.name());
                router::spawn_group_handler(ctx, reg, kind, effective);
            }
        }
        Ok(Inbound::Private(msg)) => {
            info!(
                target: "Bus",
                "[私聊] {}({}): {}",
                msg.sender.nickname, msg.user_id, msg.plain_text()
            );
            for (reg, kind, effective) in
                router::route_private(&msg, &state.plugins, state.config.master_id)
            {
                let ctx = context(state, reg.name());
                router::spawn_private_handler(ctx, reg, kind, effective);
            }
        }
        Ok(Inbound::Event(ev)) => {
            debug!(target: "Bus", "未处理的事件类型: {:?}", ev.post_type);
        }
        Err(e) => debug!(target: "Bus", "{}", e),
    }
}

fn context(state: &Arc<BusState>, plugin_name: &'static str) -> PluginContext {
    PluginContext::new(
        state.outbound.clone(),
        state.matcher.clone(),
        state.config.master_id,
        plugin_name,
    )
}

/// 在字符边界上截断，日志里不打全量大帧
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
