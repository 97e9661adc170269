use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::action::Action;
use crate::error::BusError;
use crate::{debug, error, warn};

/// 出站入队队列容量；写满时入队方挂起，形成对插件的背压
const QUEUE_CAPACITY: usize = 128;

/// 在线传输端集合，总线里唯一一处连接共享状态
pub struct Transports {
    conns: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
    attached: Notify,
}

impl Transports {
    pub fn new() -> Self {
        Self {
            conns: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            attached: Notify::new(),
        }
    }

    /// 登记一个新传输端，返回其编号和出站帧接收端
    pub fn register(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.conns.lock().unwrap().insert(id, tx);
        self.attached.notify_waiters();
        (id, rx)
    }

    /// 注销传输端，其接收端随之关闭
    pub fn deregister(&self, id: u64) -> bool {
        self.conns.lock().unwrap().remove(&id).is_some()
    }

    pub fn count(&self) -> usize {
        self.conns.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// 至少有一个传输端在线时返回；否则挂起等待接入
    async fn wait_attached(&self) {
        loop {
            let notified = self.attached.notified();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// 把一帧写入所有在线传输端；写入失败的当场注销
    pub fn broadcast(&self, frame: &str) -> usize {
        let mut conns = self.conns.lock().unwrap();
        let mut dead = Vec::new();
        let mut delivered = 0;
        for (id, tx) in conns.iter() {
            if tx.send(frame.to_string()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }
        for id in dead {
            conns.remove(&id);
            warn!(target: "Bus", "传输端 #{} 已失效，注销", id);
        }
        delivered
    }
}

impl Default for Transports {
    fn default() -> Self {
        Self::new()
    }
}

/// 出站多路复用器的入队句柄，克隆后分发给各插件上下文
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Action>,
}

impl Outbound {
    /// 动作入队；队列满时挂起，总线停机后返回 QueueClosed
    pub async fn enqueue(&self, action: Action) -> Result<(), BusError> {
        self.tx.send(action).await.map_err(|_| BusError::QueueClosed)
    }
}

/// 建立入队通道并启动扇出任务
///
/// 每个动作只序列化一次；没有任何传输端时扇出挂起，
/// 动作留在队列里等待第一个传输端接入。
pub fn start(transports: Arc<Transports>) -> (Outbound, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Action>(QUEUE_CAPACITY);
    let handle = tokio::spawn(async move {
        while let Some(action) = rx.recv().await {
            let frame = match simd_json::to_string(&action) {
                Ok(frame) => frame,
                Err(e) => {
                    error!(target: "Bus", "动作 {} 序列化失败: {}", action.action, e);
                    continue;
                }
            };

            transports.wait_attached().await;
            let delivered = transports.broadcast(&frame);
            if delivered == 0 {
                // 等待和广播之间传输端全部掉线，动作按已消费处理
                debug!(target: "Bus", "动作 {} 无送达目标", action.action);
            }
        }
    });
    (Outbound { tx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn recv(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("应在超时前收到帧")
            .expect("通道不应关闭")
    }

    #[tokio::test]
    async fn every_transport_receives_each_action() {
        let transports = Arc::new(Transports::new());
        let (outbound, _fanout) = start(transports.clone());

        let (_a, mut rx_a) = transports.register();
        let (_b, mut rx_b) = transports.register();

        outbound
            .enqueue(action::send_private_msg(1, "hi".into()))
            .await
            .unwrap();

        let frame_a = recv(&mut rx_a).await;
        let frame_b = recv(&mut rx_b).await;
        assert!(frame_a.contains("send_private_msg"));
        assert_eq!(frame_a, frame_b);
    }

    #[tokio::test]
    async fn dead_transport_is_pruned_during_broadcast() {
        let transports = Arc::new(Transports::new());
        let (outbound, _fanout) = start(transports.clone());

        let (_a, mut rx_a) = transports.register();
        let (_b, rx_b) = transports.register();
        drop(rx_b);

        outbound
            .enqueue(action::send_private_msg(2, "still here".into()))
            .await
            .unwrap();

        assert!(recv(&mut rx_a).await.contains("still here"));
        assert_eq!(transports.count(), 1);
    }

    #[tokio::test]
    async fn actions_wait_for_the_first_transport() {
        let transports = Arc::new(Transports::new());
        let (outbound, _fanout) = start(transports.clone());

        outbound
            .enqueue(action::send_private_msg(3, "early".into()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (_id, mut rx) = transports.register();
        assert!(recv(&mut rx).await.contains("early"));
    }
}
