use simd_json::OwnedValue;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::BusError;
use crate::warn;

/// 关联器：用本地生成的 echo 令牌把出站动作和它的响应帧配对
///
/// issue 必须发生在动作入队之前，这样即使响应先于 wait 到达，
/// 载荷也会停留在 oneshot 通道里等待领取。
pub struct Matcher {
    pending: Mutex<HashMap<String, oneshot::Sender<OwnedValue>>>,
    counter: AtomicU64,
}

/// 一次未决调用：令牌 + 响应接收端
pub struct PendingCall {
    token: String,
    rx: oneshot::Receiver<OwnedValue>,
}

impl PendingCall {
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Matcher {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(1),
        }
    }

    /// 生成唯一令牌并登记等待项
    pub fn issue(&self) -> PendingCall {
        let token = format!("sora-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(token.clone(), tx);
        PendingCall { token, rx }
    }

    /// 等待响应；超时后移除登记项并返回 CorrelationTimeout
    pub async fn wait(&self, call: PendingCall, timeout: Duration) -> Result<OwnedValue, BusError> {
        match tokio::time::timeout(timeout, call.rx).await {
            Ok(Ok(payload)) => Ok(payload),
            // 发送端被丢弃，等同无响应
            Ok(Err(_)) => Err(BusError::CorrelationTimeout),
            Err(_) => {
                self.pending.lock().unwrap().remove(&call.token);
                Err(BusError::CorrelationTimeout)
            }
        }
    }

    /// 撤销一次未能发出的调用，清掉登记项
    pub fn cancel(&self, call: &PendingCall) {
        self.pending.lock().unwrap().remove(&call.token);
    }

    /// 用响应帧唤醒对应的等待者；令牌无主时记录并丢弃
    pub fn resolve(&self, token: &str, payload: OwnedValue) {
        let sender = self.pending.lock().unwrap().remove(token);
        match sender {
            // 等待者可能恰好超时退出，发送失败直接忽略
            Some(tx) => {
                let _ = tx.send(payload);
            }
            None => warn!(target: "Bus", "收到无主响应 (echo={})，已丢弃", token),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn resolve_wakes_the_waiter() {
        let matcher = Arc::new(Matcher::new());
        let call = matcher.issue();
        let token = call.token().to_string();

        let resolver = matcher.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.resolve(&token, OwnedValue::from("ok"));
        });

        let payload = matcher.wait(call, Duration::from_secs(1)).await.unwrap();
        assert_eq!(payload, OwnedValue::from("ok"));
        assert_eq!(matcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn resolve_before_wait_is_not_lost() {
        let matcher = Matcher::new();
        let call = matcher.issue();
        matcher.resolve(&call.token().to_string(), OwnedValue::from(1_i64));

        let payload = matcher.wait(call, Duration::from_millis(50)).await.unwrap();
        assert_eq!(payload, OwnedValue::from(1_i64));
    }

    #[tokio::test]
    async fn timeout_removes_the_pending_entry() {
        let matcher = Matcher::new();
        let call = matcher.issue();
        let token = call.token().to_string();

        let err = matcher.wait(call, Duration::from_millis(20)).await;
        assert!(matches!(err, Err(BusError::CorrelationTimeout)));
        assert_eq!(matcher.pending_count(), 0);

        // 迟到的响应只会被记录丢弃，不会崩
        matcher.resolve(&token, OwnedValue::from("late"));
        assert_eq!(matcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancel_discards_an_unsent_call() {
        let matcher = Matcher::new();
        let call = matcher.issue();
        assert_eq!(matcher.pending_count(), 1);
        matcher.cancel(&call);
        assert_eq!(matcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn tokens_are_unique() {
        let matcher = Matcher::new();
        let a = matcher.issue();
        let b = matcher.issue();
        assert_ne!(a.token(), b.token());
        assert_eq!(matcher.pending_count(), 2);
    }
}
