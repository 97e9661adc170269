use serde::Deserialize;
use simd_json::OwnedValue;
use simd_json::derived::ValueObjectAccessAsScalar;

use crate::error::BusError;
use crate::message::Message;

/// 入站帧的 post_type 分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostType {
    /// 他人发来的消息
    Message,
    /// 机器人账号自己发出、被实现回显的消息，与 Message 同路处理
    MessageSent,
    /// 其余事件（通知、请求、元事件等）
    Other(String),
}

impl PostType {
    pub fn parse(s: &str) -> Self {
        match s {
            "message" => PostType::Message,
            "message_sent" => PostType::MessageSent,
            other => PostType::Other(other.to_string()),
        }
    }
}

/// 非消息类事件，保留原始帧供需要的消费者自行解读
#[derive(Debug, Clone)]
pub struct Event {
    pub post_type: PostType,
    pub time: i64,
    pub self_id: i64,
    pub raw: OwnedValue,
}

/// 消息发送者
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub card: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// 群消息
#[derive(Debug, Clone, Deserialize)]
pub struct GroupMessage {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub self_id: i64,
    pub message_type: String,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub message_id: i64,
    pub user_id: i64,
    pub group_id: i64,
    #[serde(default)]
    pub message: Message,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub sender: Sender,
    /// 原始帧，分类时回填
    #[serde(skip, default = "null_value")]
    pub raw: OwnedValue,
}

/// 私聊消息
#[derive(Debug, Clone, Deserialize)]
pub struct PrivateMessage {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub self_id: i64,
    pub message_type: String,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub message_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub target_id: i64,
    #[serde(default)]
    pub message: Message,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub sender: Sender,
    /// 原始帧，分类时回填
    #[serde(skip, default = "null_value")]
    pub raw: OwnedValue,
}

fn null_value() -> OwnedValue {
    OwnedValue::from(())
}

impl GroupMessage {
    pub fn plain_text(&self) -> String {
        self.message.plain_text()
    }
}

impl PrivateMessage {
    pub fn plain_text(&self) -> String {
        self.message.plain_text()
    }
}

/// 分类结果：消息走路由，其余事件仅记录
#[derive(Debug, Clone)]
pub enum Inbound {
    Group(GroupMessage),
    Private(PrivateMessage),
    Event(Event),
}

/// 把一个携带 post_type 的帧归类为强类型入站事件
///
/// message 与 message_sent 同等对待；message_type 不是 group/private
/// 或字段不完整时返回 UnknownType，由调用方降级记录。
pub fn classify(raw: OwnedValue) -> Result<Inbound, BusError> {
    let post_type = raw
        .get_str("post_type")
        .ok_or_else(|| BusError::UnknownType("缺少 post_type".to_string()))?;

    match PostType::parse(post_type) {
        PostType::Message | PostType::MessageSent => match raw.get_str("message_type") {
            Some("group") => {
                let mut msg: GroupMessage = simd_json::serde::from_owned_value(raw.clone())
                    .map_err(|e| BusError::UnknownType(format!("群消息字段不完整: {e}")))?;
                msg.raw = raw;
                Ok(Inbound::Group(msg))
            }
            Some("private") => {
                let mut msg: PrivateMessage = simd_json::serde::from_owned_value(raw.clone())
                    .map_err(|e| BusError::UnknownType(format!("私聊消息字段不完整: {e}")))?;
                msg.raw = raw;
                Ok(Inbound::Private(msg))
            }
            other => Err(BusError::UnknownType(format!(
                "未知 message_type: {other:?}"
            ))),
        },
        post_type => {
            let time = raw.get_i64("time").unwrap_or(0);
            let self_id = raw.get_i64("self_id").unwrap_or(0);
            Ok(Inbound::Event(Event {
                post_type,
                time,
                self_id,
                raw,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> OwnedValue {
        let mut bytes = json.as_bytes().to_vec();
        simd_json::to_owned_value(&mut bytes).unwrap()
    }

    #[test]
    fn group_message_classifies_with_raw_attached() {
        let raw = parse(
            r#"{"post_type":"message","message_type":"group","time":1,"self_id":99,
                "message_id":7,"user_id":123,"group_id":456,
                "sender":{"user_id":123,"nickname":"n"},
                "message":[{"type":"text","data":{"text":"hi"}}],"raw_message":"hi"}"#,
        );
        let Inbound::Group(msg) = classify(raw).unwrap() else {
            panic!("应归类为群消息");
        };
        assert_eq!(msg.group_id, 456);
        assert_eq!(msg.plain_text(), "hi");
        assert_eq!(msg.raw.get_str("post_type"), Some("message"));
    }

    #[test]
    fn message_sent_routes_like_message() {
        let raw = parse(
            r#"{"post_type":"message_sent","message_type":"private","user_id":99,
                "message":[{"type":"text","data":{"text":"self"}}]}"#,
        );
        assert!(matches!(classify(raw).unwrap(), Inbound::Private(_)));
    }

    #[test]
    fn non_message_post_type_becomes_event() {
        let raw = parse(r#"{"post_type":"meta_event","meta_event_type":"heartbeat","time":5}"#);
        let Inbound::Event(ev) = classify(raw).unwrap() else {
            panic!("应归类为普通事件");
        };
        assert_eq!(ev.post_type, PostType::Other("meta_event".to_string()));
        assert_eq!(ev.time, 5);
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let raw = parse(r#"{"post_type":"message","message_type":"guild","user_id":1}"#);
        assert!(matches!(classify(raw), Err(BusError::UnknownType(_))));
    }
}
