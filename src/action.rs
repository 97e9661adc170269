use serde::{Deserialize, Serialize};
use simd_json::OwnedValue;

use crate::message::Message;

/// 出站动作帧：`{"action": ..., "params": {...}, "echo": ...}`
///
/// echo 仅在需要等待响应时由关联器填入，普通发送不带。
#[derive(Debug, Clone, Serialize)]
pub struct Action {
    pub action: String,
    pub params: OwnedValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

impl Action {
    pub fn new(action: impl Into<String>, params: OwnedValue) -> Self {
        Self {
            action: action.into(),
            params,
            echo: None,
        }
    }

    pub fn with_echo(mut self, token: impl Into<String>) -> Self {
        self.echo = Some(token.into());
        self
    }
}

/// 参数结构体序列化为 Owned 表示
///
/// 纯数据结构序列化不会失败，万一失败退化为空参数。
fn to_params<T: Serialize>(params: &T) -> OwnedValue {
    let json = simd_json::to_string(params).unwrap_or_else(|_| "{}".to_string());
    let mut bytes = json.into_bytes();
    simd_json::to_owned_value(&mut bytes).unwrap_or_else(|_| OwnedValue::from(()))
}

// ================== 动作构造 ==================

#[derive(Serialize)]
struct SendGroupMsgParams {
    group_id: i64,
    message: Message,
}

/// 发送群消息
pub fn send_group_msg(group_id: i64, message: Message) -> Action {
    Action::new("send_group_msg", to_params(&SendGroupMsgParams { group_id, message }))
}

#[derive(Serialize)]
struct SendPrivateMsgParams {
    user_id: i64,
    message: Message,
}

/// 发送私聊消息
pub fn send_private_msg(user_id: i64, message: Message) -> Action {
    Action::new(
        "send_private_msg",
        to_params(&SendPrivateMsgParams { user_id, message }),
    )
}

#[derive(Serialize)]
struct DeleteMsgParams {
    message_id: i64,
}

/// 撤回消息
pub fn delete_msg(message_id: i64) -> Action {
    Action::new("delete_msg", to_params(&DeleteMsgParams { message_id }))
}

#[derive(Serialize)]
struct EmptyParams {}

/// 查询当前登录账号
pub fn get_login_info() -> Action {
    Action::new("get_login_info", to_params(&EmptyParams {}))
}

/// get_login_info 响应中的 data
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInfo {
    pub user_id: i64,
    pub nickname: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use simd_json::base::ValueAsArray;
    use simd_json::derived::{ValueObjectAccess, ValueObjectAccessAsScalar};

    #[test]
    fn action_without_echo_omits_the_field() {
        let action = send_private_msg(10000, Message::new().text("hi"));
        let json = simd_json::to_string(&action).unwrap();
        assert!(!json.contains("echo"));
        assert!(json.contains("\"action\":\"send_private_msg\""));
    }

    #[test]
    fn params_carry_the_message_chain() {
        let action = send_group_msg(456, Message::new().text("hi").at(1));
        assert_eq!(action.params.get_i64("group_id"), Some(456));
        let segs = action.params.get("message").and_then(|m| m.as_array()).unwrap();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].get_str("type"), Some("text"));
    }

    #[test]
    fn echo_round_trips_through_serialization() {
        let action = get_login_info().with_echo("sora-1");
        let json = simd_json::to_string(&action).unwrap();
        assert!(json.contains("\"echo\":\"sora-1\""));
    }
}
