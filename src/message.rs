use serde::{Deserialize, Serialize};
use simd_json::OwnedValue;
use simd_json::base::ValueAsScalar;
use std::collections::HashMap;

/// 消息段携带的数据表
pub type SegmentData = HashMap<String, OwnedValue>;

/// 消息段 (Segment)
///
/// 线上格式为 `{"type": ..., "data": {...}}`；已知类型解析为强类型变体，
/// 未知类型落入 `Other` 并原样保留，保证往返不丢字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSegment", into = "RawSegment")]
pub enum Segment {
    /// 纯文本
    Text { text: String },
    /// @某人
    At { qq: String },
    /// 图片
    Image { file: String },
    /// 结构化分享卡片
    Share { url: String, title: String },
    /// 引用回复
    Reply { id: String },
    /// 其余段类型，按原始键值保留
    Other { kind: String, data: SegmentData },
}

impl Segment {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// 线上表示，仅用于 serde 转换
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSegment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: SegmentData,
}

/// 字符串或数字字段统一取成 String（OneBot 实现两种都会发）
fn scalar_string(value: &OwnedValue) -> Option<String> {
    if let Some(s) = value.as_str() {
        Some(s.to_string())
    } else if let Some(i) = value.as_i64() {
        Some(i.to_string())
    } else {
        value.as_u64().map(|u| u.to_string())
    }
}

impl From<RawSegment> for Segment {
    fn from(raw: RawSegment) -> Self {
        let RawSegment { kind, data } = raw;
        let field = |name: &str| data.get(name).and_then(scalar_string);

        match kind.as_str() {
            "text" => {
                if let Some(text) = field("text") {
                    return Segment::Text { text };
                }
            }
            "at" => {
                if let Some(qq) = field("qq") {
                    return Segment::At { qq };
                }
            }
            "image" => {
                if let Some(file) = field("file") {
                    return Segment::Image { file };
                }
            }
            "share" => {
                if let (Some(url), Some(title)) = (field("url"), field("title")) {
                    return Segment::Share { url, title };
                }
            }
            "reply" => {
                if let Some(id) = field("id") {
                    return Segment::Reply { id };
                }
            }
            _ => {}
        }
        // 缺必填字段的已知类型同样按原样保留
        Segment::Other { kind, data }
    }
}

impl From<Segment> for RawSegment {
    fn from(seg: Segment) -> Self {
        fn one(kind: &str, key: &str, value: String) -> RawSegment {
            let mut data = SegmentData::new();
            data.insert(key.to_string(), OwnedValue::from(value));
            RawSegment {
                kind: kind.to_string(),
                data,
            }
        }

        match seg {
            Segment::Text { text } => one("text", "text", text),
            Segment::At { qq } => one("at", "qq", qq),
            Segment::Image { file } => one("image", "file", file),
            Segment::Reply { id } => one("reply", "id", id),
            Segment::Share { url, title } => {
                let mut data = SegmentData::new();
                data.insert("url".to_string(), OwnedValue::from(url));
                data.insert("title".to_string(), OwnedValue::from(title));
                RawSegment {
                    kind: "share".to_string(),
                    data,
                }
            }
            Segment::Other { kind, data } => RawSegment { kind, data },
        }
    }
}

/// 消息链 (Message Chain)，段的顺序端到端保持
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Message(pub Vec<Segment>);

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // ================== 构建 ==================

    pub fn push(mut self, segment: Segment) -> Self {
        self.0.push(segment);
        self
    }

    /// 纯文本
    pub fn text(self, text: impl Into<String>) -> Self {
        self.push(Segment::Text { text: text.into() })
    }

    /// @某人
    pub fn at(self, user_id: impl ToString) -> Self {
        self.push(Segment::At {
            qq: user_id.to_string(),
        })
    }

    /// 图片（文件名、URL 或 Base64）
    pub fn image(self, file: impl Into<String>) -> Self {
        self.push(Segment::Image { file: file.into() })
    }

    /// 引用回复
    pub fn reply(self, message_id: impl ToString) -> Self {
        self.push(Segment::Reply {
            id: message_id.to_string(),
        })
    }

    /// 分享卡片
    pub fn share(self, url: impl Into<String>, title: impl Into<String>) -> Self {
        self.push(Segment::Share {
            url: url.into(),
            title: title.into(),
        })
    }

    /// 拼接另一条消息链
    pub fn extend(mut self, other: Message) -> Self {
        self.0.extend(other.0);
        self
    }

    // ================== 查询 ==================

    /// 所有文本段以空格拼接后去掉首尾空白
    pub fn plain_text(&self) -> String {
        self.0
            .iter()
            .filter_map(Segment::as_text)
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }

    /// 首段是文本且以给定字面前缀开头
    pub fn starts_with(&self, prefix: &str) -> bool {
        matches!(self.0.first().and_then(Segment::as_text), Some(text) if text.starts_with(prefix))
    }

    /// 复制一份并从首个文本段剥离前缀，剥离处的多余空白一并去掉
    pub fn strip_prefix(&self, prefix: &str) -> Self {
        let mut copy = self.clone();
        if let Some(Segment::Text { text }) = copy.0.first_mut()
            && let Some(rest) = text.strip_prefix(prefix)
        {
            *text = rest.trim_start().to_string();
        }
        copy
    }

    /// 是否 @ 了机器人自己
    pub fn at_bot(&self, self_id: i64) -> bool {
        self.0.iter().any(|seg| {
            matches!(seg, Segment::At { qq } if qq.parse::<i64>() == Ok(self_id))
        })
    }

    /// 文本内容是否包含子串
    pub fn contains(&self, needle: &str, ignore_case: bool) -> bool {
        let text = self.plain_text();
        if ignore_case {
            text.to_lowercase().contains(&needle.to_lowercase())
        } else {
            text.contains(needle)
        }
    }
}

// 字符串字面量可直接当作纯文本消息使用
impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::new().text(s)
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::new().text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Message {
        let mut bytes = json.as_bytes().to_vec();
        let value = simd_json::to_owned_value(&mut bytes).unwrap();
        simd_json::serde::from_owned_value(value).unwrap()
    }

    #[test]
    fn typed_segments_parse_from_wire_format() {
        let msg = parse(
            r#"[{"type":"text","data":{"text":"hello "}},
                {"type":"at","data":{"qq":12345}},
                {"type":"image","data":{"file":"a.png"}}]"#,
        );
        assert_eq!(
            msg.segments(),
            &[
                Segment::Text {
                    text: "hello ".to_string()
                },
                Segment::At {
                    qq: "12345".to_string()
                },
                Segment::Image {
                    file: "a.png".to_string()
                },
            ]
        );
    }

    #[test]
    fn unknown_segment_kind_survives_round_trip() {
        let msg = parse(r#"[{"type":"face","data":{"id":"14"}}]"#);
        assert!(matches!(&msg.segments()[0], Segment::Other { kind, .. } if kind == "face"));

        let json = simd_json::to_string(&msg).unwrap();
        let back = parse(&json);
        assert_eq!(msg, back);
    }

    #[test]
    fn plain_text_joins_and_trims() {
        let msg = Message::new().text(" left").at(1).text("right ");
        assert_eq!(msg.plain_text(), "left right");
    }

    #[test]
    fn prefix_matches_first_text_segment_only() {
        let msg = Message::new().text("#echo hi");
        assert!(msg.starts_with("#echo"));
        assert_eq!(msg.strip_prefix("#echo").plain_text(), "hi");
        // 原链不变
        assert_eq!(msg.plain_text(), "#echo hi");

        let at_first = Message::new().at(1).text("#echo hi");
        assert!(!at_first.starts_with("#echo"));
    }

    #[test]
    fn at_bot_parses_numeric_target() {
        let msg = Message::new().at(99).text("hi");
        assert!(msg.at_bot(99));
        assert!(!msg.at_bot(100));
    }
}
