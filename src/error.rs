use thiserror::Error;

/// 总线内部错误分类
#[derive(Debug, Error)]
pub enum BusError {
    /// 帧不是合法 JSON，记录后丢弃，连接保持
    #[error("帧解析失败: {0}")]
    Decode(#[from] simd_json::Error),

    /// post_type 或消息结构无法归类，debug 级丢弃
    #[error("无法归类的事件: {0}")]
    UnknownType(String),

    /// 关联调用在截止时间内没有等到响应
    #[error("API 调用超时")]
    CorrelationTimeout,

    /// 远端返回了非零 retcode
    #[error("API 调用失败 (retcode={retcode}): {message}")]
    ActionFailed { retcode: i64, message: String },

    /// 出站队列已关闭（总线停机）
    #[error("动作队列已关闭")]
    QueueClosed,
}

/// 插件处理函数返回的错误，统一装箱
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;
