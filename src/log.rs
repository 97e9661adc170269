use chrono::Local;

pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// 统一日志输出函数
/// 格式: [Time] [LEVEL] [Target] Message
pub fn print(level: Level, target: &str, args: std::fmt::Arguments) {
    let now = Local::now().format("%m-%d %H:%M:%S");

    // ANSI 颜色代码
    let gray = "\x1b[90m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    let (color, label) = match level {
        Level::Debug => ("\x1b[34m", "DEBG"), // Blue
        Level::Info => ("\x1b[32m", "INFO"),  // Green
        Level::Warn => ("\x1b[33m", "WARN"),  // Yellow
        Level::Error => ("\x1b[31m", "ERRO"), // Red
    };

    println!(
        "{}[{}]{} {}[{}]{} {}[{}]{} {}",
        gray, now, reset, color, label, reset, cyan, target, reset, args
    );
}

#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Debug, $target, format_args!($($arg)+))
    );
    ($($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Debug, "System", format_args!($($arg)+))
    );
}

#[macro_export]
macro_rules! info {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Info, $target, format_args!($($arg)+))
    );
    ($($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Info, "System", format_args!($($arg)+))
    );
}

#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Warn, $target, format_args!($($arg)+))
    );
    ($($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Warn, "System", format_args!($($arg)+))
    );
}

#[macro_export]
macro_rules! error {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Error, $target, format_args!($($arg)+))
    );
    ($($arg:tt)+) => (
        $crate::log::print($crate::log::Level::Error, "System", format_args!($($arg)+))
    );
}
