use std::sync::atomic::{AtomicU8, Ordering};

/// Current inspection trace level, zero disables tracing.
static TRACE_LEVEL: AtomicU8 = AtomicU8::new(1);

#[inline(always)]
pub fn trace_level() -> u8 {
    TRACE_LEVEL.load(Ordering::SeqCst)
}

#[inline(always)]
pub fn is_traced(level: u8) -> bool {
    level <= trace_level()
}

pub fn set_trace_level(level: u8) {
    TRACE_LEVEL.store(level, Ordering::SeqCst)
}

/// Log a trace line at `debug` level if `$level` is enabled by the current trace level.
#[macro_export]
macro_rules! ins_trace {
    ($level: expr, target: $target:expr, $($arg:tt)+) => {
        if $crate::log::is_traced($level) {
            log::debug!(target: $target, $($arg)+)
        }
    };
    ($level: expr, $($arg:tt)+) => {
        if $crate::log::is_traced($level) {
            log::debug!(target: "inspection", $($arg)+)
        }
    };
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "inspection", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "inspection", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
