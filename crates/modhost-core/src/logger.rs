//! Logger Bridge (C2): a single structured log sink with levels
//! `{DEBUG, INFO, OK, WARN, ERROR}` and named child loggers, built on top of
//! `tracing` so every module in the kernel shares one configured minimum
//! level and one set of subscribers.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;

/// The five levels the runtime contract defines. `Ok` has no direct
/// `tracing::Level` counterpart, so it is carried as an `INFO` event with an
/// `outcome = "ok"` field rather than inventing a custom `tracing` level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Ok,
    Warn,
    Error,
}

impl Level {
    fn tracing_level(self) -> tracing::Level {
        match self {
            Level::Debug => tracing::Level::DEBUG,
            Level::Info | Level::Ok => tracing::Level::INFO,
            Level::Warn => tracing::Level::WARN,
            Level::Error => tracing::Level::ERROR,
        }
    }

    pub fn from_str_default(s: &str, default: Level) -> Level {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Level::Debug,
            "INFO" => Level::Info,
            "OK" => Level::Ok,
            "WARN" | "WARNING" => Level::Warn,
            "ERROR" => Level::Error,
            _ => default,
        }
    }
}

static SUBSCRIBER_INSTALLED: AtomicBool = AtomicBool::new(false);
static MIN_LEVEL: OnceCell<Level> = OnceCell::new();

/// Install the process-wide `tracing` subscriber, reading the minimum level
/// from `ADC_LOG_LEVEL` if set, defaulting to `DEBUG` in development and
/// `INFO` in production (spec.md §4.2, §6). Idempotent: later calls are
/// no-ops, matching a process having exactly one log sink for its lifetime.
pub fn init() {
    if SUBSCRIBER_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    let is_development = std::env::var("NODE_ENV")
        .map(|v| v == "development")
        .unwrap_or(true);
    let default_level = if is_development {
        Level::Debug
    } else {
        Level::Info
    };
    let level = std::env::var("ADC_LOG_LEVEL")
        .ok()
        .map(|v| Level::from_str_default(&v, default_level))
        .unwrap_or(default_level);
    let _ = MIN_LEVEL.set(level);

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.tracing_level().into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

fn minimum_level() -> Level {
    *MIN_LEVEL.get().unwrap_or(&Level::Info)
}

/// A namespaced handle onto the shared log sink. Cheap to clone and to
/// derive children from; carries no state of its own beyond the namespace
/// string.
#[derive(Debug, Clone)]
pub struct Logger {
    namespace: String,
}

impl Logger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Derive a child logger whose namespace is `self::name`, for
    /// attributing log lines to a specific module instance or subsystem.
    pub fn child(&self, name: impl AsRef<str>) -> Logger {
        Logger::new(format!("{}::{}", self.namespace, name.as_ref()))
    }

    fn log(&self, level: Level, message: &str) {
        if level < minimum_level() {
            return;
        }
        match level {
            Level::Debug => tracing::debug!(namespace = %self.namespace, "{message}"),
            Level::Info => tracing::info!(namespace = %self.namespace, "{message}"),
            Level::Ok => tracing::info!(namespace = %self.namespace, outcome = "ok", "{message}"),
            Level::Warn => tracing::warn!(namespace = %self.namespace, "{message}"),
            Level::Error => tracing::error!(namespace = %self.namespace, "{message}"),
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    pub fn ok(&self, message: &str) {
        self.log(Level::Ok, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    /// Re-emit a child process's stderr log notification at the matching
    /// level, under a namespace derived from the owning module (spec.md
    /// §4.3, §6: `^\[(DEBUG|INFO|OK|WARN|ERROR)\]\s+(.*)`).
    pub fn emit_child_log_line(&self, line: &str) {
        if let Some((level, message)) = parse_child_log_line(line) {
            self.log(level, message);
        } else {
            self.info(line);
        }
    }
}

fn parse_child_log_line(line: &str) -> Option<(Level, &str)> {
    let rest = line.strip_prefix('[')?;
    let (tag, message) = rest.split_once(']')?;
    let level = match tag {
        "DEBUG" => Level::Debug,
        "INFO" => Level::Info,
        "OK" => Level::Ok,
        "WARN" => Level::Warn,
        "ERROR" => Level::Error,
        _ => return None,
    };
    Some((level, message.trim_start()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_namespace_nests_under_parent() {
        let root = Logger::new("kernel");
        let child = root.child("loader");
        assert_eq!(child.namespace(), "kernel::loader");
    }

    #[test]
    fn parses_child_log_lines() {
        assert_eq!(
            parse_child_log_line("[WARN] disk nearly full"),
            Some((Level::Warn, "disk nearly full"))
        );
        assert_eq!(parse_child_log_line("plain text, no tag"), None);
    }
}
