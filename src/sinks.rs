//! Message sink record — design note 2: "inheritance-based event reporting becomes a small
//! record of three function values passed by reference; each subcomponent holds a copy."

use std::sync::Arc;

/// A UTF-8 message callback, matching spec §6's `(binary_path_utf8: bytes, length: usize)`
/// calling convention at the boundary — the public API takes `&str`, length is implicit.
pub type MessageFn = dyn Fn(&str) + Send + Sync;

/// Three independent sinks (info/warn/error), each optional. Cheaply `Clone`-able so every
/// subcomponent (worker, resolver, classifier) can hold its own copy, matching the teacher's
/// pattern of handing small shared records to every background thread.
#[derive(Clone, Default)]
pub struct MessageSinks {
    info: Option<Arc<MessageFn>>,
    warn: Option<Arc<MessageFn>>,
    error: Option<Arc<MessageFn>>,
}

impl MessageSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_info(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.info = Some(Arc::new(f));
        self
    }

    pub fn with_warn(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.warn = Some(Arc::new(f));
        self
    }

    pub fn with_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(f));
        self
    }

    /// Emits at `tracing::info!` and, if installed, the user callback (spec §7: "the only
    /// user-visible signal is the message-sink callbacks").
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
        if let Some(f) = &self.info {
            f(msg);
        }
    }

    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
        if let Some(f) = &self.warn {
            f(msg);
        }
    }

    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
        if let Some(f) = &self.error {
            f(msg);
        }
    }
}

impl std::fmt::Debug for MessageSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSinks")
            .field("info", &self.info.is_some())
            .field("warn", &self.warn.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}
