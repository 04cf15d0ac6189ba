use std::sync::{Arc, Mutex};

/// Toolchain output captured during one build. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct BuildLog {
    inner: Arc<Mutex<String>>,
}

impl BuildLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_line(&self, line: &str) {
        let mut buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.push_str(line);
        buf.push('\n');
    }

    pub fn contents(&self) -> String {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}
