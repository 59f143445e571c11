// src/exec/process.rs

/// Identifies whether the running process is the designated primary one.
///
/// Tasks scoped to [`crate::types::ProcessScope::Primary`] only run where
/// this returns `true`.
pub trait ProcessInfo: Send + Sync {
    fn is_primary_process(&self) -> bool;
}

/// Fixed answer, usually taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticProcess {
    primary: bool,
}

impl StaticProcess {
    pub fn new(primary: bool) -> Self {
        Self { primary }
    }

    pub fn primary() -> Self {
        Self::new(true)
    }

    pub fn secondary() -> Self {
        Self::new(false)
    }
}

impl Default for StaticProcess {
    fn default() -> Self {
        Self::primary()
    }
}

impl ProcessInfo for StaticProcess {
    fn is_primary_process(&self) -> bool {
        self.primary
    }
}
