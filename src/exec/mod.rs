//! Remote code execution.
//!
//! Source is submitted to a Judge0-compatible service and the response is
//! reduced to a single printable output string. At most one run is in flight
//! per session key.

mod judge0;

pub use judge0::Judge0Executor;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Language;

/// Raw result of a submission. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
}

impl Submission {
    /// First non-empty of stdout, stderr, compile output.
    #[must_use]
    pub fn render(&self) -> String {
        fn present(field: &Option<String>) -> Option<&str> {
            field.as_deref().filter(|s| !s.is_empty())
        }

        if let Some(out) = present(&self.stdout) {
            out.to_string()
        } else if let Some(err) = present(&self.stderr) {
            format!("Runtime Error:\n{err}")
        } else if let Some(out) = present(&self.compile_output) {
            format!("Compilation Error:\n{out}")
        } else {
            "No output received.".to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutput {
    pub language: Language,
    pub output: String,
}

/// Runs source code remotely and waits for the result.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn submit(&self, source: &str, language_id: u32) -> Result<Submission>;
}

/// Judge0 language id, or `None` for languages that cannot run.
#[must_use]
pub fn language_id(language: Language) -> Option<u32> {
    match language {
        Language::Python => Some(71),
        Language::Java => Some(62),
        Language::C => Some(50),
        Language::Plaintext => None,
    }
}

/// Tracks which sessions have a run in flight.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSlots {
    running: Arc<Mutex<HashSet<String>>>,
}

/// Releases its slot on drop.
#[derive(Debug)]
pub struct SlotGuard {
    running: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl ExecutionSlots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot for `key`, failing with [`Error::Busy`] if taken.
    pub fn try_acquire(&self, key: &str) -> Result<SlotGuard> {
        let mut running = self
            .running
            .lock()
            .map_err(|_| Error::Transport("execution slots poisoned".to_string()))?;
        if !running.insert(key.to_string()) {
            return Err(Error::Busy);
        }
        Ok(SlotGuard {
            running: Arc::clone(&self.running),
            key: key.to_string(),
        })
    }

    #[must_use]
    pub fn is_running(&self, key: &str) -> bool {
        self.running.lock().is_ok_and(|r| r.contains(key))
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&self.key);
        }
    }
}

/// Runs `code` under the slot for `key`. Nothing is persisted.
pub async fn run(
    executor: &dyn Executor,
    slots: &ExecutionSlots,
    key: &str,
    code: &str,
    language: Language,
) -> Result<RunOutput> {
    let id = language_id(language).ok_or(Error::NotExecutable(language))?;
    let _guard = slots.try_acquire(key)?;

    tracing::debug!("Submitting {} source for {}", language, key);
    let submission = executor.submit(code, id).await?;

    Ok(RunOutput {
        language,
        output: submission.render(),
    })
}
