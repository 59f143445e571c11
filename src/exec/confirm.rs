// src/exec/confirm.rs

//! Interceptor that asks for confirmation before a task body runs.
//!
//! The question is asked on a helper thread so the intercepting thread is
//! never blocked on input; the answer is fed back through the chain handle.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::{debug, warn};

use crate::engine::interceptor::{InterceptorChain, TaskInterceptor};

/// Answers a yes/no question.
pub type Prompter = Arc<dyn Fn(&str) -> io::Result<bool> + Send + Sync>;

static PROMPT_LOCK: Mutex<()> = Mutex::new(());

pub struct ConfirmInterceptor {
    auto_approve: bool,
    prompter: Prompter,
}

impl ConfirmInterceptor {
    /// Ask on the terminal (stderr prompt, stdin answer).
    pub fn terminal(auto_approve: bool) -> Self {
        Self {
            auto_approve,
            prompter: Arc::new(ask_terminal),
        }
    }

    pub fn with_prompter(prompter: Prompter) -> Self {
        Self {
            auto_approve: false,
            prompter,
        }
    }
}

impl TaskInterceptor for ConfirmInterceptor {
    fn intercept(&self, chain: InterceptorChain) {
        if self.auto_approve {
            debug!(task = %chain.task_name(), "confirmation auto-approved");
            chain.proceed();
            return;
        }

        let prompter = Arc::clone(&self.prompter);
        let question = format!("run task '{}'? [y/N] ", chain.task_name());
        let asker = chain.clone();
        let spawned = thread::Builder::new()
            .name("taskgraph-confirm".to_string())
            .spawn(move || match prompter(&question) {
                Ok(true) => asker.proceed(),
                Ok(false) => asker.cancel(),
                Err(err) => {
                    warn!(task = %asker.task_name(), error = %err, "could not read confirmation");
                    asker.cancel();
                }
            });

        if let Err(err) = spawned {
            warn!(task = %chain.task_name(), error = %err, "failed to spawn confirmation thread");
            chain.cancel();
        }
    }

    fn name(&self) -> String {
        "confirm".to_string()
    }
}

fn ask_terminal(question: &str) -> io::Result<bool> {
    let _serialized = PROMPT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    let mut stderr = io::stderr().lock();
    stderr.write_all(question.as_bytes())?;
    stderr.flush()?;
    drop(stderr);

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
