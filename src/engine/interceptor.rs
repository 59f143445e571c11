// src/engine/interceptor.rs

//! Pre-execution hooks that can pause, resume or veto a task.
//!
//! Each interceptor receives an [`InterceptorChain`] handle for its step.
//! It must eventually call exactly one of [`InterceptorChain::proceed`] or
//! [`InterceptorChain::cancel`]; either may be called synchronously from
//! `intercept` or later from any thread.

use std::fmt;
use std::sync::Arc;

use crate::engine::controller::TaskController;

pub trait TaskInterceptor: Send + Sync {
    fn intercept(&self, chain: InterceptorChain);

    /// Name reported in cancellations raised through this interceptor.
    fn name(&self) -> String {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Handle an interceptor uses to continue or veto one chain step.
///
/// Cheap to clone and safe to move to another thread. Only the first
/// `proceed()` for a step has an effect.
#[derive(Clone)]
pub struct InterceptorChain {
    controller: Arc<TaskController>,
    step: usize,
}

impl InterceptorChain {
    pub(crate) fn new(controller: Arc<TaskController>, step: usize) -> Self {
        Self { controller, step }
    }

    /// Let the chain continue with the next interceptor, or the body.
    pub fn proceed(&self) {
        self.controller.proceed_step(self.step);
    }

    /// Stop the chain; the owning graph is canceled.
    pub fn cancel(&self) {
        self.controller.cancel_step(self.step);
    }

    pub fn task_name(&self) -> &str {
        self.controller.name()
    }

    /// 1-based position of this step in the chain.
    pub fn step(&self) -> usize {
        self.step
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("task", &self.controller.name())
            .field("step", &self.step)
            .finish()
    }
}

/// Interceptor backed by a closure.
pub struct FnInterceptor<F> {
    name: String,
    f: F,
}

impl<F> FnInterceptor<F>
where
    F: Fn(InterceptorChain) + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> TaskInterceptor for FnInterceptor<F>
where
    F: Fn(InterceptorChain) + Send + Sync + 'static,
{
    fn intercept(&self, chain: InterceptorChain) {
        (self.f)(chain)
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Box a closure as a shareable interceptor.
pub fn interceptor_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn TaskInterceptor>
where
    F: Fn(InterceptorChain) + Send + Sync + 'static,
{
    Arc::new(FnInterceptor::new(name, f))
}

fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
