//! Call completion hooks.
//!
//! Exactly one of the three lists runs per call, each hook in registration
//! order: success hooks for a returned response, error hooks for a returned
//! error, panic hooks for a panic recovered at the call boundary.

use std::sync::Arc;

use crate::client::Client;
use crate::error::Error;
use crate::http::{Request, Response};

pub type SuccessHook = Arc<dyn Fn(&Client, &Response) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&Request, &Error) + Send + Sync>;
pub type PanicHook = Arc<dyn Fn(&Request, &Error) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Hooks {
    success: Vec<SuccessHook>,
    error: Vec<ErrorHook>,
    panic: Vec<PanicHook>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("success", &self.success.len())
            .field("error", &self.error.len())
            .field("panic", &self.panic.len())
            .finish()
    }
}

impl Hooks {
    pub fn add_success(&mut self, hook: SuccessHook) {
        self.success.push(hook);
    }

    pub fn add_error(&mut self, hook: ErrorHook) {
        self.error.push(hook);
    }

    pub fn add_panic(&mut self, hook: PanicHook) {
        self.panic.push(hook);
    }

    pub(crate) fn run_success(&self, client: &Client, response: &Response) {
        for hook in &self.success {
            hook(client, response);
        }
    }

    pub(crate) fn run_error(&self, request: &Request, error: &Error) {
        for hook in &self.error {
            hook(request, error);
        }
    }

    pub(crate) fn run_panic(&self, request: &Request, error: &Error) {
        for hook in &self.panic {
            hook(request, error);
        }
    }
}
