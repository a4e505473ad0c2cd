// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Functions, registrations, and invocations.
//!
//! A function is a name, an image (the code+data blob shared by every
//! invocation), and a simulated body. Registration attaches resource
//! limits and produces a distinct handle each time: registering the
//! same function twice yields two independent registrations.

use gantry_core::{DataFile, FailureCause, InvocationId};
use parking_lot::Mutex;
use std::sync::Arc;

/// Input handed to an invocation.
pub type FunctionInput = serde_json::Value;

/// Output produced by an invocation.
pub type FunctionOutput = serde_json::Value;

/// Future returned by a function body.
pub type FunctionFuture = std::pin::Pin<
    Box<dyn std::future::Future<Output = Result<FunctionOutput, FailureCause>> + Send>,
>;

/// A user function: name, image, and simulated body.
pub struct Function {
    name: String,
    image: DataFile,
    body: Box<dyn Fn(FunctionInput) -> FunctionFuture + Send + Sync>,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        image: DataFile,
        body: impl Fn(FunctionInput) -> FunctionFuture + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self { name: name.into(), image, body: Box::new(body) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> &DataFile {
        &self.image
    }

    pub fn call(&self, input: FunctionInput) -> FunctionFuture {
        (self.body)(input)
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("image", &self.image.id())
            .finish()
    }
}

/// Per-registration resource limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunctionLimits {
    /// Maximum execution time per invocation, in seconds.
    pub time_limit: f64,
    /// Size of the per-invocation on-disk sandbox.
    pub disk_space_limit: u64,
    /// Size of the per-invocation RAM allocation.
    pub ram_limit: u64,
    pub ingress_bytes: u64,
    pub egress_bytes: u64,
}

impl FunctionLimits {
    pub fn new(time_limit: f64, disk_space_limit: u64, ram_limit: u64) -> Self {
        Self { time_limit, disk_space_limit, ram_limit, ingress_bytes: 0, egress_bytes: 0 }
    }

    gantry_core::setters! {
        set {
            ingress_bytes: u64,
            egress_bytes: u64,
        }
    }
}

struct RegisteredInner {
    function: Arc<Function>,
    limits: FunctionLimits,
}

/// A registered function. Identity is the registration, not the
/// function: two registrations of one function are distinct handles.
#[derive(Clone)]
pub struct RegisteredFunction(Arc<RegisteredInner>);

impl RegisteredFunction {
    pub(crate) fn new(function: Arc<Function>, limits: FunctionLimits) -> Self {
        Self(Arc::new(RegisteredInner { function, limits }))
    }

    pub fn function(&self) -> &Arc<Function> {
        &self.0.function
    }

    pub fn name(&self) -> &str {
        self.0.function.name()
    }

    pub fn image(&self) -> &DataFile {
        self.0.function.image()
    }

    pub fn limits(&self) -> &FunctionLimits {
        &self.0.limits
    }
}

impl PartialEq for RegisteredFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for RegisteredFunction {}

impl std::hash::Hash for RegisteredFunction {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl std::fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("function", &self.name())
            .finish()
    }
}

#[derive(Debug, Default)]
struct InvocationInner {
    start_date: Option<f64>,
    end_date: Option<f64>,
    target_host: Option<String>,
    success: Option<bool>,
    output: Option<FunctionOutput>,
    failure: Option<FailureCause>,
}

/// Handle to one invocation of a registered function. The submitter
/// correlates the `FunctionInvocationComplete` event by id and reads
/// the outcome here.
#[derive(Clone)]
pub struct Invocation {
    id: InvocationId,
    function: RegisteredFunction,
    submit_date: f64,
    inner: Arc<Mutex<InvocationInner>>,
}

impl Invocation {
    pub(crate) fn new(function: RegisteredFunction, submit_date: f64) -> Self {
        Self {
            id: InvocationId::new(),
            function,
            submit_date,
            inner: Arc::new(Mutex::new(InvocationInner::default())),
        }
    }

    pub fn id(&self) -> InvocationId {
        self.id
    }

    pub fn registered_function(&self) -> &RegisteredFunction {
        &self.function
    }

    pub fn submit_date(&self) -> f64 {
        self.submit_date
    }

    pub fn start_date(&self) -> Option<f64> {
        self.inner.lock().start_date
    }

    pub fn end_date(&self) -> Option<f64> {
        self.inner.lock().end_date
    }

    pub fn target_host(&self) -> Option<String> {
        self.inner.lock().target_host.clone()
    }

    pub fn is_done(&self) -> bool {
        self.inner.lock().success.is_some()
    }

    pub fn succeeded(&self) -> Option<bool> {
        self.inner.lock().success
    }

    pub fn output(&self) -> Option<FunctionOutput> {
        self.inner.lock().output.clone()
    }

    pub fn failure_cause(&self) -> Option<FailureCause> {
        self.inner.lock().failure.clone()
    }

    pub(crate) fn mark_started(&self, host: &str, date: f64) {
        let mut inner = self.inner.lock();
        inner.start_date = Some(date);
        inner.target_host = Some(host.to_string());
    }

    pub(crate) fn set_output(&self, output: FunctionOutput) {
        self.inner.lock().output = Some(output);
    }

    pub(crate) fn mark_done(&self, success: bool, failure: Option<FailureCause>, date: f64) {
        let mut inner = self.inner.lock();
        inner.end_date = Some(date);
        inner.success = Some(success);
        inner.failure = failure;
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("id", &self.id)
            .field("function", &self.function.name())
            .finish()
    }
}

#[cfg(test)]
#[path = "function_tests.rs"]
mod tests;
