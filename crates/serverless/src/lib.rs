// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serverless scheduling: registered functions, cold-start image
//! placement over a two-level cache hierarchy, and per-invocation
//! sandboxing.

pub mod function;
pub mod scheduler;
pub mod service;

pub use function::{
    Function, FunctionFuture, FunctionInput, FunctionLimits, FunctionOutput, Invocation,
    RegisteredFunction,
};
pub use scheduler::{
    HostView, InvocationScheduler, InvocationView, NativeScheduler, SchedulerView,
    SchedulingDecisions,
};
pub use service::{ServerlessScheduler, ServerlessSpec};
