// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action execution: per-action executor actors, the per-host
//! resource-aware execution service, and the compound-job DAG driver.

pub mod driver;
pub mod executor;
pub mod service;

pub use driver::{AllocationSlice, DriverDone, JobDriver};
pub use executor::{ActionExecutor, ExecutorDone, ExecutorSpec};
pub use service::{ActionExecutionService, AesResources, AesSpec};
