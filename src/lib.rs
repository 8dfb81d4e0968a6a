// SPDX-License-Identifier: MIT

//! flowline-rs: a step-orchestration engine.
//!
//! Workflows are declared as a set of steps (start, listener, router) wired
//! together by triggers. The engine dispatches steps as their trigger
//! conditions become satisfied and snapshots run state after every completed
//! step so an interrupted run can be resumed.

pub mod config;
pub mod error;
pub mod flow;
