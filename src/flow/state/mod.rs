// SPDX-License-Identifier: MIT

//! Shared run state
//!
//! This module provides:
//! - `StateSchema` - optional shape, defaults and reducers for state fields
//! - `WorkflowState` - the single mutable state value owned by a run
//! - `ReducerType` - strategies for merging values into state

mod schema;
mod store;

pub use schema::{FieldType, ReducerType, StateFieldDef, StateSchema};
pub use store::WorkflowState;
