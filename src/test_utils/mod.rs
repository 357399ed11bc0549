//! Test utilities for unit and route testing.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - In-memory repository implementations for mocking persistence
//! - Recording/stub implementations of the outbound ports
//! - Helper builders for constructing use cases and `AppState` with test dependencies
//! - Postgres fixtures for adapter tests, gated on `DATABASE_URL`

mod app_state_builder;
mod billing_mocks;
mod factories;
mod notification_mocks;
mod postgres;

pub use app_state_builder::*;
pub use billing_mocks::*;
pub use factories::*;
pub use notification_mocks::*;
pub use postgres::*;
