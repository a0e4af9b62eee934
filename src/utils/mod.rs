//! # Utilities Module
//!
//! Cross-cutting helpers that don't belong in domain-specific modules.
//!
//! ## Sub-modules
//! - `telemetry`: Atomic progress blackboard and heartbeat thread

pub mod telemetry;
