//! The onboarding tour: a fixed step catalog, the engine that walks it, the
//! rules that move it forward from user clicks, and the routines that open or
//! reset sibling UI around it.

pub mod engine;
pub mod listener;
pub mod prepare;
pub mod steps;
