//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Cull: Trims the cache table at a configured interval

mod cull;

pub use cull::CullTask;
