//! Request and Response models for the cache server API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{DeltaQuery, KeysRequest, SetManyRequest, SetRequest, TouchRequest, VersionQuery};
pub use responses::{
    AddResponse, ClearResponse, CullResponse, DeleteManyResponse, DeleteResponse, GetManyResponse,
    GetResponse, HasKeyResponse, HealthResponse, IncrResponse, SetManyResponse, SetResponse,
    StatsResponse, TouchResponse, VersionResponse,
};
