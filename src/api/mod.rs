//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set`, `POST /add` - Store a value
//! - `GET /get/:key`, `POST /get_many` - Retrieve values
//! - `PUT /set_many` - Store several values at once
//! - `DELETE /del/:key`, `POST /delete_many`, `DELETE /clear` - Remove values
//! - `GET /has/:key` - Check for a live value
//! - `POST /incr/:key`, `POST /decr/:key` - Integer arithmetic
//! - `POST /incr_version/:key`, `POST /decr_version/:key` - Move a key between versions
//! - `POST /touch/:key` - Set a new timeout
//! - `POST /cull`, `GET /stats` - Table maintenance
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
