//! HTTP surface of the fxgate gateway.

pub mod error;
pub mod middleware;
pub mod router;
