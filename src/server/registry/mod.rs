//! Registry introspection: catalog and tag listing, manifest resolution and
//! tag deletion against the upstream registry's HTTP API.

pub mod client;
pub mod deletion;
pub mod error;
pub mod handlers;
pub mod manifest;
pub mod models;
pub mod routes;
#[cfg(test)]
pub(crate) mod testing;
