pub mod access;
pub mod cookie_helpers;
pub mod directory;
pub mod gate;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod session;
