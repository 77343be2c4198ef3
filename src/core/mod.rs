//! Core hub components: registry, session store, downstream client, tool
//! catalog, gateway, and the background refresh loop. Each is a plain,
//! independently-testable struct; `server.rs` wires them onto actix-web.

pub mod downstream_client;
pub mod gateway;
pub mod models;
pub mod refresh;
pub mod registry;
pub mod server;
pub mod session_store;
pub mod tool_catalog;
