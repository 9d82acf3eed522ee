//! Shared helpers for integration tests.

mod server;

pub use server::TestServer;
