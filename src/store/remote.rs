//! The remote backend: wire protocol, client, and a reference server
//! (SPEC_FULL.md §4.2, §6).

mod protocol;

mod client;
pub use client::{RemoteStore, RemoteTransaction};

mod server;
pub use server::RemoteServer;
