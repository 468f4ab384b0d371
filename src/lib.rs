//! Core library for the vqd daemon.
//!
//! vqd is a distributed, read-only query proxy for VMware vSphere
//! endpoints. Clients send self-describing JSON task requests to a broker,
//! which fans them out over a pool of workers; each worker multiplexes
//! long-lived vSphere sessions and dispatches requests through a static
//! task registry. This crate exposes the broker, worker, client, session
//! and task-catalog building blocks used by the `vqd` binary.

#![cfg_attr(test, expect(clippy::unwrap_used, reason = "test code can panic"))]
#![cfg_attr(test, expect(clippy::expect_used, reason = "test code can panic"))]
#![cfg_attr(test, expect(clippy::str_to_string, reason = "test code"))]

pub mod client;
pub mod config;
pub mod db;
pub mod helpers;
pub mod mgmt;
pub mod models;
pub mod protocol;
pub mod proxy;
pub mod registry;
pub mod schema;
pub mod session;
pub mod tasks;
pub mod transport;
pub mod vim;
pub mod worker;
