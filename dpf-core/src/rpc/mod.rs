// MIT License
// Copyright 2023--present dpf-core developers

//! Cap'n Proto RPC transport for [`crate::session::Session`].
//!
//! This module is only compiled when the `rpc` Cargo feature is enabled.
//!
//! ## Schema
//!
//! The [`schema`] submodule contains the Rust code generated from
//! `schema/Dpf.capnp` by `capnpc` during `build.rs`. The schema defines:
//!
//! - `Value`: a union over every value that can be bound to or fetched from
//!   a pin (scalars, vectors, fields, scopings, containers, data sources and
//!   server-owned entities).
//! - `Input`: either a value or a reference to another instance's output.
//! - `Dpf` interface: `ping`, `loadPlugin`, `instantiate`, `bindInput`,
//!   `evaluate`, `fetchOutput`, `release`.
//!
//! ## Client
//!
//! [`client::RpcSession`] implements `Session` with blocking methods.
//! A worker thread holds the one connection on a `LocalSet`, because
//! `capnp_rpc::RpcSystem` is `!Send` while a session must be.
//!
//! ## Server
//!
//! [`server::RpcServer`] serves a [`crate::loopback::LoopbackSession`] over
//! the same schema. All connections share that one session, so handles
//! obtained on one connection are valid on the next.

#[allow(non_snake_case, clippy::all)]
pub mod Dpf_capnp {
    include!(concat!(env!("OUT_DIR"), "/Dpf_capnp.rs"));
}

pub use Dpf_capnp as schema;

pub mod client;
pub(crate) mod convert;
pub mod server;

pub use client::RpcSession;
pub use server::RpcServer;

impl From<capnp::Error> for crate::error::Error {
    fn from(e: capnp::Error) -> Self {
        crate::error::Error::Transport(e.to_string())
    }
}
