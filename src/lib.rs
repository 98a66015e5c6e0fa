//! Event-driven HTTP/1.1 server library for the tokio-rs stack
//!
//! The crate accepts TCP connections on an acceptor thread, hands them
//! off round-robin to a pool of worker threads (each one driving its own
//! reactor), incrementally parses HTTP/1.1 requests and dispatches them
//! to handlers registered on a [`Router`](server/struct.Router.html).
#![recursion_limit="100"]

extern crate futures;
extern crate httparse;
extern crate httpdate;
extern crate net2;
extern crate netbuf;
extern crate num_cpus;
extern crate tk_bufstream;
extern crate tokio_core;
extern crate tokio_io;
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;

pub mod server;
mod enums;
mod headers;
mod base_serializer;
mod chunked;
mod body_parser;

pub use enums::{Method, Status, Version};
