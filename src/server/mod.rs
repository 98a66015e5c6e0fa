//! HTTP server protocol implementation
//!
mod accept;
mod body;
mod config;
mod date;
mod error;
mod parser;
mod proto;
mod request;
mod request_target;
mod response;
mod router;
mod simple_error_page;
mod writer;

pub use self::accept::{BackgroundServer, Server, ShutdownReport,
    StopHandle};
pub use self::body::{BodySink, BodySource, IterSource, MemSource};
pub use self::error::Error;
pub use self::proto::Proto;
pub use self::request::Request;
pub use self::request_target::RequestTarget;
pub use self::response::Response;
pub use self::router::{Handler, Route, Router};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

type ConnectionHook = Arc<Fn(SocketAddr) + Send + Sync>;
type BytesHook = Arc<Fn(SocketAddr, usize) + Send + Sync>;

/// Fine-grained configuration of the HTTP server
#[derive(Clone)]
pub struct Config {
    host: IpAddr,
    port: Option<u16>,
    buffer_size: usize,
    workers: usize,
    max_header_bytes: usize,
    max_field_bytes: usize,
    max_body_bytes: Option<u64>,
    idle_timeout: Duration,
    shutdown_deadline: Duration,
    on_connection: Option<ConnectionHook>,
    on_disconnection: Option<ConnectionHook>,
    on_bytes_received: Option<BytesHook>,
    on_bytes_sent: Option<BytesHook>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: None,
            buffer_size: 8192,
            workers: 0,
            max_header_bytes: 8192,
            max_field_bytes: 4096,
            max_body_bytes: None,
            idle_timeout: Duration::from_secs(30),
            shutdown_deadline: Duration::from_secs(5),
            on_connection: None,
            on_disconnection: None,
            on_bytes_received: None,
            on_bytes_sent: None,
        }
    }
}
