use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use num_cpus;

use server::Config;

impl Config {
    /// Create a config with defaults
    pub fn new() -> Config {
        Config::default()
    }
    /// Address to listen on, defaults to `0.0.0.0`
    pub fn host(&mut self, value: IpAddr) -> &mut Self {
        self.host = value;
        self
    }
    /// TCP port to listen on
    ///
    /// This is the only required setting.
    pub fn port(&mut self, value: u16) -> &mut Self {
        self.port = Some(value);
        self
    }
    /// Per-connection buffer size, also the write watermark above
    /// which response bodies stop being pulled (default 8192)
    pub fn buffer_size(&mut self, value: usize) -> &mut Self {
        self.buffer_size = value;
        self
    }
    /// Number of worker threads, each running its own reactor
    ///
    /// Zero (the default) means one worker per hardware thread.
    pub fn workers(&mut self, value: usize) -> &mut Self {
        self.workers = value;
        self
    }
    /// Maximum size of a request header block (default 8192)
    pub fn max_header_bytes(&mut self, value: usize) -> &mut Self {
        self.max_header_bytes = value;
        self
    }
    /// Maximum size of a single header field line (default 4096)
    pub fn max_field_bytes(&mut self, value: usize) -> &mut Self {
        self.max_field_bytes = value;
        self
    }
    /// Maximum size of a request body, unlimited by default
    ///
    /// Oversized fixed-length requests are answered with 413, chunked
    /// requests crossing the limit mid-stream close the connection.
    pub fn max_body_bytes(&mut self, value: u64) -> &mut Self {
        self.max_body_bytes = Some(value);
        self
    }
    /// How long a connection may sit without receiving a byte
    /// (default 30 seconds)
    pub fn idle_timeout(&mut self, value: Duration) -> &mut Self {
        self.idle_timeout = value;
        self
    }
    /// How long workers keep draining in-flight connections after
    /// `stop()` before force-closing them (default 5 seconds)
    pub fn shutdown_deadline(&mut self, value: Duration) -> &mut Self {
        self.shutdown_deadline = value;
        self
    }
    /// Invoked on the owning worker when a connection is accepted
    ///
    /// The callback must not block.
    pub fn on_connection<F>(&mut self, hook: F) -> &mut Self
        where F: Fn(SocketAddr) + Send + Sync + 'static
    {
        self.on_connection = Some(Arc::new(hook));
        self
    }
    /// Invoked on the owning worker when a connection goes away
    pub fn on_disconnection<F>(&mut self, hook: F) -> &mut Self
        where F: Fn(SocketAddr) + Send + Sync + 'static
    {
        self.on_disconnection = Some(Arc::new(hook));
        self
    }
    /// Invoked with the number of bytes read from a socket
    ///
    /// Serialized per connection, concurrent across connections.
    pub fn on_bytes_received<F>(&mut self, hook: F) -> &mut Self
        where F: Fn(SocketAddr, usize) + Send + Sync + 'static
    {
        self.on_bytes_received = Some(Arc::new(hook));
        self
    }
    /// Invoked with the number of bytes written to a socket
    pub fn on_bytes_sent<F>(&mut self, hook: F) -> &mut Self
        where F: Fn(SocketAddr, usize) + Send + Sync + 'static
    {
        self.on_bytes_sent = Some(Arc::new(hook));
        self
    }
    /// Create an Arc'd config clone to pass to the constructor
    ///
    /// This is just a convenience method.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }

    pub(crate) fn effective_workers(&self) -> usize {
        if self.workers == 0 { num_cpus::get() } else { self.workers }
    }

    pub(crate) fn hook_connection(&self, peer: Option<SocketAddr>) {
        if let (Some(addr), &Some(ref hook)) = (peer, &self.on_connection) {
            (**hook)(addr);
        }
    }

    pub(crate) fn hook_disconnection(&self, peer: Option<SocketAddr>) {
        if let (Some(addr), &Some(ref hook)) =
            (peer, &self.on_disconnection)
        {
            (**hook)(addr);
        }
    }

    pub(crate) fn hook_bytes_received(&self, peer: Option<SocketAddr>,
        bytes: usize)
    {
        if let (Some(addr), &Some(ref hook)) =
            (peer, &self.on_bytes_received)
        {
            (**hook)(addr, bytes);
        }
    }

    pub(crate) fn hook_bytes_sent(&self, peer: Option<SocketAddr>,
        bytes: usize)
    {
        if let (Some(addr), &Some(ref hook)) = (peer, &self.on_bytes_sent) {
            (**hook)(addr, bytes);
        }
    }
}
