extern crate tk_serve;

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tk_serve::{Method, Status};
use tk_serve::server::{BackgroundServer, Config, Response, Router, Server};

fn spawn_server(cfg: &mut Config) -> (BackgroundServer, SocketAddr) {
    let mut router = Router::new();
    router.add(Method::Get, "/",
        |_req| Response::new(Status::Ok).body("hi"));
    router.add(Method::Post, "/echo",
        |req| Response::new(Status::Ok).body(req.body().to_vec()));
    cfg.port(0).workers(2);
    let server = Server::bind(&cfg.done(), router).expect("bind");
    let addr = server.local_addr();
    let background = server.run_background().expect("spawn server");
    (background, addr)
}

fn connect(addr: &SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    stream
}

#[test]
fn end_to_end_over_tcp() {
    let counted = Arc::new(AtomicUsize::new(0));
    let counter = counted.clone();
    let mut cfg = Config::new();
    cfg.on_connection(move |_addr| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let (server, addr) = spawn_server(&mut cfg);

    {
        let mut client = connect(&addr);
        client.write_all(
            b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n\
              POST /echo HTTP/1.1\r\nHost: localhost\r\n\
              Content-Length: 5\r\nConnection: close\r\n\r\nhello")
            .unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        // both pipelined responses, in order, on one connection
        let first = response.find("\r\n\r\nhi").expect("first body");
        let second = response.find("\r\n\r\nhello").expect("second body");
        assert!(first < second, "out of order: {:?}", response);
        assert_eq!(response.matches("HTTP/1.1 200 OK\r\n").count(), 2);
        assert!(response.contains("Connection: close\r\n"));
    }

    assert_eq!(counted.load(Ordering::SeqCst), 1);
    let report = server.stop().expect("clean shutdown");
    assert_eq!(report.forced_workers, 0);
}

#[test]
fn requests_across_workers() {
    let (server, addr) = spawn_server(&mut Config::new());
    // more clients than workers, so the round-robin wraps around
    for _ in 0..5 {
        let mut client = connect(&addr);
        client.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\
            Connection: close\r\n\r\n").unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"),
            "bad response: {:?}", response);
        assert!(response.ends_with("\r\n\r\nhi"));
    }
    server.stop().expect("clean shutdown");
}
