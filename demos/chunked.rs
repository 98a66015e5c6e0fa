extern crate env_logger;
extern crate tk_serve;

use std::env;

use tk_serve::{Method, Status};
use tk_serve::server::{Config, IterSource, Response, Router, Server};

fn main() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init().expect("init logging");

    let mut router = Router::new();
    router.add(Method::Get, "/", |_req| {
        // one chunk per yielded vector
        let chunks = (1..6)
            .map(|i| format!("chunk number {}\n", i).into_bytes());
        Response::new(Status::Ok)
            .body_stream(Box::new(IterSource::new(chunks)), None)
    });

    let cfg = Config::new().port(8080).done();
    let server = Server::bind(&cfg, router).expect("bind server");
    println!("serving on http://{}/", server.local_addr());
    server.run().expect("run server");
}
