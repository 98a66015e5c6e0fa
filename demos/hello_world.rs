extern crate env_logger;
extern crate tk_serve;
#[macro_use] extern crate log;

use std::env;

use tk_serve::{Method, Status};
use tk_serve::server::{Config, Response, Router, Server};

fn main() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init().expect("init logging");

    let mut router = Router::new();
    router.add(Method::Get, "/", |_req| {
        Response::new(Status::Ok)
            .header("Server",
                concat!("tk-serve/", env!("CARGO_PKG_VERSION")))
            .body("Hello World!")
    });

    let cfg = Config::new()
        .port(8080)
        .on_connection(|addr| info!("{}: connected", addr))
        .on_disconnection(|addr| info!("{}: gone", addr))
        .done();

    let server = Server::bind(&cfg, router).expect("bind server");
    info!("serving on http://{}/", server.local_addr());
    server.run().expect("run server");
}
