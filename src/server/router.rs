//! Mapping of `(method, path)` pairs to handlers

use std::collections::HashMap;
use std::fmt;

use enums::Method;
use server::request::Request;
use server::response::Response;

/// The handler capability: borrow the request, produce a response
pub type Handler = Box<Fn(&mut Request) -> Response + Send + Sync>;

/// Outcome of a route lookup
pub enum Route<'a> {
    Found(&'a Handler),
    /// Synthesized `OPTIONS` answer carrying the `Allow` list
    Options(String),
    NotFound,
}

impl<'a> fmt::Debug for Route<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Route::Found(_) => write!(f, "Found(..)"),
            Route::Options(ref allow) => write!(f, "Options({:?})", allow),
            Route::NotFound => write!(f, "NotFound"),
        }
    }
}

/// Exact-path request router
///
/// Routes are registered before the server starts and are immutable
/// afterwards; lookups take no locks.
pub struct Router {
    routes: HashMap<Method, HashMap<String, Handler>>,
    synthesize_options: bool,
    head_fallback: bool,
}

impl Router {
    pub fn new() -> Router {
        Router {
            routes: HashMap::new(),
            synthesize_options: false,
            head_fallback: false,
        }
    }

    /// Register a handler for the exact `(method, path)` pair
    ///
    /// # Panics
    ///
    /// When the pair is already registered. Routing tables are built
    /// once at startup, a duplicate is always a programming error.
    pub fn add<H>(&mut self, method: Method, path: &str, handler: H)
        -> &mut Router
        where H: Fn(&mut Request) -> Response + Send + Sync + 'static
    {
        let by_path = self.routes.entry(method.clone())
            .or_insert_with(HashMap::new);
        if by_path.insert(path.to_string(), Box::new(handler)).is_some() {
            panic!("duplicate route {} {}", method, path);
        }
        self
    }

    /// Answer `OPTIONS` for any path that has handlers with a
    /// synthesized `204` carrying an `Allow` list (default off)
    pub fn synthesize_options(&mut self, enable: bool) -> &mut Router {
        self.synthesize_options = enable;
        self
    }

    /// Serve `HEAD` through the `GET` handler when no explicit `HEAD`
    /// route exists (default off); the serializer drops the body
    pub fn head_fallback(&mut self, enable: bool) -> &mut Router {
        self.head_fallback = enable;
        self
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Route {
        if let Some(handler) = self.routes.get(method)
            .and_then(|by_path| by_path.get(path))
        {
            return Route::Found(handler);
        }
        if *method == Method::Head && self.head_fallback {
            if let Some(handler) = self.routes.get(&Method::Get)
                .and_then(|by_path| by_path.get(path))
            {
                return Route::Found(handler);
            }
        }
        if *method == Method::Options && self.synthesize_options {
            let mut allow: Vec<&str> = self.routes.iter()
                .filter(|&(_, by_path)| by_path.contains_key(path))
                .map(|(method, _)| method.as_str())
                .collect();
            if !allow.is_empty() {
                allow.sort();
                return Route::Options(allow.join(", "));
            }
        }
        Route::NotFound
    }
}
