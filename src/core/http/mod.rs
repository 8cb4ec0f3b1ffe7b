// src/core/http/mod.rs

//! Just enough HTTP/1.x to route a request: request-line parsing and the
//! growing-buffer read loop that fills it (§9.1 of the ambient stack).

pub mod request;

pub use request::{parse_request, read_request, Method, ParsedRequest, Target};
