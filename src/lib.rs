//! webserv - HTTP/1.1 server for static files, uploads and CGI
//!
//! Core library: configuration, protocol handling, the response pipeline
//! and the connection event loop.

pub mod config;
pub mod handler;
pub mod http;
pub mod server;
