//! HTTP/1.1 protocol layer.
//!
//! - **`connection`**: per-socket state machine driving parser, handler and writer
//! - **`parser`**: incremental byte-driven request parser
//! - **`request`**: the parsed request and the closed method set
//! - **`response`**: status codes, response bodies and head serialization
//! - **`writer`**: windowed response streaming
//! - **`mime`**: extension → content type table
//!
//! # Connection State Machine
//!
//! Every accepted socket serves exactly one request:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← feed bytes to the parser on read readiness
//!        └──────┬──────┘
//!               │ request complete (or parse failure → 400 / 505)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← validation, method dispatch, assembly
//!        └──────┬───────────┘
//!               │ response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← one window per write readiness
//!        └──────┬───────────┘
//!               │ body fully sent
//!               ▼
//!            Closed
//! ```

pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
