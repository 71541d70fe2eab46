//! Deterministic, pure logic shared by the protocol engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod capabilities;
pub mod chat_format;
pub mod parser;
pub mod store;
pub mod types;
