//! End-to-end tests for the proxy live under `tests/`; this crate has no
//! library surface of its own.
