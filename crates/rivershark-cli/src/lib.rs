//! Library wrapper around the `rivershark` CLI implementation.
//!
//! The CLI is exercised through its binary (`src/main.rs`) and the integration
//! tests under `tests/`. Compiling the binary crate root as a module here lets
//! `cargo test -p rivershark-cli --lib` typecheck it without building the
//! binary test suite.

#[allow(dead_code)]
#[path = "main.rs"]
mod main_bin;
