//! Helpers behind the `labnorm` binary.
pub mod run;
pub mod transfer;
