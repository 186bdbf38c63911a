//! End-to-end checks for durable transaction nonces.
//!
//! A [`harness::Harness`] connects to a cluster and funds a payer; the
//! [`scenarios`] then create nonce accounts, build durable transactions with
//! [`durable::DurableTransactionBuilder`], carry them through a text
//! [`codec`], [`submit`] them, and check whether the stored nonce moved.

pub mod arg_parser;
pub mod codec;
pub mod config;
pub mod durable;
pub mod error;
pub mod harness;
pub mod nonce;
pub mod scenarios;
pub mod submit;

pub use crate::error::{Error, Result};
