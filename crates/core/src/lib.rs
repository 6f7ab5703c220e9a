//! Core rewriting and containment logic for the cocoon proxy.
//!
//! Everything in this crate is pure: target validation, the canonical
//! URL-rewrite function, and header translation. Streaming body transforms
//! live in `cocoon-stream`; the server pipeline lives in `cocoon-gateway`.

pub mod error;
pub mod headers;
pub mod policy;
pub mod rewrite;

pub use {
    error::{GuardError, Result},
    policy::AddressPolicy,
    rewrite::TARGET_PARAM,
};
