//! # quizly_core
//!
//! Session identity resolution for Quizly: token codec, identity cache,
//! user store, and the resolver every feature calls to identify the caller.

pub mod auth;
pub mod migrate;
pub mod models;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
