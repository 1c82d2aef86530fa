#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Core functionality for the TokenKit mobile identity SDK.
//!
//! The crate currently ships the encrypted token-cache storage engine:
//! everything the SDK persists (access tokens, refresh tokens, id tokens)
//! is sealed at rest through [`cache_crypto`].

pub mod cache_crypto;
