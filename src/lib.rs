//! rollcall — a small authenticated roster service whose database is a
//! single CSV document in an immutable, CDN-fronted object store.
//!
//! The interesting part is the storage model: the backend has no
//! update-in-place and no read-your-writes on rewritten keys, so every
//! write creates a freshly-named immutable blob and atomically repoints
//! a well-known pointer object at it (see [`store::document`]).

pub mod config;
pub mod error;
pub mod gateway;
pub mod roster;
pub mod security;
pub mod session;
pub mod store;
