//! Feed assembly for family stories: who may see what, which tags a story
//! carries, how a feed page is composed, and how comment threads are shaped.
//!
//! Everything here talks to storage through the [`backend::Backend`] and
//! [`backend::ObjectStore`] traits so it can run against SQLite in production
//! and against in-memory doubles in tests.

pub mod backend;
pub mod comments;
pub mod context;
pub mod dashboard;
pub mod present;
pub mod publish;
pub mod query;
pub mod saga;
pub mod tags;
pub mod visibility;

#[cfg(test)]
mod testing;

pub use backend::{Backend, BackendError, BackendResult, ObjectStore};
pub use context::{AccessError, ViewerContext};
