//! Core types, algorithms, and the store trait for orgfold.
//!
//! This crate is deliberately free of database and I/O dependencies. It holds
//! the domain model (records, links, scrapes, sources), the identifier graph
//! that groups identifiers into components, and the canonicalization rules
//! that reduce a component to one related-organisation view.

pub mod canonical;
pub mod error;
pub mod graph;
pub mod orgid;
pub mod record;
pub mod scheme;
pub mod scrape;
pub mod source;
pub mod store;
pub mod view;

pub use error::{Error, Result};
pub use orgid::Orgid;
