//! # Economy Harness Core
//!
//! Pure logic for Economy Harness: the record shape model, the XML reader
//! and writer, structural extraction, normalization into field rows,
//! XML reconstruction, manifest synchronization, and the store abstraction.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Everything here
//! operates on strings and in-memory values so it can be tested in
//! isolation and reused by other front-ends.
//!
//! ## Pipeline
//!
//! ```text
//! XML text ──▶ xml::parse_document ──▶ extract::extract_records ──▶ Shape
//!                                                                    │
//!                          normalize::decompose ◀────────────────────┘
//!                                   │
//!                                   ▼
//!                      FieldRow + classifications + flags (store)
//!                                   │
//!                          normalize::compose
//!                                   │
//!                                   ▼
//!             reconstruct::reconstruct ──▶ reconstruct::write_document
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`error`] | Typed error taxonomy |
//! | [`shape`] | Nested record value model |
//! | [`xml`] | Minimal element tree built on `quick-xml` |
//! | [`extract`] | XML element → [`shape::Shape`] |
//! | [`normalize`] | Shape ↔ field rows, vocabularies, flags |
//! | [`reconstruct`] | Shape → XML element and file text |
//! | [`manifest`] | `cfgeconomycore.xml` reading and rewriting |
//! | [`limits`] | `cfglimitsdefinition.xml` vocabulary seeds |
//! | [`store`] | Storage trait and in-memory backend |

pub mod error;
pub mod extract;
pub mod limits;
pub mod manifest;
pub mod normalize;
pub mod reconstruct;
pub mod shape;
pub mod store;
pub mod xml;

pub use error::Error;
