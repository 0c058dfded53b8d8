//! Pipeline stages for screenshot-to-record extraction.
//!
//! Each submodule implements exactly one step and is testable on its own.
//! Only [`extract`] talks to the network; only [`store`] touches the record
//! store file.
//!
//! ## Data Flow
//!
//! ```text
//! enumerate ──▶ checkpoint ──▶ extract ──▶ parse ──▶ store
//! (glob+sort)   (skip/trim)   (VLM call)  (JSON)    (persist)
//! ```
//!
//! 1. [`enumerate`]  — list screenshots; file-name order is page order
//! 2. [`checkpoint`] — load the store, drop a partial trailing page, decide
//!    how many leading screenshots are already done
//! 3. [`extract`]    — upload → infer → delete for one page, with retry
//! 4. [`parse`]      — fence stripping, shape handling, header key repair
//! 5. [`store`]      — whole-file JSON load and overwrite
//!
//! [`encode`] turns a screenshot into inline image data for backends that
//! take images in the request body.

pub mod checkpoint;
pub mod encode;
pub mod enumerate;
pub mod extract;
pub mod parse;
pub mod store;
