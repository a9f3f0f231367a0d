//! Core domain logic for the live detection console.
//!
//! Data model, operator selection, frame filtering and display geometry.
//! Nothing in this crate performs I/O.

pub mod backend;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod selection;
pub mod types;
