//! Derive macros for Anbar, re-exported from `anbar-macros`.

pub use anbar_macros::*;
