//! # Anbar Support
//!
//! Shared helpers for the Anbar DI engine.
//!
//! This crate provides:
//! - Rendering of resolution chains and type names for error messages
//! - "Did you mean?" suggestions for unknown keys and provider ids

pub mod rendering;
