//! # Khazna Support
//!
//! Text helpers shared between the khazna crates.
//!
//! This crate provides:
//! - Bean-name derivation from type names
//! - Rendering of resolution chains and "did you mean?" hints for errors

pub mod naming;
pub mod rendering;
