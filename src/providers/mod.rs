//! External service implementations.
//!
//! This module contains provider traits and implementations for the two
//! collaborators the sweep talks to:
//!
//! - [`email`] - The mail store (Gmail API)
//! - [`ai`] - The inference endpoint (OpenAI-compatible, Groq by default)

pub mod ai;
pub mod email;
