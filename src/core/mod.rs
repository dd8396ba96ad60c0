//! Core types and error handling shared by every binkeeper component.
//!
//! - [`error`] - the [`UpdateError`] taxonomy, retry classification, and
//!   user-friendly error rendering

pub mod error;

pub use error::{ErrorContext, RetryKind, UpdateError, user_friendly_error};
