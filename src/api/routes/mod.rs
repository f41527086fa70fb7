//! API Routes
//!
//! Route handlers organized by functionality.

pub mod comments;
pub mod health;
pub mod posts;
