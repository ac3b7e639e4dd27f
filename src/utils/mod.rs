//! # Utility Functions and Types
//!
//! Common helpers used throughout the picast crate:
//!
//! - Cryptographically random identifier generation
//! - Atomic file replacement and touch-style file creation
//!
//! ## Identifier Generation
//!
//! ```rust
//! use picast::utils::random_alphanumeric;
//!
//! let uid = random_alphanumeric(16);
//! assert_eq!(uid.len(), 16);
//! assert!(uid.chars().all(|c| c.is_ascii_alphanumeric()));
//! ```

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

/// Atomic file replacement and creation helpers
pub mod fileio;

/// Generates a random string of `len` characters drawn from `[A-Za-z0-9]`
/// using the operating system's cryptographic random source.
///
/// No uniqueness check is performed; at the lengths used for session and
/// stream identifiers, collisions are probabilistically negligible.
pub fn random_alphanumeric(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
