//! Authentication primitives
//!
//! Provides the building blocks the account service composes:
//! - Password hashing (Argon2id)
//! - Signed session tokens (HMAC JWT) with access and refresh lifetimes
//! - Opaque random tokens for single-use flows such as password reset
//!
//! None of these types hold global state. Each is constructed explicitly
//! and owned by whoever wires the service together.
//!
//! # Examples
//!
//! ## Password Hashing
//! ```
//! use auth::PasswordHasher;
//!
//! let hasher = PasswordHasher::new();
//! let hash = hasher.hash("my_password").unwrap();
//! assert!(hasher.verify("my_password", &hash));
//! assert!(!hasher.verify("not_my_password", &hash));
//! ```
//!
//! ## Session Tokens
//! ```
//! use auth::{TokenCodec, TokenKind, TokenSettings};
//! use chrono::Utc;
//!
//! let codec = TokenCodec::new(b"secret_key_at_least_32_bytes_long!", TokenSettings::default()).unwrap();
//! let now = Utc::now();
//! let token = codec.issue("user123", TokenKind::Access, now).unwrap();
//! assert_eq!(codec.extract_subject(&token, now).unwrap(), "user123");
//! ```
//!
//! ## Opaque Tokens
//! ```
//! use auth::random::{generate_token, token_digest, OsRandom};
//!
//! let token = generate_token(&OsRandom);
//! let stored = token_digest(&token);
//! assert_eq!(stored, token_digest(&token));
//! ```

pub mod jwt;
pub mod password;
pub mod random;

// Re-export commonly used items
pub use jwt::Claims;
pub use jwt::Rejection;
pub use jwt::TokenCodec;
pub use jwt::TokenError;
pub use jwt::TokenKind;
pub use jwt::TokenSettings;
pub use password::PasswordError;
pub use password::PasswordHasher;
pub use random::OsRandom;
pub use random::SecureRandom;
