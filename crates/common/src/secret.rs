//! Secret wrappers for values that must never reach a log line.
//!
//! The relay holds exactly one long-lived secret: the HS256 key shared with
//! the credential issuer. Raw credentials passing through the transport are
//! secrets too. Both are carried in these types, whose `Debug` output is
//! redacted, so structs that derive `Debug` stay safe to trace.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let key = SecretString::from("shared-hmac-key");
//! assert!(!format!("{key:?}").contains("shared-hmac-key"));
//! assert_eq!(key.expose_secret(), "shared-hmac-key");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
