//! Bitcrypt - Streaming Bitwise File and Device Encryption
//!
//! Encrypts files against a raw key file with a byte-for-byte keystream
//! transform. The transform is an involution: running it twice with the
//! same key restores the original bytes, so one operation serves as both
//! encrypt and decrypt, steered only by the `.bit` filename suffix.
//!
//! ## File Lifecycle
//!
//! Each selected file goes through the following stages:
//!
//! ```text
//! Source → Transform → Destination (±.bit) → Attributes → Shred → Gated delete
//! ```
//!
//! - **Transform**: XOR against the cyclically repeated key, zero key
//!   bytes complemented so no plaintext byte ever passes through
//! - **Attributes**: timestamps, permissions, and ownership copied to
//!   the destination
//! - **Shred**: the plaintext is overwritten in place with the
//!   encrypted bytes
//! - **Gated delete**: the source is removed only when source and
//!   destination sizes are non-zero and exactly equal
//!
//! Keys can also be deployed redundantly onto raw block devices, masked
//! with OS randomness and mirrored across two sector ranges.
//!
//! ## Example
//!
//! ```no_run
//! use bitcrypt::{CancelToken, EncryptOptions, Encryptor, NullReporter};
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//!
//! let encryptor = Encryptor::new(
//!     EncryptOptions::default(),
//!     Arc::new(NullReporter),
//!     CancelToken::new(),
//! );
//!
//! // First run appends ".bit" and encrypts; a second run on the
//! // ".bit" file decrypts.
//! let summary = encryptor
//!     .encrypt_selection(&[PathBuf::from("photo.jpg")], Path::new("my.key"))
//!     .unwrap();
//! println!("Processed {} file(s)", summary.files_processed);
//! ```

pub mod attrs;
pub mod cipher;
pub mod control;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod validate;

pub use control::CancelToken;
pub use device::{device_size, read_lba, verify_mirror, KeyWriter, LbaRange, SECTOR_SIZE};
pub use error::{BitcryptError, Result};
pub use pipeline::{
    toggle_suffix, EncryptOptions, Encryptor, RunSummary, DEFAULT_BUFFER_SIZE, ENCRYPTED_SUFFIX,
};
pub use report::{ConsoleReporter, NullReporter, Reporter};
