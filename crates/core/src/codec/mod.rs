//! Codec modules for PDF stream decoding and encryption.
//!
//! This module contains:
//! - `aes`: AES-CBC encryption/decryption
//! - `arcfour`: RC4 encryption
//! - `flate`: zlib inflate for object and cross-reference streams
//! - `predictor`: PNG predictor reversal

pub mod aes;
pub mod arcfour;
pub mod flate;
pub mod predictor;

// Re-export main functions for convenience
pub use aes::{aes_decrypt_with_iv, aes_encrypt_with_iv, unpad_aes};
pub use arcfour::{Arcfour, rc4, rc4_rounds};
pub use flate::{inflate, inflate_lenient};
pub use predictor::png_unpredict;
