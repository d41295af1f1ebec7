//! AES-CBC helpers for the AESV2 (128-bit) and AESV3 (256-bit) crypt filters.
//!
//! Encrypted PDF strings and streams carry a 16-byte IV followed by
//! PKCS#7-padded ciphertext.

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};

use crate::error::{PdfError, Result};

type Aes128CbcDec = Decryptor<aes::Aes128>;
type Aes256CbcDec = Decryptor<aes::Aes256>;
type Aes128CbcEnc = Encryptor<aes::Aes128>;
type Aes256CbcEnc = Encryptor<aes::Aes256>;

pub const AES_BLOCK: usize = 16;

fn bad_length(what: &str, len: usize) -> PdfError {
    PdfError::EncryptionError(format!("invalid AES {what} length: {len}"))
}

/// Decrypt without removing padding.
///
/// The key must be 16 or 32 bytes, the IV 16 bytes, and the data a
/// multiple of the block size.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % AES_BLOCK != 0 {
        return Err(bad_length("ciphertext", data.len()));
    }
    let mut buf = data.to_vec();
    match key.len() {
        16 => {
            Aes128CbcDec::new_from_slices(key, iv)
                .map_err(|_| bad_length("IV", iv.len()))?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|_| PdfError::EncryptionError("AES block decryption failed".into()))?;
        }
        32 => {
            Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|_| bad_length("IV", iv.len()))?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|_| PdfError::EncryptionError("AES block decryption failed".into()))?;
        }
        n => return Err(bad_length("key", n)),
    }
    Ok(buf)
}

/// Encrypt without padding; data must already be block aligned.
pub fn aes_cbc_encrypt_raw(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % AES_BLOCK != 0 {
        return Err(bad_length("plaintext", data.len()));
    }
    let mut buf = data.to_vec();
    let len = data.len();
    match key.len() {
        16 => {
            Aes128CbcEnc::new_from_slices(key, iv)
                .map_err(|_| bad_length("IV", iv.len()))?
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(|_| PdfError::EncryptionError("AES block encryption failed".into()))?;
        }
        32 => {
            Aes256CbcEnc::new_from_slices(key, iv)
                .map_err(|_| bad_length("IV", iv.len()))?
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(|_| PdfError::EncryptionError("AES block encryption failed".into()))?;
        }
        n => return Err(bad_length("key", n)),
    }
    Ok(buf)
}

/// Encrypt with PKCS#7 padding and prepend the IV, as stored in a PDF.
pub fn aes_encrypt_with_iv(key: &[u8], iv: &[u8; AES_BLOCK], data: &[u8]) -> Result<Vec<u8>> {
    let padded_len = (data.len() / AES_BLOCK + 1) * AES_BLOCK;
    let mut buf = vec![0u8; padded_len];
    buf[..data.len()].copy_from_slice(data);
    let ciphertext_len = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(|_| bad_length("IV", iv.len()))?
            .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
            .map_err(|_| PdfError::EncryptionError("AES padding failed".into()))?
            .len(),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|_| bad_length("IV", iv.len()))?
            .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
            .map_err(|_| PdfError::EncryptionError("AES padding failed".into()))?
            .len(),
        n => return Err(bad_length("key", n)),
    };
    let mut out = Vec::with_capacity(AES_BLOCK + ciphertext_len);
    out.extend_from_slice(iv);
    out.extend_from_slice(&buf[..ciphertext_len]);
    Ok(out)
}

/// Split off the leading IV, decrypt and strip padding.
///
/// Data shorter than one block is returned unchanged; an IV with no
/// ciphertext decrypts to nothing.
pub fn aes_decrypt_with_iv(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < AES_BLOCK {
        return Ok(data.to_vec());
    }
    let (iv, ciphertext) = data.split_at(AES_BLOCK);
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }
    // Some writers drop the final partial block; decrypt what is aligned.
    let aligned = ciphertext.len() - ciphertext.len() % AES_BLOCK;
    let plaintext = aes_cbc_decrypt(key, iv, &ciphertext[..aligned])?;
    Ok(unpad_aes(&plaintext).to_vec())
}

/// Remove PKCS#7 padding, leaving the data unchanged when the padding is invalid.
pub fn unpad_aes(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad_len = last as usize;
    if pad_len == 0 || pad_len > AES_BLOCK || pad_len > data.len() {
        return data;
    }
    let start = data.len() - pad_len;
    if data[start..].iter().all(|&b| b as usize == pad_len) {
        &data[..start]
    } else {
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_round_trip_128() {
        let key = [0x11u8; 16];
        let iv = [0x22u8; 16];
        let enc = aes_encrypt_with_iv(&key, &iv, b"hello world").unwrap();
        assert_eq!(enc.len(), 32);
        assert_eq!(&enc[..16], &iv);
        assert_eq!(aes_decrypt_with_iv(&key, &enc).unwrap(), b"hello world");
    }

    #[test]
    fn block_aligned_plaintext_gets_a_full_pad_block() {
        let key = [3u8; 32];
        let iv = [4u8; 16];
        let enc = aes_encrypt_with_iv(&key, &iv, &[9u8; 16]).unwrap();
        assert_eq!(enc.len(), 16 + 32);
        assert_eq!(aes_decrypt_with_iv(&key, &enc).unwrap(), vec![9u8; 16]);
    }

    #[test]
    fn wrong_key_length_is_an_error() {
        assert!(aes_cbc_decrypt(&[0u8; 5], &[0u8; 16], &[0u8; 16]).is_err());
    }

    #[test]
    fn unpad_leaves_invalid_padding() {
        assert_eq!(unpad_aes(&[1, 2, 3, 0]), &[1, 2, 3, 0]);
        assert_eq!(unpad_aes(&[1, 2, 2, 2]), &[1, 2]);
    }
}
