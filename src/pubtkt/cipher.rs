//! OpenSSL compatible symmetric encryption.
//!
//! Whole tickets are encrypted the way `openssl enc -aes-256-{ecb,cbc} -a`
//! does it: key and IV come from the legacy `EVP_BytesToKey` schedule (MD5,
//! one round) over the passphrase and an optional 8-byte salt, and the result
//! is `base64("Salted__" || salt || ciphertext)`. Input without the `Salted__`
//! marker is read as unsalted.
//!
//! The basic-auth passthrough field uses a separate container:
//! `base64(iv || ciphertext)`, AES-128-CBC with the raw 16-byte key.

use aes::{Aes128, Aes256};
use base64ct::{Base64, Encoding};
use cbc::cipher::{
    block_padding::{NoPadding, Pkcs7},
    BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit,
};
use md5::{Digest, Md5};
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use std::{fmt, str::FromStr};

use super::error::{Error, Result};

const SALT_MARKER: &[u8] = b"Salted__";
const SALT_LEN: usize = 8;
const BLOCK_LEN: usize = 16;
const KEY_LEN: usize = 32;
const BAUTH_KEY_LEN: usize = 16;

/// Block cipher mode used for whole-ticket encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherMethod {
    Ecb,
    #[default]
    Cbc,
}

impl FromStr for CipherMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ecb" => Ok(Self::Ecb),
            "cbc" => Ok(Self::Cbc),
            other => Err(Error::Options(format!("unknown cipher method {other}"))),
        }
    }
}

impl fmt::Display for CipherMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ecb => f.write_str("ecb"),
            Self::Cbc => f.write_str("cbc"),
        }
    }
}

/// `EVP_BytesToKey(aes-256, md5, salt, passphrase, count = 1)`.
fn bytes_to_key(passphrase: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; BLOCK_LEN]) {
    let mut material = Vec::with_capacity(KEY_LEN + BLOCK_LEN + 16);
    let mut prev: Vec<u8> = Vec::new();

    while material.len() < KEY_LEN + BLOCK_LEN {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(passphrase);
        hasher.update(salt);
        prev = hasher.finalize().to_vec();
        material.extend_from_slice(&prev);
    }

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&material[..KEY_LEN]);
    let mut iv = [0u8; BLOCK_LEN];
    iv.copy_from_slice(&material[KEY_LEN..KEY_LEN + BLOCK_LEN]);

    (key, iv)
}

/// Encrypt `plaintext` with a fresh random salt.
///
/// # Errors
///
/// Returns [`Error::Other`] if the system random source fails.
pub fn encrypt(passphrase: &str, plaintext: &[u8], method: CipherMethod) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| Error::Other(format!("failed to generate salt: {e}")))?;

    let (key, iv) = bytes_to_key(passphrase.as_bytes(), &salt);

    let ciphertext = match method {
        CipherMethod::Ecb => {
            ecb::Encryptor::<Aes256>::new(&key.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
        CipherMethod::Cbc => cbc::Encryptor::<Aes256>::new(&key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
    };

    let mut container = Vec::with_capacity(SALT_MARKER.len() + SALT_LEN + ciphertext.len());
    container.extend_from_slice(SALT_MARKER);
    container.extend_from_slice(&salt);
    container.extend_from_slice(&ciphertext);

    Ok(Base64::encode_string(&container))
}

/// Decrypt a salted or unsalted base64 container.
///
/// # Errors
///
/// Returns [`Error::Decrypt`] on malformed base64, a truncated or unaligned
/// ciphertext, or invalid padding.
pub fn decrypt(passphrase: &str, encoded: &str, method: CipherMethod) -> Result<Vec<u8>> {
    let data = Base64::decode_vec(encoded.trim()).map_err(|_| Error::Decrypt)?;

    let (salt, ciphertext) = match data.strip_prefix(SALT_MARKER) {
        Some(rest) if rest.len() >= SALT_LEN => rest.split_at(SALT_LEN),
        Some(_) => return Err(Error::Decrypt),
        None => (&[][..], data.as_slice()),
    };

    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(Error::Decrypt);
    }

    let (key, iv) = bytes_to_key(passphrase.as_bytes(), salt);

    match method {
        CipherMethod::Ecb => ecb::Decryptor::<Aes256>::new(&key.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        CipherMethod::Cbc => cbc::Decryptor::<Aes256>::new(&key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
    }
    .map_err(|_| Error::Decrypt)
}

/// Encrypt a basic-auth value for the `bauth` ticket field.
///
/// # Errors
///
/// Returns [`Error::Options`] if `key` is not 16 bytes long.
pub fn bauth_encrypt(value: &str, key: &str) -> Result<String> {
    let key = bauth_key(key)?;

    let mut iv = [0u8; BLOCK_LEN];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| Error::Other(format!("failed to generate iv: {e}")))?;

    let ciphertext = cbc::Encryptor::<Aes128>::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(value.as_bytes());

    let mut container = Vec::with_capacity(BLOCK_LEN + ciphertext.len());
    container.extend_from_slice(&iv);
    container.extend_from_slice(&ciphertext);

    Ok(Base64::encode_string(&container))
}

/// Decrypt a `bauth` ticket field.
///
/// # Errors
///
/// Returns [`Error::Options`] for a bad key length and [`Error::Decrypt`] for
/// anything wrong with the container.
pub fn bauth_decrypt(value: &str, key: &str) -> Result<String> {
    let key = bauth_key(key)?;

    let data = Base64::decode_vec(value.trim()).map_err(|_| Error::Decrypt)?;
    if data.len() <= BLOCK_LEN || data.len() % BLOCK_LEN != 0 {
        return Err(Error::Decrypt);
    }
    let (iv, ciphertext) = data.split_at(BLOCK_LEN);
    let iv: [u8; BLOCK_LEN] = iv.try_into().map_err(|_| Error::Decrypt)?;

    let mut plain = cbc::Decryptor::<Aes128>::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| Error::Decrypt)?;

    strip_bauth_padding(&mut plain);

    String::from_utf8(plain).map_err(|_| Error::Decrypt)
}

fn bauth_key(key: &str) -> Result<[u8; BAUTH_KEY_LEN]> {
    key.as_bytes().try_into().map_err(|_| {
        Error::Options(format!(
            "basic auth key must be {BAUTH_KEY_LEN} bytes, got {}",
            key.len()
        ))
    })
}

// Some issuers pad with NUL bytes; a PKCS#7 last byte is never NUL.
fn strip_bauth_padding(plain: &mut Vec<u8>) {
    match plain.last().copied() {
        Some(0) => {
            let len = plain.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            plain.truncate(len);
        }
        Some(n) if usize::from(n) <= BLOCK_LEN && usize::from(n) <= plain.len() => {
            let start = plain.len() - usize::from(n);
            if plain[start..].iter().all(|b| *b == n) {
                plain.truncate(start);
            }
        }
        _ => {}
    }
}
