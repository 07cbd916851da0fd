//! Payload encryption used by the appliance's local API.
//!
//! The appliance expects AES-256-CBC with PKCS#7 padding, a random 16-byte IV
//! prepended to the ciphertext, and the whole thing base64-encoded. The key is
//! the password padded with ASCII `'0'` (or truncated) to 32 bytes. That
//! derivation is weak, but the firmware only accepts exactly this.

use crate::errors::{Error, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use zeroize::Zeroize;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
const KEY_PAD: u8 = b'0';

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// 32 bytes of key material, wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

/// Right-pads with `'0'` and truncates, byte-wise, to exactly 32 bytes.
pub fn derive_key(password: &str) -> Key {
    let mut bytes = [KEY_PAD; KEY_LEN];
    let raw = password.as_bytes();
    let len = raw.len().min(KEY_LEN);
    bytes[..len].copy_from_slice(&raw[..len]);
    Key(bytes)
}

/// Encrypts under a fresh random IV and returns `base64(IV || ciphertext)`.
pub fn encrypt(plaintext: &str, key: &Key) -> String {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    encrypt_with_iv(plaintext, key, iv)
}

fn encrypt_with_iv(plaintext: &str, key: &Key, iv: [u8; IV_LEN]) -> String {
    let ciphertext = Aes256CbcEnc::new(&key.0.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut wire = Vec::with_capacity(IV_LEN + ciphertext.len());
    wire.extend_from_slice(&iv);
    wire.extend_from_slice(&ciphertext);
    STANDARD.encode(wire)
}

pub fn decrypt(blob: &str, key: &Key) -> Result<String> {
    let raw = STANDARD
        .decode(blob.trim())
        .map_err(|_| Error::Decrypt { reason: "invalid base64" })?;

    if raw.len() < IV_LEN {
        return Err(Error::Decrypt { reason: "payload shorter than IV" });
    }
    let (iv, ciphertext) = raw.split_at(IV_LEN);

    let plaintext = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|_| Error::Decrypt { reason: "invalid key or IV length" })?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::Decrypt { reason: "bad padding" })?;

    String::from_utf8(plaintext).map_err(|_| Error::Decrypt { reason: "invalid UTF-8" })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXED_IV: [u8; IV_LEN] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
    // AES-256-CBC of `{"reset":true}` under "mypw" padded with '0', IV 00..0f.
    const RESET_VECTOR: &str = "AAECAwQFBgcICQoLDA0OD6LgOafxDhXi2ptINFVyH4g=";

    #[test]
    fn test_short_password_is_zero_padded() {
        let key = derive_key("mypw");
        assert_eq!(key.as_bytes(), b"mypw0000000000000000000000000000");
    }

    #[test]
    fn test_long_password_is_truncated() {
        let key = derive_key("abcdefghijklmnopqrstuvwxyz0123456789");
        assert_eq!(key.as_bytes(), b"abcdefghijklmnopqrstuvwxyz012345");
    }

    #[test]
    fn test_exact_length_password_is_unchanged() {
        let password = "0123456789abcdef0123456789abcdef";
        assert_eq!(derive_key(password).as_bytes(), password.as_bytes());
    }

    #[test]
    fn test_matches_appliance_vector() {
        let key = derive_key("mypw");
        assert_eq!(encrypt_with_iv(r#"{"reset":true}"#, &key, FIXED_IV), RESET_VECTOR);
        assert_eq!(decrypt(RESET_VECTOR, &key).unwrap(), r#"{"reset":true}"#);
    }

    #[test]
    fn test_round_trip() {
        let key = derive_key("airqsetup");
        for plaintext in ["", "OK", r#"{"sound":{"freq":900,"vol":100,"length":1000}}"#, "äöü €"] {
            let blob = encrypt(plaintext, &key);
            assert_eq!(decrypt(&blob, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let key = derive_key("airqsetup");
        assert_ne!(encrypt("same", &key), encrypt("same", &key));
    }

    #[test]
    fn test_wrong_key_fails() {
        let plaintext = r#"{"health":934,"performance":637.528,"Status":"OK","uptime":503513}"#;
        let blob = encrypt(plaintext, &derive_key("right-password"));
        let err = decrypt(&blob, &derive_key("wrong-password")).unwrap_err();
        assert!(matches!(err, Error::Decrypt { .. }));
    }

    #[test]
    fn test_undersized_payload_fails() {
        let key = derive_key("mypw");
        let blob = STANDARD.encode([0u8; 8]);
        assert!(matches!(
            decrypt(&blob, &key),
            Err(Error::Decrypt { reason: "payload shorter than IV" })
        ));
    }

    #[test]
    fn test_iv_without_ciphertext_fails() {
        let key = derive_key("mypw");
        let blob = STANDARD.encode(FIXED_IV);
        assert!(matches!(decrypt(&blob, &key), Err(Error::Decrypt { .. })));
    }

    #[test]
    fn test_garbage_base64_fails() {
        let key = derive_key("mypw");
        assert!(matches!(
            decrypt("not base64 at all!", &key),
            Err(Error::Decrypt { reason: "invalid base64" })
        ));
    }
}
