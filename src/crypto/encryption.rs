//! AES-256-GCM Encryption Implementation
//!
//! Packages are encrypted with AES-256-GCM which provides:
//! - Confidentiality: the build is unreadable without the password
//! - Integrity: any tampering is detected
//! - Authentication: a successful tag check proves the password matches
//!
//! The authentication tag travels separately from the ciphertext in the
//! envelope, so both directions here work with a detached tag.

use crate::crypto::{derive_key, DerivedKey, HashId, IV_SIZE, PBKDF2_ITERATIONS, SALT_SIZE, TAG_SIZE};
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use rand::RngCore;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use tracing::debug;
use zeroize::Zeroizing;

fn aead_key(key: &DerivedKey) -> Result<LessSafeKey> {
    let unbound_key = UnboundKey::new(&AES_256_GCM, key.key())
        .map_err(|_| Error::Encryption("Failed to create AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound_key))
}

/// Encrypt data using AES-256-GCM
///
/// # Returns
/// Ciphertext and the detached 16-byte authentication tag
pub fn encrypt(key: &DerivedKey, iv: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let sealing_key = aead_key(key)?;
    let nonce = Nonce::try_assume_unique_for_key(iv)
        .map_err(|_| Error::Encryption(format!("Invalid IV length: {}", iv.len())))?;

    let mut in_out = plaintext.to_vec();
    let tag = sealing_key
        .seal_in_place_separate_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| Error::Encryption("Encryption failed".to_string()))?;

    Ok((in_out, tag.as_ref().to_vec()))
}

/// Decrypt data using AES-256-GCM
///
/// The tag is verified over the whole ciphertext before anything is
/// returned. On failure the working buffer is wiped and no plaintext
/// escapes.
///
/// # Arguments
/// * `key` - Key derived from the viewer's password
/// * `iv` - 12-byte GCM nonce
/// * `ciphertext` - Encrypted bytes without the tag
/// * `auth_tag` - 16-byte GCM tag
pub fn decrypt(key: &DerivedKey, iv: &[u8], ciphertext: &[u8], auth_tag: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != IV_SIZE || auth_tag.len() != TAG_SIZE {
        return Err(Error::AuthenticationFailed);
    }

    let opening_key = aead_key(key)?;
    let nonce = Nonce::try_assume_unique_for_key(iv).map_err(|_| Error::AuthenticationFailed)?;

    let mut in_out = Zeroizing::new(Vec::with_capacity(ciphertext.len() + TAG_SIZE));
    in_out.extend_from_slice(ciphertext);
    in_out.extend_from_slice(auth_tag);

    let plaintext = opening_key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| Error::AuthenticationFailed)?;

    Ok(plaintext.to_vec())
}

/// Encrypt a package for a password, producing a fresh envelope
///
/// Generates a random salt and IV; the key is derived with the wire-contract
/// iteration count and SHA-256. An empty package is rejected.
pub fn seal_package(password: &str, plaintext: &[u8]) -> Result<Envelope> {
    if plaintext.is_empty() {
        return Err(Error::Encryption("package is empty".to_string()));
    }

    let mut salt = [0u8; SALT_SIZE];
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut iv);

    let key = derive_key(password, &salt, PBKDF2_ITERATIONS, HashId::Sha256)?;
    let (ciphertext, auth_tag) = encrypt(&key, &iv, plaintext)?;

    debug!("Sealed package: {} plaintext bytes", plaintext.len());
    Envelope::new(salt.to_vec(), iv.to_vec(), auth_tag, ciphertext)
}

/// Decrypt an envelope with a password
pub fn open_package(password: &str, envelope: &Envelope) -> Result<Vec<u8>> {
    let key = derive_key(password, envelope.salt(), PBKDF2_ITERATIONS, HashId::Sha256)?;
    decrypt(&key, envelope.iv(), envelope.ciphertext(), envelope.auth_tag())
}

/// Known-answer round trip proving the AEAD primitive works in this process
pub fn self_test() -> bool {
    let key = DerivedKey::from_bytes([0x42; 32]);
    let iv = [0x24; IV_SIZE];
    let probe = b"portalcrypt self-test";

    let Ok((ciphertext, tag)) = encrypt(&key, &iv, probe) else {
        return false;
    };
    if ciphertext.as_slice() == probe.as_slice() {
        return false;
    }
    matches!(decrypt(&key, &iv, &ciphertext, &tag), Ok(plain) if plain == probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_key() -> DerivedKey {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        DerivedKey::from_bytes(key)
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = test_key();
        let iv = [1u8; IV_SIZE];
        let plaintext = b"Hello, portal!";

        let (ciphertext, tag) = encrypt(&key, &iv, plaintext).unwrap();
        assert_eq!(tag.len(), TAG_SIZE);
        assert_eq!(ciphertext.len(), plaintext.len());

        let decrypted = decrypt(&key, &iv, &ciphertext, &tag).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let iv = [1u8; IV_SIZE];
        let (ciphertext, tag) = encrypt(&test_key(), &iv, b"Secret data").unwrap();

        let result = decrypt(&test_key(), &iv, &ciphertext, &tag);
        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key();
        let iv = [1u8; IV_SIZE];
        let (mut ciphertext, tag) = encrypt(&key, &iv, b"Secret data").unwrap();
        ciphertext[0] ^= 0xFF;

        let result = decrypt(&key, &iv, &ciphertext, &tag);
        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = test_key();
        let iv = [1u8; IV_SIZE];
        let (ciphertext, mut tag) = encrypt(&key, &iv, b"Secret data").unwrap();
        tag[15] ^= 0x01;

        let result = decrypt(&key, &iv, &ciphertext, &tag);
        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_short_tag_fails() {
        let key = test_key();
        let iv = [1u8; IV_SIZE];
        let (ciphertext, tag) = encrypt(&key, &iv, b"Secret data").unwrap();

        let result = decrypt(&key, &iv, &ciphertext, &tag[..8]);
        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = test_key();
        let iv = [9u8; IV_SIZE];

        let (ciphertext, tag) = encrypt(&key, &iv, b"").unwrap();
        let decrypted = decrypt(&key, &iv, &ciphertext, &tag).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_package_round_trip() {
        let plaintext = vec![0x42u8; 64 * 1024];

        let envelope = seal_package("correct-horse", &plaintext).unwrap();
        assert_eq!(envelope.salt().len(), SALT_SIZE);
        assert_eq!(envelope.iv().len(), IV_SIZE);

        let opened = open_package("correct-horse", &envelope).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_package_wrong_password() {
        let envelope = seal_package("correct-horse", b"archive bytes").unwrap();
        let result = open_package("wrong", &envelope);
        assert!(matches!(result, Err(Error::AuthenticationFailed)));
    }

    #[test]
    fn test_seal_empty_package_rejected() {
        let result = seal_package("correct-horse", b"");
        assert!(matches!(result, Err(Error::Encryption(_))));
    }

    #[test]
    fn test_fresh_salt_and_iv_per_seal() {
        let a = seal_package("pw", b"same").unwrap();
        let b = seal_package("pw", b"same").unwrap();
        assert_ne!(a.salt(), b.salt());
        assert_ne!(a.iv(), b.iv());
    }

    #[test]
    fn test_self_test_passes() {
        assert!(self_test());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn test_round_trip_any_password(
            password in "[ -~]{1,32}",
            plaintext in proptest::collection::vec(any::<u8>(), 1..512),
            salt in any::<[u8; SALT_SIZE]>(),
            iv in any::<[u8; IV_SIZE]>(),
        ) {
            let key = derive_key(&password, &salt, 1_000, HashId::Sha256).unwrap();
            let (ciphertext, tag) = encrypt(&key, &iv, &plaintext).unwrap();
            prop_assert_eq!(decrypt(&key, &iv, &ciphertext, &tag).unwrap(), plaintext);

            let other = format!("{}!", password);
            let wrong = derive_key(&other, &salt, 1_000, HashId::Sha256).unwrap();
            prop_assert!(matches!(
                decrypt(&wrong, &iv, &ciphertext, &tag),
                Err(Error::AuthenticationFailed)
            ));
        }
    }
}
