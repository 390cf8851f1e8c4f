//! Reversible substitution cipher over URL-safe base64.
//!
//! Not encryption: it only keeps paths, queries and bodies unreadable at a glance.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;

use crate::{Error, ErrorContext, Result};

/// URL-safe base64 symbols plus the `=` pad, in index order.
pub const BASE_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_=";

const ALPHABET_LEN: usize = 65;

/// A validated substitution table.
#[derive(Clone)]
pub struct Cipher {
    forward: [u8; 128],
    backward: [u8; 128],
}

impl Cipher {
    /// Build a cipher from a permutation of [`BASE_ALPHABET`].
    pub fn new(alphabet: &str) -> Result<Self> {
        validate_alphabet(alphabet)?;
        let mut forward = [0u8; 128];
        let mut backward = [0u8; 128];
        for (plain, sub) in BASE_ALPHABET.bytes().zip(alphabet.bytes()) {
            forward[plain as usize] = sub;
            backward[sub as usize] = plain;
        }
        Ok(Self { forward, backward })
    }

    pub fn obfuscate(&self, plaintext: &str) -> String {
        URL_SAFE
            .encode(plaintext.as_bytes())
            .bytes()
            .map(|b| self.forward[b as usize] as char)
            .collect()
    }

    pub fn deobfuscate(&self, obfuscated: &str) -> Result<String> {
        let mut encoded = Vec::with_capacity(obfuscated.len());
        for ch in obfuscated.chars() {
            let mapped = if ch.is_ascii() {
                self.backward[ch as usize]
            } else {
                0
            };
            if mapped == 0 {
                return Err(Error::codec_with_context(
                    format!("character {ch:?} is not part of the cipher alphabet"),
                    ErrorContext::new().with_source("cipher"),
                ));
            }
            encoded.push(mapped);
        }
        let bytes = URL_SAFE.decode(&encoded).map_err(|e| {
            Error::codec_with_context(
                format!("invalid obfuscated payload: {e}"),
                ErrorContext::new().with_source("cipher"),
            )
        })?;
        String::from_utf8(bytes).map_err(|e| {
            Error::codec_with_context(
                format!("obfuscated payload is not UTF-8: {e}"),
                ErrorContext::new().with_source("cipher"),
            )
        })
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cipher(..)")
    }
}

/// Check that `alphabet` is a 65-symbol permutation of [`BASE_ALPHABET`].
pub fn validate_alphabet(alphabet: &str) -> Result<()> {
    let err = |details: String| {
        Error::configuration_with_context(
            "invalid cipher alphabet",
            ErrorContext::new()
                .with_field_path("cipher_alphabet")
                .with_details(details)
                .with_source("cipher"),
        )
    };

    let count = alphabet.chars().count();
    if count != ALPHABET_LEN {
        return Err(err(format!("expected {ALPHABET_LEN} symbols, got {count}")));
    }
    let mut seen = [false; 128];
    for ch in alphabet.chars() {
        if !ch.is_ascii() || !BASE_ALPHABET.contains(ch) {
            return Err(err(format!("symbol {ch:?} is not a base64url symbol")));
        }
        if std::mem::replace(&mut seen[ch as usize], true) {
            return Err(err(format!("symbol {ch:?} appears twice")));
        }
    }
    Ok(())
}

/// One-shot form of [`Cipher::obfuscate`].
pub fn obfuscate(plaintext: &str, alphabet: &str) -> Result<String> {
    Ok(Cipher::new(alphabet)?.obfuscate(plaintext))
}

/// One-shot form of [`Cipher::deobfuscate`].
pub fn deobfuscate(obfuscated: &str, alphabet: &str) -> Result<String> {
    Cipher::new(alphabet)?.deobfuscate(obfuscated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reversed() -> String {
        BASE_ALPHABET.chars().rev().collect()
    }

    #[test]
    fn test_identity_alphabet_is_plain_base64url() {
        let c = Cipher::new(BASE_ALPHABET).unwrap();
        assert_eq!(c.obfuscate("hi?"), "aGk_");
        assert_eq!(c.obfuscate("a"), "YQ==");
    }

    #[test]
    fn test_substitution_changes_output() {
        let c = Cipher::new(&reversed()).unwrap();
        let out = c.obfuscate("orders");
        assert_ne!(out, URL_SAFE.encode("orders"));
        assert_eq!(c.deobfuscate(&out).unwrap(), "orders");
    }

    #[test]
    fn test_empty_string_round_trips() {
        let c = Cipher::new(&reversed()).unwrap();
        assert_eq!(c.obfuscate(""), "");
        assert_eq!(c.deobfuscate("").unwrap(), "");
    }

    #[test]
    fn test_rejects_malformed_alphabets() {
        assert!(validate_alphabet("abc").is_err());
        let dup = format!("A{}", &BASE_ALPHABET[..64]);
        assert!(validate_alphabet(&dup).is_err());
        let foreign = format!("{}!", &BASE_ALPHABET[..64]);
        assert!(validate_alphabet(&foreign).is_err());
    }

    #[test]
    fn test_deobfuscate_rejects_foreign_symbols() {
        let c = Cipher::new(BASE_ALPHABET).unwrap();
        assert!(c.deobfuscate("ab!c").is_err());
        assert!(c.deobfuscate("é").is_err());
    }

    fn alphabet_strategy() -> impl Strategy<Value = String> {
        Just(BASE_ALPHABET.chars().collect::<Vec<_>>())
            .prop_shuffle()
            .prop_map(|chars| chars.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_round_trip(s in any::<String>(), alphabet in alphabet_strategy()) {
            let out = obfuscate(&s, &alphabet).unwrap();
            prop_assert_eq!(deobfuscate(&out, &alphabet).unwrap(), s);
        }
    }
}
