//! BIP-39 mnemonic generation and parsing.

use bip39::{Language, Mnemonic};
use ghost_core::constants::MNEMONIC_ENTROPY_LEN;
use ghost_core::types::SeedPhrase;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::WalletError;

/// Generate a fresh 12-word English mnemonic from OS randomness.
pub fn generate_mnemonic() -> Result<SeedPhrase, WalletError> {
    let mut entropy = Zeroizing::new([0u8; MNEMONIC_ENTROPY_LEN]);
    rand::rngs::OsRng.fill_bytes(entropy.as_mut());
    let m = Mnemonic::from_entropy_in(Language::English, entropy.as_ref())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    Ok(SeedPhrase::new(m.to_string()))
}

/// Validate a user-supplied phrase.
///
/// Normalizes whitespace and converts to lowercase before parsing. Any
/// BIP-39 word count (12 to 24) is accepted.
pub fn parse_mnemonic(phrase: &str) -> Result<SeedPhrase, WalletError> {
    let normalized = Zeroizing::new(
        phrase
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
    );
    let m = Mnemonic::parse_in(Language::English, normalized.as_str())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    Ok(SeedPhrase::new(m.to_string()))
}

/// 64-byte BIP-39 seed with an empty passphrase.
pub(crate) fn to_seed_bytes(seed: &SeedPhrase) -> Result<Zeroizing<[u8; 64]>, WalletError> {
    let m = Mnemonic::parse_in(Language::English, seed.as_str())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(m.to_seed("")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PHRASE: &str = "test test test test test test test test test test test junk";

    #[test]
    fn generated_mnemonic_is_12_words() {
        let seed = generate_mnemonic().unwrap();
        assert_eq!(seed.word_count(), 12);
        assert!(parse_mnemonic(seed.as_str()).is_ok());
    }

    #[test]
    fn generated_mnemonics_differ() {
        let a = generate_mnemonic().unwrap();
        let b = generate_mnemonic().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let messy = "  TEST test\ttest test  test test test test test test test JUNK ";
        let seed = parse_mnemonic(messy).unwrap();
        assert_eq!(seed.as_str(), TEST_PHRASE);
    }

    #[test]
    fn invalid_word_rejected() {
        let err = parse_mnemonic("abandon abandon abandon invalidword").unwrap_err();
        assert!(matches!(err, WalletError::InvalidMnemonic(_)));
        assert!(err.to_string().contains("invalid mnemonic"));
    }

    #[test]
    fn bad_checksum_rejected() {
        // "abandon" x11 + "zoo" fails the 12-word checksum.
        let mut phrase = vec!["abandon"; 11].join(" ");
        phrase.push_str(" zoo");
        assert!(parse_mnemonic(&phrase).is_err());
    }

    #[test]
    fn wrong_word_count_rejected() {
        assert!(parse_mnemonic("abandon abandon").is_err());
        assert!(parse_mnemonic("").is_err());
    }

    #[test]
    fn seed_bytes_known_vector() {
        // BIP-39 reference vector for the all-"abandon" phrase, empty passphrase.
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon \
                      abandon abandon abandon about";
        let seed = parse_mnemonic(phrase).unwrap();
        let bytes = to_seed_bytes(&seed).unwrap();
        assert_eq!(hex::encode(&bytes[..8]), "5eb00bbddcf06908");
    }
}
