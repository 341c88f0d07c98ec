//! Public identity derivation.
//!
//! The public account is the standard Ethereum account of the mnemonic:
//! BIP-39 seed (empty passphrase), BIP-32 path `m/44'/60'/0'/0/0`,
//! secp256k1 public key, Keccak-256, last 20 bytes. Addresses are rendered
//! with the EIP-55 mixed-case checksum.

use bip32::{DerivationPath, XPrv};
use ghost_core::constants::ETH_DERIVATION_PATH;
use ghost_core::types::SeedPhrase;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::WalletError;
use crate::mnemonic::to_seed_bytes;

/// The public-chain side of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIdentity {
    /// EIP-55 checksummed `0x` address.
    pub address: String,
}

/// Derive the public account address of `seed`.
pub fn derive_public_identity(seed: &SeedPhrase) -> Result<PublicIdentity, WalletError> {
    let seed_bytes = to_seed_bytes(seed)?;
    let path: DerivationPath = ETH_DERIVATION_PATH
        .parse()
        .map_err(|e: bip32::Error| WalletError::KeyDerivation(e.to_string()))?;
    let xprv = XPrv::derive_from_path(seed_bytes.as_ref(), &path)
        .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;

    let public_key = k256::PublicKey::from(xprv.private_key().verifying_key());
    let encoded = public_key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag.
    let digest = Keccak256::digest(&encoded.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);

    Ok(PublicIdentity {
        address: to_checksum_address(&address),
    })
}

/// EIP-55 checksum encoding of a 20-byte address.
pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = Keccak256::digest(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Whether `s` is a `0x` address whose letter casing is a valid EIP-55
/// checksum. All-lowercase and all-uppercase forms are accepted unchecked.
pub fn is_valid_address(s: &str) -> bool {
    let Some(body) = s.strip_prefix("0x") else {
        return false;
    };
    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    let Ok(bytes) = hex::decode(body) else {
        return false;
    };
    let lower = body.to_ascii_lowercase();
    let upper = body.to_ascii_uppercase();
    if body == lower || body == upper {
        return true;
    }
    let mut address = [0u8; 20];
    address.copy_from_slice(&bytes);
    to_checksum_address(&address) == s
}
