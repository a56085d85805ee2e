//! Recoverable ECDSA signatures over the Secp256k1 curve, in the 65-byte
//! `r||s||v` format that EVM tooling produces. Signers are identified by
//! the 20-byte address derived from their public key, so signatures can be
//! checked without separately supplied key material.

use std::hash::Hash;

use anyhow::bail;
use elliptic_curve::sec1::ToEncodedPoint as _;
use zeroize::ZeroizeOnDrop;

use crate::{keccak256::Keccak256, sha256::Sha256, ByteFmt, Text, TextFmt};

pub mod testonly;


const SIGNATURE_LENGTH: usize = 65;

/// Secp256k1 secret key.
#[derive(ZeroizeOnDrop, PartialEq, Eq)]
pub struct SecretKey(k256::ecdsa::SigningKey);

impl SecretKey {
    /// Generates a secret key from a cryptographically-secure entropy source.
    pub fn generate() -> Self {
        Self(k256::SecretKey::random(&mut rand::rngs::OsRng).into())
    }

    /// Gets the corresponding [`PublicKey`] for this [`SecretKey`].
    pub fn public(&self) -> PublicKey {
        PublicKey(*self.0.verifying_key())
    }

    /// Address of this key's signer.
    pub fn address(&self) -> Address {
        self.public().address()
    }

    /// Hashes the payload with SHA256 and signs the digest recoverably.
    pub fn sign_payload(&self, payload: &[u8]) -> anyhow::Result<Signature> {
        self.sign_hash(&Sha256::new(payload))
    }

    /// Signs a message digest.
    pub fn sign_hash(&self, hash: &Sha256) -> anyhow::Result<Signature> {
        let (sig, recid) = self.0.sign_prehash_recoverable(hash.as_bytes())?;
        Ok(Signature { sig, recid })
    }
}

impl ByteFmt for SecretKey {
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let sk = k256::ecdsa::SigningKey::from_slice(bytes)?;
        Ok(Self(sk))
    }

    fn encode(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey({:?})", self.address())
    }
}

/// Secp256k1 public key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PublicKey(k256::ecdsa::VerifyingKey);

impl PublicKey {
    /// Address of the signer holding this key: the last 20 bytes of the
    /// Keccak256 hash of the uncompressed SEC1 point, coordinates only.
    pub fn address(&self) -> Address {
        let point = self.0.to_encoded_point(false);
        let digest = Keccak256::new(&point.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&digest.as_bytes()[12..]);
        Address(address)
    }
}

impl ByteFmt for PublicKey {
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let vk = k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)?;
        Ok(Self(vk))
    }

    fn encode(&self) -> Vec<u8> {
        self.0.to_sec1_bytes().to_vec()
    }
}

impl Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write(&self.encode())
    }
}

/// 20-byte signer address derived from a Secp256k1 public key.
///
/// The byte representation is the canonical identity: text spellings of an
/// address differ only in capitalization, so parsing makes all further
/// comparisons case-insensitive.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Hex form with the mixed-case checksum capitalization (EIP-55):
    /// the i-th hex digit is uppercased iff the i-th nibble of
    /// Keccak256 of the lowercase hex form is >= 8.
    fn checksummed(&self) -> String {
        let hex = hex::encode(self.0);
        let digest = Keccak256::new(hex.as_bytes());
        let mut out = String::with_capacity(2 + hex.len());
        out.push_str("0x");
        for (i, c) in hex.chars().enumerate() {
            let byte = digest.as_bytes()[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl ByteFmt for Address {
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(Self(bytes.try_into()?))
    }

    fn encode(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl TextFmt for Address {
    fn decode(text: Text) -> anyhow::Result<Self> {
        text.strip_nocase("0x")?.decode_hex()
    }

    fn encode(&self) -> String {
        self.checksummed()
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.checksummed())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.checksummed())
    }
}

/// Secp256k1 signature with a recovery id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    sig: k256::ecdsa::Signature,
    /// Standard Recovery ID. Serialized to bytes shifted by 27,
    /// the way EVM tooling emits it.
    recid: k256::ecdsa::RecoveryId,
}

impl Signature {
    /// Recovers the address of the signer, assuming the signature was made
    /// over the SHA256 digest of `payload`.
    pub fn recover_payload_signer(&self, payload: &[u8]) -> anyhow::Result<Address> {
        Ok(self.recover_hash(&Sha256::new(payload))?.address())
    }

    /// Recovers the public key from the signature over the given digest.
    pub fn recover_hash(&self, hash: &Sha256) -> anyhow::Result<PublicKey> {
        let vk =
            k256::ecdsa::VerifyingKey::recover_from_prehash(hash.as_bytes(), &self.sig, self.recid)?;
        Ok(PublicKey(vk))
    }

    /// Verifies the signature over `payload` against the expected signer address.
    pub fn verify_payload(&self, payload: &[u8], signer: &Address) -> anyhow::Result<()> {
        let recovered = self.recover_payload_signer(payload)?;
        anyhow::ensure!(
            &recovered == signer,
            "signer mismatch: expected {signer:?}, recovered {recovered:?}"
        );
        Ok(())
    }
}

impl ByteFmt for Signature {
    fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(
            bytes.len() == SIGNATURE_LENGTH,
            "unexpected signature length: {}",
            bytes.len()
        );
        let recid = normalize_recovery_id(bytes[64]);
        let Some(recid) = k256::ecdsa::RecoveryId::from_byte(recid) else {
            bail!("unexpected recovery ID: {}", bytes[64]);
        };
        let sig = k256::ecdsa::Signature::from_slice(&bytes[..64])?;
        Ok(Self { sig, recid })
    }

    fn encode(&self) -> Vec<u8> {
        let mut bz = vec![0u8; SIGNATURE_LENGTH];
        let (r, s) = self.sig.split_bytes();
        bz[..32].copy_from_slice(&r);
        bz[32..64].copy_from_slice(&s);
        bz[64] = self.recid.to_byte() + 27;
        bz
    }
}

impl Hash for Signature {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write(&self.encode())
    }
}

impl PartialOrd for Signature {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Signature {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        ByteFmt::encode(self).cmp(&ByteFmt::encode(other))
    }
}

/// Normalize the V in signatures from Ethereum tooling.
///
/// Based on <https://github.com/gakonst/ethers-rs/blob/51fe937f6515689b17a3a83b74a05984ad3a7f11/ethers-core/src/types/signature.rs#L202>
fn normalize_recovery_id(v: u8) -> u8 {
    match v {
        // Case 0: raw/bare
        v @ 0..=26 => v % 4,
        // Case 2: non-eip155 v value
        v @ 27..=34 => (v - 27) % 4,
        // Case 3: eip155 V value
        v @ 35.. => (v - 1) % 2,
    }
}
