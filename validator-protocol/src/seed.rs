//! Per-request seed generation.
//!
//! Every Store/Challenge/Retrieve request carries a fresh 32-byte seed the
//! validator generates. Binding an opening to this seed is the protocol's
//! principal defense against a miner replaying a stale proof: a miner that
//! no longer holds the blob cannot compute `H(seed || data)` for a seed
//! chosen after it last had the data.

use rand::RngCore;

/// A 32-byte, validator-chosen nonce binding a proof to one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Seed(pub [u8; 32]);

impl Seed {
    /// Draws a fresh random seed.
    pub fn generate(rng: &mut impl RngCore) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Seed(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let mut arr = [0u8; 32];
        if bytes.len() != 32 {
            // hex::FromHexError has no "wrong length" variant that fits
            // cleanly here, so surface it the same way an odd-length hex
            // string would be rejected.
            return Err(hex::FromHexError::InvalidStringLength);
        }
        arr.copy_from_slice(&bytes);
        Ok(Seed(arr))
    }
}
