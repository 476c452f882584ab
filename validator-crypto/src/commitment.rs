//! Pedersen commitments over NIST P-256.
//!
//! A commitment to a message `m` with randomness `r` is `C = m*g + r*h`,
//! where `(g, h)` is a per-round common reference string (CRS). `g` is the
//! curve's standard base point; `h` is derived deterministically from the
//! round seed via hash-to-curve, so no party knows the discrete log of `h`
//! with respect to `g` (binding holds even though both generators are
//! publicly derivable).

use elliptic_curve::bigint::U256;
use elliptic_curve::ops::Reduce;
use elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use elliptic_curve::point::DecompressPoint;
use elliptic_curve::subtle::Choice;
use elliptic_curve::Field;
use p256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar};
use sha3::{Digest, Sha3_256};

/// Errors that can occur while working with commitments or curve encodings.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("point is not a valid curve point")]
    InvalidPoint,
    #[error("unsupported curve: {0}")]
    UnsupportedCurve(String),
}

/// A scalar value rendered as a fixed 32-byte big-endian hex string.
///
/// Used for both the Pedersen randomness `r` and reduced message scalars.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scalar256(pub Scalar);

impl Scalar256 {
    /// Reduces an arbitrary 32-byte digest modulo the curve order.
    ///
    /// Both parties (validator and miner) must perform this reduction
    /// identically so that openings agree.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let bytes = FieldBytes::clone_from_slice(digest);
        Scalar256(<Scalar as Reduce<U256>>::reduce_bytes(&bytes))
    }

    /// Draws a uniformly random scalar using the given RNG.
    pub fn random(rng: &mut (impl rand_core::RngCore + rand_core::CryptoRng)) -> Self {
        Scalar256(Scalar::random(rng))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidPoint);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self::from_digest(&arr))
    }
}

/// A point on the curve, used for the CRS generators and for commitments.
#[derive(Clone, Copy, Debug)]
pub struct CurvePoint(pub ProjectivePoint);

impl CurvePoint {
    /// Encodes the point in uncompressed SEC1 form (`04 || x || y`) as hex.
    pub fn to_hex(&self) -> String {
        let encoded = self.0.to_affine().to_encoded_point(false);
        hex::encode(encoded.as_bytes())
    }

    /// Decodes an uncompressed or compressed SEC1 hex-encoded point.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        let encoded = EncodedPoint::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPoint)?;
        let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or(CryptoError::InvalidPoint)?;
        Ok(CurvePoint(ProjectivePoint::from(affine)))
    }
}

impl PartialEq for CurvePoint {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_affine() == other.0.to_affine()
    }
}
impl Eq for CurvePoint {}

/// Hashes `label` to a curve point via try-and-increment.
///
/// This produces a generator with no known discrete-log relationship to the
/// standard base point, which is what lets a Pedersen commitment built from
/// `(G, hash_to_point(seed))` remain binding.
fn hash_to_point(label: &[u8]) -> ProjectivePoint {
    let mut counter: u32 = 0;
    loop {
        let mut hasher = Sha3_256::new();
        hasher.update(b"storage-subnet-crs-generator");
        hasher.update(label);
        hasher.update(counter.to_be_bytes());
        let digest = hasher.finalize();
        let x_bytes = FieldBytes::clone_from_slice(&digest);

        for y_is_odd in [0u8, 1u8] {
            let candidate = AffinePoint::decompress(&x_bytes, Choice::from(y_is_odd));
            if bool::from(candidate.is_some()) {
                return ProjectivePoint::from(candidate.unwrap());
            }
        }
        counter = counter.wrapping_add(1);
    }
}

/// Common reference string for one round: two generators `(g, h)`.
///
/// `g` is the curve's standard base point; `h` is re-derived from the
/// round's 32-byte seed each time [`Crs::for_round`] is called, so miners
/// cannot precompute commitments against a future CRS.
#[derive(Clone, Copy, Debug)]
pub struct Crs {
    pub g: CurvePoint,
    pub h: CurvePoint,
}

impl Crs {
    /// Derives a fresh CRS for a round from its 32-byte seed.
    pub fn for_round(round_seed: &[u8; 32]) -> Self {
        Crs {
            g: CurvePoint(ProjectivePoint::GENERATOR),
            h: CurvePoint(hash_to_point(round_seed)),
        }
    }
}

/// A Pedersen commitment together with the opening the recipient must
/// recompute against to verify it.
#[derive(Clone, Copy, Debug)]
pub struct Opening {
    pub message: Scalar256,
    pub randomness: Scalar256,
}

/// Computes `C = m*g + r*h`.
pub fn commit(crs: &Crs, message: Scalar256, randomness: Scalar256) -> CurvePoint {
    let c = crs.g.0 * message.0 + crs.h.0 * randomness.0;
    CurvePoint(c)
}

/// Checks that `commitment == commit(crs, opening.message, opening.randomness)`.
///
/// Binding: finding `(m', r') != (m, r)` with `commit(crs, m, r) ==
/// commit(crs, m', r')` requires solving a discrete-log instance on the
/// curve, which is assumed hard.
pub fn open(crs: &Crs, commitment: &CurvePoint, opening: &Opening) -> bool {
    let recomputed = commit(crs, opening.message, opening.randomness);
    &recomputed == commitment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_seeded;

    fn rng() -> rand::rngs::StdRng {
        use rand::SeedableRng;
        rand::rngs::StdRng::seed_from_u64(42)
    }

    #[test]
    fn commit_then_open_succeeds_with_matching_values() {
        let crs = Crs::for_round(&[7u8; 32]);
        let mut r = rng();
        let message = Scalar256::from_digest(&hash_seeded(&[1u8; 32], b"chunk-bytes"));
        let randomness = Scalar256::random(&mut r);

        let c = commit(&crs, message, randomness);
        let opening = Opening { message, randomness };
        assert!(open(&crs, &c, &opening));
    }

    #[test]
    fn open_rejects_wrong_message() {
        let crs = Crs::for_round(&[7u8; 32]);
        let mut r = rng();
        let message = Scalar256::from_digest(&hash_seeded(&[1u8; 32], b"chunk-bytes"));
        let other_message = Scalar256::from_digest(&hash_seeded(&[2u8; 32], b"chunk-bytes"));
        let randomness = Scalar256::random(&mut r);

        let c = commit(&crs, message, randomness);
        let bad_opening = Opening {
            message: other_message,
            randomness,
        };
        assert!(!open(&crs, &c, &bad_opening));
    }

    #[test]
    fn open_rejects_reused_seed_opening() {
        // Simulates a miner replaying a prior valid proof under a new CRS.
        let crs_round1 = Crs::for_round(&[1u8; 32]);
        let crs_round2 = Crs::for_round(&[2u8; 32]);
        let mut r = rng();

        let message = Scalar256::from_digest(&hash_seeded(&[1u8; 32], b"chunk-bytes"));
        let randomness = Scalar256::random(&mut r);
        let c_round1 = commit(&crs_round1, message, randomness);

        let opening = Opening { message, randomness };
        assert!(!open(&crs_round2, &c_round1, &opening));
    }

    #[test]
    fn point_hex_roundtrips() {
        let crs = Crs::for_round(&[9u8; 32]);
        let hex = crs.h.to_hex();
        let decoded = CurvePoint::from_hex(&hex).expect("valid point hex");
        assert_eq!(crs.h, decoded);
    }

    #[test]
    fn scalar_hex_roundtrips() {
        let mut r = rng();
        let s = Scalar256::random(&mut r);
        let hex = s.to_hex();
        let decoded = Scalar256::from_hex(&hex).expect("valid scalar hex");
        assert_eq!(s, decoded);
    }

    #[test]
    fn crs_h_differs_per_round() {
        let crs1 = Crs::for_round(&[1u8; 32]);
        let crs2 = Crs::for_round(&[2u8; 32]);
        assert_ne!(crs1.h, crs2.h);
    }
}
