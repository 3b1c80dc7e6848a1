//! Prime field arithmetic for secret shares.
//!
//! All shares, correctness values and validity checks live in `Z_p` with
//! `p = 2^61 - 1`. A Mersenne prime keeps every product inside a `u128`
//! before reduction.

use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

/// The field modulus, `2^61 - 1`.
pub const MODULUS: u64 = (1u64 << 61) - 1;

/// An element of `Z_p`.
///
/// Always stored fully reduced (`0 <= value < MODULUS`). Scalars are
/// serialized as decimal text, which is also how correctness shares travel on
/// the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Scalar(u64);

impl Scalar {
    /// Additive identity.
    pub const ZERO: Self = Scalar(0);

    /// Multiplicative identity.
    pub const ONE: Self = Scalar(1);

    /// Create a scalar, reducing the value modulo `p`.
    pub fn new(value: u64) -> Self {
        Scalar(value % MODULUS)
    }

    /// Map a signed integer into the field (negative values wrap to `p - |v|`).
    pub fn from_i64(value: i64) -> Self {
        let magnitude = Scalar::new(value.unsigned_abs());
        if value < 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Interpret the scalar as a signed integer centered on zero.
    ///
    /// Values above `p / 2` are read as negative. This is the inverse of
    /// [`Scalar::from_i64`] for inputs of magnitude below `p / 2`.
    pub fn to_i64(self) -> i64 {
        if self.0 > MODULUS / 2 {
            -((MODULUS - self.0) as i64)
        } else {
            self.0 as i64
        }
    }

    /// Get the reduced representative.
    pub fn value(self) -> u64 {
        self.0
    }

    /// Check if this is the zero element.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Sample a uniformly random field element.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let candidate = rng.gen::<u64>() & MODULUS;
            if candidate < MODULUS {
                return Scalar(candidate);
            }
        }
    }

    /// Reduce the first eight bytes of a digest into the field.
    pub fn from_digest(bytes: &[u8; 32]) -> Self {
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[..8]);
        Scalar::new(u64::from_le_bytes(word) & MODULUS)
    }

    /// Raise to a power by square-and-multiply.
    pub fn pow(self, mut exponent: u64) -> Self {
        let mut base = self;
        let mut acc = Scalar::ONE;
        while exponent > 0 {
            if exponent & 1 == 1 {
                acc = acc * base;
            }
            base = base * base;
            exponent >>= 1;
        }
        acc
    }

    /// Multiplicative inverse, or `None` for zero.
    pub fn inverse(self) -> Option<Self> {
        if self.is_zero() {
            None
        } else {
            Some(self.pow(MODULUS - 2))
        }
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Scalar::new(value)
    }
}

impl Add for Scalar {
    type Output = Scalar;

    fn add(self, rhs: Scalar) -> Scalar {
        let sum = self.0 + rhs.0;
        if sum >= MODULUS {
            Scalar(sum - MODULUS)
        } else {
            Scalar(sum)
        }
    }
}

impl AddAssign for Scalar {
    fn add_assign(&mut self, rhs: Scalar) {
        *self = *self + rhs;
    }
}

impl Sub for Scalar {
    type Output = Scalar;

    fn sub(self, rhs: Scalar) -> Scalar {
        self + (-rhs)
    }
}

impl SubAssign for Scalar {
    fn sub_assign(&mut self, rhs: Scalar) {
        *self = *self - rhs;
    }
}

impl Neg for Scalar {
    type Output = Scalar;

    fn neg(self) -> Scalar {
        if self.0 == 0 {
            self
        } else {
            Scalar(MODULUS - self.0)
        }
    }
}

impl Mul for Scalar {
    type Output = Scalar;

    fn mul(self, rhs: Scalar) -> Scalar {
        let product = (self.0 as u128) * (rhs.0 as u128);
        Scalar((product % MODULUS as u128) as u64)
    }
}

impl Sum for Scalar {
    fn sum<I: Iterator<Item = Scalar>>(iter: I) -> Scalar {
        iter.fold(Scalar::ZERO, |acc, x| acc + x)
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scalar({})", self.0)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error parsing a scalar from its decimal text form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScalarParseError {
    /// The text is not a decimal integer.
    #[error("invalid decimal scalar: {0:?}")]
    NotDecimal(String),

    /// The integer is not a reduced field element.
    #[error("scalar {0} is not below the field modulus")]
    OutOfRange(u64),
}

impl FromStr for Scalar {
    type Err = ScalarParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u64 = s
            .trim()
            .parse()
            .map_err(|_| ScalarParseError::NotDecimal(s.to_string()))?;
        if value >= MODULUS {
            return Err(ScalarParseError::OutOfRange(value));
        }
        Ok(Scalar(value))
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_add_wraps_at_modulus() {
        let a = Scalar::new(MODULUS - 1);
        assert_eq!(a + Scalar::ONE, Scalar::ZERO);
        assert_eq!(Scalar::ZERO - Scalar::ONE, a);
    }

    #[test]
    fn test_signed_mapping() {
        assert_eq!(Scalar::from_i64(-5).to_i64(), -5);
        assert_eq!(Scalar::from_i64(42).to_i64(), 42);
        assert_eq!(Scalar::from_i64(-5) + Scalar::from_i64(5), Scalar::ZERO);
        // 2^63 = 4 * 2^61 = 4 (mod p)
        assert_eq!(Scalar::from_i64(i64::MIN), Scalar::from_i64(-4));
    }

    #[test]
    fn test_inverse() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..16 {
            let x = Scalar::random(&mut rng);
            if x.is_zero() {
                continue;
            }
            assert_eq!(x * x.inverse().unwrap(), Scalar::ONE);
        }
        assert!(Scalar::ZERO.inverse().is_none());
    }

    #[test]
    fn test_decimal_text() {
        let x = Scalar::new(1234567890123);
        let text = x.to_string();
        assert_eq!(text, "1234567890123");
        assert_eq!(text.parse::<Scalar>().unwrap(), x);

        assert!(matches!(
            "12ab".parse::<Scalar>(),
            Err(ScalarParseError::NotDecimal(_))
        ));
        assert!(matches!(
            MODULUS.to_string().parse::<Scalar>(),
            Err(ScalarParseError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_random_is_reduced() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..1000 {
            assert!(Scalar::random(&mut rng).value() < MODULUS);
        }
    }
}
