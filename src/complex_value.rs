//! Plain complex values: a pair of `f64`s with tolerance-aware comparison.
//!
//! [`ComplexValue`] is the *value* counterpart of the interned
//! [`Complex`](crate::complex::Complex) handle pair: results that leave the
//! package (amplitudes, inner products, serialized weights) are plain values,
//! while everything stored inside the diagrams goes through the tables.

use std::fmt;
use std::io::{Read, Write};
use std::ops::{Add, AddAssign, Mul};

use crate::complex_table::ComplexTable;
use crate::types::DdError;

/// A raw complex number `r + i*im`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ComplexValue {
    pub r: f64,
    pub i: f64,
}

impl ComplexValue {
    pub const fn new(r: f64, i: f64) -> Self {
        ComplexValue { r, i }
    }

    pub const fn zero() -> Self {
        ComplexValue { r: 0.0, i: 0.0 }
    }

    pub const fn one() -> Self {
        ComplexValue { r: 1.0, i: 0.0 }
    }

    /// Squared magnitude.
    pub fn mag2(&self) -> f64 {
        self.r * self.r + self.i * self.i
    }

    /// Componentwise equality under the global magnitude tolerance.
    pub fn approx_eq(&self, other: &ComplexValue) -> bool {
        let tol = ComplexTable::tolerance();
        (self.r - other.r).abs() < tol && (self.i - other.i).abs() < tol
    }

    pub fn approx_zero(&self) -> bool {
        let tol = ComplexTable::tolerance();
        self.r.abs() < tol && self.i.abs() < tol
    }

    pub fn approx_one(&self) -> bool {
        let tol = ComplexTable::tolerance();
        (self.r - 1.0).abs() < tol && self.i.abs() < tol
    }

    /// Parses the two halves of a textual weight. `real` may be empty (zero);
    /// `imag` is the imaginary half with `i` suffix and spaces still attached,
    /// where a bare sign means `+1`/`-1`.
    pub fn from_string(real: &str, imag: &str) -> Result<Self, DdError> {
        let parse = |s: &str| -> Result<f64, DdError> {
            s.parse::<f64>().map_err(|_| DdError::Serialization {
                message: format!("malformed number in complex value: {:?}", s),
            })
        };

        let r = if real.is_empty() { 0.0 } else { parse(real)? };

        let mut im: String = imag.chars().filter(|&c| c != ' ' && c != 'i' && c != 'I').collect();
        if im == "+" || im == "-" {
            im.push('1');
        }
        let i = if im.is_empty() { 0.0 } else { parse(&im)? };

        Ok(ComplexValue { r, i })
    }

    /// Reads `r` and `i` as two little-endian `f64`s.
    pub fn read_binary<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        let r = f64::from_le_bytes(buf);
        reader.read_exact(&mut buf)?;
        let i = f64::from_le_bytes(buf);
        Ok(ComplexValue { r, i })
    }

    /// Writes `r` and `i` as two little-endian `f64`s.
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.r.to_le_bytes())?;
        writer.write_all(&self.i.to_le_bytes())?;
        Ok(())
    }
}

impl Add for ComplexValue {
    type Output = ComplexValue;

    fn add(self, rhs: ComplexValue) -> ComplexValue {
        ComplexValue { r: self.r + rhs.r, i: self.i + rhs.i }
    }
}

impl AddAssign for ComplexValue {
    fn add_assign(&mut self, rhs: ComplexValue) {
        self.r += rhs.r;
        self.i += rhs.i;
    }
}

impl Mul for ComplexValue {
    type Output = ComplexValue;

    fn mul(self, rhs: ComplexValue) -> ComplexValue {
        ComplexValue {
            r: self.r * rhs.r - self.i * rhs.i,
            i: self.r * rhs.i + self.i * rhs.r,
        }
    }
}

/// Prints both components with an explicit sign between them, e.g.
/// `0.5-0.5i`. The form is what the text serializer emits and what
/// [`ComplexValue::from_string`] accepts back.
impl fmt::Display for ComplexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.i.is_sign_negative() { '-' } else { '+' };
        write!(f, "{}{}{}i", self.r, sign, self.i.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_eq() {
        let a = ComplexValue::new(0.5, -0.25);
        let b = ComplexValue::new(0.5 + 1e-14, -0.25 - 1e-14);
        assert!(a.approx_eq(&b));
        assert!(!a.approx_eq(&ComplexValue::new(0.5 + 1e-12, -0.25)));
    }

    #[test]
    fn test_mul() {
        // (1 + i) * (1 - i) = 2
        let p = ComplexValue::new(1.0, 1.0) * ComplexValue::new(1.0, -1.0);
        assert!(p.approx_eq(&ComplexValue::new(2.0, 0.0)));
    }

    #[test]
    fn test_display_roundtrip() {
        for v in [
            ComplexValue::new(0.5, -0.25),
            ComplexValue::new(-1.0, 0.0),
            ComplexValue::new(0.001, 20000000.0),
            ComplexValue::zero(),
        ] {
            let s = v.to_string();
            let idx = s[1..].find(['+', '-']).map(|k| k + 1).unwrap();
            let parsed = ComplexValue::from_string(&s[..idx], &s[idx..]).unwrap();
            assert_eq!(v, parsed, "roundtrip through {:?}", s);
        }
    }

    #[test]
    fn test_from_string_shorthand() {
        // a bare sign on the imaginary half means +/- 1
        let v = ComplexValue::from_string("", "+i").unwrap();
        assert_eq!(v, ComplexValue::new(0.0, 1.0));
        let v = ComplexValue::from_string("2", "-i").unwrap();
        assert_eq!(v, ComplexValue::new(2.0, -1.0));
        assert!(ComplexValue::from_string("abc", "").is_err());
    }

    #[test]
    fn test_binary_roundtrip() {
        let v = ComplexValue::new(std::f64::consts::FRAC_1_SQRT_2, -0.125);
        let mut buf = Vec::new();
        v.write_binary(&mut buf).unwrap();
        let back = ComplexValue::read_binary(&mut buf.as_slice()).unwrap();
        assert_eq!(v, back);
    }
}
