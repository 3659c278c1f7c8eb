// Scalar type model for the columnar engine.
//
// All column values are fixed-size, nullable-free value types: Integer,
// Numeric<P> (fixed-point decimal), Date, Timestamp, Char<N> and Varchar<N>.
// Every scalar hashes through the same xorshift mix so that hash-table bucket
// selection is identical across the scalar and SIMD kernel paths.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::error::{DbError, Result};

/// Seed for the scalar hash mix.
pub const HASH_SEED: u64 = 0x0139_6840_9090_6A9C;

/// xorshift mix used by every scalar hash.
#[inline(always)]
pub fn hash_bits(bits: u64) -> u64 {
    let mut r = HASH_SEED ^ bits;
    r ^= r << 13;
    r ^= r >> 7;
    r ^= r << 17;
    r
}

/// Combine an existing hash with the bit pattern of another key column.
#[inline(always)]
pub fn rehash_bits(hash: u64, bits: u64) -> u64 {
    let mut r = hash ^ bits;
    r ^= r << 13;
    r ^= r >> 7;
    r ^= r << 17;
    r
}

/// Powers of ten for fixed-point scaling, up to the i64 range.
pub const POW10: [i64; 19] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
];

/// Runtime descriptor of a column's element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Integer,
    Numeric(u8),
    Date,
    Timestamp,
    Char(u16),
    Varchar(u16),
}

impl ScalarKind {
    /// Element stride in bytes.
    pub fn rt_size(&self) -> usize {
        match self {
            Self::Integer | Self::Date => 4,
            Self::Numeric(_) | Self::Timestamp => 8,
            Self::Char(n) | Self::Varchar(n) => *n as usize + 1,
        }
    }
}

/// Fixed-size column element. The bit pattern of a value is significant:
/// equal values must be bitwise equal (string types zero-pad their tails).
pub trait Scalar: Copy + PartialEq + Send + Sync + 'static {
    fn kind() -> ScalarKind;
    fn hash(&self) -> u64;
}

// --- Integer ---------------------------------------------------------------

/// Signed 32-bit integer column value.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Integer {
    pub value: i32,
}

impl Integer {
    #[inline]
    pub const fn new(value: i32) -> Self {
        Self { value }
    }

    /// Parse an optionally signed decimal literal; surrounding spaces are
    /// tolerated, anything else is an error.
    pub fn parse(s: &str) -> Result<Self> {
        let t = s.trim_matches(' ');
        let (neg, digits) = match t.as_bytes().first() {
            Some(b'-') => (true, &t[1..]),
            Some(b'+') => (false, &t[1..]),
            _ => (false, t),
        };
        if digits.is_empty() || !digits.bytes().all(|c| c.is_ascii_digit()) {
            return Err(DbError::Parse(format!("invalid integer literal '{s}'")));
        }
        let mut v: i64 = 0;
        for c in digits.bytes() {
            v = v * 10 + (c - b'0') as i64;
        }
        Ok(Self::new(if neg { -v } else { v } as i32))
    }
}

impl Scalar for Integer {
    fn kind() -> ScalarKind {
        ScalarKind::Integer
    }

    #[inline(always)]
    fn hash(&self) -> u64 {
        hash_bits(self.value as i64 as u64)
    }
}

impl Add for Integer {
    type Output = Integer;
    fn add(self, rhs: Integer) -> Integer {
        Integer::new(self.value + rhs.value)
    }
}

impl Sub for Integer {
    type Output = Integer;
    fn sub(self, rhs: Integer) -> Integer {
        Integer::new(self.value - rhs.value)
    }
}

impl Mul for Integer {
    type Output = Integer;
    fn mul(self, rhs: Integer) -> Integer {
        Integer::new(self.value * rhs.value)
    }
}

impl fmt::Display for Integer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

// --- Numeric ---------------------------------------------------------------

/// Fixed-point decimal with `P` fractional digits, stored as the scaled
/// 64-bit integer `mathematical value * 10^P`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Numeric<const P: u8> {
    pub value: i64,
}

impl<const P: u8> Numeric<P> {
    /// Wrap an already scaled raw value.
    #[inline]
    pub const fn from_raw(value: i64) -> Self {
        Self { value }
    }

    #[inline]
    pub const fn raw(&self) -> i64 {
        self.value
    }

    pub const ZERO: Self = Self { value: 0 };

    /// Parse `[sign] digits [ '.' digits ]`, scaled to `10^P`. Missing
    /// fraction digits pad with zeros; more than `P` fraction digits or a
    /// second decimal point are errors.
    pub fn parse(s: &str) -> Result<Self> {
        let t = s.trim_matches(' ');
        let bytes = t.as_bytes();
        let mut i = 0;
        let neg = match bytes.first() {
            Some(b'-') => {
                i += 1;
                true
            }
            Some(b'+') => {
                i += 1;
                false
            }
            _ => false,
        };
        let mut result: i64 = 0;
        let mut fraction = false;
        let mut digits_seen = 0u32;
        let mut frac_digits = 0u32;
        while i < bytes.len() {
            match bytes[i] {
                c @ b'0'..=b'9' => {
                    result = result * 10 + (c - b'0') as i64;
                    digits_seen += 1;
                    if fraction {
                        frac_digits += 1;
                    }
                }
                b'.' if !fraction => fraction = true,
                _ => return Err(DbError::Parse(format!("invalid numeric literal '{s}'"))),
            }
            i += 1;
        }
        if digits_seen == 0 {
            return Err(DbError::Parse(format!("invalid numeric literal '{s}'")));
        }
        if frac_digits > P as u32 {
            return Err(DbError::Parse(format!(
                "numeric literal '{s}' has more than {P} fraction digits"
            )));
        }
        result *= POW10[(P as u32 - frac_digits) as usize];
        Ok(Self::from_raw(if neg { -result } else { result }))
    }
}

impl<const P: u8> From<Integer> for Numeric<P> {
    #[inline]
    fn from(x: Integer) -> Self {
        Self::from_raw(x.value as i64 * POW10[P as usize])
    }
}

impl<const P: u8> Add for Numeric<P> {
    type Output = Numeric<P>;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::from_raw(self.value + rhs.value)
    }
}

impl<const P: u8> AddAssign for Numeric<P> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.value += rhs.value;
    }
}

impl<const P: u8> Sub for Numeric<P> {
    type Output = Numeric<P>;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::from_raw(self.value - rhs.value)
    }
}

impl<const P: u8> Neg for Numeric<P> {
    type Output = Numeric<P>;
    #[inline]
    fn neg(self) -> Self {
        Self::from_raw(-self.value)
    }
}

/// Division keeps the dividend's precision: the raw dividend is premultiplied
/// by the divisor's scale before the integer division.
impl<const P: u8, const Q: u8> Div<Numeric<Q>> for Numeric<P> {
    type Output = Numeric<P>;
    #[inline]
    fn div(self, rhs: Numeric<Q>) -> Numeric<P> {
        Numeric::from_raw(self.value * POW10[Q as usize] / rhs.value)
    }
}

impl<const P: u8> Div<Integer> for Numeric<P> {
    type Output = Numeric<P>;
    #[inline]
    fn div(self, rhs: Integer) -> Numeric<P> {
        Numeric::from_raw(self.value / rhs.value as i64)
    }
}

/// Multiplication adds the precisions. Expressed per precision pair because
/// the output scale is part of the type.
macro_rules! numeric_mul {
    ($p:literal, $q:literal, $r:literal) => {
        impl Mul<Numeric<$q>> for Numeric<$p> {
            type Output = Numeric<$r>;
            #[inline]
            fn mul(self, rhs: Numeric<$q>) -> Numeric<$r> {
                Numeric::from_raw(self.value * rhs.value)
            }
        }
    };
}

numeric_mul!(2, 2, 4);
numeric_mul!(4, 2, 6);
numeric_mul!(2, 4, 6);
numeric_mul!(0, 2, 2);
numeric_mul!(2, 0, 2);

impl<const P: u8> Scalar for Numeric<P> {
    fn kind() -> ScalarKind {
        ScalarKind::Numeric(P)
    }

    #[inline(always)]
    fn hash(&self) -> u64 {
        hash_bits(self.value as u64)
    }
}

impl<const P: u8> fmt::Display for Numeric<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if P == 0 {
            return self.value.fmt(f);
        }
        let scale = POW10[P as usize];
        let sign = if self.value < 0 { "-" } else { "" };
        let abs = self.value.unsigned_abs();
        let int = abs / scale as u64;
        let frac = abs % scale as u64;
        write!(f, "{sign}{int}.{frac:0width$}", width = P as usize)
    }
}

// --- Date ------------------------------------------------------------------

const EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(1970, 1, 1) {
    Some(d) => d,
    None => unreachable!(),
};

/// Calendar date stored as signed days since 1970-01-01. Ordering is plain
/// integer ordering.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub value: i32,
}

impl Date {
    #[inline]
    pub const fn new(value: i32) -> Self {
        Self { value }
    }

    /// Parse a strict `YYYY-MM-DD` literal.
    pub fn parse(s: &str) -> Result<Self> {
        let d = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| DbError::Parse(format!("invalid date literal '{s}'")))?;
        Ok(Self::new(d.signed_duration_since(EPOCH).num_days() as i32))
    }

    pub fn year(&self) -> Integer {
        let d = EPOCH + chrono::Duration::days(self.value as i64);
        Integer::new(d.year())
    }
}

impl Scalar for Date {
    fn kind() -> ScalarKind {
        ScalarKind::Date
    }

    #[inline(always)]
    fn hash(&self) -> u64 {
        hash_bits(self.value as i64 as u64)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = EPOCH + chrono::Duration::days(self.value as i64);
        write!(f, "{}", d.format("%Y-%m-%d"))
    }
}

// --- Timestamp -------------------------------------------------------------

/// Point in time stored as unsigned seconds since 1970-01-01T00:00:00.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub value: u64,
}

impl Timestamp {
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self { value }
    }

    /// Parse a strict `YYYY-MM-DD HH:MM:SS` literal.
    pub fn parse(s: &str) -> Result<Self> {
        let t = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .map_err(|_| DbError::Parse(format!("invalid timestamp literal '{s}'")))?;
        Ok(Self::new(t.and_utc().timestamp() as u64))
    }
}

impl Scalar for Timestamp {
    fn kind() -> ScalarKind {
        ScalarKind::Timestamp
    }

    #[inline(always)]
    fn hash(&self) -> u64 {
        hash_bits(self.value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp(self.value as i64, 0) {
            Some(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{}", self.value),
        }
    }
}

// --- fixed-capacity strings ------------------------------------------------

/// Hash the value bytes of a fixed-capacity string in 8-byte little-endian
/// chunks. The tail past `len` is zero by construction, so equal values hash
/// equally regardless of capacity use.
#[inline]
fn hash_padded_bytes(data: &[u8]) -> u64 {
    let mut h = 0u64;
    let mut first = true;
    for chunk in data.chunks(8) {
        let mut word = [0u8; 8];
        word[..chunk.len()].copy_from_slice(chunk);
        let bits = u64::from_le_bytes(word);
        h = if first { hash_bits(bits) } else { rehash_bits(h, bits) };
        first = false;
    }
    h
}

#[inline]
fn str_cmp(a_data: &[u8], a_len: u8, b_data: &[u8], b_len: u8) -> Ordering {
    let n = a_len.min(b_len) as usize;
    match a_data[..n].cmp(&b_data[..n]) {
        Ordering::Equal => a_len.cmp(&b_len),
        other => other,
    }
}

macro_rules! fixed_string_type {
    ($name:ident, $kind:ident, $doc:literal) => {
        #[doc = $doc]
        #[repr(C)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name<const N: usize> {
            pub len: u8,
            pub data: [u8; N],
        }

        impl<const N: usize> Default for $name<N> {
            fn default() -> Self {
                Self { len: 0, data: [0u8; N] }
            }
        }

        impl<const N: usize> $name<N> {
            fn from_bytes(bytes: &[u8]) -> Result<Self> {
                debug_assert!(N < 256, "length prefix is one byte");
                if bytes.len() > N {
                    return Err(DbError::Parse(format!(
                        "string of {} bytes exceeds capacity {}",
                        bytes.len(),
                        N
                    )));
                }
                let mut v = Self::default();
                v.len = bytes.len() as u8;
                v.data[..bytes.len()].copy_from_slice(bytes);
                Ok(v)
            }

            pub fn as_str(&self) -> &str {
                std::str::from_utf8(&self.data[..self.len as usize]).unwrap_or("")
            }

            pub fn len(&self) -> usize {
                self.len as usize
            }

            pub fn is_empty(&self) -> bool {
                self.len == 0
            }
        }

        impl<const N: usize> PartialOrd for $name<N> {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl<const N: usize> Ord for $name<N> {
            fn cmp(&self, other: &Self) -> Ordering {
                str_cmp(&self.data, self.len, &other.data, other.len)
            }
        }

        impl<const N: usize> Scalar for $name<N> {
            fn kind() -> ScalarKind {
                ScalarKind::$kind(N as u16)
            }

            #[inline]
            fn hash(&self) -> u64 {
                hash_padded_bytes(&self.data)
            }
        }

        impl<const N: usize> fmt::Display for $name<N> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

fixed_string_type!(
    Char,
    Char,
    "Fixed-capacity string; casts trim leading spaces. The unused tail is \
     always zero so values compare bitwise."
);
fixed_string_type!(
    Varchar,
    Varchar,
    "Fixed-capacity string without space trimming; lexicographic ordering. \
     The unused tail is always zero so values compare bitwise."
);

impl<const N: usize> Char<N> {
    /// Cast from text, trimming leading spaces.
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_bytes(s.trim_start_matches(' ').as_bytes())
    }
}

impl<const N: usize> Varchar<N> {
    /// Cast from text verbatim.
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_bytes(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_parse() {
        assert_eq!(Integer::parse("42").unwrap().value, 42);
        assert_eq!(Integer::parse("-17").unwrap().value, -17);
        assert_eq!(Integer::parse(" +5 ").unwrap().value, 5);
        assert!(Integer::parse("12a").is_err());
        assert!(Integer::parse("").is_err());
    }

    #[test]
    fn numeric_parse_scales_to_precision() {
        assert_eq!(Numeric::<2>::parse("0.05").unwrap().raw(), 5);
        assert_eq!(Numeric::<2>::parse("24").unwrap().raw(), 2400);
        assert_eq!(Numeric::<2>::parse("-1.5").unwrap().raw(), -150);
        assert_eq!(Numeric::<4>::parse("3.14").unwrap().raw(), 31400);
    }

    #[test]
    fn numeric_parse_rejects_excess_fraction() {
        assert!(Numeric::<2>::parse("1.234").is_err());
        assert!(Numeric::<2>::parse("1.2.3").is_err());
        assert!(Numeric::<2>::parse("x").is_err());
    }

    #[test]
    fn numeric_algebra() {
        let price = Numeric::<2>::parse("100.00").unwrap();
        let disc = Numeric::<2>::parse("0.05").unwrap();
        let rev: Numeric<4> = price * disc;
        assert_eq!(rev.raw(), 50_000);
        assert_eq!(rev.to_string(), "5.0000");

        let avg = Numeric::<2>::parse("10.00").unwrap() / Integer::new(4);
        assert_eq!(avg.raw(), 250);

        // dividing by a scaled value premultiplies the dividend
        let ratio = Numeric::<2>::parse("1.00").unwrap() / Numeric::<2>::parse("0.50").unwrap();
        assert_eq!(ratio.raw(), 200);
    }

    #[test]
    fn numeric_from_integer() {
        let n: Numeric<2> = Integer::new(24).into();
        assert_eq!(n.raw(), 2400);
    }

    #[test]
    fn date_parse_strict() {
        assert_eq!(Date::parse("1970-01-01").unwrap().value, 0);
        assert_eq!(Date::parse("1970-01-02").unwrap().value, 1);
        assert!(Date::parse("1994-01-01").unwrap() < Date::parse("1995-01-01").unwrap());
        assert!(Date::parse("1994-1-1").is_err());
        assert!(Date::parse("1994-13-01").is_err());
        assert_eq!(Date::parse("1994-06-15").unwrap().to_string(), "1994-06-15");
        assert_eq!(Date::parse("1994-06-15").unwrap().year().value, 1994);
    }

    #[test]
    fn timestamp_parse() {
        assert_eq!(Timestamp::parse("1970-01-01 00:00:10").unwrap().value, 10);
        assert!(Timestamp::parse("1970-01-01").is_err());
    }

    #[test]
    fn char_trims_leading_spaces() {
        let c = Char::<10>::parse("  BUILDING").unwrap();
        assert_eq!(c.as_str(), "BUILDING");
        let v = Varchar::<10>::parse("  ab").unwrap();
        assert_eq!(v.as_str(), "  ab");
        assert!(Char::<4>::parse("toolong").is_err());
    }

    #[test]
    fn string_ordering_is_lexicographic() {
        let a = Varchar::<8>::parse("abc").unwrap();
        let b = Varchar::<8>::parse("abd").unwrap();
        let c = Varchar::<8>::parse("ab").unwrap();
        assert!(a < b);
        assert!(c < a);
        assert_eq!(a.cmp(&a), Ordering::Equal);
    }

    #[test]
    fn hash_is_deterministic_and_seeded() {
        // reference values pinned against the xorshift definition
        let h = Integer::new(1).hash();
        assert_eq!(h, Integer::new(1).hash());
        assert_ne!(h, Integer::new(2).hash());
        assert_eq!(Date::new(1).hash(), h, "same bit pattern hashes equally");
        assert_eq!(Numeric::<2>::from_raw(1).hash(), h);

        // negative i32 sign-extends before the mix
        assert_eq!(Integer::new(-1).hash(), hash_bits(u64::MAX));
    }

    #[test]
    fn string_hash_ignores_capacity_tail() {
        let a = Varchar::<8>::parse("abc").unwrap();
        let b = Varchar::<16>::parse("abc").unwrap();
        // different capacities, same first chunk, tail zeroed
        assert_eq!(hash_padded_bytes(&a.data[..8]), hash_padded_bytes(&b.data[..8]));
        assert_eq!(a.hash(), hash_padded_bytes(&a.data));
    }

    #[test]
    fn scalar_kind_strides() {
        assert_eq!(ScalarKind::Integer.rt_size(), 4);
        assert_eq!(ScalarKind::Numeric(2).rt_size(), 8);
        assert_eq!(ScalarKind::Date.rt_size(), 4);
        assert_eq!(ScalarKind::Timestamp.rt_size(), 8);
        assert_eq!(ScalarKind::Char(10).rt_size(), 11);
        assert_eq!(ScalarKind::Varchar(44).rt_size(), 45);
        assert_eq!(std::mem::size_of::<Char<10>>(), 11);
    }
}
