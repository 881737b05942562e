//! Column types and decoded values

use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;

/// Semantic type of an exported column
///
/// Discriminants are the type codes carried in schema blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    TinyInt = 3,
    SmallInt = 4,
    Integer = 5,
    BigInt = 6,
    Float = 8,
    String = 9,
    Timestamp = 11,
    Decimal = 22,
    VarBinary = 25,
    GeographyPoint = 26,
    Geography = 27,
}

impl ColumnType {
    /// Convert from a wire type code
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            3 => Some(Self::TinyInt),
            4 => Some(Self::SmallInt),
            5 => Some(Self::Integer),
            6 => Some(Self::BigInt),
            8 => Some(Self::Float),
            9 => Some(Self::String),
            11 => Some(Self::Timestamp),
            22 => Some(Self::Decimal),
            25 => Some(Self::VarBinary),
            26 => Some(Self::GeographyPoint),
            27 => Some(Self::Geography),
            _ => None,
        }
    }

    /// Wire type code
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Encoded width in bytes, or `None` for length-prefixed types
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            Self::TinyInt => Some(1),
            Self::SmallInt => Some(2),
            Self::Integer => Some(4),
            Self::BigInt | Self::Float | Self::Timestamp => Some(8),
            Self::Decimal | Self::GeographyPoint => Some(16),
            Self::String | Self::VarBinary | Self::Geography => None,
        }
    }

    /// SQL type name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Float => "FLOAT",
            Self::String => "VARCHAR",
            Self::Timestamp => "TIMESTAMP",
            Self::Decimal => "DECIMAL",
            Self::VarBinary => "VARBINARY",
            Self::GeographyPoint => "GEOGRAPHY_POINT",
            Self::Geography => "GEOGRAPHY",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-point decimal: `unscaled * 10^-scale`
///
/// Equality is numeric, so `1.50` (150, 2) equals `1.5` (15, 1).
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    unscaled: i128,
    scale: u32,
}

/// Largest scale representable in an i128 unscaled value
pub const MAX_DECIMAL_SCALE: u32 = 38;

impl Decimal {
    /// Create a decimal from its unscaled value and scale
    pub const fn new(unscaled: i128, scale: u32) -> Self {
        Self { unscaled, scale }
    }

    /// Unscaled integer value
    #[inline]
    pub const fn unscaled(&self) -> i128 {
        self.unscaled
    }

    /// Number of fractional digits
    #[inline]
    pub const fn scale(&self) -> u32 {
        self.scale
    }

    /// Express this value at `target` fractional digits
    ///
    /// Returns `None` if the value would overflow or lose digits.
    pub fn rescale(&self, target: u32) -> Option<Self> {
        match target.cmp(&self.scale) {
            Ordering::Equal => Some(*self),
            Ordering::Greater => {
                let factor = 10i128.checked_pow(target - self.scale)?;
                let unscaled = self.unscaled.checked_mul(factor)?;
                Some(Self::new(unscaled, target))
            }
            Ordering::Less => {
                let factor = 10i128.checked_pow(self.scale - target)?;
                if self.unscaled % factor != 0 {
                    return None;
                }
                Some(Self::new(self.unscaled / factor, target))
            }
        }
    }

    /// Strip trailing fractional zeros
    fn normalized(&self) -> Self {
        let mut unscaled = self.unscaled;
        let mut scale = self.scale;
        while scale > 0 && unscaled % 10 == 0 {
            unscaled /= 10;
            scale -= 1;
        }
        Self::new(unscaled, scale)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        a.unscaled == b.unscaled && a.scale == b.scale
    }
}

impl Eq for Decimal {}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.unscaled.unsigned_abs().to_string();
        let sign = if self.unscaled < 0 { "-" } else { "" };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = if digits.len() <= scale {
            format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

/// One decoded column value
///
/// `Null` stands in for any column whose null bit is set, regardless of
/// the declared column type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Float(f64),
    /// Microseconds since the Unix epoch
    Timestamp(i64),
    String(String),
    VarBinary(Bytes),
    Decimal(Decimal),
    GeographyPoint { longitude: f64, latitude: f64 },
    /// Opaque serialized polygon
    Geography(Bytes),
}

impl Value {
    /// Check if this is the null sentinel
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Column type this value belongs to, `None` for null
    pub fn column_type(&self) -> Option<ColumnType> {
        Some(match self {
            Self::Null => return None,
            Self::TinyInt(_) => ColumnType::TinyInt,
            Self::SmallInt(_) => ColumnType::SmallInt,
            Self::Integer(_) => ColumnType::Integer,
            Self::BigInt(_) => ColumnType::BigInt,
            Self::Float(_) => ColumnType::Float,
            Self::Timestamp(_) => ColumnType::Timestamp,
            Self::String(_) => ColumnType::String,
            Self::VarBinary(_) => ColumnType::VarBinary,
            Self::Decimal(_) => ColumnType::Decimal,
            Self::GeographyPoint { .. } => ColumnType::GeographyPoint,
            Self::Geography(_) => ColumnType::Geography,
        })
    }

    /// Integer view of any integral value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::TinyInt(v) => Some(i64::from(*v)),
            Self::SmallInt(v) => Some(i64::from(*v)),
            Self::Integer(v) => Some(i64::from(*v)),
            Self::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Self::TinyInt(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
