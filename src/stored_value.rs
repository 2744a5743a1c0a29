//! Numeric element types for stored regrets and cumulative strategy.

use std::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Storage width chosen per street for regrets and sumprobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Width {
    U8,
    U16,
    I32,
    F64,
}

impl Width {
    pub fn is_integer(self) -> bool {
        self != Width::F64
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, Width::U8 | Width::U16)
    }

    pub fn bytes(self) -> usize {
        match self {
            Width::U8 => 1,
            Width::U16 => 2,
            Width::I32 => 4,
            Width::F64 => 8,
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Width::U8 => "u8",
            Width::U16 => "u16",
            Width::I32 => "i32",
            Width::F64 => "f64",
        };
        write!(f, "{}", name)
    }
}

pub trait StoredValue: Copy + Default + PartialOrd + Send + Sync + fmt::Debug + 'static {
    const WIDTH: Width;
    const MIN: f64;
    const MAX: f64;

    fn to_f64(self) -> f64;

    /// Converts a value already known to lie in `[MIN, MAX]`.
    fn from_f64(v: f64) -> Self;

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self>;
    fn write_to<W: Write>(self, w: &mut W) -> std::io::Result<()>;

    /// Rounds `v` up with probability equal to its fractional part; floats
    /// pass through.
    #[inline]
    fn round<G: Rng>(v: f64, rng: &mut G) -> f64 {
        if !Self::WIDTH.is_integer() {
            return v;
        }
        let floor = v.floor();
        if rng.gen::<f64>() < v - floor {
            floor + 1.0
        } else {
            floor
        }
    }
}

impl StoredValue for u8 {
    const WIDTH: Width = Width::U8;
    const MIN: f64 = 0.0;
    const MAX: f64 = u8::MAX as f64;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as u8
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        r.read_u8()
    }

    fn write_to<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_u8(self)
    }
}

impl StoredValue for u16 {
    const WIDTH: Width = Width::U16;
    const MIN: f64 = 0.0;
    const MAX: f64 = u16::MAX as f64;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as u16
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        r.read_u16::<LittleEndian>()
    }

    fn write_to<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_u16::<LittleEndian>(self)
    }
}

impl StoredValue for i32 {
    const WIDTH: Width = Width::I32;
    const MIN: f64 = i32::MIN as f64;
    const MAX: f64 = i32::MAX as f64;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as i32
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        r.read_i32::<LittleEndian>()
    }

    fn write_to<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_i32::<LittleEndian>(self)
    }
}

impl StoredValue for f64 {
    const WIDTH: Width = Width::F64;
    const MIN: f64 = f64::MIN;
    const MAX: f64 = f64::MAX;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        r.read_f64::<LittleEndian>()
    }

    fn write_to<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_f64::<LittleEndian>(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn stochastic_rounding_is_unbiased() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let total: f64 = (0..n).map(|_| <u16 as StoredValue>::round(2.25, &mut rng)).sum();
        let mean = total / n as f64;
        assert!((mean - 2.25).abs() < 0.02, "mean {}", mean);
    }

    #[test]
    fn floats_are_not_rounded() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(<f64 as StoredValue>::round(0.3, &mut rng), 0.3);
    }

    #[test]
    fn width_names_round_trip_through_json() {
        let json = serde_json::to_string(&Width::U16).unwrap();
        assert_eq!(json, "\"u16\"");
        let back: Width = serde_json::from_str("\"i32\"").unwrap();
        assert_eq!(back, Width::I32);
    }
}
