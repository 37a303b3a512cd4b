//! Byte-level helpers for the layered net file format.
//!
//! Layout (all numbers in the writer's native byte order):
//!
//! ```text
//! i32 group_count
//! repeat group_count:
//!   i32 neuron_count
//!   repeat neuron_count:
//!     i32 input_count
//!     repeat input_count:
//!       i32 source_group   (-1 for a bias)
//!       i32 source_neuron  (-1 for a bias)
//!       f64 weight
//! ```
//!
//! The format is not portable across architectures with different byte
//! orders.

use std::io::{self, Read, Write};

use crate::error::StorageError;

/// Group/neuron index pair marking a bias record.
pub const BIAS_INDEX: i32 = -1;

/// Sink that only tallies how many bytes a save would produce.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteCounter(usize);

impl ByteCounter {
    pub fn len(&self) -> usize {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn write_i32_ne<W: Write>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_ne_bytes())
}

pub fn write_f64_ne<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_ne_bytes())
}

/// Write a count, rejecting values the 32-bit format cannot hold.
pub fn write_count<W: Write>(w: &mut W, n: usize, what: &'static str) -> Result<(), StorageError> {
    let n = i32::try_from(n).map_err(|_| StorageError::TooLarge(what))?;
    write_i32_ne(w, n)?;
    Ok(())
}

pub fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_i32_ne<R: Read>(r: &mut R) -> io::Result<i32> {
    Ok(i32::from_ne_bytes(read_exact::<4, _>(r)?))
}

pub fn read_f64_ne<R: Read>(r: &mut R) -> io::Result<f64> {
    Ok(f64::from_ne_bytes(read_exact::<8, _>(r)?))
}

/// Read a count, rejecting negative values.
pub fn read_count<R: Read>(r: &mut R, what: &'static str) -> Result<usize, StorageError> {
    let v = read_i32_ne(r)?;
    usize::try_from(v).map_err(|_| StorageError::NegativeCount { what, value: v })
}

/// One input synapse record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputRecord {
    pub group: i32,
    pub neuron: i32,
    pub weight: f64,
}

impl InputRecord {
    pub fn bias(weight: f64) -> Self {
        Self {
            group: BIAS_INDEX,
            neuron: BIAS_INDEX,
            weight,
        }
    }

    pub fn is_bias(&self) -> bool {
        self.group == BIAS_INDEX
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_i32_ne(w, self.group)?;
        write_i32_ne(w, self.neuron)?;
        write_f64_ne(w, self.weight)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let group = read_i32_ne(r)?;
        let neuron = read_i32_ne(r)?;
        let weight = read_f64_ne(r)?;
        Ok(Self {
            group,
            neuron,
            weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout_is_16_bytes() {
        let mut buf = Vec::new();
        InputRecord {
            group: 2,
            neuron: 7,
            weight: -0.125,
        }
        .write_to(&mut buf)
        .unwrap();
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[0..4], &2i32.to_ne_bytes());
        assert_eq!(&buf[4..8], &7i32.to_ne_bytes());
        assert_eq!(&buf[8..16], &(-0.125f64).to_ne_bytes());

        let back = InputRecord::read_from(&mut io::Cursor::new(buf)).unwrap();
        assert_eq!(back.weight, -0.125);
        assert!(!back.is_bias());
        assert!(InputRecord::bias(1.0).is_bias());
    }

    #[test]
    fn negative_counts_are_rejected() {
        let mut buf = Vec::new();
        write_i32_ne(&mut buf, -3).unwrap();
        let err = read_count(&mut io::Cursor::new(buf), "layer").unwrap_err();
        assert!(matches!(
            err,
            StorageError::NegativeCount {
                what: "layer",
                value: -3
            }
        ));
    }

    #[test]
    fn truncated_input_is_an_io_error() {
        let err = read_f64_ne(&mut io::Cursor::new(vec![0u8; 5])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn byte_counter_tallies_records() {
        let mut counter = ByteCounter::default();
        assert!(counter.is_empty());
        write_i32_ne(&mut counter, 1).unwrap();
        InputRecord::bias(1.0).write_to(&mut counter).unwrap();
        assert_eq!(counter.len(), 20);
    }
}
