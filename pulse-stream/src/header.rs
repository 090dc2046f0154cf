use crate::error::{FormatError, StreamResult};
use pulse_lifetime_common::Sample;
use std::{io::Read, mem::size_of};

/// Size in bytes of the stream header on disk.
pub const HEADER_SIZE: usize = 32;

/// The stream header, read once per stream.
///
/// The on-disk layout is
/// `i32 reserved, i32 reserved, f64 sweep_ns, f64 frequency_ghz, i32 number_of_cells, i32 reserved`.
/// Only `number_of_cells` is needed to decode the records which follow.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct StreamHeader {
    pub number_of_cells: usize,
    pub sweep_ns: f64,
    pub frequency_ghz: f64,
}

impl StreamHeader {
    pub fn new(number_of_cells: usize, sweep_ns: f64, frequency_ghz: f64) -> Self {
        Self {
            number_of_cells,
            sweep_ns,
            frequency_ghz,
        }
    }

    /// Number of bytes occupied by a single pulse record.
    pub fn pulse_bytes(&self) -> usize {
        2 * self.number_of_cells * size_of::<Sample>()
    }

    /// Number of bytes occupied by one A/B pulse pair.
    pub fn pair_bytes(&self) -> usize {
        2 * self.pulse_bytes()
    }

    /// Number of complete pulse pairs in a stream of `stream_len` bytes, header included.
    pub fn complete_pairs(&self, stream_len: usize) -> usize {
        match self.pair_bytes() {
            0 => 0,
            pair_bytes => stream_len.saturating_sub(HEADER_SIZE) / pair_bytes,
        }
    }

    pub(crate) fn load<R: Read>(reader: &mut R) -> StreamResult<Self> {
        let mut bytes = [0u8; HEADER_SIZE];
        let num_bytes = read_fully(reader, &mut bytes)?;
        if num_bytes != HEADER_SIZE {
            return Err(FormatError::TruncatedHeader {
                expected: HEADER_SIZE,
                got: num_bytes,
            }
            .into());
        }
        Self::from_bytes(&bytes)
    }

    pub(crate) fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> StreamResult<Self> {
        let truncated = || FormatError::TruncatedHeader {
            expected: HEADER_SIZE,
            got: bytes.len(),
        };
        let mut cursor = bytes.as_slice();
        let _reserved = take::<4>(&mut cursor).ok_or_else(truncated)?;
        let _reserved = take::<4>(&mut cursor).ok_or_else(truncated)?;
        let sweep_ns = f64::from_le_bytes(take(&mut cursor).ok_or_else(truncated)?);
        let frequency_ghz = f64::from_le_bytes(take(&mut cursor).ok_or_else(truncated)?);
        let number_of_cells = i32::from_le_bytes(take(&mut cursor).ok_or_else(truncated)?);
        let _padding = take::<4>(&mut cursor).ok_or_else(truncated)?;

        let number_of_cells = usize::try_from(number_of_cells)
            .map_err(|_| FormatError::InvalidNumberOfCells(number_of_cells.into()))?;
        Ok(Self {
            number_of_cells,
            sweep_ns,
            frequency_ghz,
        })
    }

    pub(crate) fn to_bytes(&self) -> StreamResult<[u8; HEADER_SIZE]> {
        let number_of_cells = i32::try_from(self.number_of_cells).map_err(|_| {
            FormatError::InvalidNumberOfCells(self.number_of_cells.try_into().unwrap_or(i64::MAX))
        })?;
        let mut bytes = [0u8; HEADER_SIZE];
        let fields = [
            0i32.to_le_bytes().as_slice(),
            0i32.to_le_bytes().as_slice(),
            self.sweep_ns.to_le_bytes().as_slice(),
            self.frequency_ghz.to_le_bytes().as_slice(),
            number_of_cells.to_le_bytes().as_slice(),
            0i32.to_le_bytes().as_slice(),
        ]
        .concat();
        bytes.copy_from_slice(&fields);
        Ok(bytes)
    }
}

fn take<const N: usize>(bytes: &mut &[u8]) -> Option<[u8; N]> {
    let (chunk, rest) = bytes.split_first_chunk::<N>()?;
    *bytes = rest;
    Some(*chunk)
}

/// Reads until `buffer` is full or the stream is exhausted, returning the number of bytes read.
pub(crate) fn read_fully<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut total_bytes = 0;
    while let Some(remaining) = buffer.get_mut(total_bytes..) {
        if remaining.is_empty() {
            break;
        }
        match reader.read(remaining) {
            Ok(0) => break,
            Ok(num_bytes) => total_bytes += num_bytes,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total_bytes)
}
