use crate::{
    error::StreamResult,
    header::{StreamHeader, read_fully},
};
use pulse_lifetime_common::{Real, Sample};
use std::{
    fs::File,
    io::{BufReader, Read},
    mem::size_of,
    path::Path,
};
use tracing::{debug, trace};

/// The time (ns) and voltage (mV) traces of a single detector pulse.
/// An empty record marks the end of the stream.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct PulseRecord {
    pub time: Vec<Sample>,
    pub voltage: Vec<Sample>,
}

impl PulseRecord {
    pub fn new(time: Vec<Sample>, voltage: Vec<Sample>) -> Self {
        Self { time, voltage }
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty() || self.voltage.is_empty()
    }

    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn time_as_real(&self) -> Vec<Real> {
        self.time.iter().copied().map(Real::from).collect()
    }

    pub fn voltage_as_real(&self) -> Vec<Real> {
        self.voltage.iter().copied().map(Real::from).collect()
    }
}

/// One time-synchronised event of a coincidence stream.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct PulsePair {
    pub a: PulseRecord,
    pub b: PulseRecord,
}

/// Reads the 32 byte stream header. Fails with a format error if fewer bytes are available.
pub fn read_header<R: Read>(reader: &mut R) -> StreamResult<StreamHeader> {
    StreamHeader::load(reader)
}

/// Reads one pulse record of `number_of_cells` samples.
///
/// Returns an empty record as soon as a short read occurs in either array.
/// If any adjacent pair of time samples is decreasing, the whole time array is sorted
/// ascending. The voltage array is left as read.
pub fn read_pulse<R: Read>(reader: &mut R, number_of_cells: usize) -> StreamResult<PulseRecord> {
    let Some(mut time) = load_samples(reader, number_of_cells)? else {
        return Ok(PulseRecord::default());
    };
    if !time.is_sorted_by(|prior, next| prior <= next) {
        trace!("Time samples out of order, re-sorting");
        time.sort_by(Sample::total_cmp);
    }
    let Some(voltage) = load_samples(reader, number_of_cells)? else {
        return Ok(PulseRecord::default());
    };
    Ok(PulseRecord { time, voltage })
}

fn load_samples<R: Read>(reader: &mut R, size: usize) -> StreamResult<Option<Vec<Sample>>> {
    let mut bytes = vec![0u8; size * size_of::<Sample>()];
    let num_bytes = read_fully(reader, &mut bytes)?;
    if num_bytes != bytes.len() || size == 0 {
        debug!("Expected {0} bytes, got {num_bytes}.", bytes.len());
        return Ok(None);
    }
    Ok(Some(
        bytes
            .chunks_exact(size_of::<Sample>())
            .filter_map(|chunk| chunk.try_into().ok().map(Sample::from_le_bytes))
            .collect(),
    ))
}

/// Sequential reader over a pulse stream, holding the decoded header.
#[derive(Debug)]
pub struct PulseStreamReader<R: Read> {
    reader: R,
    header: StreamHeader,
    bytes_read: usize,
}

impl PulseStreamReader<BufReader<File>> {
    pub fn open(path: &Path) -> StreamResult<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> PulseStreamReader<R> {
    pub fn new(mut reader: R) -> StreamResult<Self> {
        let header = read_header(&mut reader)?;
        debug!(
            number_of_cells = header.number_of_cells,
            sweep_ns = header.sweep_ns,
            frequency_ghz = header.frequency_ghz,
            "Read stream header"
        );
        Ok(Self {
            reader,
            header,
            bytes_read: crate::HEADER_SIZE,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Number of bytes consumed so far, including the header.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Reads the next record, or `None` once the stream is exhausted.
    pub fn next_pulse(&mut self) -> StreamResult<Option<PulseRecord>> {
        let pulse = read_pulse(&mut self.reader, self.header.number_of_cells)?;
        if pulse.is_empty() {
            Ok(None)
        } else {
            self.bytes_read += self.header.pulse_bytes();
            Ok(Some(pulse))
        }
    }

    /// Reads the next A then B record, or `None` if either is missing.
    pub fn next_pair(&mut self) -> StreamResult<Option<PulsePair>> {
        let Some(a) = self.next_pulse()? else {
            return Ok(None);
        };
        let Some(b) = self.next_pulse()? else {
            return Ok(None);
        };
        Ok(Some(PulsePair { a, b }))
    }
}
