use crate::{
    PulseRecord,
    error::{StreamError, StreamResult},
    header::{HEADER_SIZE, StreamHeader},
};
use pulse_lifetime_common::Sample;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Streams detector pulses to a binary pulse-stream, the inverse of [crate::PulseStreamReader].
#[derive(Debug)]
pub struct PulseStreamWriter<W: Write> {
    writer: W,
    header: StreamHeader,
    bytes_written: usize,
}

impl PulseStreamWriter<BufWriter<File>> {
    pub fn create(path: &Path, header: StreamHeader) -> StreamResult<Self> {
        Self::new(BufWriter::new(File::create(path)?), header)
    }
}

impl<W: Write> PulseStreamWriter<W> {
    /// Writes the header and returns a writer ready to accept pulses.
    pub fn new(mut writer: W, header: StreamHeader) -> StreamResult<Self> {
        writer.write_all(&header.to_bytes()?)?;
        Ok(Self {
            writer,
            header,
            bytes_written: HEADER_SIZE,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Streams one pulse, both arrays must hold exactly `number_of_cells` samples.
    pub fn write_pulse(&mut self, pulse: &PulseRecord) -> StreamResult<()> {
        self.check_length(&pulse.time)?;
        self.check_length(&pulse.voltage)?;
        for value in pulse.time.iter().chain(&pulse.voltage) {
            self.writer.write_all(&value.to_le_bytes())?;
        }
        self.bytes_written += self.header.pulse_bytes();
        Ok(())
    }

    /// Streams two time-synchronised pulses, A first.
    pub fn write_pulse_pair(&mut self, a: &PulseRecord, b: &PulseRecord) -> StreamResult<()> {
        self.check_length(&b.time)?;
        self.check_length(&b.voltage)?;
        self.write_pulse(a)?;
        self.write_pulse(b)
    }

    /// Flushes and returns the underlying writer.
    pub fn finish(mut self) -> StreamResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn check_length(&self, samples: &[Sample]) -> StreamResult<()> {
        if samples.len() == self.header.number_of_cells {
            Ok(())
        } else {
            Err(StreamError::LengthMismatch {
                expected: self.header.number_of_cells,
                got: samples.len(),
            })
        }
    }
}
