//! Reading and writing of binary pulse streams.
//!
//! A pulse stream begins with a fixed 32 byte header, followed by a sequence of pulse records.
//! Each record holds `number_of_cells` little-endian `f32` time samples (ns) followed by the
//! same number of `f32` voltage samples (mV). A two-channel coincidence stream interleaves one
//! record from detector A and one record from detector B per event.
//!
//! A short read in the middle of a record is the stream's end-of-data signal, not an error.

mod error;
mod header;
mod reader;
mod writer;

pub use error::{FormatError, StreamError};
pub use header::{HEADER_SIZE, StreamHeader};
pub use reader::{PulsePair, PulseRecord, PulseStreamReader, read_header, read_pulse};
pub use writer::PulseStreamWriter;
