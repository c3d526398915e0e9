//! Intel hex sketches.

use ihex::Record;
use tracing::debug;

use crate::error::Error;

/// Data bytes per hex record.
pub const HEX_LINE_LENGTH: usize = 16;

/// Decode an intel hex sketch to a flat binary.
///
/// The binary covers address 0 up to the last byte any record writes; gaps stay erased (0xFF).
/// No other padding is applied.
pub fn hex_to_bin(hex: &str) -> Result<Vec<u8>, Error> {
    let mut base = 0usize;
    let mut segments = Vec::new();
    for line in hex.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match Record::from_record_string(line)? {
            Record::Data { offset, value } => segments.push((base + offset as usize, value)),
            Record::ExtendedSegmentAddress(segment) => base = (segment as usize) << 4,
            Record::ExtendedLinearAddress(upper) => base = (upper as usize) << 16,
            Record::EndOfFile => break,
            Record::StartSegmentAddress { .. } | Record::StartLinearAddress(_) => {}
        }
    }

    let length = segments
        .iter()
        .map(|(address, data)| address + data.len())
        .max()
        .unwrap_or(0);
    debug!("computed hex data length is {}", length);

    let mut result = vec![0xFF; length];
    for (address, data) in segments {
        result[address..address + data.len()].copy_from_slice(&data);
    }
    Ok(result)
}

/// Encode a binary as intel hex, unmodified.
pub fn bin_to_hex(data: &[u8]) -> Result<String, Error> {
    let mut records = Vec::with_capacity(data.len() / HEX_LINE_LENGTH + 2);
    let mut upper = 0u16;
    for (i, chunk) in data.chunks(HEX_LINE_LENGTH).enumerate() {
        let address = i * HEX_LINE_LENGTH;
        let chunk_upper = (address >> 16) as u16;
        if chunk_upper != upper {
            records.push(Record::ExtendedLinearAddress(chunk_upper));
            upper = chunk_upper;
        }
        records.push(Record::Data {
            offset: (address & 0xFFFF) as u16,
            value: chunk.to_vec(),
        });
    }
    records.push(Record::EndOfFile);
    Ok(ihex::create_object_file_representation(&records)?)
}
