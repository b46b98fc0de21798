//! WAV (RIFF) reading and writing.

use crate::FormatError;
use pm_core::AuFormat;
use std::io::Write;

// Format codes from the fmt chunk.
const TAG_PCM: u16 = 0x0001;
const TAG_IEEE_FLOAT: u16 = 0x0003;
const TAG_ALAW: u16 = 0x0006;
const TAG_MULAW: u16 = 0x0007;
const TAG_EXTENSIBLE: u16 = 0xFFFE;

/// Decoded WAV container: format description plus the raw interleaved
/// sample bytes of the data chunk.
#[derive(Clone, Debug)]
pub struct WavData {
    /// Sample encoding
    pub format: AuFormat,
    /// Interleaved channel count (1 or 2)
    pub channels: u16,
    /// Samples per second
    pub sample_rate: u32,
    /// Bytes per frame, all channels
    pub block_align: u16,
    /// Bits per sample, one channel
    pub bits_per_sample: u16,
    /// Raw data chunk payload
    pub data: Vec<u8>,
}

impl WavData {
    /// Number of frames in the data chunk.
    pub fn frames(&self) -> usize {
        if self.block_align == 0 {
            0
        } else {
            self.data.len() / self.block_align as usize
        }
    }
}

/// Returns true if the bytes start with a RIFF/WAVE header.
pub fn is_wav(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

/// Parse a WAV file from raw bytes.
///
/// Walks the RIFF chunk list: `fmt ` (including the EXTENSIBLE
/// SubFormat), `fact` and `data` may appear in any order; unknown chunks
/// are skipped. Odd-sized chunks carry a pad byte.
pub fn load_wav(bytes: &[u8]) -> Result<WavData, FormatError> {
    if bytes.len() < 12 {
        return Err(FormatError::UnexpectedEof);
    }
    if !is_wav(bytes) {
        return Err(FormatError::InvalidHeader);
    }

    let mut fmt: Option<FmtChunk> = None;
    let mut data: Option<Vec<u8>> = None;

    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = read_u32(bytes, pos + 4)? as usize;
        let body = pos + 8;
        if body + size > bytes.len() {
            return Err(FormatError::UnexpectedEof);
        }

        match id {
            b"fmt " => fmt = Some(parse_fmt(&bytes[body..body + size])?),
            b"data" => data = Some(bytes[body..body + size].to_vec()),
            // "fact" (sample count) and any other chunk: skip
            _ => {}
        }

        // chunks are word aligned; odd sizes carry a pad byte
        pos = body + size + (size & 1);
    }

    let fmt = fmt.ok_or(FormatError::InvalidHeader)?;
    let data = data.ok_or(FormatError::InvalidHeader)?;

    if fmt.channels == 0 || fmt.channels > 2 || fmt.block_align == 0 {
        return Err(FormatError::UnsupportedFormat);
    }

    let format = resolve_format(fmt.tag, fmt.bits_per_sample)?;

    Ok(WavData {
        format,
        channels: fmt.channels,
        sample_rate: fmt.sample_rate,
        block_align: fmt.block_align,
        bits_per_sample: fmt.bits_per_sample,
        data,
    })
}

struct FmtChunk {
    tag: u16,
    channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

fn parse_fmt(body: &[u8]) -> Result<FmtChunk, FormatError> {
    if body.len() < 16 {
        return Err(FormatError::UnexpectedEof);
    }
    let mut tag = read_u16(body, 0)?;
    let channels = read_u16(body, 2)?;
    let sample_rate = read_u32(body, 4)?;
    let block_align = read_u16(body, 12)?;
    let bits_per_sample = read_u16(body, 14)?;

    if tag == TAG_EXTENSIBLE {
        // extension: cbSize, wValidBitsPerSample, dwChannelMask, then the
        // SubFormat GUID whose leading two bytes are the real format code
        if body.len() < 18 {
            return Err(FormatError::UnexpectedEof);
        }
        let cb_size = read_u16(body, 16)?;
        if cb_size < 22 || body.len() < 18 + 22 {
            return Err(FormatError::UnsupportedFormat);
        }
        tag = read_u16(body, 24)?;
    }

    Ok(FmtChunk { tag, channels, sample_rate, block_align, bits_per_sample })
}

fn resolve_format(tag: u16, bits: u16) -> Result<AuFormat, FormatError> {
    match tag {
        TAG_PCM => match bits {
            8 => Ok(AuFormat::Uint8),
            // 12-bit data is aligned into 16-bit containers
            12 | 16 => Ok(AuFormat::Int16),
            24 => Ok(AuFormat::Int24),
            32 => Ok(AuFormat::Int32),
            _ => Err(FormatError::UnsupportedFormat),
        },
        TAG_IEEE_FLOAT => match bits {
            32 => Ok(AuFormat::Float32),
            64 => Ok(AuFormat::Float64),
            _ => Err(FormatError::UnsupportedFormat),
        },
        TAG_ALAW => Ok(AuFormat::ALaw),
        TAG_MULAW => Ok(AuFormat::MuLaw),
        _ => Err(FormatError::UnsupportedFormat),
    }
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, FormatError> {
    if offset + 2 > data.len() {
        return Err(FormatError::UnexpectedEof);
    }
    Ok(u16::from_le_bytes([data[offset], data[offset + 1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, FormatError> {
    if offset + 4 > data.len() {
        return Err(FormatError::UnexpectedEof);
    }
    Ok(u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]))
}

// --- Writing ---

/// Write interleaved 16-bit PCM samples as a WAV file.
pub fn write_wav(
    w: &mut impl Write,
    samples: &[i16],
    channels: u16,
    sample_rate: u32,
) -> std::io::Result<()> {
    let block_align = channels * 2;
    let data_size = (samples.len() * 2) as u32;

    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")?;

    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&TAG_PCM.to_le_bytes())?;
    w.write_all(&channels.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&16u16.to_le_bytes())?;

    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    for s in samples {
        w.write_all(&s.to_le_bytes())?;
    }
    Ok(())
}
