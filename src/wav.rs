//! Minimal strict WAV framing for the batch file path and chunk export.
//!
//! Only one shape is accepted: RIFF/WAVE container, PCM format code 1,
//! mono, 16-bit.  Anything else is rejected with
//! [`EngineError::UnsupportedAudioFormat`] naming the offending parameter,
//! never coerced.  Encoding always produces the matching 44-byte-header
//! PCM16 mono layout.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::EngineError;

/// Decoded mono PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct WavAudio {
    /// Normalized samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// Parse PCM16 mono WAV bytes into normalized samples.
///
/// Unknown chunks between `fmt ` and `data` are skipped (players commonly
/// insert `LIST` metadata there).
pub fn parse_wav(bytes: &[u8]) -> Result<WavAudio, EngineError> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 4];
    read_exact(&mut cursor, &mut magic)?;
    if &magic != b"RIFF" {
        return Err(EngineError::UnsupportedAudioFormat(
            "missing RIFF header".into(),
        ));
    }
    let _riff_size = cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| truncated())?;
    read_exact(&mut cursor, &mut magic)?;
    if &magic != b"WAVE" {
        return Err(EngineError::UnsupportedAudioFormat(
            "missing WAVE identifier".into(),
        ));
    }

    let mut format: Option<(u16, u16, u32, u16)> = None;

    loop {
        let mut id = [0u8; 4];
        if cursor.read_exact(&mut id).is_err() {
            return Err(EngineError::UnsupportedAudioFormat(
                "no data chunk found".into(),
            ));
        }
        let size = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| truncated())? as usize;

        match &id {
            b"fmt " => {
                if size < 16 {
                    return Err(EngineError::UnsupportedAudioFormat(
                        "fmt chunk too short".into(),
                    ));
                }
                let format_code = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())?;
                let channels = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())?;
                let sample_rate = cursor.read_u32::<LittleEndian>().map_err(|_| truncated())?;
                let _byte_rate = cursor.read_u32::<LittleEndian>().map_err(|_| truncated())?;
                let _block_align = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())?;
                let bits = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())?;
                skip(&mut cursor, size - 16)?;

                if format_code != 1 {
                    return Err(EngineError::UnsupportedAudioFormat(format!(
                        "format code {format_code}, only PCM (1) is supported"
                    )));
                }
                if channels != 1 {
                    return Err(EngineError::UnsupportedAudioFormat(format!(
                        "{channels} channels, requires mono"
                    )));
                }
                if bits != 16 {
                    return Err(EngineError::UnsupportedAudioFormat(format!(
                        "{bits}-bit samples, requires 16-bit"
                    )));
                }
                format = Some((format_code, channels, sample_rate, bits));
            }
            b"data" => {
                let (_, _, sample_rate, _) = format.ok_or_else(|| {
                    EngineError::UnsupportedAudioFormat("data chunk before fmt chunk".into())
                })?;

                let count = size / 2;
                let mut samples = Vec::with_capacity(count);
                for _ in 0..count {
                    let raw = cursor.read_i16::<LittleEndian>().map_err(|_| truncated())?;
                    samples.push(raw as f32 / 32768.0);
                }
                return Ok(WavAudio {
                    samples,
                    sample_rate,
                });
            }
            _ => {
                // Chunks are word-aligned; odd sizes carry a pad byte.
                skip(&mut cursor, size + (size & 1))?;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode normalized mono samples as PCM16 WAV bytes.
///
/// Samples are clamped to `[-1.0, 1.0]` before quantization.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_size = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + samples.len() * 2);

    out.extend_from_slice(b"RIFF");
    out.write_u32::<LittleEndian>(36 + data_size).unwrap();
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.write_u32::<LittleEndian>(16).unwrap();
    out.write_u16::<LittleEndian>(1).unwrap(); // PCM
    out.write_u16::<LittleEndian>(1).unwrap(); // mono
    out.write_u32::<LittleEndian>(sample_rate).unwrap();
    out.write_u32::<LittleEndian>(sample_rate * 2).unwrap(); // byte rate
    out.write_u16::<LittleEndian>(2).unwrap(); // block align
    out.write_u16::<LittleEndian>(16).unwrap(); // bits per sample

    out.extend_from_slice(b"data");
    out.write_u32::<LittleEndian>(data_size).unwrap();
    for &sample in samples {
        let clamped = if sample.is_finite() {
            sample.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let raw = (clamped * 32767.0).round() as i16;
        out.write_i16::<LittleEndian>(raw).unwrap();
    }

    out
}

fn truncated() -> EngineError {
    EngineError::UnsupportedAudioFormat("truncated file".into())
}

fn read_exact(cursor: &mut Cursor<&[u8]>, buf: &mut [u8]) -> Result<(), EngineError> {
    cursor.read_exact(buf).map_err(|_| truncated())
}

fn skip(cursor: &mut Cursor<&[u8]>, n: usize) -> Result<(), EngineError> {
    let pos = cursor.position() + n as u64;
    if pos > cursor.get_ref().len() as u64 {
        return Err(truncated());
    }
    cursor.set_position(pos);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
