//! # Symphonia Chunk Decoder

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{ChunkDecoder, DecodedBuffer};
use bytes::Bytes;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, instrument, warn};

const MAX_CONSECUTIVE_ERRORS: usize = 10;

/// Decodes whole chunks with Symphonia.
///
/// Corrupted packets are skipped; a chunk fails only when no audio could be
/// decoded or too many packets in a row are unreadable.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaChunkDecoder {
    extension: Option<String>,
}

impl SymphoniaChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe with a container hint (for example `"mp3"` or `"flac"`).
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: Some(extension.into()),
        }
    }
}

#[async_trait]
impl ChunkDecoder for SymphoniaChunkDecoder {
    async fn decode(&self, bytes: Bytes) -> Result<DecodedBuffer> {
        let extension = self.extension.clone();
        tokio::task::spawn_blocking(move || decode_chunk(bytes, extension.as_deref()))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Decode task failed: {}", e)))?
    }
}

#[instrument(skip(bytes), fields(len = bytes.len()))]
fn decode_chunk(bytes: Bytes, extension: Option<&str>) -> Result<DecodedBuffer> {
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let media_source = Box::new(Cursor::new(bytes.to_vec())) as Box<dyn MediaSource>;
    let stream = MediaSourceStream::new(media_source, Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| BridgeError::InvalidData(format!("Failed to probe chunk: {}", e)))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| BridgeError::InvalidData("No supported audio track".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| BridgeError::InvalidData(format!("Unsupported codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);
    let mut consecutive_errors = 0;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(BridgeError::InvalidData(format!(
                    "Failed to read packet: {}",
                    e
                )))
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                consecutive_errors = 0;
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(e @ (SymphoniaError::DecodeError(_) | SymphoniaError::IoError(_))) => {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    return Err(BridgeError::InvalidData(format!(
                        "Chunk corrupted after {} failed packets: {}",
                        MAX_CONSECUTIVE_ERRORS, e
                    )));
                }
                warn!(error = %e, attempt = consecutive_errors, "Skipping corrupted packet");
            }
            Err(e) => {
                return Err(BridgeError::InvalidData(format!(
                    "Failed to decode packet: {}",
                    e
                )))
            }
        }
    }

    if samples.is_empty() || sample_rate == 0 || channels == 0 {
        return Err(BridgeError::InvalidData(
            "Chunk contained no decodable audio".to_string(),
        ));
    }

    let buffer = DecodedBuffer::new(samples, sample_rate, channels);
    debug!(
        frames = buffer.frames(),
        sample_rate,
        channels,
        duration_secs = buffer.duration.as_secs_f64(),
        "Decoded chunk"
    );
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// 16-bit mono PCM WAV
    fn wav(sample_rate: u32, frames: usize) -> Bytes {
        let data_len = (frames * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames {
            let sample = ((i % 64) as i16 - 32) * 256;
            out.extend_from_slice(&sample.to_le_bytes());
        }
        Bytes::from(out)
    }

    #[tokio::test]
    async fn test_decodes_wav_chunk() {
        let decoder = SymphoniaChunkDecoder::with_extension("wav");
        let buffer = decoder.decode(wav(8_000, 4_000)).await.unwrap();

        assert_eq!(buffer.sample_rate, 8_000);
        assert_eq!(buffer.channels, 1);
        assert_eq!(buffer.frames(), 4_000);
        assert_eq!(decoder.decoded_duration(&buffer), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_garbage_is_invalid_data() {
        let decoder = SymphoniaChunkDecoder::new();
        let err = decoder
            .decode(Bytes::from_static(&[0xFF, 0xFB, 0x90, 0x00]))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidData(_)));
    }
}
