//! Audio transcoding
//!
//! Decodes a fetched source payload (MP3 in production; any symphonia
//! container is accepted) to mono f32 PCM and re-encodes it as 16-bit PCM
//! WAV. Deterministic given identical input bytes and target parameters.

use crate::error::StageError;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Decoded audio payload
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count of the source before downmix
    pub channels: usize,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode an in-memory audio payload to mono f32 PCM
///
/// Probes the container, decodes the default audio track, and averages
/// channels to mono. Fails with [`StageError::Decode`] on malformed input.
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedAudio, StageError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| StageError::Decode(format!("unrecognized container: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| StageError::Decode("no audio track found".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| StageError::Decode("sample rate unknown".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| StageError::Decode("channel layout unknown".to_string()))?;
    let channel_count = channels.count();

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| StageError::Decode(format!("no decoder for codec: {}", e)))?;

    let mut mono: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(StageError::Decode(format!("packet read failed: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| StageError::Decode(format!("packet decode failed: {}", e)))?;

        // Reallocate if a packet carries more frames than the current buffer
        let needed_samples = decoded.capacity() * channel_count;
        let reallocate = sample_buf
            .as_ref()
            .map(|buf| buf.capacity() < needed_samples)
            .unwrap_or(true);
        if reallocate {
            sample_buf = Some(SampleBuffer::<f32>::new(
                decoded.capacity() as u64,
                *decoded.spec(),
            ));
        }
        let buf = sample_buf.as_mut().expect("sample buffer allocated above");
        buf.copy_interleaved_ref(decoded);

        for frame in buf.samples().chunks_exact(channel_count) {
            let sum: f32 = frame.iter().sum();
            mono.push(sum / channel_count as f32);
        }
    }

    if mono.is_empty() {
        return Err(StageError::Decode("no decodable audio frames".to_string()));
    }

    debug!(
        samples = mono.len(),
        sample_rate = sample_rate,
        channels = channel_count,
        "Audio decoded"
    );

    Ok(DecodedAudio {
        samples: mono,
        sample_rate,
        channels: channel_count,
    })
}

/// Transcode a source payload to mono 16-bit PCM WAV bytes
pub fn to_wav(source_bytes: &[u8]) -> Result<Vec<u8>, StageError> {
    let decoded = decode_bytes(source_bytes)?;
    encode_wav(&decoded.samples, decoded.sample_rate)
}

/// Encode mono f32 samples as 16-bit PCM WAV
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, StageError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| StageError::Decode(format!("WAV header write failed: {}", e)))?;
        for &sample in samples {
            let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(quantized)
                .map_err(|e| StageError::Decode(format!("WAV sample write failed: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| StageError::Decode(format!("WAV finalize failed: {}", e)))?;
    }
    Ok(cursor.into_inner())
}
