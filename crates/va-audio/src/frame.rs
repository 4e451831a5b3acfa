use std::io::Cursor;

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, Result};

pub const SAMPLE_RATE_HZ: u32 = 16_000;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const CHANNELS: u16 = 1;

/// A single unit of inbound audio, already addressed to a session.
/// Produced by `ClientTransport` from either a raw binary websocket
/// frame or a base64 text envelope — both collapse to this shape before
/// `AudioIntake` ever sees them (SPEC_FULL §4.1).
#[derive(Debug, Clone)]
pub struct FrameUnit {
    pub session_id: String,
    pub bytes: Vec<u8>,
    pub received_at_ms: u64,
}

/// Decodes a WAV payload to mono 16kHz 16-bit PCM samples, rejecting
/// anything that doesn't match that exact format. The server has no
/// resampler — it was the client's job to record at this rate.
pub fn decode_pcm(wav_bytes: &[u8]) -> Result<Vec<i16>> {
    let cursor = Cursor::new(wav_bytes);
    let mut reader = hound::WavReader::new(cursor)
        .map_err(|e| AudioError::InvalidWav(e.to_string()))?;

    let spec = reader.spec();
    if spec.channels != CHANNELS {
        return Err(AudioError::UnsupportedFormat(format!(
            "expected {CHANNELS} channel(s), got {}",
            spec.channels
        )));
    }
    if spec.sample_rate != SAMPLE_RATE_HZ {
        return Err(AudioError::UnsupportedFormat(format!(
            "expected {SAMPLE_RATE_HZ}Hz sample rate, got {}",
            spec.sample_rate
        )));
    }
    if spec.bits_per_sample != BITS_PER_SAMPLE || spec.sample_format != hound::SampleFormat::Int {
        return Err(AudioError::UnsupportedFormat(format!(
            "expected {BITS_PER_SAMPLE}-bit PCM, got {}-bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<i16>, _>>()
        .map_err(|e| AudioError::InvalidWav(e.to_string()))
}

/// Encodes mono 16kHz 16-bit PCM samples as a WAV byte buffer, for
/// batching several `FrameUnit`s into a single `Transcriber` call.
pub fn encode_pcm(samples: &[i16]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let spec = hound::WavSpec {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE_HZ,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AudioError::InvalidWav(e.to_string()))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| AudioError::InvalidWav(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| AudioError::InvalidWav(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Validates without fully decoding — used by `AudioIntake::push` to
/// reject garbage before it ever reaches a queue.
pub fn validate_wav(wav_bytes: &[u8]) -> Result<()> {
    decode_pcm(wav_bytes).map(|_| ())
}

/// The text-envelope shape of an inbound audio frame
/// (`{"type": "audio_chunk", "session_id": "...", "data": "<base64 wav>"}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunkEnvelope {
    pub session_id: String,
    pub data: String,
}

impl AudioChunkEnvelope {
    pub fn decode_bytes(&self) -> Result<Vec<u8>> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| AudioError::InvalidBase64(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_pcm_through_wav() {
        let samples = vec![100i16, -200, 300, 0, -1];
        let wav = encode_pcm(&samples).unwrap();
        let decoded = decode_pcm(&wav).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn rejects_wrong_sample_rate() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: 44_100,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0i16).unwrap();
            writer.finalize().unwrap();
        }
        let err = decode_pcm(&cursor.into_inner()).unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat(_)));
    }

    #[test]
    fn rejects_stereo() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let spec = hound::WavSpec {
                channels: 2,
                sample_rate: SAMPLE_RATE_HZ,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0i16).unwrap();
            writer.write_sample(0i16).unwrap();
            writer.finalize().unwrap();
        }
        let err = decode_pcm(&cursor.into_inner()).unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedFormat(_)));
    }

    #[test]
    fn envelope_decodes_base64() {
        let wav = encode_pcm(&[1, 2, 3]).unwrap();
        use base64::Engine;
        let data = base64::engine::general_purpose::STANDARD.encode(&wav);
        let envelope = AudioChunkEnvelope {
            session_id: "s1".to_string(),
            data,
        };
        assert_eq!(envelope.decode_bytes().unwrap(), wav);
    }
}
