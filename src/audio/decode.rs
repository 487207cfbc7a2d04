//! Decode fetched audio bytes into an [`AudioBuffer`] with Symphonia.

use std::io::{self, Cursor};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::debug;

use crate::audio::buffer::AudioBuffer;
use crate::error::ClockError;

/// File extension of a URL, used as a probe hint
pub fn extension_hint(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

pub fn decode_audio(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioBuffer, ClockError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ClockError::Decode(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| ClockError::Decode("no default audio track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let channels = codec_params
        .channels
        .ok_or_else(|| ClockError::Decode("audio track missing channel info".into()))?;
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| ClockError::Decode("audio track missing sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| ClockError::Decode(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }
                let decoded = match decoder.decode(&packet) {
                    Ok(buf) => buf,
                    Err(Error::DecodeError(_)) => continue,
                    Err(err) => return Err(ClockError::Decode(err.to_string())),
                };
                let mut sample_buf =
                    SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                sample_buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(sample_buf.samples());
            }
            Err(Error::IoError(err)) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(Error::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(Error::DecodeError(_)) => continue,
            Err(err) => return Err(ClockError::Decode(err.to_string())),
        }
    }

    if samples.is_empty() {
        return Err(ClockError::Decode("no audio samples produced".into()));
    }

    let buffer = AudioBuffer::new(samples, sample_rate, channels.count().max(1) as u16);
    debug!(
        channels = buffer.channels,
        sample_rate = buffer.sample_rate,
        seconds = buffer.duration(),
        "audio decoded"
    );
    Ok(buffer)
}

/// 16-bit PCM WAV bytes, for feeding the decoder in tests
#[cfg(test)]
pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_hint("https://cdn/x/voice.mp3?sig=abc"), Some("mp3"));
        assert_eq!(extension_hint("file:///tmp/music.wav"), Some("wav"));
        assert_eq!(extension_hint("https://cdn/x/noext"), None);
    }

    #[test]
    fn test_decode_wav() {
        let samples: Vec<i16> = (0..8_000).map(|i| if i % 2 == 0 { 16_384 } else { -16_384 }).collect();
        let buffer = decode_audio(wav_bytes(8_000, 1, &samples), Some("wav")).unwrap();

        assert_eq!(buffer.sample_rate, 8_000);
        assert_eq!(buffer.channels, 1);
        assert_eq!(buffer.frame_count(), 8_000);
        assert!((buffer.samples[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_audio(vec![0u8; 64], None).unwrap_err();
        assert!(matches!(err, ClockError::Decode(_)));
    }
}
