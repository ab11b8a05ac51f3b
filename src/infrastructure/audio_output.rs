use crate::infrastructure::error::InfraError;
use log::debug;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
}

/// One oscillator note, scheduled relative to the start of its sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: f32,
    pub start_offset: Duration,
    pub duration: Duration,
    pub waveform: Waveform,
}

impl Tone {
    pub const fn sine(frequency_hz: f32, start_offset_ms: u64, duration_ms: u64) -> Self {
        Self {
            frequency_hz,
            start_offset: Duration::from_millis(start_offset_ms),
            duration: Duration::from_millis(duration_ms),
            waveform: Waveform::Sine,
        }
    }

    pub const fn square(frequency_hz: f32, start_offset_ms: u64, duration_ms: u64) -> Self {
        Self {
            waveform: Waveform::Square,
            ..Self::sine(frequency_hz, start_offset_ms, duration_ms)
        }
    }
}

/// Sound output device. Implementations schedule playback and return without blocking.
pub trait AudioOutput: Send + Sync {
    fn play_tone(&self, tone: &Tone) -> Result<(), InfraError>;
    /// Starts an encoded clip and reports its length.
    fn play_buffer(&self, bytes: &[u8]) -> Result<Duration, InfraError>;
    /// Cuts whatever is currently sounding.
    fn silence(&self);
}

/// Headless output: nothing is audible, playback is traced at debug level.
#[derive(Debug, Default)]
pub struct LoggingAudioOutput;

impl AudioOutput for LoggingAudioOutput {
    fn play_tone(&self, tone: &Tone) -> Result<(), InfraError> {
        debug!(
            "tone {:?} {:.2}Hz at +{}ms for {}ms",
            tone.waveform,
            tone.frequency_hz,
            tone.start_offset.as_millis(),
            tone.duration.as_millis()
        );
        Ok(())
    }

    fn play_buffer(&self, bytes: &[u8]) -> Result<Duration, InfraError> {
        if bytes.is_empty() {
            return Err(InfraError::Audio("audio clip is empty".to_string()));
        }
        let length = clip_length(bytes);
        debug!("clip of {} bytes, about {}ms", bytes.len(), length.as_millis());
        Ok(length)
    }

    fn silence(&self) {
        debug!("audio silenced");
    }
}

const WAV_HEADER_LEN: usize = 44;
const UNKNOWN_CLIP_LENGTH: Duration = Duration::from_secs(1);

/// Length of a PCM WAV clip from its header; other formats report one second.
pub fn clip_length(bytes: &[u8]) -> Duration {
    if bytes.len() < WAV_HEADER_LEN || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return UNKNOWN_CLIP_LENGTH;
    }
    let byte_rate = u32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]);
    if byte_rate == 0 {
        return UNKNOWN_CLIP_LENGTH;
    }
    let data_len = (bytes.len() - WAV_HEADER_LEN) as f64;
    Duration::from_secs_f64(data_len / f64::from(byte_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_with(byte_rate: u32, data_len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; WAV_HEADER_LEN + data_len];
        bytes[0..4].copy_from_slice(b"RIFF");
        bytes[8..12].copy_from_slice(b"WAVE");
        bytes[28..32].copy_from_slice(&byte_rate.to_le_bytes());
        bytes
    }

    #[test]
    fn clip_length_reads_wav_byte_rate() {
        let clip = wav_with(8_000, 4_000);
        assert_eq!(clip_length(&clip), Duration::from_millis(500));
    }

    #[test]
    fn unknown_formats_report_one_second() {
        assert_eq!(clip_length(b"ID3\x03mp3-ish"), UNKNOWN_CLIP_LENGTH);
        assert_eq!(clip_length(&wav_with(0, 10)), UNKNOWN_CLIP_LENGTH);
    }

    #[test]
    fn logging_output_rejects_empty_clip() {
        let output = LoggingAudioOutput;
        assert!(output.play_buffer(&[]).is_err());
        assert!(output.play_tone(&Tone::square(1000.0, 0, 200)).is_ok());
    }
}
