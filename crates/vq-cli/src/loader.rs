//! Audio file loading
//!
//! WAV goes through hound, everything else through symphonia. Multi-channel
//! files are averaged down to mono before scoring.

use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use vq_engine::AudioSignal;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("INVALID_ARGUMENT: Failed to load audio file {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("INVALID_ARGUMENT: {path} contains no audio")]
    Empty { path: String },

    #[error(
        "INVALID_ARGUMENT: Sample rate mismatch: reference={reference}Hz, degraded={degraded}Hz"
    )]
    SampleRateMismatch { reference: u32, degraded: u32 },
}

impl LoadError {
    fn decode(path: &str, reason: impl std::fmt::Display) -> Self {
        LoadError::Decode {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Decoded file, one vector per channel
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub channels: Vec<Vec<f64>>,
    pub sample_rate: u32,
    pub source_path: String,
}

impl AudioFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let is_wav = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        let file = if is_wav {
            Self::load_wav(path, &path_str)?
        } else {
            Self::load_symphonia(path, &path_str)?
        };

        if file.num_samples() == 0 {
            return Err(LoadError::Empty { path: path_str });
        }
        log::debug!(
            "Loaded {}: {} Hz, {} channels, {:.3}s",
            file.source_path,
            file.sample_rate,
            file.channels.len(),
            file.num_samples() as f64 / file.sample_rate as f64
        );
        Ok(file)
    }

    fn load_wav(path: &Path, path_str: &str) -> Result<Self, LoadError> {
        let reader = hound::WavReader::open(path).map_err(|e| LoadError::decode(path_str, e))?;

        let spec = reader.spec();
        let num_channels = (spec.channels as usize).max(1);

        let samples: Vec<f64> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .map(|s| s.map(|v| v as f64))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| LoadError::decode(path_str, e))?,
            hound::SampleFormat::Int => {
                let full_scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f64;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f64 / full_scale))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| LoadError::decode(path_str, e))?
            }
        };

        let frames = samples.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(frames); num_channels];
        for (i, sample) in samples.into_iter().enumerate() {
            channels[i % num_channels].push(sample);
        }

        Ok(Self {
            channels,
            sample_rate: spec.sample_rate,
            source_path: path_str.to_string(),
        })
    }

    fn load_symphonia(path: &Path, path_str: &str) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path).map_err(|e| LoadError::decode(path_str, e))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::decode(path_str, e))?;
        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| LoadError::decode(path_str, "no audio track"))?;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| LoadError::decode(path_str, "unknown sample rate"))?;
        let num_channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| LoadError::decode(path_str, "unknown channel layout"))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::decode(path_str, e))?;

        let track_id = track.id;
        let mut channels = vec![Vec::new(); num_channels];

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(LoadError::decode(path_str, e)),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                // Recoverable: skip the corrupt packet
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("{}: skipping undecodable packet: {}", path_str, e);
                    continue;
                }
                Err(e) => return Err(LoadError::decode(path_str, e)),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }
            let mut buffer = SampleBuffer::<f64>::new(decoded.capacity() as u64, *decoded.spec());
            buffer.copy_planar_ref(decoded);
            for (channel, plane) in channels.iter_mut().zip(buffer.samples().chunks(frames)) {
                channel.extend_from_slice(plane);
            }
        }

        Ok(Self {
            channels,
            sample_rate,
            source_path: path_str.to_string(),
        })
    }

    /// Frames in the shortest channel
    pub fn num_samples(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// Average all channels
    pub fn to_mono(&self) -> Vec<f64> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }

        let scale = 1.0 / self.channels.len() as f64;
        (0..self.num_samples())
            .map(|i| self.channels.iter().map(|ch| ch[i]).sum::<f64>() * scale)
            .collect()
    }

    pub fn into_signal(self) -> AudioSignal {
        AudioSignal::new(self.to_mono(), self.sample_rate)
    }
}

/// Load a reference/degraded pair that shares a sample rate
pub fn load_pair(
    reference: &Path,
    degraded: &Path,
) -> Result<(AudioSignal, AudioSignal), LoadError> {
    let reference = AudioFile::load(reference)?;
    let degraded = AudioFile::load(degraded)?;
    if reference.sample_rate != degraded.sample_rate {
        return Err(LoadError::SampleRateMismatch {
            reference: reference.sample_rate,
            degraded: degraded.sample_rate,
        });
    }
    Ok((reference.into_signal(), degraded.into_signal()))
}
