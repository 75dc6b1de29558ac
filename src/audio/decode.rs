use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::DecodeError;

/// Planar PCM for one track. Shared between the playback output and the
/// extraction worker.
#[derive(Debug, Clone)]
pub struct DecodedTrack {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl DecodedTrack {
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn duration(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }

    pub fn first_channel(&self) -> &[f32] {
        self.channels.first().map_or(&[], |c| c.as_slice())
    }

    /// Mono mix of one frame, used by the playback tap.
    pub fn mono_at(&self, frame: usize) -> f32 {
        let n = self.channels.len().max(1) as f32;
        self.channels
            .iter()
            .map(|c| c.get(frame).copied().unwrap_or(0.0))
            .sum::<f32>()
            / n
    }
}

/// Decode an in-memory media file. `extension` is only a format hint.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedTrack, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(DecodeError::UnknownFormat)?;

    let mut format = detected.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;

    let track_id = track.id;
    let channel_count = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::UnknownSampleRate)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(DecodeError::Codec)?;

    let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count];

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(DecodeError::Packet(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecodeError::Packet(e)),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        let stride = spec.channels.count().max(1);

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        // De-interleave; extra decoder channels beyond the track header are dropped
        for frame in sample_buf.samples().chunks(stride) {
            for (ch, out) in channels.iter_mut().enumerate() {
                out.push(frame.get(ch).copied().unwrap_or(0.0));
            }
        }
    }

    let track = DecodedTrack { channels, sample_rate };
    if track.frames() == 0 {
        return Err(DecodeError::Empty);
    }

    log::info!(
        "Decoded audio: {} frames x {} ch, {}Hz, {:.1}s",
        track.frames(),
        channel_count,
        sample_rate,
        track.duration()
    );

    Ok(track)
}
