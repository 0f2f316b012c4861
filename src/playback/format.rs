// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

/// Bitrate assumed when a stream carries no timing information at all
pub const FALLBACK_BITRATE: u32 = 128_000;

/// What probing a buffered artifact found out about its audio track
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    /// Short codec name, e.g. `mp3` or `pcm_u8`
    pub codec: &'static str,
    pub sample_rate: Option<u32>,
    pub duration: Duration,
}

/// Probe an in-memory artifact and work out its playing time.
///
/// The container is demuxed to the end and the packet durations summed, so
/// variable bitrate streams get their real length. The track's frame count
/// is used when no packet could be read, and a fixed bitrate estimate only
/// when the stream has no timing information.
pub fn probe_audio(data: Bytes, extension: Option<&str>) -> Result<AudioInfo, SymphoniaError> {
    let byte_len = data.len();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    // Create a hint using the file extension
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let (track_id, params) = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .map(|t| (t.id, t.codec_params.clone()))
        .ok_or(SymphoniaError::Unsupported("no audio track"))?;

    let counted = count_ticks(&mut *format, track_id);
    let duration = track_duration(&params, counted, byte_len);

    let codec = symphonia::default::get_codecs()
        .get_codec(params.codec)
        .map(|descriptor| descriptor.short_name)
        .unwrap_or("unknown");

    Ok(AudioInfo {
        codec,
        sample_rate: params.sample_rate,
        duration,
    })
}

/// Playing time of `len` bytes at `bits_per_second`
pub fn duration_at_bitrate(len: usize, bits_per_second: u32) -> Duration {
    if bits_per_second == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(len as f64 * 8.0 / f64::from(bits_per_second))
}

/// Sum of the packet durations of `track_id`, in the track's time base
fn count_ticks(format: &mut dyn FormatReader, track_id: u32) -> Option<u64> {
    let mut total: u64 = 0;

    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() == track_id {
                    total = total.saturating_add(packet.dur);
                }
            }
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading packets early");
                break;
            }
        }
    }

    (total > 0).then_some(total)
}

fn track_duration(params: &CodecParameters, counted: Option<u64>, byte_len: usize) -> Duration {
    if let (Some(ticks), Some(time_base)) = (counted, params.time_base) {
        return to_duration(time_base.calc_time(ticks));
    }

    let rate = params.sample_rate.filter(|rate| *rate > 0);
    if let (Some(frames), Some(rate)) = (params.n_frames, rate) {
        return Duration::from_secs_f64(frames as f64 / f64::from(rate));
    }
    if let (Some(frames), Some(time_base)) = (params.n_frames, params.time_base) {
        return to_duration(time_base.calc_time(frames));
    }

    duration_at_bitrate(byte_len, FALLBACK_BITRATE)
}

fn to_duration(time: Time) -> Duration {
    Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac)
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A PCM WAV file holding `seconds` of silence at 8000 bytes per second
    pub fn wav(seconds: u32) -> Vec<u8> {
        let byte_rate: u32 = 8000;
        let data_len = byte_rate * seconds;

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&8000u32.to_le_bytes()); // sample rate
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // block align
        out.extend_from_slice(&8u16.to_le_bytes()); // bits per sample
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(out.len() + data_len as usize, 0x80);
        out
    }

    const MPEG1_LAYER3_KBPS: [u32; 15] = [
        0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
    ];

    /// Silent MPEG-1 Layer III frames at 44.1 kHz, one per entry of `kbps`
    pub fn mp3(kbps: &[u32]) -> Vec<u8> {
        let mut out = Vec::new();
        for rate in kbps {
            let index = MPEG1_LAYER3_KBPS
                .iter()
                .position(|r| r == rate)
                .expect("valid Layer III bitrate") as u8;
            let frame_len = (144 * rate * 1000 / 44_100) as usize;

            let start = out.len();
            out.extend_from_slice(&[0xFF, 0xFB, index << 4, 0xC0]); // mono, no CRC
            out.resize(start + frame_len, 0);
        }
        out
    }

    /// Playing time of `frames` Layer III frames at 44.1 kHz
    pub fn mp3_duration(frames: usize) -> std::time::Duration {
        std::time::Duration::from_secs_f64(frames as f64 * 1152.0 / 44_100.0)
    }
}
