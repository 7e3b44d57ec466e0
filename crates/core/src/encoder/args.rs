//! Encoder argument construction.

use crate::job::{ConversionSettings, Job};
use std::path::Path;

/// Default audio codec when none is requested.
pub const DEFAULT_AUDIO_CODEC: &str = "aac";

/// Builds the ffmpeg argument list for a job.
///
/// Pure: the result depends only on the job's paths and settings. Raw extra
/// arguments come after the structured flags so they can override them, and
/// the output path is always last.
pub fn build_args(job: &Job) -> Vec<String> {
    build_args_for(&job.input_path, &job.output_path, &job.settings)
}

/// Builds the ffmpeg argument list from paths and settings.
pub fn build_args_for(input: &Path, output: &Path, settings: &ConversionSettings) -> Vec<String> {
    let effective = settings.resolve();

    let mut args = vec!["-i".to_string(), input.to_string_lossy().to_string()];

    // Video
    args.extend([
        "-c:v".to_string(),
        settings.format.video_codec().to_string(),
    ]);

    if let Some(bitrate) = effective.video_bitrate_kbps {
        args.extend(["-b:v".to_string(), format!("{}k", bitrate)]);
    }

    if let Some(resolution) = effective.resolution {
        if settings.preserve_aspect_ratio {
            args.extend([
                "-vf".to_string(),
                format!(
                    "scale={}:{}:force_original_aspect_ratio=decrease",
                    resolution.width, resolution.height
                ),
            ]);
        } else {
            args.extend(["-s".to_string(), resolution.to_string()]);
        }
    }

    if let Some(fps) = effective.frame_rate {
        args.extend(["-r".to_string(), fps.to_string()]);
    }

    // Audio
    args.extend([
        "-c:a".to_string(),
        effective
            .audio_codec
            .unwrap_or_else(|| DEFAULT_AUDIO_CODEC.to_string()),
    ]);
    if let Some(bitrate) = effective.audio_bitrate_kbps {
        args.extend(["-b:a".to_string(), format!("{}k", bitrate)]);
    }

    // Trim: start offset plus a duration, never an absolute end
    if let Some(trim) = settings.trim.filter(|t| !t.is_empty()) {
        args.extend(["-ss".to_string(), format_secs(trim.start())]);
        if let Some(duration) = trim.duration() {
            args.extend(["-t".to_string(), format_secs(duration)]);
        }
    }

    args.extend(settings.extra_args.iter().cloned());

    // Machine-readable progress on stderr
    args.extend(["-progress".to_string(), "pipe:2".to_string()]);
    args.push("-y".to_string());
    args.push(output.to_string_lossy().to_string());

    args
}

/// Formats seconds with millisecond precision and no trailing zeros.
fn format_secs(secs: f64) -> String {
    let rounded = (secs * 1000.0).round() / 1000.0;
    rounded.to_string()
}
