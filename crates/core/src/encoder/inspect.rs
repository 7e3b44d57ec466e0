//! FFprobe-based media inspector.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

use super::config::EncoderConfig;
use super::error::EncoderError;
use super::traits::Inspector;
use super::types::MediaInfo;

/// Inspector that shells out to ffprobe.
pub struct FfprobeInspector {
    config: EncoderConfig,
}

impl FfprobeInspector {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, EncoderError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
            bit_rate: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
            r_frame_rate: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| EncoderError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let duration_secs = probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
        let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

        Ok(MediaInfo {
            path: path.to_path_buf(),
            duration_secs,
            width: video_stream.and_then(|s| s.width),
            height: video_stream.and_then(|s| s.height),
            frame_rate: video_stream
                .and_then(|s| s.r_frame_rate.as_deref())
                .and_then(parse_frame_rate),
            bitrate_kbps: probe
                .format
                .bit_rate
                .as_ref()
                .and_then(|b| b.parse::<u64>().ok())
                .map(|b| (b / 1000) as u32),
            video_codec: video_stream.and_then(|s| s.codec_name.clone()),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
        })
    }
}

/// Parses frame rate like "24000/1001" or "30/1".
fn parse_frame_rate(raw: &str) -> Option<f32> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f32>().ok()?;
            let den = den.parse::<f32>().ok()?;
            if den > 0.0 {
                Some(num / den)
            } else {
                None
            }
        }
        None => raw.parse::<f32>().ok(),
    }
}

#[async_trait]
impl Inspector for FfprobeInspector {
    fn name(&self) -> &str {
        "ffprobe"
    }

    async fn inspect(&self, path: &Path) -> Result<MediaInfo, EncoderError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(EncoderError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    EncoderError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EncoderError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_video() {
        let json = r#"{
            "format": {
                "filename": "test.mkv",
                "format_name": "matroska,webm",
                "duration": "7200.0",
                "bit_rate": "5000000"
            },
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "24000/1001"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "channels": 6
                }
            ]
        }"#;

        let info = FfprobeInspector::parse_probe_output(Path::new("test.mkv"), json).unwrap();
        assert_eq!(info.duration_secs, 7200.0);
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.width, Some(1920));
        assert_eq!(info.height, Some(1080));
        assert_eq!(info.bitrate_kbps, Some(5000));
        let fps = info.frame_rate.unwrap();
        assert!((fps - 23.976).abs() < 0.01);
        assert_eq!(info.audio_codec.as_deref(), Some("aac"));
    }

    #[test]
    fn test_parse_probe_output_audio_only() {
        let json = r#"{
            "format": { "duration": "180.5" },
            "streams": [ { "codec_type": "audio", "codec_name": "flac" } ]
        }"#;
        let info = FfprobeInspector::parse_probe_output(Path::new("a.flac"), json).unwrap();
        assert!((info.duration_secs - 180.5).abs() < 0.01);
        assert!(info.video_codec.is_none());
        assert!(info.frame_rate.is_none());
    }

    #[test]
    fn test_parse_probe_output_invalid_json() {
        let err = FfprobeInspector::parse_probe_output(Path::new("x"), "not json").unwrap_err();
        assert!(matches!(err, EncoderError::ParseError { .. }));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[tokio::test]
    async fn test_inspect_missing_file() {
        let inspector = FfprobeInspector::new(EncoderConfig::default());
        let err = inspector
            .inspect(Path::new("/definitely/not/here.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, EncoderError::InputNotFound { .. }));
    }
}
