//! Parsing of ffmpeg progress output.
//!
//! ffmpeg writes `key=value` progress blocks to stderr when run with
//! `-progress pipe:2`, and a one-line stats summary (`frame=  100 fps= 25 ...`)
//! otherwise. Both shapes are understood. The parser keeps no state of its
//! own: callers pass the previous snapshot and get the next one back.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::job::ProgressSnapshot;

static FRAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bframe=\s*(\d+)").unwrap());
static FPS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bfps=\s*(\d+(?:\.\d+)?)").unwrap());
static BITRATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bbitrate=\s*(\d+(?:\.\d+)?)\s*kbits/s").unwrap());
static SPEED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bspeed=\s*(\d+(?:\.\d+)?)x").unwrap());
// out_time_ms is in microseconds too (long-standing ffmpeg quirk)
static OUT_TIME_US_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bout_time_(?:us|ms)=\s*(\d+)").unwrap());
static STATS_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\btime=\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap());
static PROGRESS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bprogress=(\w+)").unwrap());

/// Returns true if the line carries any progress marker.
pub fn is_progress_line(line: &str) -> bool {
    FRAME_RE.is_match(line)
        || OUT_TIME_US_RE.is_match(line)
        || STATS_TIME_RE.is_match(line)
        || SPEED_RE.is_match(line)
        || PROGRESS_RE.is_match(line)
        || line.starts_with("out_time=")
        || line.starts_with("total_size=")
        || line.starts_with("dup_frames=")
        || line.starts_with("drop_frames=")
        || line.starts_with("stream_")
        || FPS_RE.is_match(line)
        || BITRATE_RE.is_match(line)
        || line.starts_with("bitrate=")
}

/// Parses one chunk of encoder output on top of `previous`.
///
/// Only fields whose markers appear in the chunk change. Returns `None` when
/// the chunk carried no recognised marker.
pub fn feed(chunk: &str, previous: &ProgressSnapshot) -> Option<ProgressSnapshot> {
    let mut next = previous.clone();
    let mut found = false;

    for line in chunk.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        found |= apply_line(line, &mut next);
    }

    if !found {
        return None;
    }

    recompute_derived(&mut next, previous);
    Some(next)
}

fn apply_line(line: &str, snapshot: &mut ProgressSnapshot) -> bool {
    let mut found = false;

    if let Some(frame) = capture(&FRAME_RE, line).and_then(|v| v.parse::<u64>().ok()) {
        snapshot.frame = Some(frame);
        found = true;
    }

    if let Some(fps) = capture(&FPS_RE, line).and_then(|v| v.parse::<f64>().ok()) {
        snapshot.fps = Some(fps);
        found = true;
    }

    if let Some(bitrate) = capture(&BITRATE_RE, line).and_then(|v| v.parse::<f64>().ok()) {
        snapshot.bitrate_kbps = Some(bitrate);
        found = true;
    }

    if let Some(speed) = capture(&SPEED_RE, line).and_then(|v| v.parse::<f64>().ok()) {
        snapshot.speed = Some(speed);
        found = true;
    }

    if let Some(us) = capture(&OUT_TIME_US_RE, line).and_then(|v| v.parse::<f64>().ok()) {
        snapshot.current_time = us / 1_000_000.0;
        found = true;
    } else if let Some(caps) = STATS_TIME_RE.captures(line) {
        let hours = caps[1].parse::<f64>().unwrap_or(0.0);
        let minutes = caps[2].parse::<f64>().unwrap_or(0.0);
        let seconds = caps[3].parse::<f64>().unwrap_or(0.0);
        snapshot.current_time = hours * 3600.0 + minutes * 60.0 + seconds;
        found = true;
    }

    if let Some(state) = capture(&PROGRESS_RE, line) {
        snapshot.stage = match state {
            "end" => "finalizing".to_string(),
            _ => "encoding".to_string(),
        };
        found = true;
    }

    found
}

fn capture<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Updates percentage and eta from time, duration and speed.
fn recompute_derived(next: &mut ProgressSnapshot, previous: &ProgressSnapshot) {
    if next.stage == "starting" {
        next.stage = "encoding".to_string();
    }

    let Some(total) = next.total_time.filter(|t| *t > 0.0) else {
        return;
    };

    let percentage = (next.current_time / total * 100.0).clamp(0.0, 100.0);
    // Never report going backwards within one job
    next.percentage = percentage.max(previous.percentage.clamp(0.0, 100.0));

    if let Some(speed) = next.speed.filter(|s| *s > 0.0) {
        next.eta_secs = Some(((total - next.current_time).max(0.0)) / speed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_total(total: f64) -> ProgressSnapshot {
        ProgressSnapshot::starting(Some(total))
    }

    #[test]
    fn test_two_chunk_accumulation() {
        let start = with_total(10.0);

        let first = feed("frame=100 fps=25", &start).unwrap();
        assert_eq!(first.frame, Some(100));
        assert_eq!(first.fps, Some(25.0));
        assert_eq!(first.percentage, 0.0);

        let second = feed("out_time_ms=4000000", &first).unwrap();
        assert_eq!(second.frame, Some(100));
        assert_eq!(second.fps, Some(25.0));
        assert_eq!(second.current_time, 4.0);
        assert!((second.percentage - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_block() {
        let block = "frame=250\nfps=50.00\nstream_0_0_q=28.0\nbitrate=1536.2kbits/s\n\
                     total_size=1920000\nout_time_us=10000000\nout_time_ms=10000000\n\
                     out_time=00:00:10.000000\ndup_frames=0\ndrop_frames=0\nspeed=2.0x\n\
                     progress=continue\n";
        let snapshot = feed(block, &with_total(40.0)).unwrap();

        assert_eq!(snapshot.frame, Some(250));
        assert_eq!(snapshot.fps, Some(50.0));
        assert_eq!(snapshot.bitrate_kbps, Some(1536.2));
        assert_eq!(snapshot.speed, Some(2.0));
        assert_eq!(snapshot.current_time, 10.0);
        assert_eq!(snapshot.percentage, 25.0);
        assert_eq!(snapshot.eta_secs, Some(15.0));
        assert_eq!(snapshot.stage, "encoding");
    }

    #[test]
    fn test_classic_stats_line() {
        let line = "frame=  120 fps= 30 q=28.0 size=     512kB time=00:01:02.50 \
                    bitrate= 800.0kbits/s speed=1.25x";
        let snapshot = feed(line, &with_total(125.0)).unwrap();

        assert_eq!(snapshot.frame, Some(120));
        assert_eq!(snapshot.current_time, 62.5);
        assert_eq!(snapshot.bitrate_kbps, Some(800.0));
        assert_eq!(snapshot.speed, Some(1.25));
        assert_eq!(snapshot.percentage, 50.0);
    }

    #[test]
    fn test_unrecognised_chunk_returns_none() {
        let start = with_total(10.0);
        assert!(feed("Input #0, mov,mp4, from 'in.mov':", &start).is_none());
        assert!(feed("", &start).is_none());
        assert!(feed("bitrate=N/A\nout_time_us=N/A", &start).is_none());
    }

    #[test]
    fn test_percentage_capped_and_monotonic() {
        let start = with_total(10.0);
        let over = feed("out_time_us=15000000", &start).unwrap();
        assert_eq!(over.percentage, 100.0);

        let mut previous = feed("out_time_us=6000000", &start).unwrap();
        assert_eq!(previous.percentage, 60.0);
        // A stale timestamp must not move the bar backwards
        previous = feed("out_time_us=5000000", &previous).unwrap();
        assert_eq!(previous.percentage, 60.0);
    }

    #[test]
    fn test_unknown_duration_leaves_percentage() {
        let snapshot = feed("out_time_us=3000000 speed=1.5x", &ProgressSnapshot::default()).unwrap();
        assert_eq!(snapshot.current_time, 3.0);
        assert_eq!(snapshot.percentage, 0.0);
        assert!(snapshot.eta_secs.is_none());
    }

    #[test]
    fn test_partial_line_is_tolerated() {
        let start = with_total(10.0);
        // Encoder flushed mid-line: only the complete marker is taken
        let snapshot = feed("frame=42\nfps=2", &start).unwrap();
        assert_eq!(snapshot.frame, Some(42));
        let next = feed("out_ti", &snapshot);
        assert!(next.is_none());
    }

    #[test]
    fn test_progress_end_marks_finalizing() {
        let snapshot = feed("progress=end", &with_total(10.0)).unwrap();
        assert_eq!(snapshot.stage, "finalizing");
    }

    #[test]
    fn test_out_time_not_confused_with_stats_time() {
        let snapshot = feed("out_time=00:00:09.000000", &with_total(10.0));
        // out_time= alone is ignored; the microsecond marker is authoritative
        assert!(snapshot.is_none());
    }

    #[test]
    fn test_is_progress_line() {
        assert!(is_progress_line("frame=10"));
        assert!(is_progress_line("progress=continue"));
        assert!(is_progress_line("total_size=1024"));
        assert!(!is_progress_line("[libx264 @ 0x1] using cpu capabilities"));
        assert!(!is_progress_line("Conversion failed!"));
    }
}
