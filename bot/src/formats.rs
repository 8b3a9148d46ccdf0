/// Format reduction for the selection keyboard.
///
/// Collapses the raw yt-dlp format list into one candidate per display
/// resolution (highest total bitrate wins) plus a single best audio-only
/// option, ordered by resolution descending with audio last.
use crate::ytdlp::FormatDescriptor;

/// Button label for the audio-only candidate.
pub const AUDIO_LABEL: &str = "🎵 MP3 Audio";

/// One selectable download option derived from the format list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatCandidate {
    pub label: String,
    pub format_id: String,
    pub is_audio: bool,
}

pub fn reduce_formats(formats: &[FormatDescriptor]) -> Vec<FormatCandidate> {
    // Per-resolution best video: highest total bitrate wins; the first
    // format encountered keeps the slot on a tie. Formats without a known
    // approximate size are not offered. A missing height groups under the
    // degenerate "0p" label, which is still presented.
    let mut by_height: Vec<(u32, &FormatDescriptor)> = Vec::new();
    for f in formats {
        if !f.has_video() || f.filesize_approx.is_none() {
            continue;
        }
        let h = f.height.unwrap_or(0);
        match by_height.iter_mut().find(|(bh, _)| *bh == h) {
            Some((_, best)) if f.tbr.unwrap_or(0.0) > best.tbr.unwrap_or(0.0) => *best = f,
            Some(_) => {}
            None => by_height.push((h, f)),
        }
    }
    by_height.sort_by(|a, b| b.0.cmp(&a.0));

    let mut candidates: Vec<FormatCandidate> = by_height
        .into_iter()
        .map(|(h, f)| FormatCandidate {
            label: format!("{}p", h),
            format_id: f.format_id.clone(),
            is_audio: false,
        })
        .collect();

    // Single best audio-only stream by audio bitrate; first wins on a tie.
    let mut best_audio: Option<&FormatDescriptor> = None;
    for f in formats {
        if !f.has_audio() || f.has_video() {
            continue;
        }
        match best_audio {
            Some(best) if f.abr.unwrap_or(0.0) <= best.abr.unwrap_or(0.0) => {}
            _ => best_audio = Some(f),
        }
    }
    if let Some(f) = best_audio {
        candidates.push(FormatCandidate {
            label: AUDIO_LABEL.to_string(),
            format_id: f.format_id.clone(),
            is_audio: true,
        });
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, height: Option<u32>, tbr: f64, size: Option<u64>) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.into(),
            vcodec: Some("avc1".into()),
            acodec: Some("mp4a".into()),
            height,
            tbr: Some(tbr),
            abr: None,
            filesize_approx: size,
        }
    }

    fn audio(id: &str, abr: f64) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.into(),
            vcodec: Some("none".into()),
            acodec: Some("opus".into()),
            height: None,
            tbr: None,
            abr: Some(abr),
            filesize_approx: Some(1),
        }
    }

    #[test]
    fn highest_bitrate_wins_per_resolution() {
        let formats = [
            video("a", Some(720), 500.0, Some(10)),
            video("b", Some(720), 800.0, Some(20)),
        ];
        let out = reduce_formats(&formats);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].format_id, "b");
        assert_eq!(out[0].label, "720p");
    }

    #[test]
    fn tie_keeps_first_encountered() {
        let formats = [
            video("first", Some(480), 500.0, Some(10)),
            video("second", Some(480), 500.0, Some(10)),
        ];
        let out = reduce_formats(&formats);
        assert_eq!(out[0].format_id, "first");
    }

    #[test]
    fn missing_size_is_excluded() {
        let formats = [video("a", Some(720), 800.0, None)];
        assert!(reduce_formats(&formats).is_empty());
    }

    #[test]
    fn missing_height_gets_degenerate_label() {
        let formats = [video("a", None, 100.0, Some(10))];
        let out = reduce_formats(&formats);
        assert_eq!(out[0].label, "0p");
    }

    #[test]
    fn resolutions_ordered_descending_with_audio_last() {
        let formats = [
            video("v480", Some(480), 300.0, Some(10)),
            video("v1080", Some(1080), 900.0, Some(30)),
            video("v720", Some(720), 600.0, Some(20)),
            audio("a1", 128.0),
        ];
        let out = reduce_formats(&formats);
        let labels: Vec<&str> = out.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["1080p", "720p", "480p", AUDIO_LABEL]);
        assert!(out.last().unwrap().is_audio);
    }

    #[test]
    fn best_audio_selected_by_bitrate() {
        let formats = [audio("low", 64.0), audio("high", 160.0)];
        let out = reduce_formats(&formats);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].format_id, "high");
        assert!(out[0].is_audio);
    }

    #[test]
    fn no_audio_only_stream_means_no_audio_candidate() {
        let formats = [video("a", Some(360), 100.0, Some(10))];
        let out = reduce_formats(&formats);
        assert!(out.iter().all(|c| !c.is_audio));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(reduce_formats(&[]).is_empty());
    }
}
