//! Turning raw status tracks into named, playable [`Track`]s.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::api::{RawTrack, TaskHandle};

/// Stem used when a title sanitises to nothing.
pub const FALLBACK_STEM: &str = "generated_music";

/// Extension of downloaded files.
pub const AUDIO_EXTENSION: &str = "mp3";

/// A playable track with a collision-free filename stem.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Position in the API batch, counting unplayable entries.
    pub index: usize,
    /// API track identifier, when present.
    pub id: Option<String>,
    pub title: String,
    /// Playable-but-not-final audio URL.
    pub stream_url: Option<String>,
    /// Fully rendered audio URL.
    pub final_url: Option<String>,
    pub tags: Option<String>,
    /// Length in seconds.
    pub duration: Option<f64>,
    /// Filename without extension, unique within the batch and the target
    /// directory.
    pub file_stem: String,
}

impl Track {
    /// Best URL to fetch or stream: final first, then streaming.
    pub fn best_url(&self) -> Option<&str> {
        self.final_url.as_deref().or(self.stream_url.as_deref())
    }

    /// File name including extension.
    pub fn file_name(&self) -> String {
        format!("{}.{AUDIO_EXTENSION}", self.file_stem)
    }

    /// Duration formatted as `m:ss`.
    pub fn duration_label(&self) -> Option<String> {
        self.duration.filter(|d| d.is_finite() && *d >= 0.0).map(|d| {
            let secs = d.round() as u64;
            format!("{}:{:02}", secs / 60, secs % 60)
        })
    }
}

/// Make a filesystem-safe stem from a track title.
///
/// Keeps ASCII letters, digits, space, `_` and `-`; spaces become `_`.
/// Idempotent. An empty result becomes [`FALLBACK_STEM`].
pub fn sanitize_title(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    if stem.is_empty() {
        FALLBACK_STEM.to_owned()
    } else {
        stem
    }
}

/// Hands out collision-free stems for one batch.
///
/// A stem collides when it was already handed out or when
/// `<dir>/<stem>.mp3` exists. The first collision appends `_<suffix>`,
/// later ones `_<suffix>_<n>` starting at 2.
#[derive(Debug)]
pub struct FilenameAllocator {
    dir: Option<PathBuf>,
    suffix: String,
    taken: HashSet<String>,
}

impl FilenameAllocator {
    /// `dir` is checked for existing files; `None` checks only the batch.
    pub fn new(dir: Option<&Path>, task: &TaskHandle) -> Self {
        Self {
            dir: dir.map(Path::to_path_buf),
            suffix: task.suffix(),
            taken: HashSet::new(),
        }
    }

    fn is_free(&self, stem: &str) -> bool {
        if self.taken.contains(stem) {
            return false;
        }
        match &self.dir {
            Some(dir) => !dir.join(format!("{stem}.{AUDIO_EXTENSION}")).exists(),
            None => true,
        }
    }

    /// Reserve a stem derived from `base`.
    pub fn allocate(&mut self, base: &str) -> String {
        let mut candidate = base.to_owned();
        if !self.is_free(&candidate) {
            candidate = format!("{base}_{}", self.suffix);
            let mut n = 2u32;
            while !self.is_free(&candidate) {
                candidate = format!("{base}_{}_{n}", self.suffix);
                n += 1;
            }
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// Keep playable tracks in API order and give each a title and stem.
///
/// Untitled tracks are named `Track <n>` after their position in the
/// batch (1-based, counting unplayable entries too).
pub fn resolve_tracks(raw: &[RawTrack], task: &TaskHandle, dir: Option<&Path>) -> Vec<Track> {
    let mut allocator = FilenameAllocator::new(dir, task);
    raw.iter()
        .enumerate()
        .filter(|(_, t)| t.is_playable())
        .map(|(index, t)| {
            let title = t
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map_or_else(|| format!("Track {}", index + 1), str::to_owned);
            let file_stem = allocator.allocate(&sanitize_title(&title));
            Track {
                index,
                id: t.id.clone(),
                title,
                stream_url: t.stream_url.clone(),
                final_url: t.final_url.clone(),
                tags: t.tags.clone(),
                duration: t.duration,
                file_stem,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::api::extract::extract_tracks;

    fn raw(title: Option<&str>, stream: Option<&str>, final_url: Option<&str>) -> RawTrack {
        RawTrack {
            title: title.map(str::to_owned),
            stream_url: stream.map(str::to_owned),
            final_url: final_url.map(str::to_owned),
            ..RawTrack::default()
        }
    }

    #[test]
    fn sanitize_replaces_spaces_and_drops_punctuation() {
        assert_eq!(sanitize_title("Sunny Morning"), "Sunny_Morning");
        assert_eq!(sanitize_title("  Rock & Roll! (live) "), "Rock__Roll_live");
        assert_eq!(sanitize_title("lo-fi_beats 2"), "lo-fi_beats_2");
        assert_eq!(sanitize_title("Café del Mar"), "Caf_del_Mar");
    }

    #[test]
    fn sanitize_falls_back_for_empty_results() {
        assert_eq!(sanitize_title("!!!???"), FALLBACK_STEM);
        assert_eq!(sanitize_title(""), FALLBACK_STEM);
        assert_eq!(sanitize_title("   "), FALLBACK_STEM);
        assert_eq!(sanitize_title("日本語"), FALLBACK_STEM);
    }

    #[test]
    fn sanitize_is_idempotent() {
        for title in [
            "Sunny Morning",
            "  padded  ",
            "a/b\\c:d",
            "!!!",
            "Track 1",
            "-_- face",
            "tab\tand\nnewline",
        ] {
            let once = sanitize_title(title);
            assert_eq!(sanitize_title(&once), once, "not idempotent for {title:?}");
        }
    }

    #[test]
    fn stream_only_tracks_are_playable_and_get_positional_titles() {
        let body = r#"{"code":200,"data":{"status":"FIRST_SUCCESS","response":{"sunoData":[
            {"id":"t1","title":"Sunrise","streamAudioUrl":"https://cdn.example/s/1","audioUrl":null},
            {"id":"t2","title":null,"streamAudioUrl":"https://cdn.example/s/2","audioUrl":null}
        ]}}}"#;
        let root: serde_json::Value = serde_json::from_str(body).unwrap();
        let tracks = resolve_tracks(&extract_tracks(&root), &TaskHandle::new("abc123"), None);

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].title, "Sunrise");
        assert_eq!(tracks[1].title, "Track 2");
        assert_eq!(tracks[1].best_url(), Some("https://cdn.example/s/2"));
        assert!(tracks.iter().all(|t| t.final_url.is_none()));
    }

    #[test]
    fn untitled_tracks_are_numbered_by_position() {
        let raw_tracks = vec![
            raw(None, Some("s1"), None),
            raw(None, None, None),
            raw(Some(""), Some("s3"), None),
        ];
        let tracks = resolve_tracks(&raw_tracks, &TaskHandle::new("abc123"), None);
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Track 1", "Track 3"]);
        assert_eq!(tracks[1].index, 2);
        assert_eq!(tracks[0].file_stem, "Track_1");
    }

    #[test]
    fn unplayable_tracks_are_dropped() {
        let raw_tracks = vec![raw(Some("ghost"), None, None)];
        assert!(resolve_tracks(&raw_tracks, &TaskHandle::new("abc123"), None).is_empty());
    }

    #[test]
    fn duplicate_titles_in_a_batch_get_task_suffixes() {
        let raw_tracks = vec![
            raw(Some("Same"), None, Some("a1")),
            raw(Some("Same"), None, Some("a2")),
            raw(Some("Same"), None, Some("a3")),
        ];
        let tracks = resolve_tracks(&raw_tracks, &TaskHandle::new("abc123"), None);
        let stems: Vec<_> = tracks.iter().map(|t| t.file_stem.as_str()).collect();
        assert_eq!(stems, vec!["Same", "Same_abc123", "Same_abc123_2"]);
    }

    #[test]
    fn existing_files_count_as_collisions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Sunny_Morning.mp3"), b"old").unwrap();
        std::fs::write(dir.path().join("Sunny_Morning_abc123.mp3"), b"old").unwrap();

        let mut alloc = FilenameAllocator::new(Some(dir.path()), &TaskHandle::new("abc123"));
        assert_eq!(alloc.allocate("Sunny_Morning"), "Sunny_Morning_abc123_2");
        assert_eq!(alloc.allocate("Other"), "Other");
    }

    #[test]
    fn duration_label_formats_minutes() {
        let mut track = resolve_tracks(
            &[raw(Some("x"), None, Some("u"))],
            &TaskHandle::new("abc123"),
            None,
        )
        .remove(0);
        track.duration = Some(182.4);
        assert_eq!(track.duration_label().as_deref(), Some("3:02"));
        assert_eq!(track.file_name(), "x.mp3");
    }
}
