//! Helpers for narrated reading: word-level highlighting and step timelines
//! built from text-to-speech timestamps.

use serde::{Deserialize, Serialize};

use crate::timeline::TimelineEvent;

/// Silence assumed after the last word when estimating total length.
pub const TRAILING_SILENCE_MS: u64 = 200;

/// One spoken word and where it sits in the audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordBoundary {
    pub text: String,
    pub offset_ms: u64,
    pub duration_ms: u64,
}

impl WordBoundary {
    pub fn new(text: impl Into<String>, offset_ms: u64, duration_ms: u64) -> Self {
        Self {
            text: text.into(),
            offset_ms,
            duration_ms,
        }
    }

    pub fn end_ms(&self) -> u64 {
        self.offset_ms.saturating_add(self.duration_ms)
    }
}

/// Converts word boundaries into timeline events carrying the word. Words
/// reported with zero duration are widened to one millisecond, and offsets at
/// the very end of the `u64` range are pulled back so every interval stays
/// non-empty.
pub fn word_timeline(words: &[WordBoundary]) -> Vec<TimelineEvent<WordBoundary>> {
    words
        .iter()
        .map(|word| {
            let start_ms = word.offset_ms.min(u64::MAX - 1);
            TimelineEvent {
                start_ms,
                end_ms: start_ms.saturating_add(word.duration_ms.max(1)),
                data: word.clone(),
            }
        })
        .collect()
}

/// Index of the word to highlight at `ms`: the word being spoken, or failing
/// that the last word already finished. `None` before the first word.
pub fn active_word_index(ms: f64, words: &[WordBoundary]) -> Option<usize> {
    let mut found = None;
    for (index, word) in words.iter().enumerate() {
        let start = word.offset_ms as f64;
        let end = word.end_ms() as f64;
        if ms >= start && ms < end {
            return Some(index);
        }
        if ms >= end {
            found = Some(index);
        }
    }
    found
}

/// Start offsets of consecutive steps with the given durations.
pub fn step_starts(durations: &[u64]) -> Vec<u64> {
    durations
        .iter()
        .scan(0u64, |offset, duration| {
            let start = *offset;
            *offset = offset.saturating_add(*duration);
            Some(start)
        })
        .collect()
}

/// Last step whose start is at or before `ms`.
pub fn current_step(ms: f64, starts: &[u64]) -> Option<usize> {
    starts.iter().rposition(|start| ms >= *start as f64)
}

/// Playback progress in `[0, 1]`; zero while the total is unknown.
pub fn progress(current_ms: f64, total_ms: f64) -> f64 {
    if total_ms > 0.0 {
        (current_ms / total_ms).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Total narration length guessed from the last word.
pub fn estimated_total_ms(words: &[WordBoundary]) -> Option<u64> {
    words
        .last()
        .map(|word| word.end_ms().saturating_add(TRAILING_SILENCE_MS))
}

/// Follows the highlighted word across frames and reports only changes, so
/// callers can restyle the text once per word instead of once per frame.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WordTracker {
    current: Option<usize>,
}

impl WordTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Word highlighted after the last update.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Re-evaluates the highlighted word at `ms`. Returns the new index
    /// (`None` meaning nothing highlighted) when it differs from the previous
    /// update, and `None` when nothing changed.
    pub fn update(&mut self, ms: f64, words: &[WordBoundary]) -> Option<Option<usize>> {
        let index = active_word_index(ms, words);
        if index == self.current {
            return None;
        }
        self.current = index;
        Some(index)
    }

    /// Forgets the highlighted word, as when the text or audio is replaced.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence() -> Vec<WordBoundary> {
        vec![
            WordBoundary::new("The", 0, 120),
            WordBoundary::new("cat", 150, 200),
            WordBoundary::new("sat", 400, 180),
        ]
    }

    #[test]
    fn highlights_spoken_word_or_last_finished() {
        let words = sentence();
        assert_eq!(active_word_index(0.0, &words), Some(0));
        assert_eq!(active_word_index(130.0, &words), Some(0));
        assert_eq!(active_word_index(200.0, &words), Some(1));
        assert_eq!(active_word_index(10_000.0, &words), Some(2));
        assert_eq!(active_word_index(5.0, &[WordBoundary::new("late", 10, 5)]), None);
        assert_eq!(active_word_index(5.0, &[]), None);
    }

    #[test]
    fn word_timeline_keeps_words_and_widens_empty_ones() {
        let mut words = sentence();
        words.push(WordBoundary::new(".", 580, 0));
        let events = word_timeline(&words);
        assert_eq!(events.len(), 4);
        assert_eq!(events[1].start_ms, 150);
        assert_eq!(events[1].end_ms, 350);
        assert_eq!(events[1].data.text, "cat");
        assert_eq!(events[3].end_ms, 581);
        assert!(events.iter().all(|event| event.end_ms > event.start_ms));
    }

    #[test]
    fn steps_accumulate_durations() {
        let starts = step_starts(&[500, 250, 1_000]);
        assert_eq!(starts, vec![0, 500, 750]);
        assert_eq!(current_step(0.0, &starts), Some(0));
        assert_eq!(current_step(749.0, &starts), Some(1));
        assert_eq!(current_step(5_000.0, &starts), Some(2));
        assert_eq!(current_step(-1.0, &starts), None);
        assert_eq!(current_step(10.0, &[]), None);
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress(50.0, 200.0), 0.25);
        assert_eq!(progress(500.0, 200.0), 1.0);
        assert_eq!(progress(50.0, 0.0), 0.0);
    }

    #[test]
    fn extreme_offsets_saturate_instead_of_overflowing() {
        let words = vec![
            WordBoundary::new("ok", 0, 100),
            WordBoundary::new("huge", u64::MAX, 5),
        ];
        assert_eq!(words[1].end_ms(), u64::MAX);
        assert_eq!(active_word_index(0.0, &words), Some(0));
        assert_eq!(estimated_total_ms(&words), Some(u64::MAX));

        let events = word_timeline(&words);
        assert_eq!(events[1].start_ms, u64::MAX - 1);
        assert_eq!(events[1].end_ms, u64::MAX);
        assert!(events.iter().all(|event| event.end_ms > event.start_ms));

        assert_eq!(step_starts(&[u64::MAX, 10, 10]), vec![0, u64::MAX, u64::MAX]);
    }

    #[test]
    fn word_tracker_reports_only_changes() {
        let words = sentence();
        let mut tracker = WordTracker::new();

        assert_eq!(tracker.update(0.0, &words), Some(Some(0)));
        assert_eq!(tracker.update(16.0, &words), None);
        assert_eq!(tracker.update(130.0, &words), None);
        assert_eq!(tracker.update(160.0, &words), Some(Some(1)));
        assert_eq!(tracker.current(), Some(1));

        tracker.reset();
        assert_eq!(tracker.current(), None);
        assert_eq!(tracker.update(170.0, &words), Some(Some(1)));
    }

    #[test]
    fn word_tracker_reports_clearing_the_highlight() {
        let words = vec![WordBoundary::new("late", 100, 50)];
        let mut tracker = WordTracker::new();
        assert_eq!(tracker.update(0.0, &words), None);
        assert_eq!(tracker.update(120.0, &words), Some(Some(0)));
        assert_eq!(tracker.update(10.0, &words), Some(None));
    }

    #[test]
    fn total_includes_trailing_silence() {
        assert_eq!(estimated_total_ms(&sentence()), Some(780));
        assert_eq!(estimated_total_ms(&[]), None);
    }
}
