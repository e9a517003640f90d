//! Per-image counting and summary text.

use serde::{Deserialize, Serialize};

use crate::labels::ClassroomLabel;

/// Counts for the six mapped classroom labels. Absent labels count zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub focused_challenge: u32,
    pub classroom_tension: u32,
    pub learning_anxiety: u32,
    pub active_engagement: u32,
    pub learning_surprise: u32,
    pub calm_attention: u32,
}

impl LabelCounts {
    /// Count for a label; unmapped labels are not tracked here.
    pub fn get(&self, label: &ClassroomLabel) -> u32 {
        match label {
            ClassroomLabel::FocusedChallenge => self.focused_challenge,
            ClassroomLabel::ClassroomTension => self.classroom_tension,
            ClassroomLabel::LearningAnxiety => self.learning_anxiety,
            ClassroomLabel::ActiveEngagement => self.active_engagement,
            ClassroomLabel::LearningSurprise => self.learning_surprise,
            ClassroomLabel::CalmAttention => self.calm_attention,
            ClassroomLabel::Unmapped(_) => 0,
        }
    }

    fn slot(&mut self, label: &ClassroomLabel) -> Option<&mut u32> {
        match label {
            ClassroomLabel::FocusedChallenge => Some(&mut self.focused_challenge),
            ClassroomLabel::ClassroomTension => Some(&mut self.classroom_tension),
            ClassroomLabel::LearningAnxiety => Some(&mut self.learning_anxiety),
            ClassroomLabel::ActiveEngagement => Some(&mut self.active_engagement),
            ClassroomLabel::LearningSurprise => Some(&mut self.learning_surprise),
            ClassroomLabel::CalmAttention => Some(&mut self.calm_attention),
            ClassroomLabel::Unmapped(_) => None,
        }
    }

    /// All six labels with their counts, in column order.
    pub fn iter(&self) -> impl Iterator<Item = (ClassroomLabel, u32)> + '_ {
        ClassroomLabel::MAPPED
            .into_iter()
            .map(move |label| {
                let count = self.get(&label);
                (label, count)
            })
    }

    pub fn total(&self) -> u32 {
        self.iter().map(|(_, c)| c).sum()
    }
}

/// Accumulates one image's people and labels.
///
/// `person_count` counts every box accepted from the suppressor, classified or
/// not. Label counts only see successful classifications. Labels are reported
/// in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct Aggregator {
    person_count: u32,
    seen: Vec<(ClassroomLabel, u32)>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A kept box is about to be classified.
    pub fn record_person(&mut self) {
        self.person_count += 1;
    }

    /// A kept box was classified as `label`.
    pub fn record_label(&mut self, label: ClassroomLabel) {
        match self.seen.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 += 1,
            None => self.seen.push((label, 1)),
        }
    }

    pub fn person_count(&self) -> u32 {
        self.person_count
    }

    /// Labels with at least one hit, in first-seen order.
    pub fn seen(&self) -> &[(ClassroomLabel, u32)] {
        &self.seen
    }

    pub fn label_counts(&self) -> LabelCounts {
        let mut counts = LabelCounts::default();
        for (label, count) in &self.seen {
            if let Some(slot) = counts.slot(label) {
                *slot += count;
            }
        }
        counts
    }

    /// Header line, then one `"{label}: {count}"` line per seen label.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.seen.len() + 1);
        lines.push(format!("Total People Detected: {}", self.person_count));
        lines.extend(
            self.seen
                .iter()
                .map(|(label, count)| format!("{}: {}", label, count)),
        );
        lines
    }

    pub fn summary_text(&self) -> String {
        self.summary_lines().join("\n")
    }
}
