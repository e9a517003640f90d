//! Emotion labels and their classroom remapping.
//!
//! The classifier speaks in raw emotion names. Those are normalized into
//! [`Emotion`] (a known [`CanonicalEmotion`] or the normalized raw name) and
//! then remapped onto a [`ClassroomLabel`] for display and counting.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalEmotion {
    Sad,
    Angry,
    Fear,
    Happy,
    Surprise,
    Neutral,
}

impl CanonicalEmotion {
    pub const ALL: [CanonicalEmotion; 6] = [
        CanonicalEmotion::Sad,
        CanonicalEmotion::Angry,
        CanonicalEmotion::Fear,
        CanonicalEmotion::Happy,
        CanonicalEmotion::Surprise,
        CanonicalEmotion::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalEmotion::Sad => "Sad",
            CanonicalEmotion::Angry => "Angry",
            CanonicalEmotion::Fear => "Fear",
            CanonicalEmotion::Happy => "Happy",
            CanonicalEmotion::Surprise => "Surprise",
            CanonicalEmotion::Neutral => "Neutral",
        }
    }

    /// Exact match on the capitalized name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }
}

/// A classifier verdict after case normalization.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    Canonical(CanonicalEmotion),
    /// A label outside the known set, kept in its normalized form.
    Other(String),
}

impl Emotion {
    /// Capitalizes a raw classifier label (first character upper, rest lower)
    /// and resolves it against the known set.
    pub fn normalize(raw: &str) -> Self {
        let name = capitalize(raw.trim());
        match CanonicalEmotion::from_name(&name) {
            Some(known) => Emotion::Canonical(known),
            None => Emotion::Other(name),
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emotion::Canonical(e) => f.write_str(e.as_str()),
            Emotion::Other(name) => f.write_str(name),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Classroom-facing label. Six fixed terms plus a passthrough for unknown emotions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassroomLabel {
    FocusedChallenge,
    ClassroomTension,
    LearningAnxiety,
    ActiveEngagement,
    LearningSurprise,
    CalmAttention,
    Unmapped(String),
}

impl ClassroomLabel {
    /// The six mapped labels, in canonical column order.
    pub const MAPPED: [ClassroomLabel; 6] = [
        ClassroomLabel::FocusedChallenge,
        ClassroomLabel::ClassroomTension,
        ClassroomLabel::LearningAnxiety,
        ClassroomLabel::ActiveEngagement,
        ClassroomLabel::LearningSurprise,
        ClassroomLabel::CalmAttention,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ClassroomLabel::FocusedChallenge => "Focused Challenge",
            ClassroomLabel::ClassroomTension => "Classroom Tension",
            ClassroomLabel::LearningAnxiety => "Learning Anxiety",
            ClassroomLabel::ActiveEngagement => "Active Engagement",
            ClassroomLabel::LearningSurprise => "Learning Surprise",
            ClassroomLabel::CalmAttention => "Calm Attention",
            ClassroomLabel::Unmapped(name) => name,
        }
    }
}

impl fmt::Display for ClassroomLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static remapping table.
pub fn classroom_label(emotion: CanonicalEmotion) -> ClassroomLabel {
    match emotion {
        CanonicalEmotion::Sad => ClassroomLabel::FocusedChallenge,
        CanonicalEmotion::Angry => ClassroomLabel::ClassroomTension,
        CanonicalEmotion::Fear => ClassroomLabel::LearningAnxiety,
        CanonicalEmotion::Happy => ClassroomLabel::ActiveEngagement,
        CanonicalEmotion::Surprise => ClassroomLabel::LearningSurprise,
        CanonicalEmotion::Neutral => ClassroomLabel::CalmAttention,
    }
}

/// Remaps any classifier verdict. Unknown emotions pass through unchanged.
pub fn remap(emotion: &Emotion) -> ClassroomLabel {
    match emotion {
        Emotion::Canonical(e) => classroom_label(*e),
        Emotion::Other(name) => ClassroomLabel::Unmapped(name.clone()),
    }
}
