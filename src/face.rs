use serde::{Deserialize, Serialize};

use crate::metrics::Emotion;
use crate::shapes::point::PointF32;

/// One subject as reported by the detector for a single frame. Landmark
/// points are in source-image coordinates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectedFace {
    pub points: Vec<PointF32>,
    pub emotions: Emotions,
    pub expressions: Expressions,
    pub appearance: Appearance,
    pub emojis: EmojiScores,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Emotions {
    pub anger: f32,
    pub disgust: f32,
    pub fear: f32,
    pub joy: f32,
    pub sadness: f32,
    pub surprise: f32,
    pub contempt: f32,
    pub valence: f32,
    pub engagement: f32,
}

// No emotion is dominant unless it scores above this.
const DOMINANT_EMOTION_THRESHOLD: f32 = 50.;

impl Emotions {
    /// Strongest single emotion, valence and engagement excluded. Scores must
    /// beat the threshold and every earlier candidate strictly, so ties keep
    /// the first in [`Emotion::DOMINANCE_ORDER`].
    pub fn dominant(&self) -> Option<(Emotion, f32)> {
        let mut dominant = None;
        let mut best = DOMINANT_EMOTION_THRESHOLD;

        for emotion in Emotion::DOMINANCE_ORDER {
            let score = emotion.value(self);
            if score > best {
                best = score;
                dominant = Some((emotion, score));
            }
        }

        dominant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Expressions {
    pub attention: f32,
    pub brow_furrow: f32,
    pub brow_raise: f32,
    pub chin_raise: f32,
    pub eye_closure: f32,
    pub inner_brow_raise: f32,
    pub lip_corner_depressor: f32,
    pub lip_press: f32,
    pub lip_pucker: f32,
    pub lip_suck: f32,
    pub mouth_open: f32,
    pub nose_wrinkle: f32,
    pub smile: f32,
    pub smirk: f32,
    pub upper_lip_raise: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Glasses {
    Yes,
    #[default]
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Appearance {
    pub gender: Gender,
    pub glasses: Glasses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Emoji {
    Relaxed,
    Smiley,
    Laughing,
    Kissing,
    Disappointed,
    Rage,
    Smirk,
    Wink,
    StuckOutTongueWinkingEye,
    StuckOutTongue,
    Flushed,
    Scream,
    #[default]
    Unknown,
}

impl Emoji {
    /// Every emoji the detector scores. `Unknown` is not a score, only a
    /// possible dominant value.
    pub const SCORED: [Emoji; 12] = [
        Emoji::Relaxed,
        Emoji::Smiley,
        Emoji::Laughing,
        Emoji::Kissing,
        Emoji::Disappointed,
        Emoji::Rage,
        Emoji::Smirk,
        Emoji::Wink,
        Emoji::StuckOutTongueWinkingEye,
        Emoji::StuckOutTongue,
        Emoji::Flushed,
        Emoji::Scream,
    ];

    /// Detector-side identifier, which also seeds the marker file name.
    pub fn name(&self) -> &'static str {
        match self {
            Emoji::Relaxed => "RELAXED",
            Emoji::Smiley => "SMILEY",
            Emoji::Laughing => "LAUGHING",
            Emoji::Kissing => "KISSING",
            Emoji::Disappointed => "DISAPPOINTED",
            Emoji::Rage => "RAGE",
            Emoji::Smirk => "SMIRK",
            Emoji::Wink => "WINK",
            Emoji::StuckOutTongueWinkingEye => "STUCK_OUT_TONGUE_WINKING_EYE",
            Emoji::StuckOutTongue => "STUCK_OUT_TONGUE",
            Emoji::Flushed => "FLUSHED",
            Emoji::Scream => "SCREAM",
            Emoji::Unknown => "UNKNOWN",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Emoji::Relaxed => "Relaxed",
            Emoji::Smiley => "Smiley",
            Emoji::Laughing => "Laughing",
            Emoji::Kissing => "Kiss",
            Emoji::Disappointed => "Disappointed",
            Emoji::Rage => "Rage",
            Emoji::Smirk => "Smirk Emoji",
            Emoji::Wink => "Wink",
            Emoji::StuckOutTongueWinkingEye => "Tongue Wink",
            Emoji::StuckOutTongue => "Tongue Out",
            Emoji::Flushed => "Flushed",
            Emoji::Scream => "Scream",
            Emoji::Unknown => "Unknown",
        }
    }

    /// Case-insensitive lookup by display name.
    pub fn from_display_name(name: &str) -> Option<Emoji> {
        Emoji::SCORED
            .into_iter()
            .find(|e| e.display_name().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmojiScores {
    pub relaxed: f32,
    pub smiley: f32,
    pub laughing: f32,
    pub kissing: f32,
    pub disappointed: f32,
    pub rage: f32,
    pub smirk: f32,
    pub wink: f32,
    pub stuck_out_tongue_winking_eye: f32,
    pub stuck_out_tongue: f32,
    pub flushed: f32,
    pub scream: f32,
    pub dominant: Emoji,
}

impl EmojiScores {
    pub fn score(&self, emoji: Emoji) -> Option<f32> {
        let score = match emoji {
            Emoji::Relaxed => self.relaxed,
            Emoji::Smiley => self.smiley,
            Emoji::Laughing => self.laughing,
            Emoji::Kissing => self.kissing,
            Emoji::Disappointed => self.disappointed,
            Emoji::Rage => self.rage,
            Emoji::Smirk => self.smirk,
            Emoji::Wink => self.wink,
            Emoji::StuckOutTongueWinkingEye => self.stuck_out_tongue_winking_eye,
            Emoji::StuckOutTongue => self.stuck_out_tongue,
            Emoji::Flushed => self.flushed,
            Emoji::Scream => self.scream,
            Emoji::Unknown => return None,
        };

        Some(score)
    }
}
