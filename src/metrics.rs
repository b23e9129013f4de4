//! Every metric the detector reports, with a typed accessor per metric so
//! looking up a score by metric can never fail at runtime.

use crate::face::{DetectedFace, Emoji, Emotions, Expressions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Anger,
    Disgust,
    Fear,
    Joy,
    Sadness,
    Surprise,
    Contempt,
    Engagement,
    Valence,
}

impl Emotion {
    pub const ALL: [Emotion; 9] = [
        Emotion::Anger,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Surprise,
        Emotion::Contempt,
        Emotion::Engagement,
        Emotion::Valence,
    ];

    /// Candidates for the dominant emotion label, in tie-breaking order.
    pub const DOMINANCE_ORDER: [Emotion; 7] = [
        Emotion::Anger,
        Emotion::Contempt,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Surprise,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Emotion::Anger => "ANGER",
            Emotion::Disgust => "DISGUST",
            Emotion::Fear => "FEAR",
            Emotion::Joy => "JOY",
            Emotion::Sadness => "SADNESS",
            Emotion::Surprise => "SURPRISE",
            Emotion::Contempt => "CONTEMPT",
            Emotion::Engagement => "ENGAGEMENT",
            Emotion::Valence => "VALENCE",
        }
    }

    pub fn value(&self, e: &Emotions) -> f32 {
        match self {
            Emotion::Anger => e.anger,
            Emotion::Disgust => e.disgust,
            Emotion::Fear => e.fear,
            Emotion::Joy => e.joy,
            Emotion::Sadness => e.sadness,
            Emotion::Surprise => e.surprise,
            Emotion::Contempt => e.contempt,
            Emotion::Engagement => e.engagement,
            Emotion::Valence => e.valence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expression {
    Attention,
    BrowFurrow,
    BrowRaise,
    ChinRaise,
    EyeClosure,
    InnerBrowRaise,
    LipCornerDepressor,
    LipPress,
    LipPucker,
    LipSuck,
    MouthOpen,
    NoseWrinkle,
    Smile,
    Smirk,
    UpperLipRaise,
}

impl Expression {
    pub const ALL: [Expression; 15] = [
        Expression::Attention,
        Expression::BrowFurrow,
        Expression::BrowRaise,
        Expression::ChinRaise,
        Expression::EyeClosure,
        Expression::InnerBrowRaise,
        Expression::LipCornerDepressor,
        Expression::LipPress,
        Expression::LipPucker,
        Expression::LipSuck,
        Expression::MouthOpen,
        Expression::NoseWrinkle,
        Expression::Smile,
        Expression::Smirk,
        Expression::UpperLipRaise,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Expression::Attention => "ATTENTION",
            Expression::BrowFurrow => "BROW_FURROW",
            Expression::BrowRaise => "BROW_RAISE",
            Expression::ChinRaise => "CHIN_RAISE",
            Expression::EyeClosure => "EYE_CLOSURE",
            Expression::InnerBrowRaise => "INNER_BROW_RAISE",
            Expression::LipCornerDepressor => "LIP_CORNER_DEPRESSOR",
            Expression::LipPress => "LIP_PRESS",
            Expression::LipPucker => "LIP_PUCKER",
            Expression::LipSuck => "LIP_SUCK",
            Expression::MouthOpen => "MOUTH_OPEN",
            Expression::NoseWrinkle => "NOSE_WRINKLE",
            Expression::Smile => "SMILE",
            Expression::Smirk => "SMIRK",
            Expression::UpperLipRaise => "UPPER_LIP_RAISE",
        }
    }

    pub fn value(&self, e: &Expressions) -> f32 {
        match self {
            Expression::Attention => e.attention,
            Expression::BrowFurrow => e.brow_furrow,
            Expression::BrowRaise => e.brow_raise,
            Expression::ChinRaise => e.chin_raise,
            Expression::EyeClosure => e.eye_closure,
            Expression::InnerBrowRaise => e.inner_brow_raise,
            Expression::LipCornerDepressor => e.lip_corner_depressor,
            Expression::LipPress => e.lip_press,
            Expression::LipPucker => e.lip_pucker,
            Expression::LipSuck => e.lip_suck,
            Expression::MouthOpen => e.mouth_open,
            Expression::NoseWrinkle => e.nose_wrinkle,
            Expression::Smile => e.smile,
            Expression::Smirk => e.smirk,
            Expression::UpperLipRaise => e.upper_lip_raise,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Emotion(Emotion),
    Expression(Expression),
    Emoji(Emoji),
}

impl From<Emotion> for Metric {
    fn from(e: Emotion) -> Metric {
        Metric::Emotion(e)
    }
}

impl From<Expression> for Metric {
    fn from(e: Expression) -> Metric {
        Metric::Expression(e)
    }
}

impl From<Emoji> for Metric {
    fn from(e: Emoji) -> Metric {
        Metric::Emoji(e)
    }
}

impl Metric {
    /// Emotions, then expressions, then scored emojis.
    pub fn all() -> Vec<Metric> {
        Emotion::ALL
            .into_iter()
            .map(Metric::from)
            .chain(Expression::ALL.into_iter().map(Metric::from))
            .chain(Emoji::SCORED.into_iter().map(Metric::from))
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Emotion(e) => e.name(),
            Metric::Expression(e) => e.name(),
            Metric::Emoji(e) => e.name(),
        }
    }

    pub fn value(&self, face: &DetectedFace) -> f32 {
        match self {
            Metric::Emotion(e) => e.value(&face.emotions),
            Metric::Expression(e) => e.value(&face.expressions),
            Metric::Emoji(e) => face.emojis.score(*e).unwrap_or(0.),
        }
    }

    /// Shown on metric displays, e.g. `BROW FURROW`.
    pub fn upper_case_name(&self) -> String {
        match self {
            Metric::Expression(Expression::LipCornerDepressor) => "FROWN".to_string(),
            Metric::Emoji(e) => e.display_name().to_uppercase(),
            _ => self.name().replace('_', " "),
        }
    }

    /// Shown in selection lists and the dominant emotion label, e.g. `Brow Furrow`.
    pub fn capitalized_name(&self) -> String {
        match self {
            Metric::Emoji(e) => return e.display_name().to_string(),
            Metric::Expression(Expression::LipCornerDepressor) => return "Frown".to_string(),
            _ => {}
        }

        self.name()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Resource naming form, e.g. `brow_furrow`.
    pub fn lower_case_name(&self) -> String {
        self.name().to_lowercase()
    }
}
