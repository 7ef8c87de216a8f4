//! Lead scoring.
//!
//! A static weighted sum over three submitted attributes, clamped to
//! `0..=100`. The same attributes always produce the same score.

use serde::{Deserialize, Serialize};

use crate::CtaType;

/// Weight for the organization category / function role.
const FUNCTION_WEIGHTS: &[(&str, u8)] = &[
    ("Research Institution", 35),
    ("Hospital", 30),
    ("Medical Practice", 25),
    ("Veterinary Clinic", 20),
];

/// Disciplines worth [`HIGH_VALUE_DISCIPLINE_WEIGHT`].
const HIGH_VALUE_DISCIPLINES: &[&str] = &[
    "Regenerative Medicine",
    "Sports Medicine",
    "Orthopedics",
    "Physical Therapy",
];

const HIGH_VALUE_DISCIPLINE_WEIGHT: u8 = 25;
const DEMO_CTA_WEIGHT: u8 = 40;
const WAITLIST_CTA_WEIGHT: u8 = 20;

/// A lead score in `0..=100`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "i32", into = "i32")]
pub struct LeadScore(u8);

impl LeadScore {
    /// Highest possible score.
    pub const MAX: Self = Self(100);

    /// Build a score, clamping into range.
    #[must_use]
    pub fn clamped(raw: i64) -> Self {
        // Clamped into 0..=100 first, so the narrowing cannot truncate
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self(raw.clamp(0, 100) as u8)
    }

    /// The score as an integer.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i32> for LeadScore {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or_else(|| format!("lead score out of range: {value}"))
    }
}

impl From<LeadScore> for i32 {
    fn from(score: LeadScore) -> Self {
        Self::from(score.0)
    }
}

impl std::fmt::Display for LeadScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The submitted attributes the score depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadAttributes<'a> {
    /// Organization category or function role, e.g. "Hospital".
    pub function_role: Option<&'a str>,
    /// Clinical discipline, e.g. "Sports Medicine".
    pub discipline: Option<&'a str>,
    /// Form variant.
    pub cta_type: Option<&'a CtaType>,
}

/// Compute the lead score for a set of submitted attributes.
///
/// | Attribute | Match | Points |
/// |-----------|-------|--------|
/// | function role | Research Institution / Hospital / Medical Practice / Veterinary Clinic | 35 / 30 / 25 / 20 |
/// | discipline | Regenerative Medicine, Sports Medicine, Orthopedics, Physical Therapy | 25 |
/// | CTA | demo / waitlist | 40 / 20 |
///
/// Matching is exact after trimming. The sum is clamped to 100.
///
/// ```
/// use cellionyx_core::{CtaType, LeadAttributes, lead_score};
///
/// let cta = CtaType::parse("Request a Clinical Demo");
/// let score = lead_score(&LeadAttributes {
///     function_role: Some("Research Institution"),
///     discipline: Some("Sports Medicine"),
///     cta_type: Some(&cta),
/// });
/// assert_eq!(score.value(), 100);
/// ```
#[must_use]
pub fn lead_score(attrs: &LeadAttributes<'_>) -> LeadScore {
    let mut score: i64 = 0;

    if let Some(role) = attrs.function_role.map(str::trim) {
        score += FUNCTION_WEIGHTS
            .iter()
            .find(|(name, _)| *name == role)
            .map_or(0, |(_, weight)| i64::from(*weight));
    }

    if attrs
        .discipline
        .map(str::trim)
        .is_some_and(|d| HIGH_VALUE_DISCIPLINES.contains(&d))
    {
        score += i64::from(HIGH_VALUE_DISCIPLINE_WEIGHT);
    }

    score += match attrs.cta_type {
        Some(CtaType::Demo) => i64::from(DEMO_CTA_WEIGHT),
        Some(CtaType::Waitlist) => i64::from(WAITLIST_CTA_WEIGHT),
        Some(CtaType::Other(_)) | None => 0,
    };

    LeadScore::clamped(score)
}
