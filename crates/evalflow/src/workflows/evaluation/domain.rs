use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier wrapper for a person (subject or evaluator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(pub u64);

/// Identifier wrapper for a rubric template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateId(pub u64);

/// Identifier wrapper for an evaluation instance of either variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvaluationId(pub u64);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Evaluation period in `MM-YYYY` form, validated at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period(String);

impl Period {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let invalid = || ValidationError::InvalidPeriod {
            raw: raw.to_string(),
        };

        let (month, year) = trimmed.split_once('-').ok_or_else(invalid)?;
        if month.len() != 2 || year.len() != 4 {
            return Err(invalid());
        }
        let month: u32 = month.parse().map_err(|_| invalid())?;
        let _: u32 = year.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Period {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.0
    }
}

/// Rubric definition owned by the admin subsystem; read-only for the
/// evaluation core. Manager templates reference their structurally parallel
/// self-evaluation template through `paired_self_template`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationTemplate {
    pub id: TemplateId,
    pub name: String,
    pub weighted: bool,
    pub paired_self_template: Option<TemplateId>,
    pub areas: Vec<TemplateArea>,
}

/// Area with a percentage weight. Weights are intended to sum to 100 across
/// a template; that remains an admin responsibility and is not enforced here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateArea {
    pub id: u32,
    pub name: String,
    pub weight: u32,
    pub competencies: Vec<TemplateCompetency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateCompetency {
    pub id: u32,
    pub name: String,
    pub indicators: Vec<TemplateIndicator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateIndicator {
    pub id: u32,
    pub number: u32,
    pub statement: String,
    pub definition: Option<String>,
    pub levels: Vec<AchievementLevel>,
}

impl TemplateIndicator {
    /// Maximum achievable score; 0 when the rubric carries no levels.
    pub fn max_score(&self) -> u16 {
        self.levels.iter().map(|level| level.score).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementLevel {
    pub label: String,
    pub description: String,
    pub score: u16,
}

/// User-correctable input errors, surfaced with the violating field named.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("period '{raw}' must use the MM-YYYY format")]
    InvalidPeriod { raw: String },
    #[error("template {template} does not exist")]
    UnknownTemplate { template: TemplateId },
    #[error("indicator {indicator} is not part of this evaluation (snapshot {version})")]
    UnknownIndicator { indicator: u32, version: String },
    #[error("score {score} for indicator {indicator} exceeds the snapshot maximum of {max}")]
    ScoreOutOfBounds { indicator: u32, score: u16, max: u16 },
    #[error("an evaluation already exists for this subject, template, and period")]
    DuplicateEvaluation,
    #[error("an objection reason is required to sign with objection")]
    ObjectionReasonMissing,
    #[error("the objection reason must be at least {minimum} characters (got {length})")]
    ObjectionReasonTooShort { length: usize, minimum: usize },
}
