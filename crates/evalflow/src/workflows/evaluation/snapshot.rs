use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{EvaluationTemplate, TemplateId};

/// Deep, immutable copy of a template captured when an evaluation instance is
/// created. Scoring and response validation read exclusively from this copy,
/// never from the live template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub template_id: TemplateId,
    pub template_name: String,
    pub areas: Vec<AreaSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaSnapshot {
    pub id: u32,
    pub name: String,
    pub weight: u32,
    pub competencies: Vec<CompetencySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetencySnapshot {
    pub id: u32,
    pub name: String,
    pub indicators: Vec<IndicatorSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub id: u32,
    pub number: u32,
    pub statement: String,
    pub definition: Option<String>,
    pub levels: Vec<LevelSnapshot>,
}

impl IndicatorSnapshot {
    /// Maximum achievable score recorded in the snapshot; 0 without levels.
    pub fn max_score(&self) -> u16 {
        self.levels.iter().map(|level| level.score).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSnapshot {
    pub label: String,
    pub description: String,
    pub score: u16,
}

impl StructureSnapshot {
    /// Flattened set of indicator ids legal for this evaluation.
    pub fn indicator_ids(&self) -> BTreeSet<u32> {
        self.indicators().map(|indicator| indicator.id).collect()
    }

    /// Depth-first indicator traversal in template order.
    pub fn indicators(&self) -> impl Iterator<Item = &IndicatorSnapshot> + '_ {
        self.areas
            .iter()
            .flat_map(|area| area.competencies.iter())
            .flat_map(|competency| competency.indicators.iter())
    }

    pub fn indicator(&self, id: u32) -> Option<&IndicatorSnapshot> {
        self.indicators().find(|indicator| indicator.id == id)
    }

    pub fn indicator_count(&self) -> usize {
        self.indicators().count()
    }

    /// Sum of every indicator's maximum achievable score.
    pub fn max_points(&self) -> u32 {
        self.indicators()
            .map(|indicator| u32::from(indicator.max_score()))
            .sum()
    }
}

/// Capture a snapshot and its version tag from a live template.
///
/// Pure copy-by-value: the template is not mutated and the snapshot holds no
/// references back into it. An empty template produces an empty-area snapshot
/// that scores to zero rather than erroring.
pub fn capture(template: &EvaluationTemplate, at: DateTime<Utc>) -> (StructureSnapshot, String) {
    let areas = template
        .areas
        .iter()
        .map(|area| AreaSnapshot {
            id: area.id,
            name: area.name.clone(),
            weight: area.weight,
            competencies: area
                .competencies
                .iter()
                .map(|competency| CompetencySnapshot {
                    id: competency.id,
                    name: competency.name.clone(),
                    indicators: competency
                        .indicators
                        .iter()
                        .map(|indicator| IndicatorSnapshot {
                            id: indicator.id,
                            number: indicator.number,
                            statement: indicator.statement.clone(),
                            definition: indicator.definition.clone(),
                            levels: indicator
                                .levels
                                .iter()
                                .map(|level| LevelSnapshot {
                                    label: level.label.clone(),
                                    description: level.description.clone(),
                                    score: level.score,
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    let snapshot = StructureSnapshot {
        template_id: template.id,
        template_name: template.name.clone(),
        areas,
    };
    let version = format!("{}_{}", template.id, at.format("%Y%m%d_%H%M%S"));

    (snapshot, version)
}
