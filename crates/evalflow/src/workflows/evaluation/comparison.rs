use serde::Serialize;

use super::domain::{EvaluationId, EvaluationTemplate, PersonId, TemplateId};
use super::ledger::{self, IndicatorResponse};
use super::snapshot::StructureSnapshot;

/// Per-indicator point cap applied when totalling comparison maxima, to
/// normalize heterogeneous rubric scales. Indicators without levels count
/// the full cap.
pub const INDICATOR_POINT_CAP: f64 = 4.0;

/// Normalized intermediate representation of a rubric structure. Both
/// snapshot-backed and live-template-backed evaluations reduce to this shape
/// before the positional walk, so the comparator itself never branches on
/// the source.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedStructure {
    pub areas: Vec<NormalizedArea>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedArea {
    pub id: u32,
    pub name: String,
    pub competencies: Vec<NormalizedCompetency>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCompetency {
    pub id: u32,
    pub name: String,
    pub indicators: Vec<NormalizedIndicator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedIndicator {
    pub id: u32,
    pub number: u32,
    pub statement: String,
    /// `None` when the rubric carries no achievement levels.
    pub max_score: Option<u16>,
}

pub fn normalize_snapshot(snapshot: &StructureSnapshot) -> NormalizedStructure {
    NormalizedStructure {
        areas: snapshot
            .areas
            .iter()
            .map(|area| NormalizedArea {
                id: area.id,
                name: area.name.clone(),
                competencies: area
                    .competencies
                    .iter()
                    .map(|competency| NormalizedCompetency {
                        id: competency.id,
                        name: competency.name.clone(),
                        indicators: competency
                            .indicators
                            .iter()
                            .map(|indicator| NormalizedIndicator {
                                id: indicator.id,
                                number: indicator.number,
                                statement: indicator.statement.clone(),
                                max_score: indicator
                                    .levels
                                    .iter()
                                    .map(|level| level.score)
                                    .max(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

pub fn normalize_template(template: &EvaluationTemplate) -> NormalizedStructure {
    NormalizedStructure {
        areas: template
            .areas
            .iter()
            .map(|area| NormalizedArea {
                id: area.id,
                name: area.name.clone(),
                competencies: area
                    .competencies
                    .iter()
                    .map(|competency| NormalizedCompetency {
                        id: competency.id,
                        name: competency.name.clone(),
                        indicators: competency
                            .indicators
                            .iter()
                            .map(|indicator| NormalizedIndicator {
                                id: indicator.id,
                                number: indicator.number,
                                statement: indicator.statement.clone(),
                                max_score: indicator
                                    .levels
                                    .iter()
                                    .map(|level| level.score)
                                    .max(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// One positionally paired indicator. The delta is only computed when both
/// sides recorded a score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorComparison {
    pub indicator: u32,
    pub number: u32,
    pub statement: String,
    pub self_score: Option<u16>,
    pub manager_score: Option<u16>,
    pub delta: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetencyComparison {
    pub id: u32,
    pub name: String,
    pub indicators: Vec<IndicatorComparison>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaComparison {
    pub id: u32,
    pub name: String,
    pub competencies: Vec<CompetencyComparison>,
}

/// Aggregate line of the report. Percentages come from each instance's
/// stored achievement score; point totals come from the positional walk.
/// That dual source of truth is deliberate and preserved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub self_points: Option<f64>,
    pub manager_points: Option<f64>,
    pub max_points: Option<f64>,
    pub delta_points: Option<f64>,
    pub self_percentage: Option<f64>,
    pub manager_percentage: Option<f64>,
    pub delta_percentage: Option<f64>,
    pub answered_self: usize,
    pub answered_manager: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub manager_evaluation: EvaluationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_evaluation: Option<EvaluationId>,
    pub subject: PersonId,
    pub evaluator: PersonId,
    pub template: TemplateId,
    pub template_name: String,
    pub period: String,
    pub areas: Vec<AreaComparison>,
    pub summary: ComparisonSummary,
}

#[derive(Debug, Default)]
pub(crate) struct WalkTotals {
    pub max_points: f64,
    pub self_points: f64,
    pub manager_points: f64,
}

/// Walk the manager structure and the (optional) self structure in parallel,
/// pairing entries by position and truncating to the shorter side at the
/// area, competency, and indicator levels. Trailing unmatched entries are
/// silently dropped. Without a self side the walk covers the manager
/// structure alone with null self scores.
pub(crate) fn walk(
    manager: &NormalizedStructure,
    manager_responses: &[IndicatorResponse],
    self_side: Option<(&NormalizedStructure, &[IndicatorResponse])>,
) -> (Vec<AreaComparison>, WalkTotals) {
    let mut totals = WalkTotals::default();
    let mut areas = Vec::new();

    let area_count = match self_side {
        Some((structure, _)) => manager.areas.len().min(structure.areas.len()),
        None => manager.areas.len(),
    };

    for i in 0..area_count {
        let area_m = &manager.areas[i];
        let area_s = self_side.map(|(structure, _)| &structure.areas[i]);

        let competency_count = match area_s {
            Some(area) => area_m.competencies.len().min(area.competencies.len()),
            None => area_m.competencies.len(),
        };

        let mut competencies = Vec::new();
        for j in 0..competency_count {
            let comp_m = &area_m.competencies[j];
            let comp_s = area_s.map(|area| &area.competencies[j]);

            let indicator_count = match comp_s {
                Some(comp) => comp_m.indicators.len().min(comp.indicators.len()),
                None => comp_m.indicators.len(),
            };

            let mut indicators = Vec::new();
            for k in 0..indicator_count {
                let ind_m = &comp_m.indicators[k];
                let ind_s = comp_s.map(|comp| &comp.indicators[k]);

                let manager_score = ledger::score_for(manager_responses, ind_m.id);
                let self_score = match (ind_s, self_side) {
                    (Some(indicator), Some((_, responses))) => {
                        ledger::score_for(responses, indicator.id)
                    }
                    _ => None,
                };

                totals.max_points += ind_m
                    .max_score
                    .map(|max| f64::from(max).min(INDICATOR_POINT_CAP))
                    .unwrap_or(INDICATOR_POINT_CAP);
                if let Some(score) = self_score {
                    totals.self_points += f64::from(score);
                }
                if let Some(score) = manager_score {
                    totals.manager_points += f64::from(score);
                }

                let delta = match (manager_score, self_score) {
                    (Some(manager), Some(own)) => Some(i32::from(manager) - i32::from(own)),
                    _ => None,
                };

                indicators.push(IndicatorComparison {
                    indicator: ind_m.id,
                    number: ind_m.number,
                    statement: ind_m.statement.clone(),
                    self_score,
                    manager_score,
                    delta,
                });
            }

            competencies.push(CompetencyComparison {
                id: comp_m.id,
                name: comp_m.name.clone(),
                indicators,
            });
        }

        areas.push(AreaComparison {
            id: area_m.id,
            name: area_m.name.clone(),
            competencies,
        });
    }

    (areas, totals)
}

/// Responses recorded against a structure, counted over the *full*
/// (untruncated) traversal of that side.
pub(crate) fn answered_count(
    structure: &NormalizedStructure,
    responses: &[IndicatorResponse],
) -> usize {
    structure
        .areas
        .iter()
        .flat_map(|area| area.competencies.iter())
        .flat_map(|competency| competency.indicators.iter())
        .filter(|indicator| ledger::score_for(responses, indicator.id).is_some())
        .count()
}
