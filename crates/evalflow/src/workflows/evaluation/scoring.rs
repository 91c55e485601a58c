use std::collections::BTreeMap;

use serde::Serialize;

use super::ledger::IndicatorResponse;
use super::snapshot::StructureSnapshot;

/// Per-area contribution to the achievement percentage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaScore {
    pub area: u32,
    pub name: String,
    pub weight: u32,
    pub obtained: u32,
    pub maximum: u32,
    pub percentage: f64,
    pub contribution: f64,
}

/// Full scoring result for one evaluation instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub points_obtained: u32,
    pub points_maximum: u32,
    pub answered: usize,
    pub expected: usize,
    pub areas: Vec<AreaScore>,
}

/// Weighted achievement percentage computed exclusively from the snapshot.
///
/// For each area: `obtained` sums the recorded scores of that area's
/// indicators (a missing response counts zero, while the indicator's maximum
/// still counts), `maximum` sums the snapshot maxima. Areas whose maximum is
/// zero contribute nothing; the rest contribute `obtained / maximum * weight`.
/// The total is rounded to two decimal places.
pub fn compute(snapshot: &StructureSnapshot, responses: &[IndicatorResponse]) -> ScoreBreakdown {
    let recorded: BTreeMap<u32, u16> = responses
        .iter()
        .map(|record| (record.indicator, record.score))
        .collect();

    let mut total = 0.0;
    let mut points_obtained = 0;
    let mut points_maximum = 0;
    let mut answered = 0;
    let mut expected = 0;
    let mut areas = Vec::with_capacity(snapshot.areas.len());

    for area in &snapshot.areas {
        let mut obtained: u32 = 0;
        let mut maximum: u32 = 0;

        for competency in &area.competencies {
            for indicator in &competency.indicators {
                expected += 1;
                maximum += u32::from(indicator.max_score());
                if let Some(&score) = recorded.get(&indicator.id) {
                    obtained += u32::from(score);
                    answered += 1;
                }
            }
        }

        let (percentage, contribution) = if maximum > 0 {
            let ratio = f64::from(obtained) / f64::from(maximum);
            (round2(ratio * 100.0), ratio * f64::from(area.weight))
        } else {
            (0.0, 0.0)
        };

        total += contribution;
        points_obtained += obtained;
        points_maximum += maximum;

        areas.push(AreaScore {
            area: area.id,
            name: area.name.clone(),
            weight: area.weight,
            obtained,
            maximum,
            percentage,
            contribution: round2(contribution),
        });
    }

    ScoreBreakdown {
        total: round2(total),
        points_obtained,
        points_maximum,
        answered,
        expected,
        areas,
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
