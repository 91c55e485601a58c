use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::workflows::evaluation::domain::{
    AchievementLevel, EvaluationTemplate, Period, PersonId, TemplateArea, TemplateCompetency,
    TemplateId, TemplateIndicator,
};
use crate::workflows::evaluation::instance::{ManagerEvaluation, SelfEvaluation};
use crate::workflows::evaluation::ledger::ResponseEntry;
use crate::workflows::evaluation::repository::{
    EvaluationNotice, EvaluationRef, EvaluationRepository, NotificationError,
    NotificationPublisher, RepositoryError, TemplateStore,
};
use crate::workflows::evaluation::router::evaluation_router;
use crate::workflows::evaluation::service::{
    CreateManagerEvaluation, CreateSelfEvaluation, EvaluationService,
};
use crate::workflows::evaluation::{EvaluationId, WorkflowAction};

pub(super) const SUBJECT: PersonId = PersonId(7);
pub(super) const EVALUATOR: PersonId = PersonId(3);

pub(super) const SINGLE_TEMPLATE: TemplateId = TemplateId(10);
pub(super) const TWO_AREA_TEMPLATE: TemplateId = TemplateId(20);
pub(super) const MANAGER_TEMPLATE: TemplateId = TemplateId(30);
pub(super) const SELF_TEMPLATE: TemplateId = TemplateId(31);

pub(super) fn period() -> Period {
    Period::parse("06-2025").expect("valid period")
}

fn level(label: &str, score: u16) -> AchievementLevel {
    AchievementLevel {
        label: label.to_string(),
        description: format!("{label} performance"),
        score,
    }
}

fn indicator(id: u32, number: u32, statement: &str, level_scores: &[u16]) -> TemplateIndicator {
    let labels = ["Not achieved", "Developing", "Achieved", "Outstanding"];
    TemplateIndicator {
        id,
        number,
        statement: statement.to_string(),
        definition: None,
        levels: level_scores
            .iter()
            .enumerate()
            .map(|(index, &score)| level(labels.get(index).copied().unwrap_or("Level"), score))
            .collect(),
    }
}

/// One area (weight 100), one competency, one indicator with levels scoring
/// {0, 2, 4}.
pub(super) fn single_indicator_template() -> EvaluationTemplate {
    EvaluationTemplate {
        id: SINGLE_TEMPLATE,
        name: "Annual Review".to_string(),
        weighted: true,
        paired_self_template: None,
        areas: vec![TemplateArea {
            id: 1,
            name: "Teaching Practice".to_string(),
            weight: 100,
            competencies: vec![TemplateCompetency {
                id: 11,
                name: "Planning".to_string(),
                indicators: vec![indicator(101, 1, "Plans lessons ahead of time", &[0, 2, 4])],
            }],
        }],
    }
}

/// Two areas weighted 60/40, with maxima 10 and 20 respectively.
pub(super) fn two_area_template() -> EvaluationTemplate {
    EvaluationTemplate {
        id: TWO_AREA_TEMPLATE,
        name: "Semester Review".to_string(),
        weighted: true,
        paired_self_template: None,
        areas: vec![
            TemplateArea {
                id: 1,
                name: "Instruction".to_string(),
                weight: 60,
                competencies: vec![TemplateCompetency {
                    id: 11,
                    name: "Delivery".to_string(),
                    indicators: vec![
                        indicator(201, 1, "Communicates objectives", &[0, 2, 4]),
                        indicator(202, 2, "Adapts to the classroom", &[0, 3, 6]),
                    ],
                }],
            },
            TemplateArea {
                id: 2,
                name: "Collaboration".to_string(),
                weight: 40,
                competencies: vec![TemplateCompetency {
                    id: 21,
                    name: "Teamwork".to_string(),
                    indicators: vec![
                        indicator(203, 1, "Shares material with peers", &[0, 4, 8]),
                        indicator(204, 2, "Participates in councils", &[0, 6, 12]),
                    ],
                }],
            },
        ],
    }
}

/// Structurally parallel manager/self template pair with disjoint indicator
/// ids, so only positional alignment can pair them.
pub(super) fn paired_templates() -> (EvaluationTemplate, EvaluationTemplate) {
    let manager = EvaluationTemplate {
        id: MANAGER_TEMPLATE,
        name: "Leadership Review".to_string(),
        weighted: true,
        paired_self_template: Some(SELF_TEMPLATE),
        areas: vec![TemplateArea {
            id: 1,
            name: "Professional Conduct".to_string(),
            weight: 100,
            competencies: vec![TemplateCompetency {
                id: 11,
                name: "Responsibility".to_string(),
                indicators: vec![
                    indicator(301, 1, "Meets deadlines", &[0, 2, 4]),
                    indicator(302, 2, "Keeps records current", &[0, 2, 4]),
                    indicator(303, 3, "Attends meetings", &[0, 2, 4]),
                ],
            }],
        }],
    };

    let mut own = manager.clone();
    own.id = SELF_TEMPLATE;
    own.name = "Leadership Self-Review".to_string();
    own.paired_self_template = None;
    let competency = &mut own.areas[0].competencies[0];
    competency.indicators = vec![
        indicator(401, 1, "Meets deadlines", &[0, 2, 4]),
        indicator(402, 2, "Keeps records current", &[0, 2, 4]),
        indicator(403, 3, "Attends meetings", &[0, 2, 4]),
    ];

    (manager, own)
}

pub(super) fn entries(pairs: &[(u32, u16)]) -> Vec<ResponseEntry> {
    pairs
        .iter()
        .map(|&(indicator, score)| ResponseEntry { indicator, score })
        .collect()
}

#[derive(Default)]
pub(super) struct MemoryTemplateStore {
    templates: Mutex<HashMap<TemplateId, EvaluationTemplate>>,
}

impl MemoryTemplateStore {
    pub(super) fn insert(&self, template: EvaluationTemplate) {
        self.templates
            .lock()
            .expect("template mutex poisoned")
            .insert(template.id, template);
    }

    /// Replace a template in place, simulating an admin edit after an
    /// evaluation instance already captured its snapshot.
    pub(super) fn replace(&self, template: EvaluationTemplate) {
        self.insert(template);
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn fetch(&self, id: TemplateId) -> Result<Option<EvaluationTemplate>, RepositoryError> {
        let guard = self.templates.lock().expect("template mutex poisoned");
        Ok(guard.get(&id).cloned())
    }
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    self_evaluations: Mutex<HashMap<EvaluationId, SelfEvaluation>>,
    manager_evaluations: Mutex<HashMap<EvaluationId, ManagerEvaluation>>,
}

impl EvaluationRepository for MemoryRepository {
    fn insert_self(&self, record: SelfEvaluation) -> Result<SelfEvaluation, RepositoryError> {
        let mut guard = self
            .self_evaluations
            .lock()
            .expect("repository mutex poisoned");
        let duplicate = guard.values().any(|existing| {
            existing.core.subject == record.core.subject
                && existing.core.template == record.core.template
                && existing.core.period == record.core.period
        });
        if duplicate || guard.contains_key(&record.core.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.core.id, record.clone());
        Ok(record)
    }

    fn insert_manager(
        &self,
        record: ManagerEvaluation,
    ) -> Result<ManagerEvaluation, RepositoryError> {
        let mut guard = self
            .manager_evaluations
            .lock()
            .expect("repository mutex poisoned");
        let duplicate = guard.values().any(|existing| {
            existing.core.subject == record.core.subject
                && existing.evaluator == record.evaluator
                && existing.core.template == record.core.template
                && existing.core.period == record.core.period
        });
        if duplicate || guard.contains_key(&record.core.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.core.id, record.clone());
        Ok(record)
    }

    fn fetch_self(&self, id: EvaluationId) -> Result<Option<SelfEvaluation>, RepositoryError> {
        let guard = self
            .self_evaluations
            .lock()
            .expect("repository mutex poisoned");
        Ok(guard.get(&id).cloned())
    }

    fn fetch_manager(
        &self,
        id: EvaluationId,
    ) -> Result<Option<ManagerEvaluation>, RepositoryError> {
        let guard = self
            .manager_evaluations
            .lock()
            .expect("repository mutex poisoned");
        Ok(guard.get(&id).cloned())
    }

    fn update_self(&self, record: SelfEvaluation) -> Result<(), RepositoryError> {
        let mut guard = self
            .self_evaluations
            .lock()
            .expect("repository mutex poisoned");
        if !guard.contains_key(&record.core.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(record.core.id, record);
        Ok(())
    }

    fn update_manager(&self, record: ManagerEvaluation) -> Result<(), RepositoryError> {
        let mut guard = self
            .manager_evaluations
            .lock()
            .expect("repository mutex poisoned");
        if !guard.contains_key(&record.core.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(record.core.id, record);
        Ok(())
    }

    fn find_self(
        &self,
        subject: PersonId,
        template: TemplateId,
        period: &Period,
    ) -> Result<Option<SelfEvaluation>, RepositoryError> {
        let guard = self
            .self_evaluations
            .lock()
            .expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|record| {
                record.core.subject == subject
                    && record.core.template == template
                    && &record.core.period == period
            })
            .cloned())
    }

    fn self_evaluations_for(
        &self,
        subject: PersonId,
    ) -> Result<Vec<SelfEvaluation>, RepositoryError> {
        let guard = self
            .self_evaluations
            .lock()
            .expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| record.core.subject == subject)
            .cloned()
            .collect())
    }

    fn manager_evaluations_for(
        &self,
        evaluator: PersonId,
    ) -> Result<Vec<ManagerEvaluation>, RepositoryError> {
        let guard = self
            .manager_evaluations
            .lock()
            .expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| record.evaluator == evaluator)
            .cloned()
            .collect())
    }

    fn missing_snapshots(&self) -> Result<Vec<EvaluationRef>, RepositoryError> {
        let mut pending = Vec::new();
        {
            let guard = self
                .self_evaluations
                .lock()
                .expect("repository mutex poisoned");
            pending.extend(
                guard
                    .values()
                    .filter(|record| record.core.snapshot.is_none())
                    .map(|record| EvaluationRef::SelfEvaluation(record.core.id)),
            );
        }
        {
            let guard = self
                .manager_evaluations
                .lock()
                .expect("repository mutex poisoned");
            pending.extend(
                guard
                    .values()
                    .filter(|record| record.core.snapshot.is_none())
                    .map(|record| EvaluationRef::ManagerEvaluation(record.core.id)),
            );
        }
        Ok(pending)
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    events: Mutex<Vec<EvaluationNotice>>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<EvaluationNotice> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, notice: EvaluationNotice) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl NotificationPublisher for FailingNotifier {
    fn publish(&self, _notice: EvaluationNotice) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp offline".to_string()))
    }
}

pub(super) type TestService =
    EvaluationService<MemoryTemplateStore, MemoryRepository, MemoryNotifier>;

pub(super) fn build_service() -> (
    TestService,
    Arc<MemoryTemplateStore>,
    Arc<MemoryRepository>,
    Arc<MemoryNotifier>,
) {
    let templates = Arc::new(MemoryTemplateStore::default());
    templates.insert(single_indicator_template());
    templates.insert(two_area_template());
    let (manager, own) = paired_templates();
    templates.insert(manager);
    templates.insert(own);

    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let service =
        EvaluationService::new(templates.clone(), repository.clone(), notifier.clone());

    (service, templates, repository, notifier)
}

pub(super) fn create_self(service: &TestService, template: TemplateId) -> SelfEvaluation {
    service
        .create_self(CreateSelfEvaluation {
            subject: SUBJECT,
            template,
            period: period(),
        })
        .expect("self evaluation created")
}

pub(super) fn create_manager(service: &TestService, template: TemplateId) -> ManagerEvaluation {
    service
        .create_manager(CreateManagerEvaluation {
            subject: SUBJECT,
            evaluator: EVALUATOR,
            template,
            period: period(),
        })
        .expect("manager evaluation created")
}

/// Drive a freshly created manager evaluation up to (and including) closing
/// it for signature.
pub(super) fn close_for_signature(service: &TestService, id: EvaluationId) {
    for action in [
        WorkflowAction::Complete,
        WorkflowAction::GiveFeedback,
        WorkflowAction::CloseForSignature,
    ] {
        service.advance(id, action).expect("transition applies");
    }
}

pub(super) fn valid_objection() -> String {
    "The scores recorded for the collaboration area do not reflect the agreed \
     outcomes of our feedback meeting."
        .to_string()
}

pub(super) fn evaluation_router_with_service(service: TestService) -> axum::Router {
    evaluation_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
