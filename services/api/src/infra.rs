use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use evalflow::workflows::evaluation::{
    AchievementLevel, EvaluationId, EvaluationNotice, EvaluationRef, EvaluationRepository,
    EvaluationTemplate, ManagerEvaluation, NotificationError, NotificationPublisher, Period,
    PersonId, RepositoryError, SelfEvaluation, TemplateArea, TemplateCompetency, TemplateId,
    TemplateIndicator, TemplateStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
pub(crate) struct InMemoryTemplateStore {
    templates: Mutex<HashMap<TemplateId, EvaluationTemplate>>,
}

impl InMemoryTemplateStore {
    pub(crate) fn insert(&self, template: EvaluationTemplate) {
        self.templates
            .lock()
            .expect("template mutex poisoned")
            .insert(template.id, template);
    }
}

impl TemplateStore for InMemoryTemplateStore {
    fn fetch(&self, id: TemplateId) -> Result<Option<EvaluationTemplate>, RepositoryError> {
        let guard = self.templates.lock().expect("template mutex poisoned");
        Ok(guard.get(&id).cloned())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryEvaluationRepository {
    self_evaluations: Mutex<HashMap<EvaluationId, SelfEvaluation>>,
    manager_evaluations: Mutex<HashMap<EvaluationId, ManagerEvaluation>>,
}

impl EvaluationRepository for InMemoryEvaluationRepository {
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

/// Delivery adapter that records the notice in the logs. Mail transport is a
/// deployment concern; the service only requires that publishing never
/// blocks or fails the triggering transition.
#[derive(Default)]
pub(crate) struct LoggingNotificationPublisher;

impl NotificationPublisher for LoggingNotificationPublisher {
    fn publish(&self, notice: EvaluationNotice) -> Result<(), NotificationError> {
        info!(
            template = %notice.template,
            evaluation = %notice.evaluation,
            recipient = ?notice.recipient,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Notification publisher that collects events, for the demo walkthrough.
#[derive(Default)]
pub(crate) struct InMemoryNotificationPublisher {
    events: Mutex<Vec<EvaluationNotice>>,
}

impl InMemoryNotificationPublisher {
    pub(crate) fn events(&self) -> Vec<EvaluationNotice> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, notice: EvaluationNotice) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

fn level(label: &str, description: &str, score: u16) -> AchievementLevel {
    AchievementLevel {
        label: label.to_string(),
        description: description.to_string(),
        score,
    }
}

fn indicator(id: u32, number: u32, statement: &str, definition: &str) -> TemplateIndicator {
    TemplateIndicator {
        id,
        number,
        statement: statement.to_string(),
        definition: Some(definition.to_string()),
        levels: vec![
            level("Not achieved", "No evidence of the practice", 0),
            level("Developing", "Partial, inconsistent evidence", 2),
            level("Outstanding", "Consistent, documented evidence", 4),
        ],
    }
}

/// Default rubric pair used when no admin-managed template store is wired
/// in: a manager-review template and its structurally parallel self-review
/// counterpart.
pub(crate) fn standard_templates() -> (EvaluationTemplate, EvaluationTemplate) {
    let manager = EvaluationTemplate {
        id: TemplateId(1),
        name: "Teaching Staff Review".to_string(),
        weighted: true,
        paired_self_template: Some(TemplateId(2)),
        areas: vec![
            TemplateArea {
                id: 1,
                name: "Instructional Practice".to_string(),
                weight: 60,
                competencies: vec![TemplateCompetency {
                    id: 11,
                    name: "Planning and Delivery".to_string(),
                    indicators: vec![
                        indicator(
                            101,
                            1,
                            "Plans lessons aligned to the curriculum",
                            "Lesson plans exist, are current, and follow the program",
                        ),
                        indicator(
                            102,
                            2,
                            "Adapts instruction to student needs",
                            "Observed differentiation across student groups",
                        ),
                    ],
                }],
            },
            TemplateArea {
                id: 2,
                name: "Professional Collaboration".to_string(),
                weight: 40,
                competencies: vec![TemplateCompetency {
                    id: 21,
                    name: "Community".to_string(),
                    indicators: vec![indicator(
                        103,
                        1,
                        "Contributes to department meetings",
                        "Attendance and documented contributions",
                    )],
                }],
            },
        ],
    };

    let mut own = manager.clone();
    own.id = TemplateId(2);
    own.name = "Teaching Staff Self-Review".to_string();
    own.paired_self_template = None;
    own.areas[0].competencies[0].indicators = vec![
        indicator(
            201,
            1,
            "Plans lessons aligned to the curriculum",
            "Lesson plans exist, are current, and follow the program",
        ),
        indicator(
            202,
            2,
            "Adapts instruction to student needs",
            "Differentiation across student groups",
        ),
    ];
    own.areas[1].competencies[0].indicators = vec![indicator(
        203,
        1,
        "Contributes to department meetings",
        "Attendance and documented contributions",
    )];

    (manager, own)
}
