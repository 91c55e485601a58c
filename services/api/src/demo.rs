use std::sync::Arc;

use clap::Args;
use evalflow::error::AppError;
use evalflow::workflows::evaluation::{
    AssignmentEntry, EvaluationService, EvaluationServiceError, ManagerAssignment, Period,
    PersonId, ResponseEntry, ResponseSubmission, SelfAssignment, WorkflowAction,
};

use crate::infra::{
    standard_templates, InMemoryEvaluationRepository, InMemoryNotificationPublisher,
    InMemoryTemplateStore,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluation period to run, MM-YYYY
    #[arg(long, default_value = "06-2025")]
    pub(crate) period: String,
    /// Print the full comparison report as JSON
    #[arg(long)]
    pub(crate) report_json: bool,
}

fn entries(pairs: &[(u32, u16)]) -> Vec<ResponseEntry> {
    pairs
        .iter()
        .map(|&(indicator, score)| ResponseEntry { indicator, score })
        .collect()
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let period = Period::parse(&args.period).map_err(EvaluationServiceError::from)?;

    let templates = Arc::new(InMemoryTemplateStore::default());
    let (manager_template, self_template) = standard_templates();
    let manager_template_id = manager_template.id;
    let self_template_id = self_template.id;
    templates.insert(manager_template);
    templates.insert(self_template);

    let repository = Arc::new(InMemoryEvaluationRepository::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let service = EvaluationService::new(templates, repository, notifier.clone());

    let subject = PersonId(7);
    let evaluator = PersonId(3);

    println!("== Assignment ==");
    let self_batch = service.assign_self(SelfAssignment {
        template: self_template_id,
        period: period.clone(),
        subjects: vec![subject],
    })?;
    let manager_batch = service.assign_manager(ManagerAssignment {
        template: manager_template_id,
        period: period.clone(),
        entries: vec![AssignmentEntry { subject, evaluator }],
    })?;
    let self_id = self_batch.created[0];
    let manager_id = manager_batch.created[0];
    println!("self evaluation {self_id}, manager evaluation {manager_id} for period {period}");

    println!("\n== Self-evaluation ==");
    let breakdown = service.submit_self_responses(
        self_id,
        ResponseSubmission {
            responses: entries(&[(201, 2), (202, 2), (203, 4)]),
            highlights: Some("Strong curriculum alignment this semester.".to_string()),
            ..Default::default()
        },
    )?;
    service.complete_self(self_id)?;
    println!("subject scored themself {:.2}%", breakdown.total);

    println!("\n== Manager evaluation ==");
    let breakdown = service.submit_manager_responses(
        manager_id,
        ResponseSubmission {
            responses: entries(&[(101, 4), (102, 2), (103, 4)]),
            feedback: Some("Agreed on a mentoring plan for differentiation.".to_string()),
            ..Default::default()
        },
    )?;
    println!("manager scored the subject {:.2}%", breakdown.total);
    for area in &breakdown.areas {
        println!(
            "  {}: {}/{} ({:.2}% at weight {})",
            area.name, area.obtained, area.maximum, area.percentage, area.weight
        );
    }

    println!("\n== Approval workflow ==");
    for action in [
        WorkflowAction::Complete,
        WorkflowAction::GiveFeedback,
        WorkflowAction::CloseForSignature,
        WorkflowAction::Sign,
    ] {
        let name = action.name();
        let stage = service.advance(manager_id, action)?;
        println!("{name} -> {}", stage.label());
    }

    println!("\n== Comparison ==");
    let report = service.compare(manager_id)?;
    let summary = &report.summary;
    println!(
        "self {:?}% vs manager {:?}% (delta {:?}); points {:?}/{:?} of {:?}",
        summary.self_percentage,
        summary.manager_percentage,
        summary.delta_percentage,
        summary.self_points,
        summary.manager_points,
        summary.max_points,
    );
    if args.report_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).expect("report serializes")
        );
    }

    println!("\n== Notifications ==");
    for notice in notifier.events() {
        println!(
            "  {} -> {:?} (evaluation {})",
            notice.template, notice.recipient, notice.evaluation
        );
    }

    Ok(())
}
