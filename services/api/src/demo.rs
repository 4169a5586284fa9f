use chrono::{Local, NaiveDate};
use clap::Args;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use ta_recruitment::config::RecruitmentConfig;
use ta_recruitment::error::AppError;
use ta_recruitment::workflows::recruitment::{
    parse_catalog, ApplyRequest, InMemoryRecruitmentStore, Module, NewRound, RecordingNotifier,
    RecruitmentService, RequirementChange, RoundId, StaticDocumentStatus, StaticMailingLists, TaCategory,
    UserId,
};

const DEMO_CATALOG: &str = "Code,Name,Semester,Coordinators\n\
COMP1100,Programming as Problem Solving,S1,lect-ada\n\
COMP2300,Computer Organisation,S1,lect-ada;lect-bob\n\
COMP4670,Statistical Machine Learning,S1,lect-bob\n";

type DemoService = RecruitmentService<InMemoryRecruitmentStore, RecordingNotifier>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the round opens (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Module catalog CSV to import instead of the built-in sample.
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct CatalogCheckArgs {
    /// Catalog CSV export (columns Code, Name, Semester, Coordinators)
    #[arg(long)]
    pub(crate) path: PathBuf,
}

pub(crate) fn run_catalog_check(args: CatalogCheckArgs) -> Result<(), AppError> {
    let file = std::fs::File::open(&args.path)?;
    let entries = parse_catalog(file)?;

    println!("{} modules in {}", entries.len(), args.path.display());
    for entry in entries {
        let coordinators: Vec<&str> = entry.coordinators.iter().map(UserId::as_str).collect();
        println!(
            "- {} {} ({}) coordinated by {}",
            entry.code,
            entry.name,
            if entry.semester.is_empty() {
                "no semester"
            } else {
                entry.semester.as_str()
            },
            coordinators.join(", ")
        );
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { today, catalog } = args;
    let today = today.unwrap_or_else(|| Local::now().date_naive());

    let notifier = Arc::new(RecordingNotifier::default());
    let documents = StaticDocumentStatus::default();
    let lists = StaticMailingLists::default()
        .with_list(
            "ta-undergraduates",
            vec![UserId::new("stu-ana"), UserId::new("stu-ben")],
        )
        .with_list("ta-postgraduates", vec![UserId::new("stu-cho")]);
    let service = RecruitmentService::new(
        Arc::new(InMemoryRecruitmentStore::default()),
        notifier.clone(),
        Arc::new(lists),
        Arc::new(documents.clone()),
        RecruitmentConfig::default(),
    );

    println!("TA recruitment demo");
    let round = service.create_round(NewRound {
        name: format!("Round opening {today}"),
        application_due: today + chrono::Duration::days(7),
        document_due: today + chrono::Duration::days(21),
        undergraduate_hours: None,
        postgraduate_hours: None,
        undergraduate_list: "ta-undergraduates".to_string(),
        postgraduate_list: "ta-postgraduates".to_string(),
    })?;
    let round = service.activate_round(&round.id)?;
    println!(
        "- Round {} active: applications due {}, documents due {}",
        round.id, round.application_due, round.document_due
    );

    let modules = match catalog {
        Some(path) => service.import_modules_from_path(&round.id, path)?,
        None => service.import_modules(&round.id, Cursor::new(DEMO_CATALOG))?,
    };
    println!("- Imported {} modules", modules.len());

    let plans = [(3, 2, 1), (4, 1, 1), (8, 0, 1)];
    let mut advertised = Vec::new();
    for (module, (hours, undergraduate, postgraduate)) in modules.iter().zip(plans) {
        let Some(coordinator) = module.coordinators.first() else {
            continue;
        };
        service.request_changes(&module.id)?;
        service.edit_requirements(
            coordinator,
            &module.id,
            RequirementChange {
                required_ta_hours: hours,
                required_undergraduate_ta_count: undergraduate,
                required_postgraduate_ta_count: postgraduate,
                requirements: format!("Tutorials for {}", module.name),
            },
        )?;
        let advertisement = service.advertise(&module.id)?;
        println!(
            "  - {} advertised to {} students ({} h/week)",
            advertisement.module.code,
            advertisement.recipients.len(),
            advertisement.module.required_ta_hours
        );
        advertised.push(advertisement.module);
    }

    println!("\nApplications");
    let attempts = [
        ("stu-ana", TaCategory::Undergraduate, 0),
        ("stu-ana", TaCategory::Undergraduate, 0),
        ("stu-ana", TaCategory::Undergraduate, 1),
        ("stu-ben", TaCategory::Undergraduate, 1),
        ("stu-dan", TaCategory::Undergraduate, 1),
        ("stu-cho", TaCategory::Postgraduate, 2),
    ];
    let mut receipts = Vec::new();
    for (student, category, index) in attempts {
        let Some(module) = advertised.get(index) else {
            continue;
        };
        let outcome = service.apply_for_ta(ApplyRequest {
            student: UserId::new(student),
            category: category.label().to_string(),
            module_id: module.id.clone(),
            round_id: round.id.clone(),
            ta_hours: None,
        });
        match outcome {
            Ok(receipt) => {
                println!(
                    "- {student} -> {}: {} ({} h/week left)",
                    module.code, receipt.application.id, receipt.remaining_hours
                );
                receipts.push((receipt.application, module.coordinators.clone()));
            }
            Err(err) => println!(
                "- {student} -> {}: {} [{}]",
                module.code,
                err,
                err.kind().code()
            ),
        }
    }

    println!("\nDecisions");
    for (position, (application, coordinators)) in receipts.iter().enumerate() {
        let Some(lecturer) = coordinators.first() else {
            continue;
        };
        let decided = if position % 3 == 2 {
            service.reject_application(lecturer, &application.id)?
        } else {
            service.accept_application(lecturer, &application.id)?
        };
        println!("- {} {}", decided.id, decided.status);
    }

    documents.mark_submitted(UserId::new("stu-ana"));
    let after_applications = round.application_due + chrono::Duration::days(1);
    let collecting = service.advance_round_phases(&round.id, after_applications)?;
    for module in &collecting {
        service.refresh_documents(&module.id)?;
    }
    let after_documents = round.document_due + chrono::Duration::days(1);
    let closed = service.advance_round_phases(&round.id, after_documents)?;

    println!("\nRound close-out");
    for module in service.list_round_modules(&round.id)? {
        print_module(&module);
    }
    println!(
        "- {} modules moved to document collection, {} closed",
        collecting.len(),
        closed.len()
    );

    let events = notifier.events();
    println!("\nNotifications: {}", events.len());
    for event in events {
        println!("  - {} -> {} recipients", event.template, event.recipients.len());
    }

    summarize_budgets(&service, &round.id)?;
    Ok(())
}

fn print_module(module: &Module) {
    println!("- {} [{}]", module.code, module.status);
    for category in TaCategory::ordered() {
        if let Some(counters) = module.counters(category) {
            println!(
                "    {}: {}/{} slots free, {} applied, {} accepted, {} appointed",
                category,
                counters.remaining,
                counters.required,
                counters.applied,
                counters.accepted,
                counters.appointed
            );
        }
    }
}

fn summarize_budgets(
    service: &DemoService,
    round: &RoundId,
) -> Result<(), AppError> {
    println!("\nHour budgets");
    for student in ["stu-ana", "stu-ben", "stu-cho"] {
        if let Some(budget) = service.get_budget(&UserId::new(student), round)? {
            println!(
                "- {student}: {} h/week left across {} applications",
                budget.available_hours,
                budget.applications.len()
            );
        }
    }
    Ok(())
}
