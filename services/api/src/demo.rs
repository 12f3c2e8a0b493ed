use crate::cli::academic_year_start;
use crate::infra::{in_memory_service, InMemoryAdmissions};
use chrono::{Datelike, Local, NaiveDate};
use clap::Args;
use ucaes_admissions::config::AppConfig;
use ucaes_admissions::error::AppError;
use ucaes_admissions::workflows::admissions::{
    AcceptanceDecision, AcceptanceOutcome, AdmissionsSettings, ApplicantDetails,
    ApplicationRecord, ContactDetails, DocumentCategory, DocumentDescriptor, ListingFilter,
    PaymentConfirmation, PersonalDetails, ProgramOverride, ProgramSelection,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// First calendar year of the academic year. Defaults to last year.
    #[arg(long, value_parser = academic_year_start)]
    pub(crate) academic_year_start: Option<u16>,
    /// Number of applicants to submit.
    #[arg(long, default_value_t = 2)]
    pub(crate) applicants: u16,
    /// Simulate a student portal outage, then retry the transfer.
    #[arg(long)]
    pub(crate) portal_offline: bool,
}

const APPLICANTS: [(&str, &str, &str); 4] = [
    ("Akosua", "Owusu", "BSc Nursing"),
    ("Kwame", "Asante", "BSc Agriculture"),
    ("Efua", "Quaye", "BEd Mathematics"),
    ("Yaw", "Darko", "BSc Computer Science"),
];

/// Demo against the configured admissions settings (`ADMISSIONS_*` variables).
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    run_demo_with(args, config.admissions.settings()).map(|_| ())
}

/// Runs the walkthrough and returns the submitted records.
pub(crate) fn run_demo_with(
    args: DemoArgs,
    settings: AdmissionsSettings,
) -> Result<Vec<ApplicationRecord>, AppError> {
    let today = Local::now().date_naive();
    let start_year = args
        .academic_year_start
        .unwrap_or_else(|| u16::try_from(today.year() - 1).unwrap_or(2025));

    let (service, portal) = in_memory_service(settings, start_year)?;
    let (resolved, year_key) = service.current_year_key()?;

    println!("UCAES admissions demo");
    println!(
        "  Academic year {}/{} -> admission year {} ({}), counter {}",
        start_year,
        start_year.saturating_add(1),
        resolved.year,
        resolved.source.as_str(),
        year_key
    );

    let mut submitted = Vec::new();
    for index in 0..usize::from(args.applicants) {
        let record = submit_applicant(&service, index, today)?;
        println!(
            "  Submitted {:<22} -> {}",
            record
                .details
                .personal
                .as_ref()
                .map(PersonalDetails::full_name)
                .unwrap_or_default(),
            record
                .application_id
                .as_ref()
                .map(|id| id.as_str())
                .unwrap_or("-")
        );
        submitted.push(record);
    }

    let draft = service.create_draft(ApplicantDetails::default())?;
    println!("  Unsubmitted draft {} stays private", draft.key);

    let Some(first) = submitted.first() else {
        println!("  No applicants submitted; nothing to review");
        return Ok(submitted);
    };
    let reference = first
        .application_id
        .as_ref()
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| first.key.0.clone());

    service.claim_for_review(&reference, "director.admissions")?;
    service.annotate(&reference, "director.admissions", "Documents verified")?;

    if args.portal_offline {
        portal.set_available(false);
    }
    let outcome = service.accept(
        &reference,
        AcceptanceDecision {
            reviewer: "director.admissions".to_string(),
            program_override: Some(ProgramOverride {
                program: None,
                level: Some("100".to_string()),
            }),
            note: Some("Admitted on merit".to_string()),
        },
    )?;
    print_outcome("Accepted", &outcome);

    if !outcome.success {
        portal.set_available(true);
        let retried = service.retry_transfer(&reference)?;
        print_outcome("Retried transfer", &retried);
    }

    if let Some(second) = submitted.get(1) {
        let reference = second
            .application_id
            .as_ref()
            .map(|id| id.as_str().to_string())
            .unwrap_or_else(|| second.key.0.clone());
        service.claim_for_review(&reference, "director.admissions")?;
        service.reject(&reference, "director.admissions", "Programme capacity reached")?;
        println!("  Rejected {reference}");
    }

    println!("\nStaff listing (drafts excluded)");
    for record in service.staff_listing(&ListingFilter::default())? {
        let view = record.status_view();
        println!(
            "  {:<16} {:<13} {}",
            view.application_id
                .as_ref()
                .map(|id| id.as_str())
                .unwrap_or("-"),
            view.status,
            view.registration_number
                .as_ref()
                .map(|number| number.0.as_str())
                .unwrap_or("")
        );
    }

    if let Some(counter) = service.counter(&year_key)? {
        println!(
            "\nCounter {} last issued {}",
            counter.year_key, counter.last_number
        );
    }

    Ok(submitted)
}

fn submit_applicant(
    service: &InMemoryAdmissions,
    index: usize,
    today: NaiveDate,
) -> Result<ApplicationRecord, AppError> {
    let (first_name, last_name, program) = APPLICANTS[index % APPLICANTS.len()];
    let draft = service.create_draft(ApplicantDetails::default())?;

    let details = ApplicantDetails {
        personal: Some(PersonalDetails {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            other_names: None,
            date_of_birth: NaiveDate::from_ymd_opt(2006, 1, 1 + (index % 28) as u32)
                .unwrap_or(today),
            nationality: Some("Ghanaian".to_string()),
        }),
        contact: Some(ContactDetails {
            email: format!(
                "{}.{}@example.com",
                first_name.to_lowercase(),
                last_name.to_lowercase()
            ),
            phone: format!("+23320000{index:04}"),
            postal_address: None,
        }),
        program: Some(ProgramSelection {
            first_choice: program.to_string(),
            second_choice: None,
            level: "100".to_string(),
            study_mode: Some("regular".to_string()),
        }),
        documents: vec![
            DocumentDescriptor {
                name: "National ID".to_string(),
                category: DocumentCategory::Identification,
                storage_key: format!("demo/{}/id.pdf", draft.key),
            },
            DocumentDescriptor {
                name: "WASSCE results".to_string(),
                category: DocumentCategory::Transcript,
                storage_key: format!("demo/{}/results.pdf", draft.key),
            },
        ],
        payment: Some(PaymentConfirmation {
            reference: format!("DEMO-PAY-{index:03}"),
            amount_minor: 25_000,
            paid_on: today,
        }),
    };

    service.update_draft(&draft.key, details)?;
    Ok(service.submit(&draft.key)?)
}

fn print_outcome(label: &str, outcome: &AcceptanceOutcome) {
    match (&outcome.registration_number, &outcome.error) {
        (Some(number), _) => println!(
            "  {label} {} -> registration number {}",
            outcome.application_id, number.0
        ),
        (None, Some(error)) => println!(
            "  {label} {} but transfer failed: {error}",
            outcome.application_id
        ),
        (None, None) => println!("  {label} {}", outcome.application_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucaes_admissions::config::{AdmissionsConfig, ConfigError};

    fn settings() -> AdmissionsSettings {
        AdmissionsConfig::default().settings()
    }

    #[test]
    fn demo_completes_with_portal_outage() {
        let args = DemoArgs {
            academic_year_start: Some(2025),
            applicants: 3,
            portal_offline: true,
        };

        let submitted = run_demo_with(args, settings()).expect("demo runs");
        assert_eq!(submitted.len(), 3);
    }

    #[test]
    fn demo_handles_zero_applicants() {
        let args = DemoArgs {
            academic_year_start: Some(2025),
            applicants: 0,
            portal_offline: false,
        };

        let submitted = run_demo_with(args, settings()).expect("demo runs");
        assert!(submitted.is_empty());
    }

    #[test]
    fn demo_uses_configured_prefix() {
        let config = AdmissionsConfig {
            id_prefix: "UCC".to_string(),
            ..AdmissionsConfig::default()
        };
        let args = DemoArgs {
            academic_year_start: Some(2025),
            applicants: 2,
            portal_offline: false,
        };

        let submitted = run_demo_with(args, config.settings()).expect("demo runs");

        let ids: Vec<_> = submitted
            .into_iter()
            .filter_map(|record| record.application_id.map(|id| id.0))
            .collect();
        assert_eq!(ids, vec!["UCC20260001", "UCC20260002"]);
    }

    #[test]
    fn demo_refuses_unrepresentable_academic_year() {
        let args = DemoArgs {
            academic_year_start: Some(u16::MAX),
            applicants: 1,
            portal_offline: false,
        };

        let result = run_demo_with(args, settings());

        assert!(matches!(
            result,
            Err(AppError::Config(ConfigError::AcademicYearOutOfRange { .. }))
        ));
    }

    #[test]
    fn applicants_get_sequential_ids() {
        let (service, _) = in_memory_service(settings(), 2025).expect("service wired");
        let today = NaiveDate::from_ymd_opt(2026, 2, 1).expect("valid date");

        let first = submit_applicant(&service, 0, today).expect("submitted");
        let second = submit_applicant(&service, 1, today).expect("submitted");

        assert_eq!(
            first.application_id.map(|id| id.0),
            Some("UCAES20260001".to_string())
        );
        assert_eq!(
            second.application_id.map(|id| id.0),
            Some("UCAES20260002".to_string())
        );
    }
}
