use super::common::*;
use crate::workflows::admissions::domain::{ApplicantDetails, DocumentCategory};
use crate::workflows::admissions::guard::{ApplicationSection, SubmissionGuard, SubmissionPolicy};

#[test]
fn complete_details_pass() {
    let guard = SubmissionGuard::default();
    assert!(guard.check(&complete_details()).is_ok());
}

#[test]
fn empty_details_list_every_section() {
    let guard = SubmissionGuard::default();

    let error = guard
        .check(&ApplicantDetails::default())
        .expect_err("empty draft is incomplete");

    assert_eq!(
        error.missing,
        vec![
            ApplicationSection::Personal,
            ApplicationSection::Contact,
            ApplicationSection::Program,
            ApplicationSection::Documents,
            ApplicationSection::Payment,
        ]
    );
    assert_eq!(
        error.to_string(),
        "application incomplete; missing sections: personal, contact, program, documents, payment"
    );
}

#[test]
fn missing_transcript_fails_documents() {
    let guard = SubmissionGuard::default();
    let mut details = complete_details();
    details
        .documents
        .retain(|document| document.category != DocumentCategory::Transcript);

    assert_eq!(
        guard.missing_sections(&details),
        vec![ApplicationSection::Documents]
    );
}

#[test]
fn malformed_contact_is_incomplete() {
    let guard = SubmissionGuard::default();
    let mut details = complete_details();
    if let Some(contact) = details.contact.as_mut() {
        contact.email = "not-an-email".to_string();
    }

    assert_eq!(
        guard.missing_sections(&details),
        vec![ApplicationSection::Contact]
    );
}

#[test]
fn payment_can_be_waived_by_policy() {
    let guard = SubmissionGuard::with_policy(SubmissionPolicy::new(
        vec![DocumentCategory::Identification],
        false,
    ));
    let mut details = complete_details();
    details.payment = None;

    assert!(guard.check(&details).is_ok());
    assert_eq!(
        guard.policy().required_documents(),
        &[DocumentCategory::Identification]
    );
}
