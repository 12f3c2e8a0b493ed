use serde::Serialize;

use super::domain::{ApplicantDetails, DocumentCategory};

/// Sections an applicant must complete before handing in the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationSection {
    Personal,
    Contact,
    Program,
    Documents,
    Payment,
}

impl ApplicationSection {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Contact => "contact",
            Self::Program => "program",
            Self::Documents => "documents",
            Self::Payment => "payment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("application incomplete; missing sections: {}", labels(.missing))]
pub struct IncompleteApplication {
    pub missing: Vec<ApplicationSection>,
}

fn labels(sections: &[ApplicationSection]) -> String {
    sections
        .iter()
        .map(|section| section.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Which supporting documents a submission must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionPolicy {
    required_documents: Vec<DocumentCategory>,
    require_payment: bool,
}

impl SubmissionPolicy {
    pub fn new(required_documents: Vec<DocumentCategory>, require_payment: bool) -> Self {
        Self {
            required_documents,
            require_payment,
        }
    }

    pub fn required_documents(&self) -> &[DocumentCategory] {
        &self.required_documents
    }
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self::new(
            vec![DocumentCategory::Identification, DocumentCategory::Transcript],
            true,
        )
    }
}

/// Decides whether a draft is complete enough to be submitted.
#[derive(Debug, Clone, Default)]
pub struct SubmissionGuard {
    policy: SubmissionPolicy,
}

impl SubmissionGuard {
    pub fn with_policy(policy: SubmissionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SubmissionPolicy {
        &self.policy
    }

    pub fn missing_sections(&self, details: &ApplicantDetails) -> Vec<ApplicationSection> {
        let mut missing = Vec::new();

        let personal_complete = details.personal.as_ref().is_some_and(|personal| {
            !personal.first_name.trim().is_empty() && !personal.last_name.trim().is_empty()
        });
        if !personal_complete {
            missing.push(ApplicationSection::Personal);
        }

        let contact_complete = details.contact.as_ref().is_some_and(|contact| {
            contact.email.contains('@') && !contact.phone.trim().is_empty()
        });
        if !contact_complete {
            missing.push(ApplicationSection::Contact);
        }

        let program_complete = details.program.as_ref().is_some_and(|program| {
            !program.first_choice.trim().is_empty() && !program.level.trim().is_empty()
        });
        if !program_complete {
            missing.push(ApplicationSection::Program);
        }

        let documents_complete = self.policy.required_documents.iter().all(|required| {
            details
                .documents
                .iter()
                .any(|document| document.category == *required)
        });
        if !documents_complete {
            missing.push(ApplicationSection::Documents);
        }

        let payment_complete = !self.policy.require_payment
            || details
                .payment
                .as_ref()
                .is_some_and(|payment| !payment.reference.trim().is_empty());
        if !payment_complete {
            missing.push(ApplicationSection::Payment);
        }

        missing
    }

    pub fn check(&self, details: &ApplicantDetails) -> Result<(), IncompleteApplication> {
        let missing = self.missing_sections(details);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(IncompleteApplication { missing })
        }
    }
}
