use std::sync::Arc;

use poflow_core::api_types::{AmendmentState, EmailOutcome, OutcomeStatus};
use poflow_core::error::{PoflowError, Result};
use poflow_core::intent::Intent;
use poflow_extraction::ExtractionCoordinator;
use poflow_intent::{extract_subject, IntentClassifier};

use crate::amendment::AmendmentEngine;
use crate::change_log::ChangeLogProducer;
use crate::reconciler::{Reconciler, Reconciliation};

/// One inbound email from classification through persistence.
///
/// Change emails become a change log and an amendment; order emails are
/// extracted and reconciled; everything else is reported as not an order.
pub struct EmailPipeline {
    classifier: Arc<IntentClassifier>,
    coordinator: ExtractionCoordinator,
    reconciler: Reconciler,
    change_logs: ChangeLogProducer,
    amendments: AmendmentEngine,
}

impl EmailPipeline {
    pub fn new(
        classifier: Arc<IntentClassifier>,
        coordinator: ExtractionCoordinator,
        reconciler: Reconciler,
        change_logs: ChangeLogProducer,
        amendments: AmendmentEngine,
    ) -> Self {
        Self {
            classifier,
            coordinator,
            reconciler,
            change_logs,
            amendments,
        }
    }

    pub fn classifier(&self) -> &Arc<IntentClassifier> {
        &self.classifier
    }

    pub fn change_logs(&self) -> &ChangeLogProducer {
        &self.change_logs
    }

    pub fn amendments(&self) -> &AmendmentEngine {
        &self.amendments
    }

    #[tracing::instrument(skip_all)]
    pub async fn process(&self, email_text: &str) -> Result<EmailOutcome> {
        let intent = self
            .classifier
            .classify(email_text, &extract_subject(email_text))
            .await;

        if intent == Intent::PoChange {
            return self.process_change(intent, email_text).await;
        }
        if intent.is_order() {
            return self.process_order(intent, email_text).await;
        }
        tracing::info!(intent = %intent, "Email is not an order; skipping");
        Ok(EmailOutcome::new(OutcomeStatus::NotAnOrder, intent))
    }

    /// Extract and reconcile, whatever the classified intent.
    pub async fn process_order(&self, intent: Intent, email_text: &str) -> Result<EmailOutcome> {
        let extraction = self.coordinator.coordinate(email_text).await;

        let mut outcome = EmailOutcome::new(OutcomeStatus::MissingPoNumber, intent);
        outcome.po_number = extraction.po_number.clone();
        outcome.is_reference_po = extraction.is_reference;
        outcome.items = extraction.items().to_vec();

        match self.reconciler.reconcile(&extraction, email_text).await {
            Ok(reconciliation) => {
                outcome.po_found = true;
                outcome.is_new_po = reconciliation.is_new();
                outcome.status = match reconciliation {
                    Reconciliation::Created { .. } => OutcomeStatus::Created,
                    Reconciliation::Attached { .. } => OutcomeStatus::ItemsAttached,
                };
                outcome.document_id = Some(reconciliation.document_id().to_string());
                outcome.record = Some(reconciliation.record().clone());
            }
            Err(PoflowError::MissingPoNumber) => {
                tracing::warn!("No PO number in email");
            }
            Err(PoflowError::ReferencedPoNotFound(po_number)) => {
                tracing::warn!(po_number = %po_number, "Email refers to an unknown PO");
                outcome.status = OutcomeStatus::ReferencedPoNotFound;
            }
            Err(e) => return Err(e),
        }
        Ok(outcome)
    }

    async fn process_change(&self, intent: Intent, email_text: &str) -> Result<EmailOutcome> {
        let (log, _) = self.change_logs.produce(email_text).await?;
        let report = self.amendments.apply_amendment(&log).await?;

        let mut outcome = EmailOutcome::new(OutcomeStatus::NoChangeDetected, intent);
        outcome.po_number = report.po_no.clone();
        if report.state == AmendmentState::Persisted {
            outcome.status = OutcomeStatus::Amended;
            outcome.po_found = true;
            outcome.document_id = report.document_ids.first().cloned();
        }
        outcome.amendment = Some(report);
        Ok(outcome)
    }
}
