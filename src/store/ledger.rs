//! The submission ledger as a dispatch recipient.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::{Recipient, Submission, SubmissionKind};
use crate::error::DeliveryError;

use super::LibSqlBackend;

/// Appends every confirmed application to the `submissions` table. Urgent
/// requests are operator-only and never reach the ledger.
pub struct Ledger {
    db: Arc<LibSqlBackend>,
}

impl Ledger {
    pub fn new(db: Arc<LibSqlBackend>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Recipient for Ledger {
    fn name(&self) -> &str {
        "ledger"
    }

    fn accepts(&self, kind: SubmissionKind) -> bool {
        kind == SubmissionKind::Application
    }

    async fn deliver(&self, submission: &Submission) -> Result<(), DeliveryError> {
        self.db.record_submission(submission).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[tokio::test]
    async fn ledger_accepts_applications_only() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let ledger = Ledger::new(db.clone());
        assert!(ledger.accepts(SubmissionKind::Application));
        assert!(!ledger.accepts(SubmissionKind::Urgent));

        ledger
            .deliver(&Submission::application("telegram:3", HashMap::new()))
            .await
            .unwrap();
        assert_eq!(db.ledger_entries("telegram:3").await.unwrap().len(), 1);
    }
}
