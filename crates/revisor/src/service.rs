use std::sync::Arc;

use revisor_agent::Agent;
use revisor_core::{Orchestrator, RevisionError, RevisionRequest, RevisionResult, RevisionSettings};
use revisor_logging::{Logger, ResultsLog};
use tracing::{error, info};

/// Runs revision requests against one backend and records every completed
/// result in the results log
pub struct RevisionService {
    agent: Box<dyn Agent>,
    settings: RevisionSettings,
    logger: Arc<Logger>,
    results: Option<ResultsLog>,
}

impl RevisionService {
    pub fn new(
        agent: Box<dyn Agent>,
        settings: RevisionSettings,
        logger: Arc<Logger>,
        results: Option<ResultsLog>,
    ) -> Self {
        Self {
            agent,
            settings,
            logger,
            results,
        }
    }

    pub fn agent(&self) -> &dyn Agent {
        self.agent.as_ref()
    }

    /// Revise one request. Requests without an `id` get a random one.
    pub async fn process(&self, request: &RevisionRequest) -> Result<RevisionResult, RevisionError> {
        let request_id = match request.id {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        let orchestrator =
            Orchestrator::new(self.agent.as_ref(), self.settings.clone(), self.logger.clone());
        let result = orchestrator.revise(&request_id, request).await?;

        if let Some(ref results) = self.results {
            // A result that cannot be recorded is still returned to the caller
            if let Err(e) = results.append(&result.audit) {
                error!(
                    request_id = %request_id,
                    path = %results.path().display(),
                    error = %e,
                    "Failed to append to results log"
                );
            }
        }

        Ok(result)
    }

    /// Revise requests one after another, stopping at the first failure
    pub async fn process_batch(
        &self,
        requests: &[RevisionRequest],
    ) -> Result<Vec<RevisionResult>, RevisionError> {
        info!(count = requests.len(), "Processing revision batch");
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.process(request).await?);
        }
        Ok(results)
    }
}
