use crate::error::AppError;
use crate::models::request::ServiceRequest;
use crate::state::AppState;

#[derive(Debug)]
pub struct DispatchJob {
    pub request: ServiceRequest,
}

pub async fn enqueue_job(state: &AppState, job: DispatchJob) -> Result<(), AppError> {
    state
        .dispatch_tx
        .send(job)
        .await
        .map_err(|err| AppError::Internal(format!("dispatch queue send failed: {err}")))?;

    state.metrics.dispatch_queue_depth.inc();
    Ok(())
}
