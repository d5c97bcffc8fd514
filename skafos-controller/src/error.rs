use thiserror::Error;

/// Errors the controller's operator-facing surface reports with a
/// non-OK status. Wraps `skafos_core::ValidationError` for the
/// Apply*Rule path; transient remote errors (reqwest/timeout) are never
/// represented here, they're logged at the call site and never
/// propagate past a reconcile or messager tick.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] skafos_core::ValidationError),
}
