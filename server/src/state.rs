//! Application state shared across handlers.

use waitline_runtime::{AdmissionService, ReadinessProbe};

/// Application state, cloned (cheaply) for each request.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Admission operations
    pub service: AdmissionService,
    /// Dependency checks behind `/ready`
    pub readiness: ReadinessProbe,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(service: AdmissionService, readiness: ReadinessProbe) -> Self {
        Self { service, readiness }
    }
}
