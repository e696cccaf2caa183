use std::sync::Arc;
use crate::admission::AdmissionController;

// app's shared state

#[derive(Clone)]
pub struct AppState {
    pub admission: Arc<AdmissionController>,
}

impl AppState {
    pub fn new(admission: Arc<AdmissionController>) -> Self {
        Self { admission }
    }
}
