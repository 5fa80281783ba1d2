pub mod allocations;
pub mod audit_logs;
pub mod lookups;
pub mod material_requests;
pub mod notifications;
pub mod pagination;

use crate::config::{AppConfig, SubmissionPolicy};

pub use pagination::{Page, PageRequest, Pagination};

/// Behavior switches shared by the services, taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub default_page_size: u64,
    pub max_page_size: u64,
    pub submission_policy: SubmissionPolicy,
    pub allocation_row_locks: bool,
    pub allow_re_review: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            submission_policy: SubmissionPolicy::AutoSubmit,
            allocation_row_locks: false,
            allow_re_review: false,
        }
    }
}

impl From<&AppConfig> for ServiceSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            default_page_size: cfg.api_default_page_size,
            max_page_size: cfg.api_max_page_size,
            submission_policy: cfg.request_submission_policy,
            allocation_row_locks: cfg.allocation_row_locks,
            allow_re_review: cfg.allow_re_review,
        }
    }
}

impl ServiceSettings {
    pub fn page_request(&self, page: Option<u64>, limit: Option<u64>) -> PageRequest {
        PageRequest::normalize(page, limit, self.default_page_size, self.max_page_size)
    }
}
