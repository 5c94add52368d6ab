//! 通用类型：操作者、分页、批量结果

use serde::{Deserialize, Serialize};

/// Who performs a mutation; copied into every change-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub client_ip: String,
    pub tenant_id: String,
}

impl Actor {
    pub fn new(
        id: impl Into<String>,
        client_ip: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            client_ip: client_ip.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// Actor used by scheduled jobs.
    pub fn system(tenant_id: impl Into<String>) -> Self {
        Self::new("system", "127.0.0.1", tenant_id)
    }
}

/// 1-indexed page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl PageRequest {
    pub const MAX_PAGE_SIZE: u64 = 200;

    /// Clamp into `page >= 1`, `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    pub fn offset(self) -> u64 {
        let p = self.normalized();
        (p.page - 1) * p.page_size
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let request = request.normalized();
        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
            total_pages: total.div_ceil(request.page_size),
        }
    }

    /// Slice an already filtered, already sorted list.
    pub fn from_vec(all: Vec<T>, request: PageRequest) -> Self {
        let request = request.normalized();
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(usize::try_from(request.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(request.page_size).unwrap_or(usize::MAX))
            .collect();
        Self::new(items, total, request)
    }
}

/// One failed item of a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub id: String,
    pub error: String,
}

/// Aggregate result of a batch operation; items are processed in isolation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub success_count: usize,
    pub failure_count: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn record_success(&mut self) {
        self.success_count += 1;
    }

    pub fn record_failure(&mut self, id: impl Into<String>, error: impl ToString) {
        self.failure_count += 1;
        self.failures.push(BatchFailure {
            id: id.into(),
            error: error.to_string(),
        });
    }
}
