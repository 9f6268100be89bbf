//! Operation catalog: operation id -> HTTP method and path

use reqwest::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Operation {
    pub id: &'static str,
    pub method: HttpMethod,
    /// Relative to the API base URL
    pub path: &'static str,
}

const fn op(id: &'static str, method: HttpMethod, path: &'static str) -> Operation {
    Operation { id, method, path }
}

/// Every operation the tool modules may call
pub const OPERATIONS: &[Operation] = &[
    op(
        "scheduled_reports_query",
        HttpMethod::Get,
        "reports/queries/scheduled-reports/v1",
    ),
    op(
        "scheduled_reports_get",
        HttpMethod::Get,
        "reports/entities/scheduled-reports/v1",
    ),
    op(
        "scheduled_reports_launch",
        HttpMethod::Post,
        "reports/entities/scheduled-reports/execution/v1",
    ),
    op(
        "reports_executions_query",
        HttpMethod::Get,
        "reports/queries/report-executions/v1",
    ),
    op(
        "report_executions_get",
        HttpMethod::Get,
        "reports/entities/report-executions/v1",
    ),
    op(
        "report_executions_download_get",
        HttpMethod::Get,
        "reports/entities/report-executions-download/v1",
    ),
];

pub fn lookup(id: &str) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|op| op.id == id)
}
