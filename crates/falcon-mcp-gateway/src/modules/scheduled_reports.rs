//! Scheduled reports and scheduled searches

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{JsonObject, Tool};
use rmcp::ErrorData as McpError;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::base::{self, compact_params};
use super::{parse_arguments, tool, Module, StaticResource};
use crate::upstream::FalconApi;

const SEARCH_SCHEDULED_REPORTS: &str = "falcon_search_scheduled_reports";
const LAUNCH_SCHEDULED_REPORT: &str = "falcon_launch_scheduled_report";
const SEARCH_REPORT_EXECUTIONS: &str = "falcon_search_report_executions";
const DOWNLOAD_REPORT_EXECUTION: &str = "falcon_download_report_execution";

const SCHEDULED_REPORTS_FQL_URI: &str = "falcon://scheduled-reports/search/fql-guide";
const REPORT_EXECUTIONS_FQL_URI: &str = "falcon://scheduled-reports/executions/search/fql-guide";

const MAX_LIMIT: u32 = 5000;

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct SearchScheduledReportsArgs {
    filter: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    offset: Option<u64>,
    sort: Option<String>,
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchReportExecutionsArgs {
    filter: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    offset: Option<u64>,
    sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdArgs {
    id: String,
}

fn check_limit(tool: &str, limit: u32) -> Result<(), McpError> {
    if (1..=MAX_LIMIT).contains(&limit) {
        Ok(())
    } else {
        Err(McpError::invalid_params(
            format!("Invalid arguments for {}: limit must be between 1 and {}", tool, MAX_LIMIT),
            None,
        ))
    }
}

/// List-returning tools hand errors back as a one-element list
fn wrap_error(result: Value) -> Value {
    if base::is_error(&result) {
        Value::Array(vec![result])
    } else {
        result
    }
}

pub struct ScheduledReportsModule {
    api: Arc<dyn FalconApi>,
}

impl ScheduledReportsModule {
    pub const NAME: &'static str = "scheduled_reports";

    pub fn new(api: Arc<dyn FalconApi>) -> Self {
        Self { api }
    }

    pub async fn search_scheduled_reports(&self, args: SearchScheduledReportsArgs) -> Value {
        let params = compact_params([
            ("filter", args.filter.map(Value::from)),
            ("limit", Some(json!(args.limit))),
            ("offset", args.offset.map(Value::from)),
            ("sort", args.sort.map(Value::from)),
            ("q", args.q.map(Value::from)),
        ]);

        let result = base::search(
            self.api.as_ref(),
            "scheduled_reports_query",
            params,
            "Failed to search for scheduled reports",
            json!([]),
        )
        .await;
        wrap_error(result)
    }

    pub async fn launch_scheduled_report(&self, args: IdArgs) -> Value {
        let result = base::query(
            self.api.as_ref(),
            "scheduled_reports_launch",
            None,
            Some(json!({ "id": args.id })),
            "Failed to launch scheduled report",
            json!([]),
        )
        .await;
        wrap_error(result)
    }

    pub async fn search_report_executions(&self, args: SearchReportExecutionsArgs) -> Value {
        let params = compact_params([
            ("filter", args.filter.map(Value::from)),
            ("limit", Some(json!(args.limit))),
            ("offset", args.offset.map(Value::from)),
            ("sort", args.sort.map(Value::from)),
        ]);

        let result = base::search(
            self.api.as_ref(),
            "reports_executions_query",
            params,
            "Failed to search for report executions",
            json!([]),
        )
        .await;
        wrap_error(result)
    }

    pub async fn download_report_execution(&self, args: IdArgs) -> Value {
        base::get_binary(
            self.api.as_ref(),
            "report_executions_download_get",
            compact_params([("id", Some(Value::from(args.id)))]),
            "Failed to download report execution",
        )
        .await
    }
}

#[async_trait]
impl Module for ScheduledReportsModule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn tools(&self) -> Vec<Tool> {
        vec![
            tool(
                SEARCH_SCHEDULED_REPORTS,
                "Search for scheduled reports and searches in your CrowdStrike environment. \
                 Returns matching scheduled report/search entities. IMPORTANT: use the \
                 `falcon://scheduled-reports/search/fql-guide` resource when you need the \
                 `filter` parameter. Examples: filter=status:'ACTIVE'+type:'event_search', \
                 filter=created_on:>'2023-01-01', filter=id:'<report-id>'.",
                json!({
                    "type": "object",
                    "properties": {
                        "filter": {
                            "type": ["string", "null"],
                            "description": "FQL filter to limit results. Use id:'<id>' to get specific reports. IMPORTANT: use the `falcon://scheduled-reports/search/fql-guide` resource when building this filter parameter."
                        },
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_LIMIT,
                            "default": 10,
                            "description": "Maximum number of records to return. (Max: 5000)"
                        },
                        "offset": {
                            "type": ["integer", "null"],
                            "description": "Starting index of overall result set from which to return IDs."
                        },
                        "sort": {
                            "type": ["string", "null"],
                            "description": "Property to sort by. Ex: created_on.asc, last_updated_on.desc, next_execution_on.desc"
                        },
                        "q": {
                            "type": ["string", "null"],
                            "description": "Free-text search for terms in id, name, description, type, status fields"
                        }
                    }
                }),
            ),
            tool(
                LAUNCH_SCHEDULED_REPORT,
                "Launch a scheduled report on demand, outside of its recurring schedule. \
                 Returns the execution details; use the execution id with \
                 falcon_search_report_executions to check status and \
                 falcon_download_report_execution to fetch the result.",
                json!({
                    "type": "object",
                    "properties": {
                        "id": {
                            "type": "string",
                            "description": "Scheduled report/search entity ID to execute."
                        }
                    },
                    "required": ["id"]
                }),
            ),
            tool(
                SEARCH_REPORT_EXECUTIONS,
                "Search for scheduled report/search executions in your CrowdStrike environment. \
                 IMPORTANT: use the `falcon://scheduled-reports/executions/search/fql-guide` \
                 resource when you need the `filter` parameter. Examples: \
                 filter=status:'DONE'+created_on:>'2023-01-01', \
                 filter=scheduled_report_id:'<report-id>'.",
                json!({
                    "type": "object",
                    "properties": {
                        "filter": {
                            "type": ["string", "null"],
                            "description": "FQL filter to limit results. Use id:'<id>' to get specific executions. IMPORTANT: use the `falcon://scheduled-reports/executions/search/fql-guide` resource when building this filter parameter."
                        },
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_LIMIT,
                            "default": 10,
                            "description": "Maximum number of records to return. (Max: 5000)"
                        },
                        "offset": {
                            "type": ["integer", "null"],
                            "description": "Starting index of overall result set from which to return IDs."
                        },
                        "sort": {
                            "type": ["string", "null"],
                            "description": "Property to sort by. Ex: created_on.asc, last_updated_on.desc"
                        }
                    }
                }),
            ),
            tool(
                DOWNLOAD_REPORT_EXECUTION,
                "Download the generated report file of a completed execution \
                 (status='DONE'). The report is returned as decoded UTF-8 text. Check the \
                 execution status with falcon_search_report_executions first.",
                json!({
                    "type": "object",
                    "properties": {
                        "id": {
                            "type": "string",
                            "description": "Report execution ID to download."
                        }
                    },
                    "required": ["id"]
                }),
            ),
        ]
    }

    fn resources(&self) -> Vec<StaticResource> {
        vec![
            StaticResource {
                uri: SCHEDULED_REPORTS_FQL_URI,
                name: "falcon_search_scheduled_reports_fql_guide",
                description: "Contains the guide for the `filter` param of the `falcon_search_scheduled_reports` tool.",
                mime_type: "text/plain",
                text: SEARCH_SCHEDULED_REPORTS_FQL_DOCUMENTATION,
            },
            StaticResource {
                uri: REPORT_EXECUTIONS_FQL_URI,
                name: "falcon_search_report_executions_fql_guide",
                description: "Contains the guide for the `filter` param of the `falcon_search_report_executions` tool.",
                mime_type: "text/plain",
                text: SEARCH_REPORT_EXECUTIONS_FQL_DOCUMENTATION,
            },
        ]
    }

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> Result<Value, McpError> {
        debug!(tool = name, "[Modules] scheduled_reports");

        match name {
            SEARCH_SCHEDULED_REPORTS => {
                let args: SearchScheduledReportsArgs = parse_arguments(name, arguments)?;
                check_limit(name, args.limit)?;
                Ok(self.search_scheduled_reports(args).await)
            }
            LAUNCH_SCHEDULED_REPORT => {
                let args: IdArgs = parse_arguments(name, arguments)?;
                Ok(self.launch_scheduled_report(args).await)
            }
            SEARCH_REPORT_EXECUTIONS => {
                let args: SearchReportExecutionsArgs = parse_arguments(name, arguments)?;
                check_limit(name, args.limit)?;
                Ok(self.search_report_executions(args).await)
            }
            DOWNLOAD_REPORT_EXECUTION => {
                let args: IdArgs = parse_arguments(name, arguments)?;
                Ok(self.download_report_execution(args).await)
            }
            other => Err(McpError::invalid_params(
                format!("Unknown tool: {}", other),
                None,
            )),
        }
    }
}

const SEARCH_SCHEDULED_REPORTS_FQL_DOCUMENTATION: &str = r#"Falcon Query Language (FQL) - Search Scheduled Reports Guide

=== BASIC SYNTAX ===
property_name:[operator]'value'

=== OPERATORS ===
- (none)  equal to                     status:'ACTIVE'
- !       not equal to                 status:!'DISABLED'
- >, >=   greater than (or equal)      created_on:>'2024-01-01'
- <, <=   less than (or equal)         last_updated_on:<'2024-06-01'
- ~       text match (case-insensitive) name:~'weekly'
- *       wildcard                     name:*'*hosts*'

=== COMBINING ===
- +  AND    status:'ACTIVE'+type:'event_search'
- ,  OR     type:'event_search',type:'dashboard'
- [] list   id:['id1','id2']

=== FILTERABLE PROPERTIES ===
- id                  Scheduled report/search entity ID
- name                Report name
- description         Report description
- type                Report type (e.g. event_search, dashboard, spotlight_vulnerabilities)
- status              ACTIVE or DISABLED
- user_id             Creator of the report
- created_on          Creation timestamp (ISO 8601)
- last_updated_on     Last modification timestamp (ISO 8601)
- last_execution_on   Timestamp of the most recent execution
- next_execution_on   Timestamp of the next scheduled execution
- shared_with         Users the report is shared with

=== EXAMPLES ===
- status:'ACTIVE'+type:'event_search'     Active scheduled searches
- created_on:>'2023-01-01'                Created after a date
- id:'45c59557ded4413cafb8ff81e7640456'   A specific report
- user_id:'user@example.com'              Reports created by a user
"#;

const SEARCH_REPORT_EXECUTIONS_FQL_DOCUMENTATION: &str = r#"Falcon Query Language (FQL) - Search Report Executions Guide

=== BASIC SYNTAX ===
property_name:[operator]'value'

=== OPERATORS ===
- (none)  equal to                     status:'DONE'
- !       not equal to                 status:!'FAILED'
- >, >=   greater than (or equal)      created_on:>'2024-01-01'
- <, <=   less than (or equal)         created_on:<'2024-06-01'

=== COMBINING ===
- +  AND    status:'DONE'+created_on:>'2024-01-01'
- ,  OR     status:'PENDING',status:'PROCESSING'
- [] list   id:['id1','id2']

=== FILTERABLE PROPERTIES ===
- id                    Execution ID
- scheduled_report_id   Scheduled report/search the execution belongs to
- status                PENDING, PROCESSING, DONE or FAILED
- type                  Report type of the parent entity
- user_id               Owner of the parent entity
- created_on            Execution start timestamp (ISO 8601)
- last_updated_on       Last status change timestamp (ISO 8601)
- expiration_on         When the generated file expires

=== EXAMPLES ===
- status:'DONE'+created_on:>'2023-01-01'       Successful runs after a date
- scheduled_report_id:'abc123'                 All executions of one report
- id:'f1984ff006a94980b352f18ee79aed77'        A specific execution
- status:'FAILED'                              Failed executions

Only executions with status 'DONE' can be downloaded.
"#;
