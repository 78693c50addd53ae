//! BrAPI response envelope
//!
//! ```json
//! {
//!   "metadata": {
//!     "status": [{"message": "...", "messageType": "INFO"}],
//!     "pagination": {"pageSize": 10, "currentPage": 0, "totalCount": 3, "totalPages": 1},
//!     "datafiles": []
//!   },
//!   "result": {"data": []}
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::query::{DataPage, PageRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Info,
    Warning,
    Error,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub message: String,
    pub message_type: MessageType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page_size: u64,
    pub current_page: u64,
    pub total_count: u64,
    pub total_pages: u64,
}

impl Pagination {
    /// Pagination of `page` over `total_count` results; an unpaged request is
    /// reported as one page holding everything
    pub fn new(page: PageRequest, total_count: u64) -> Self {
        Self {
            page_size: page.page_size.unwrap_or(total_count),
            current_page: page.page,
            total_count,
            total_pages: page.total_pages(total_count),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub status: Vec<StatusMessage>,
    pub pagination: Pagination,
    pub datafiles: Vec<Value>,
}

/// BrAPI response with its HTTP status
#[derive(Debug, Clone, Serialize)]
pub struct BrapiResponse {
    pub metadata: Metadata,
    pub result: Value,
    #[serde(skip)]
    pub status_code: StatusCode,
}

impl BrapiResponse {
    /// Single object result
    pub fn single(result: Value) -> Self {
        Self {
            metadata: Metadata::default(),
            result,
            status_code: StatusCode::OK,
        }
    }

    /// `{"data": [...]}` result with pagination
    pub fn list(data: Vec<Value>, pagination: Pagination) -> Self {
        Self {
            metadata: Metadata {
                pagination,
                ..Metadata::default()
            },
            result: json!({ "data": data }),
            status_code: StatusCode::OK,
        }
    }

    /// List response for a page of projected objects, filter warnings included
    pub fn page(page: &DataPage) -> Self {
        Self::list(page.objects(), Pagination::new(page.page, page.total_count))
            .with_warnings(page.warnings.iter().cloned())
    }

    pub fn error(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            metadata: Metadata::default(),
            result: Value::Null,
            status_code,
        }
        .with_message(MessageType::Error, message)
    }

    pub fn with_status(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_message(mut self, message_type: MessageType, message: impl Into<String>) -> Self {
        self.metadata.status.push(StatusMessage {
            message: message.into(),
            message_type,
        });
        self
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = String>) -> Self {
        for warning in warnings {
            self = self.with_message(MessageType::Warning, warning);
        }
        self
    }
}

impl IntoResponse for BrapiResponse {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}
