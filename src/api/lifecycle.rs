//! Long-running operation polling.
//!
//! An operation starts with a 202 (or 201) response naming a status URL in
//! `Location` or `Operation-Location`. The status URL is polled until its
//! record reports `Succeeded` or `Failed`; a 409 means the status resource
//! does not exist yet.

use super::client::ApiClient;
use super::constants::{headers, operation};
use super::error::ApiError;
use super::request::{ApiRequest, ApiResponse};
use super::telemetry::RequestContext;
use log::debug;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Accepted by the server and still in progress.
    Started,
    /// The status resource is not materialized yet (HTTP 409).
    Conflict,
    Succeeded,
    Failed,
}

impl OperationState {
    /// Matches `status` case-sensitively against the terminal strings.
    pub fn from_status(status: &str) -> Self {
        match status {
            operation::SUCCEEDED => OperationState::Succeeded,
            operation::FAILED => OperationState::Failed,
            _ => OperationState::Started,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }
}

/// Snapshot of an operation, replaced wholesale on every poll.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord {
    pub status: String,
    pub location: Option<String>,
    pub retry_after: Option<Duration>,
    pub payload: Value,
}

impl OperationRecord {
    /// Decodes a status response body. A body without any status field is a
    /// decode failure.
    pub fn from_response(
        response: &ApiResponse,
        policy_hint: Option<Duration>,
        location: Option<String>,
    ) -> Result<Self, ApiError> {
        let payload: Value = response.decode()?;
        let status = extract_status(&payload)
            .ok_or(ApiError::OperationStatusMissing)?
            .to_string();

        Ok(Self {
            status,
            location,
            retry_after: policy_hint,
            payload,
        })
    }

    pub fn state(&self) -> OperationState {
        OperationState::from_status(&self.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Decodes the full status body into a caller type.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.payload.clone()).map_err(ApiError::Decode)
    }
}

fn extract_status(payload: &Value) -> Option<&str> {
    ["/status", "/state/id", "/properties/provisioningState", "/provisioningState"]
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_str))
}

fn operation_location(response: &ApiResponse) -> Option<String> {
    [headers::LOCATION, headers::OPERATION_LOCATION]
        .iter()
        .filter_map(|name| response.header(name))
        .find(|value| !value.trim().is_empty())
        .map(|value| value.trim().to_string())
}

impl ApiClient {
    /// Polls the operation started by `initial` until it reaches a terminal
    /// state. Any status other than 200 or 409, or an undecodable record,
    /// ends polling with an error.
    pub async fn poll_until_terminal(
        &self,
        ctx: &RequestContext,
        initial: &ApiResponse,
    ) -> Result<OperationRecord, ApiError> {
        let Some(location) = operation_location(initial) else {
            // 201 style: the state is embedded in the creation response
            if initial.body.trim_ascii().is_empty() {
                return Err(ApiError::MissingOperationLocation);
            }
            return match OperationRecord::from_response(initial, None, None) {
                Ok(record) if record.is_terminal() => Ok(record),
                Ok(_) | Err(ApiError::OperationStatusMissing) => {
                    Err(ApiError::MissingOperationLocation)
                }
                Err(err) => Err(err),
            };
        };

        let test_mode = self.config().is_test_mode();
        let mut state = OperationState::Started;
        let mut wait = self.retry_policy().wait_before_retry(initial);
        let mut poll = 0u32;

        loop {
            if !test_mode {
                debug!("Waiting {:?} before polling {} ({:?})", wait, location, state);
                ctx.sleep(wait).await?;
            }
            poll += 1;

            let response = self
                .execute(
                    ctx,
                    ApiRequest::get(&location).accept(&operation::POLL_ACCEPTED_STATUSES),
                )
                .await?;

            if response.status == StatusCode::CONFLICT {
                state = OperationState::Conflict;
                self.logger()
                    .log_poll(ctx, poll, response.status.as_u16(), None, &location);
                wait = self.retry_policy().wait_before_retry(&response);
                continue;
            }

            let hint = response
                .header(headers::RETRY_AFTER)
                .map(|_| self.retry_policy().wait_before_retry(&response));
            let record = OperationRecord::from_response(&response, hint, Some(location.clone()))?;
            self.logger().log_poll(
                ctx,
                poll,
                response.status.as_u16(),
                Some(&record.status),
                &location,
            );

            if record.is_terminal() {
                return Ok(record);
            }

            state = record.state();
            wait = record
                .retry_after
                .unwrap_or_else(|| self.retry_policy().default_delay());
        }
    }
}
