// 📊 Google Sheets Store - REST API v4 row store
// One worksheet, row 1 header, columns A:E; appends are single API calls so rows land whole

use super::{RetryPolicy, RowStore};
use crate::config::SheetsConfig;
use crate::error::StoreError;
use crate::registration::{Registration, COLUMN_COUNT, HEADER};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

// ============================================================================
// TARGET (which sheet)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetsTarget {
    pub api_base: String,
    pub spreadsheet_id: String,
    pub worksheet_name: String,
}

impl SheetsTarget {
    /// A1 range over the data columns, sheet name always quoted
    pub fn columns_range(&self) -> String {
        format!("{}!A:E", quote_sheet_name(&self.worksheet_name))
    }

    pub fn header_range(&self) -> String {
        format!("{}!A1:E1", quote_sheet_name(&self.worksheet_name))
    }

    fn spreadsheet_url(&self, tail: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| StoreError::Misconfigured(format!("invalid sheets api base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Misconfigured("sheets api base cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str()])
            .extend(tail);
        Ok(url)
    }

    pub fn metadata_url(&self) -> Result<Url, StoreError> {
        let mut url = self.spreadsheet_url(&[])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties.title");
        Ok(url)
    }

    pub fn read_url(&self) -> Result<Url, StoreError> {
        let mut url = self.spreadsheet_url(&["values", self.columns_range().as_str()])?;
        url.query_pairs_mut()
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE");
        Ok(url)
    }

    pub fn append_url(&self) -> Result<Url, StoreError> {
        let segment = format!("{}:append", self.columns_range());
        let mut url = self.spreadsheet_url(&["values", segment.as_str()])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url)
    }

    pub fn header_url(&self, write: bool) -> Result<Url, StoreError> {
        let mut url = self.spreadsheet_url(&["values", self.header_range().as_str()])?;
        if write {
            url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        }
        Ok(url)
    }
}

fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    major_dimension: Option<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

// ============================================================================
// SHEETS STORE
// ============================================================================

/// Authenticated client, shared by every call until a failure drops it
struct SheetHandle {
    client: reqwest::Client,
    auth: HeaderValue,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Connect,
    Read,
    Write,
}

pub struct SheetsStore {
    target: SheetsTarget,
    access_token: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
    handle: Mutex<Option<Arc<SheetHandle>>>,
}

impl SheetsStore {
    pub fn new(
        target: SheetsTarget,
        access_token: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        SheetsStore {
            target,
            access_token,
            timeout,
            retry,
            handle: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SheetsConfig, retry: RetryPolicy) -> Self {
        Self::new(
            SheetsTarget {
                api_base: config.api_base.clone(),
                spreadsheet_id: config.spreadsheet_id.clone(),
                worksheet_name: config.worksheet_name.clone(),
            },
            config.access_token.clone(),
            config.timeout,
            retry,
        )
    }

    pub fn target(&self) -> &SheetsTarget {
        &self.target
    }

    /// Cached handle, connecting on first use or after a failure
    async fn handle(&self) -> Result<Arc<SheetHandle>, StoreError> {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }
        let handle = Arc::new(self.open().await?);
        *slot = Some(Arc::clone(&handle));
        Ok(handle)
    }

    async fn drop_handle(&self) {
        *self.handle.lock().await = None;
    }

    /// Drop the cached handle when the failure suggests it is no good anymore
    async fn note_failure(&self, err: &StoreError) {
        if matches!(err, StoreError::Auth(_) | StoreError::Connection { .. }) {
            self.drop_handle().await;
        }
    }

    #[instrument(name = "sheets_connect", skip(self), fields(spreadsheet = %self.target.spreadsheet_id))]
    async fn open(&self) -> Result<SheetHandle, StoreError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| StoreError::Auth("no sheets access token configured".to_string()))?;
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| StoreError::Auth(format!("invalid access token: {e}")))?;
        auth.set_sensitive(true);

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| StoreError::Connection {
                message: format!("http client setup failed: {e}"),
                transient: false,
            })?;

        let resp = client
            .get(self.target.metadata_url()?)
            .header(AUTHORIZATION, auth.clone())
            .send()
            .await
            .map_err(|e| classify_transport(&e, Op::Connect))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, Op::Connect));
        }

        let meta: SpreadsheetMeta = resp
            .json()
            .await
            .map_err(|e| classify_transport(&e, Op::Connect))?;
        if !meta
            .sheets
            .iter()
            .any(|s| s.properties.title == self.target.worksheet_name)
        {
            return Err(StoreError::Misconfigured(format!(
                "worksheet '{}' not found in spreadsheet",
                self.target.worksheet_name
            )));
        }

        info!(worksheet = %self.target.worksheet_name, "Authenticated with Google Sheets");
        Ok(SheetHandle { client, auth })
    }

    async fn get_values(&self, url: Url) -> Result<ValueRange, StoreError> {
        let handle = self.handle().await?;
        let resp = handle
            .client
            .get(url)
            .header(AUTHORIZATION, handle.auth.clone())
            .send()
            .await
            .map_err(|e| classify_transport(&e, Op::Read))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, Op::Read));
        }

        resp.json().await.map_err(|e| classify_transport(&e, Op::Read))
    }

    async fn send_values(&self, url: Url, body: &ValueRange, put: bool) -> Result<(), StoreError> {
        let handle = self.handle().await?;
        let request = if put {
            handle.client.put(url)
        } else {
            handle.client.post(url)
        };
        let resp = request
            .header(AUTHORIZATION, handle.auth.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport(&e, Op::Write))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, Op::Write));
        }
        Ok(())
    }

    async fn read_once(&self) -> Result<Vec<Registration>, StoreError> {
        let range = self.get_values_checked(self.target.read_url()?).await?;
        Ok(rows_from_values(&range.values))
    }

    async fn get_values_checked(&self, url: Url) -> Result<ValueRange, StoreError> {
        let result = self.get_values(url).await;
        if let Err(e) = &result {
            self.note_failure(e).await;
        }
        result
    }

    async fn send_values_checked(&self, url: Url, body: &ValueRange, put: bool) -> Result<(), StoreError> {
        let result = self.send_values(url, body, put).await;
        if let Err(e) = &result {
            self.note_failure(e).await;
        }
        result
    }

    async fn append_once(&self, record: &Registration) -> Result<(), StoreError> {
        let body = ValueRange {
            major_dimension: Some("ROWS".to_string()),
            values: vec![row_values(record)],
        };
        self.send_values_checked(self.target.append_url()?, &body, false)
            .await
    }

    async fn write_header_once(&self) -> Result<(), StoreError> {
        let body = ValueRange {
            major_dimension: Some("ROWS".to_string()),
            values: vec![HEADER.iter().map(|h| Value::String(h.to_string())).collect()],
        };
        self.send_values_checked(self.target.header_url(true)?, &body, true)
            .await
    }

    async fn read_header_once(&self) -> Result<ValueRange, StoreError> {
        self.get_values_checked(self.target.header_url(false)?).await
    }

    /// Write the header into row 1 of an empty worksheet.
    ///
    /// Returns `true` when the header was written. A sheet that already has a
    /// first row is left alone (with a warning if it does not match).
    #[instrument(name = "sheets_ensure_header", skip(self))]
    pub async fn ensure_header(&self) -> Result<bool, StoreError> {
        let existing = self
            .retry
            .run("read_header", move |_| self.read_header_once())
            .await?;

        if let Some(first) = existing.values.first().filter(|row| !row.is_empty()) {
            let found: Vec<String> = first.iter().map(cell_text).collect();
            if found.iter().map(|c| c.trim()).ne(HEADER.iter().copied()) {
                warn!(found = ?found, expected = ?HEADER, "Worksheet header differs from expected layout");
            }
            return Ok(false);
        }

        // PUT to A1:E1, so a retry rewrites the same cells
        self.retry
            .run("write_header", move |_| self.write_header_once())
            .await?;
        info!(worksheet = %self.target.worksheet_name, "Wrote header row");
        Ok(true)
    }
}

#[async_trait]
impl RowStore for SheetsStore {
    fn backend_tag(&self) -> &'static str {
        "sheets"
    }

    async fn connect(&self) -> Result<(), StoreError> {
        self.retry
            .run("connect", move |_| async move { self.handle().await.map(|_| ()) })
            .await
    }

    #[instrument(name = "sheets_read_all", skip(self))]
    async fn read_all(&self) -> Result<Vec<Registration>, StoreError> {
        let rows = self
            .retry
            .run("read_all", move |_| self.read_once())
            .await?;
        info!(count = rows.len(), "Fetched registrations from sheet");
        Ok(rows)
    }

    // A retried append whose first attempt timed out after reaching the API
    // can leave a duplicate row; appends carry no idempotency key.
    #[instrument(name = "sheets_append_row", skip(self, record), fields(name = %record.name))]
    async fn append_row(&self, record: &Registration) -> Result<(), StoreError> {
        self.retry
            .run("append_row", move |_| self.append_once(record))
            .await
    }
}

// ============================================================================
// ROW CONVERSION
// ============================================================================

/// Data rows from a values response; the first row is the header
fn rows_from_values(values: &[Vec<Value>]) -> Vec<Registration> {
    values
        .iter()
        .skip(1)
        .filter_map(|row| {
            let cells: Vec<String> = row.iter().take(COLUMN_COUNT).map(cell_text).collect();
            Registration::from_cells(&cells)
        })
        .collect()
}

/// Amount goes out as a number so sheet formulas can sum the column
fn row_values(record: &Registration) -> Vec<Value> {
    let amount = record
        .amount
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(record.amount.normalize().to_string()));

    vec![
        Value::String(record.timestamp.clone()),
        Value::String(record.name.clone()),
        Value::String(record.email.clone()),
        Value::String(record.category.clone()),
        amount,
    ]
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// ERROR CLASSIFICATION
// ============================================================================

fn op_error(op: Op, message: String, transient: bool) -> StoreError {
    match op {
        Op::Connect => StoreError::Connection { message, transient },
        Op::Read => StoreError::read(message, transient),
        Op::Write => StoreError::write(message, transient),
    }
}

fn classify_status(status: StatusCode, body: &str, op: Op) -> StoreError {
    let detail: String = body.chars().take(200).collect();
    let message = format!("sheets api returned {status}: {detail}");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Auth(message),
        StatusCode::NOT_FOUND => StoreError::Misconfigured(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => op_error(op, message, true),
        s if s.is_server_error() => op_error(op, message, true),
        _ => op_error(op, message, false),
    }
}

fn classify_transport(err: &reqwest::Error, op: Op) -> StoreError {
    if err.is_connect() {
        return StoreError::connection(format!("cannot reach sheets api: {err}"));
    }
    if err.is_timeout() {
        return op_error(op, format!("sheets api timed out: {err}"), true);
    }
    if err.is_decode() {
        return op_error(op, format!("unexpected sheets api response: {err}"), false);
    }
    op_error(op, format!("sheets api request failed: {err}"), true)
}
