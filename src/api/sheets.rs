use crate::api::auth::TokenKeeper;
use crate::api::Table;
use crate::error::{ServiceError, ServiceResult};
use crate::retry::{retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Convert a 1-indexed column number to its A1 letters.
pub fn column_letters(col: usize) -> String {
    let mut col = col;
    let mut out = String::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.insert(0, (b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    out
}

fn encode_title(title: &str) -> String {
    title.replace(' ', "%20")
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
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
    #[serde(rename = "sheetId")]
    sheet_id: i64,
    title: String,
}

pub struct SheetsClient {
    http: Client,
    auth: Arc<TokenKeeper>,
    spreadsheet_id: String,
    policy: RetryPolicy,
}

impl SheetsClient {
    pub fn new(http: Client, auth: Arc<TokenKeeper>, spreadsheet_id: &str) -> Arc<Self> {
        Arc::new(SheetsClient {
            http,
            auth,
            spreadsheet_id: spreadsheet_id.to_string(),
            policy: RetryPolicy::default(),
        })
    }

    pub fn worksheet(self: &Arc<Self>, title: &str) -> Worksheet {
        Worksheet {
            client: Arc::clone(self),
            title: title.to_string(),
            gid: OnceCell::new(),
        }
    }

    async fn get_values(&self, range: &str) -> ServiceResult<Vec<Vec<String>>> {
        let token = self.auth.access_token().await?;
        let url = format!("{}/{}/values/{}", SHEETS_URL, self.spreadsheet_id, range);
        let resp = self.http.get(url).bearer_auth(&token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        let values: ValueRange = resp.json().await?;
        Ok(values.values)
    }

    async fn put_cell(&self, range: &str, value: &str) -> ServiceResult<()> {
        let token = self.auth.access_token().await?;
        let url = format!("{}/{}/values/{}", SHEETS_URL, self.spreadsheet_id, range);
        let body = serde_json::json!({"values": [[value]]});
        let resp = self
            .http
            .put(url)
            .bearer_auth(&token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        Ok(())
    }

    async fn post_append(&self, range: &str, values: &[String]) -> ServiceResult<()> {
        let token = self.auth.access_token().await?;
        let url = format!("{}/{}/values/{}:append", SHEETS_URL, self.spreadsheet_id, range);
        let body = serde_json::json!({"values": [values]});
        let resp = self
            .http
            .post(url)
            .bearer_auth(&token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        Ok(())
    }

    async fn sheet_gid(&self, title: &str) -> ServiceResult<i64> {
        let token = self.auth.access_token().await?;
        let url = format!("{}/{}", SHEETS_URL, self.spreadsheet_id);
        let resp = self
            .http
            .get(url)
            .bearer_auth(&token)
            .query(&[("fields", "sheets.properties")])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        let meta: SpreadsheetMeta = resp.json().await?;
        meta.sheets
            .into_iter()
            .find(|s| s.properties.title == title)
            .map(|s| s.properties.sheet_id)
            .ok_or_else(|| ServiceError::Data(format!("worksheet '{}' not found", title)))
    }

    async fn post_delete_row(&self, gid: i64, row: usize) -> ServiceResult<()> {
        let token = self.auth.access_token().await?;
        let url = format!("{}/{}:batchUpdate", SHEETS_URL, self.spreadsheet_id);
        let body = serde_json::json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": gid,
                        "dimension": "ROWS",
                        "startIndex": row - 1,
                        "endIndex": row
                    }
                }
            }]
        });
        let resp = self.http.post(url).bearer_auth(&token).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, &body));
        }
        Ok(())
    }
}

/// One worksheet of the shared state spreadsheet.
pub struct Worksheet {
    client: Arc<SheetsClient>,
    title: String,
    gid: OnceCell<i64>,
}

impl Worksheet {
    fn full_range(&self) -> String {
        format!("'{}'", encode_title(&self.title))
    }

    fn cell_range(&self, row: usize, col: usize) -> String {
        format!("'{}'!{}{}", encode_title(&self.title), column_letters(col), row)
    }

    async fn gid(&self) -> ServiceResult<i64> {
        self.gid
            .get_or_try_init(|| self.client.sheet_gid(&self.title))
            .await
            .copied()
    }
}

#[async_trait]
impl Table for Worksheet {
    async fn all_values(&self) -> ServiceResult<Vec<Vec<String>>> {
        let range = self.full_range();
        retry(self.client.policy, "sheets read", || self.client.get_values(&range)).await
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> ServiceResult<()> {
        let range = self.cell_range(row, col);
        retry(self.client.policy, "sheets update", || self.client.put_cell(&range, value)).await
    }

    async fn append_row(&self, values: &[String]) -> ServiceResult<()> {
        let range = self.full_range();
        retry(self.client.policy, "sheets append", || self.client.post_append(&range, values))
            .await
    }

    async fn find_in_column(&self, col: usize, value: &str) -> ServiceResult<Option<usize>> {
        let rows = self.all_values().await?;
        for (idx, row) in rows.iter().enumerate() {
            if row.get(col - 1).map(String::as_str) == Some(value) {
                return Ok(Some(idx + 1));
            }
        }
        Ok(None)
    }

    async fn delete_row_by_key(&self, col: usize, value: &str) -> ServiceResult<bool> {
        // Resolved immediately before the mutation so earlier deletions in the
        // same pass cannot shift this row out from under us.
        let row = match self.find_in_column(col, value).await? {
            Some(row) => row,
            None => return Ok(false),
        };
        let gid = self.gid().await?;
        retry(self.client.policy, "sheets delete row", || self.client.post_delete_row(gid, row))
            .await?;
        info!("Deleted row {} from '{}'", row, self.title);
        Ok(true)
    }
}
