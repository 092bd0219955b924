//! Typed views over the raw spreadsheet rows. External data is validated
//! here, at the boundary, instead of being passed around as loose key-value
//! records.

use crate::error::{ServiceError, ServiceResult};
use std::collections::HashMap;

/// Column positions that the jobs mutate directly (1-indexed).
pub const THEME_USED_COL: usize = 4;
pub const SCRIPT_ID_COL: usize = 5;
pub const PUBLISHED_ID_COL: usize = 1;
pub const PUBLISHED_UPLOAD_DATE_COL: usize = 2;
pub const PUBLISHED_LINK_COL: usize = 3;
pub const PUBLISHED_STATUS_COL: usize = 6;
pub const PUBLISHED_TITLE_COL: usize = 8;
pub const PUBLISHED_DESC_COL: usize = 10;
pub const PRODUCTION_LINK_COL: usize = 1;
pub const PRODUCTION_VIDEO_ID_COL: usize = 4;
pub const CONTACT_EMAIL_COL: usize = 1;

/// Header row of a worksheet, mapping column names to 0-based positions.
#[derive(Debug, Clone)]
pub struct Header {
    index: HashMap<String, usize>,
}

impl Header {
    pub fn parse(row: &[String]) -> Self {
        let index = row
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Header { index }
    }

    /// 1-indexed sheet column of the named header, if present.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).map(|&i| i + 1)
    }

    /// The named cell of a data row, empty when the column or cell is absent.
    pub fn cell<'a>(&self, row: &'a [String], name: &str) -> &'a str {
        self.index
            .get(name)
            .and_then(|&i| row.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// The rotation flag of a theme row as it appears on the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsedFlag {
    Clear,
    Active,
    /// Not an integer at all; must be repaired to 0.
    Corrupt(String),
}

impl UsedFlag {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(n) if n >= 1 => UsedFlag::Active,
            Ok(_) => UsedFlag::Clear,
            Err(_) => UsedFlag::Corrupt(raw.to_string()),
        }
    }
}

/// One candidate daily topic in the Content Themes table.
#[derive(Debug, Clone)]
pub struct ThemeRow {
    /// 1-indexed sheet row.
    pub row: usize,
    pub theme: String,
    pub activity: Option<String>,
    pub chapter: u8,
    pub used: UsedFlag,
}

impl ThemeRow {
    pub fn from_values(row: usize, header: &Header, values: &[String]) -> ServiceResult<Self> {
        let theme = header.cell(values, "Theme").trim().to_string();
        let activity = header.cell(values, "Activity").trim();
        let chapter_raw = header.cell(values, "Chapter").trim();
        let chapter = chapter_raw.parse::<u8>().map_err(|_| {
            ServiceError::Data(format!("row {}: chapter '{}' is not a number", row, chapter_raw))
        })?;
        Ok(ThemeRow {
            row,
            theme,
            activity: if activity.is_empty() { None } else { Some(activity.to_string()) },
            chapter,
            used: UsedFlag::parse(header.cell(values, "Used")),
        })
    }
}

/// Human approval marker on a drafted script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishFlag {
    Yes,
    No,
    /// Anything else, including empty: the row is left untouched.
    Pending(String),
}

impl PublishFlag {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "yes" => PublishFlag::Yes,
            "no" => PublishFlag::No,
            other => PublishFlag::Pending(other.to_string()),
        }
    }
}

/// One row of the Active Scripts worksheet.
#[derive(Debug, Clone)]
pub struct ScriptRecord {
    pub row: usize,
    pub id: String,
    pub script: String,
    pub feedback: String,
    pub content_type: String,
    pub publish: PublishFlag,
}

impl ScriptRecord {
    pub fn from_values(row: usize, header: &Header, values: &[String]) -> Self {
        ScriptRecord {
            row,
            id: header.cell(values, "Id").trim().to_string(),
            script: header.cell(values, "Script").to_string(),
            feedback: header.cell(values, "Feedback").to_string(),
            content_type: header.cell(values, "Content Type").to_string(),
            publish: PublishFlag::parse(header.cell(values, "Publish")),
        }
    }
}

/// One row of the Published worksheet, 11 columns wide.
#[derive(Debug, Clone, Default)]
pub struct PublishedRecord {
    pub id: String,
    pub upload_date: String,
    pub youtube_link: String,
    pub feedback: String,
    pub created_date: String,
    pub status: String,
    pub content_type: String,
    pub title: String,
    pub script: String,
    pub description: String,
    pub flag: String,
}

impl PublishedRecord {
    /// A freshly approved script waiting for the upload job.
    pub fn awaiting_upload(
        id: &str,
        feedback: &str,
        content_type: &str,
        script: &str,
        description: &str,
        created_date: &str,
    ) -> Self {
        PublishedRecord {
            id: id.to_string(),
            feedback: feedback.to_string(),
            created_date: created_date.to_string(),
            status: "Awaiting Upload".to_string(),
            content_type: content_type.to_string(),
            script: script.to_string(),
            description: description.to_string(),
            flag: "No".to_string(),
            ..Default::default()
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.upload_date.clone(),
            self.youtube_link.clone(),
            self.feedback.clone(),
            self.created_date.clone(),
            self.status.clone(),
            self.content_type.clone(),
            self.title.clone(),
            self.script.clone(),
            self.description.clone(),
            self.flag.clone(),
        ]
    }
}

/// One unsubscribe form response, email normalized for lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubRequest {
    pub email: String,
    /// The cell exactly as submitted, for matching the request row itself.
    pub raw: String,
}

impl UnsubRequest {
    pub fn from_values(header: &Header, values: &[String]) -> Self {
        let raw = header.cell(values, "Email Address").to_string();
        UnsubRequest {
            email: raw.trim().to_lowercase(),
            raw,
        }
    }
}

/// Data rows with their 1-indexed sheet row numbers, header stripped.
pub fn data_rows(values: &[Vec<String>]) -> (Header, Vec<(usize, &Vec<String>)>) {
    let header = values
        .first()
        .map(|row| Header::parse(row))
        .unwrap_or_else(|| Header::parse(&[]));
    let rows = values.iter().enumerate().skip(1).map(|(i, row)| (i + 1, row)).collect();
    (header, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_strings(row: &[&str]) -> Vec<String> {
        row.iter().map(|s| s.to_string()).collect()
    }

    fn theme_sheet() -> Vec<Vec<String>> {
        vec![
            to_strings(&["Theme", "Activity", "Chapter", "Used"]),
            to_strings(&["Focus", "journaling", "1", "0"]),
            to_strings(&["Sleep", "", "2", "1"]),
            to_strings(&["Gratitude", "walking", "3", "maybe"]),
        ]
    }

    #[test]
    fn theme_rows_parse_with_row_numbers() {
        let values = theme_sheet();
        let (header, rows) = data_rows(&values);
        assert_eq!(rows.len(), 3);

        let first = ThemeRow::from_values(rows[0].0, &header, rows[0].1).unwrap();
        assert_eq!(first.row, 2);
        assert_eq!(first.theme, "Focus");
        assert_eq!(first.activity.as_deref(), Some("journaling"));
        assert_eq!(first.used, UsedFlag::Clear);

        let second = ThemeRow::from_values(rows[1].0, &header, rows[1].1).unwrap();
        assert_eq!(second.activity, None);
        assert_eq!(second.used, UsedFlag::Active);

        let third = ThemeRow::from_values(rows[2].0, &header, rows[2].1).unwrap();
        assert_eq!(third.used, UsedFlag::Corrupt("maybe".into()));
    }

    #[test]
    fn bad_chapter_is_a_data_error() {
        let values = vec![
            to_strings(&["Theme", "Activity", "Chapter", "Used"]),
            to_strings(&["Focus", "", "one", "0"]),
        ];
        let (header, rows) = data_rows(&values);
        assert!(ThemeRow::from_values(rows[0].0, &header, rows[0].1).is_err());
    }

    #[test]
    fn publish_flag_parses_three_ways() {
        assert_eq!(PublishFlag::parse("yes"), PublishFlag::Yes);
        assert_eq!(PublishFlag::parse("no"), PublishFlag::No);
        assert_eq!(PublishFlag::parse("pending"), PublishFlag::Pending("pending".into()));
        assert_eq!(PublishFlag::parse(""), PublishFlag::Pending("".into()));
    }

    #[test]
    fn published_record_is_eleven_columns() {
        let record = PublishedRecord::awaiting_upload(
            "file-1",
            "great",
            "short",
            "the script",
            "a description",
            "2026-08-30 09:00:00",
        );
        let row = record.to_row();
        assert_eq!(row.len(), 11);
        assert_eq!(row[0], "file-1");
        assert_eq!(row[5], "Awaiting Upload");
        assert_eq!(row[9], "a description");
        assert_eq!(row[10], "No");
    }

    #[test]
    fn unsub_request_normalizes_email() {
        let values = vec![
            to_strings(&["Timestamp", "Email Address"]),
            to_strings(&["x", "  User@Example.COM "]),
        ];
        let (header, rows) = data_rows(&values);
        let req = UnsubRequest::from_values(&header, rows[0].1);
        assert_eq!(req.email, "user@example.com");
        assert_eq!(header.position("Email Address"), Some(2));
        assert_eq!(header.position("Missing"), None);
    }
}
