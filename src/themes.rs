//! Theme-rotation state machine over the Content Themes table. Target
//! invariant: exactly one row carries Used=1; any other state is repaired in
//! place before a selection is made.

use crate::api::Table;
use crate::error::{ServiceError, ServiceResult};
use crate::rows::{data_rows, ThemeRow, UsedFlag, THEME_USED_COL};
use tracing::warn;

/// First data row; row 1 is the header.
const FIRST_DATA_ROW: usize = 2;

/// The theme row currently marked for use.
#[derive(Debug, Clone)]
pub struct ActiveTheme {
    pub row: usize,
    pub theme: String,
    pub activity: Option<String>,
    pub chapter: u8,
}

impl From<&ThemeRow> for ActiveTheme {
    fn from(theme: &ThemeRow) -> Self {
        ActiveTheme {
            row: theme.row,
            theme: theme.theme.clone(),
            activity: theme.activity.clone(),
            chapter: theme.chapter,
        }
    }
}

/// Scan the table, repair invalid or duplicate Used flags, and return the
/// single active theme together with the data-row count.
pub async fn select_active(themes: &dyn Table) -> ServiceResult<(ActiveTheme, usize)> {
    let values = themes.all_values().await?;
    let (header, rows) = data_rows(&values);
    if rows.is_empty() {
        return Err(ServiceError::Data("content themes table has no data rows".into()));
    }

    let mut parsed = Vec::with_capacity(rows.len());
    for (row_no, raw) in &rows {
        parsed.push(ThemeRow::from_values(*row_no, &header, raw)?);
    }

    for theme in &mut parsed {
        if let UsedFlag::Corrupt(raw) = &theme.used {
            warn!(
                "Used value for row {} of the Content Themes sheet is '{}', not 0 or 1; resetting",
                theme.row, raw
            );
            themes.update_cell(theme.row, THEME_USED_COL, "0").await?;
            theme.used = UsedFlag::Clear;
        }
    }

    let active: Vec<&ThemeRow> = parsed.iter().filter(|t| t.used == UsedFlag::Active).collect();
    let selected: &ThemeRow = match active.len() {
        0 => {
            // Nothing marked: rotation restarts from the top row.
            themes.update_cell(FIRST_DATA_ROW, THEME_USED_COL, "1").await?;
            &parsed[0]
        }
        1 => active[0],
        _ => {
            // Duplicates: keep the first encountered, clear the rest.
            warn!("{} theme rows marked active, repairing to the first", active.len());
            let keep = active[0].row;
            for theme in &active {
                themes.update_cell(theme.row, THEME_USED_COL, "0").await?;
            }
            themes.update_cell(keep, THEME_USED_COL, "1").await?;
            active[0]
        }
    };

    Ok((ActiveTheme::from(selected), parsed.len()))
}

/// After a successful run: clear the selected row and mark the next one,
/// wrapping to the first data row past the end of the table.
pub async fn advance(themes: &dyn Table, selected_row: usize, row_count: usize) -> ServiceResult<()> {
    themes.update_cell(selected_row, THEME_USED_COL, "0").await?;
    let last_data_row = row_count + 1;
    if selected_row >= last_data_row {
        themes.update_cell(FIRST_DATA_ROW, THEME_USED_COL, "1").await?;
    } else {
        themes.update_cell(selected_row + 1, THEME_USED_COL, "1").await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeThemes {
        rows: Mutex<Vec<Vec<String>>>,
    }

    impl FakeThemes {
        fn new(used: &[&str]) -> Self {
            let mut rows = vec![vec![
                "Theme".to_string(),
                "Activity".to_string(),
                "Chapter".to_string(),
                "Used".to_string(),
            ]];
            for (i, flag) in used.iter().enumerate() {
                rows.push(vec![
                    format!("Theme {}", i + 1),
                    String::new(),
                    format!("{}", i % 3 + 1),
                    flag.to_string(),
                ]);
            }
            FakeThemes { rows: Mutex::new(rows) }
        }

        fn active_rows(&self) -> Vec<usize> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(_, row)| row[THEME_USED_COL - 1] == "1")
                .map(|(i, _)| i + 1)
                .collect()
        }
    }

    #[async_trait]
    impl Table for FakeThemes {
        async fn all_values(&self) -> ServiceResult<Vec<Vec<String>>> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn update_cell(&self, row: usize, col: usize, value: &str) -> ServiceResult<()> {
            let mut rows = self.rows.lock().unwrap();
            let row = &mut rows[row - 1];
            while row.len() < col {
                row.push(String::new());
            }
            row[col - 1] = value.to_string();
            Ok(())
        }

        async fn append_row(&self, values: &[String]) -> ServiceResult<()> {
            self.rows.lock().unwrap().push(values.to_vec());
            Ok(())
        }

        async fn find_in_column(&self, col: usize, value: &str) -> ServiceResult<Option<usize>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .position(|row| row.get(col - 1).map(String::as_str) == Some(value))
                .map(|i| i + 1))
        }

        async fn delete_row_by_key(&self, col: usize, value: &str) -> ServiceResult<bool> {
            let mut rows = self.rows.lock().unwrap();
            match rows
                .iter()
                .position(|row| row.get(col - 1).map(String::as_str) == Some(value))
            {
                Some(i) => {
                    rows.remove(i);
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    #[tokio::test]
    async fn no_active_row_selects_the_top() {
        let table = FakeThemes::new(&["0", "0", "0"]);
        let (active, count) = select_active(&table).await.unwrap();
        assert_eq!(active.row, 2);
        assert_eq!(count, 3);
        assert_eq!(table.active_rows(), vec![2]);
    }

    #[tokio::test]
    async fn single_active_row_is_selected_unchanged() {
        let table = FakeThemes::new(&["0", "1", "0"]);
        let (active, _) = select_active(&table).await.unwrap();
        assert_eq!(active.row, 3);
        assert_eq!(active.theme, "Theme 2");
        assert_eq!(table.active_rows(), vec![3]);
    }

    #[tokio::test]
    async fn duplicate_active_rows_repair_to_first() {
        let table = FakeThemes::new(&["0", "1", "1", "1"]);
        let (active, _) = select_active(&table).await.unwrap();
        assert_eq!(active.row, 3);
        assert_eq!(table.active_rows(), vec![3]);
    }

    #[tokio::test]
    async fn corrupt_used_cells_are_reset() {
        let table = FakeThemes::new(&["banana", "1", "x"]);
        let (active, _) = select_active(&table).await.unwrap();
        assert_eq!(active.row, 3);
        assert_eq!(table.active_rows(), vec![3]);
        // The corrupt cells must now read 0.
        let rows = table.rows.lock().unwrap().clone();
        assert_eq!(rows[1][THEME_USED_COL - 1], "0");
        assert_eq!(rows[3][THEME_USED_COL - 1], "0");
    }

    #[tokio::test]
    async fn advance_is_cyclic_for_single_row() {
        let table = FakeThemes::new(&["1"]);
        let (active, count) = select_active(&table).await.unwrap();
        advance(&table, active.row, count).await.unwrap();
        assert_eq!(table.active_rows(), vec![2]);
    }

    #[tokio::test]
    async fn advance_moves_to_next_and_wraps() {
        for size in [2usize, 5] {
            let used: Vec<&str> = std::iter::once("1").chain(std::iter::repeat("0")).take(size).collect();
            let table = FakeThemes::new(&used);

            // Walk the whole cycle and land back on row 2.
            for expected in 0..size {
                let (active, count) = select_active(&table).await.unwrap();
                assert_eq!(active.row, expected + 2, "table size {}", size);
                advance(&table, active.row, count).await.unwrap();
                assert_eq!(table.active_rows().len(), 1);
            }
            assert_eq!(table.active_rows(), vec![2]);
        }
    }
}
