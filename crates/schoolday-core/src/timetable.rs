//! Timetable reconciliation.
//!
//! The API returns one row per weekday. The UI shows one row per period, so
//! the fetched grid is transposed and padded to a rectangle first. Cells the
//! user has edited (`userChanged`) are then taken from the custom grid saved
//! under `@custom_timetable`, so local corrections survive refreshes. A
//! server substitution at an edited position stays hidden until the user
//! resets that cell.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::error::{Error, Result};
use crate::models::{Cell, TimetableGrid, EMPTY_MARK, NONE_MARK};
use crate::store::KeyValueStore;

/// Store key for the current custom timetable
pub const CUSTOM_TIMETABLE_KEY: &str = "@custom_timetable";

fn normalize(value: &str) -> String {
    if value == NONE_MARK {
        EMPTY_MARK.to_string()
    } else {
        value.to_string()
    }
}

/// Turn weekday rows into period rows.
///
/// The output has one row per period up to the longest weekday, and one
/// column per weekday. Weekdays with fewer periods are padded with
/// `Cell::sentinel()`.
pub fn transpose(weekdays: &[Vec<Cell>]) -> TimetableGrid {
    let periods = weekdays.iter().map(Vec::len).max().unwrap_or(0);

    (0..periods)
        .map(|period| {
            weekdays
                .iter()
                .map(|day| match day.get(period) {
                    Some(cell) => Cell {
                        subject: normalize(&cell.subject),
                        teacher: normalize(&cell.teacher),
                        ..cell.clone()
                    },
                    None => Cell::sentinel(),
                })
                .collect()
        })
        .collect()
}

/// Overlay user-edited cells from `stored` onto `fresh`.
///
/// Both grids are period-major. Only positions where the stored cell has
/// `userChanged == true` are replaced, and they are replaced whole.
pub fn merge(fresh: &[Vec<Cell>], stored: Option<&[Vec<Cell>]>) -> TimetableGrid {
    let Some(stored) = stored else {
        return fresh.to_vec();
    };

    fresh
        .iter()
        .enumerate()
        .map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .map(|(col, cell)| match stored.get(row).and_then(|r| r.get(col)) {
                    Some(custom) if custom.is_user_changed() => custom.clone(),
                    _ => cell.clone(),
                })
                .collect()
        })
        .collect()
}

fn dimensions(grid: &[Vec<Cell>]) -> (usize, usize) {
    (grid.len(), grid.first().map(Vec::len).unwrap_or(0))
}

fn check_bounds(grid: &[Vec<Cell>], row: usize, col: usize) -> Result<()> {
    if grid.get(row).and_then(|r| r.get(col)).is_some() {
        return Ok(());
    }
    let (rows, cols) = dimensions(grid);
    Err(Error::CellOutOfBounds { row, col, rows, cols })
}

/// Merges fetched timetables with user edits and persists the result.
#[derive(Clone)]
pub struct TimetableReconciler {
    store: Arc<dyn KeyValueStore>,
}

impl TimetableReconciler {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The saved custom grid, if any. A corrupt grid is treated as absent.
    pub async fn load_custom(&self) -> Result<Option<TimetableGrid>> {
        let Some(raw) = self.store.get_string(CUSTOM_TIMETABLE_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(grid) => Ok(Some(grid)),
            Err(e) => {
                warn!(error = %e, "Ignoring corrupt custom timetable");
                Ok(None)
            }
        }
    }

    async fn persist(&self, grid: &[Vec<Cell>]) -> Result<()> {
        let contents = serde_json::to_string(grid)?;
        self.store.set_string(CUSTOM_TIMETABLE_KEY, &contents).await?;
        Ok(())
    }

    /// Merge an already transposed grid with a stored one. Pure; nothing is written.
    pub fn get_merged_timetable(
        fresh: &[Vec<Cell>],
        stored: Option<&[Vec<Cell>]>,
    ) -> TimetableGrid {
        merge(fresh, stored)
    }

    /// Transpose a freshly fetched weekday-major grid, overlay the saved
    /// edits and save the merged grid.
    pub async fn reconcile(&self, weekdays: &[Vec<Cell>]) -> Result<TimetableGrid> {
        let fresh = transpose(weekdays);
        let stored = self.load_custom().await?;
        let merged = merge(&fresh, stored.as_deref());
        self.persist(&merged).await?;
        debug!(rows = merged.len(), "Timetable reconciled");
        Ok(merged)
    }

    /// Replace one cell with the user's subject and teacher and save the grid.
    pub async fn apply_user_edit(
        &self,
        grid: &[Vec<Cell>],
        row: usize,
        col: usize,
        subject: &str,
        teacher: &str,
    ) -> Result<TimetableGrid> {
        check_bounds(grid, row, col)?;

        let mut edited = grid.to_vec();
        let cell = &mut edited[row][col];
        if !cell.is_user_changed() {
            cell.original_subject = Some(cell.subject.clone());
            cell.original_teacher = Some(cell.teacher.clone());
        }
        cell.subject = subject.to_string();
        cell.teacher = teacher.to_string();
        cell.user_changed = Some(true);

        self.persist(&edited).await?;
        info!(row, col, "Timetable cell edited");
        Ok(edited)
    }

    /// Restore one cell from a fresh, unmerged fetch and save the grid.
    ///
    /// Fails without writing anything if the fetch fails or the fresh grid no
    /// longer has that position.
    pub async fn reset_cell_to_original<F, Fut>(
        &self,
        grid: &[Vec<Cell>],
        row: usize,
        col: usize,
        fetch_fresh: F,
    ) -> Result<TimetableGrid>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Vec<Vec<Cell>>, ApiError>>,
    {
        check_bounds(grid, row, col)?;

        let fresh = transpose(&fetch_fresh().await?);
        check_bounds(&fresh, row, col)?;

        let mut reset = grid.to_vec();
        reset[row][col] = Cell {
            user_changed: Some(false),
            original_subject: None,
            original_teacher: None,
            ..fresh[row][col].clone()
        };

        self.persist(&reset).await?;
        info!(row, col, "Timetable cell reset");
        Ok(reset)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn weekday(periods: usize, day: usize) -> Vec<Cell> {
        (0..periods)
            .map(|p| Cell::new(format!("과목{}-{}", day, p), format!("교사{}", day)))
            .collect()
    }

    fn weekdays(lengths: &[usize]) -> Vec<Vec<Cell>> {
        lengths.iter().enumerate().map(|(d, &n)| weekday(n, d)).collect()
    }

    #[test]
    fn test_transpose_pads_short_weekdays() {
        let grid = transpose(&weekdays(&[5, 5, 6, 5, 5, 0, 0]));

        assert_eq!(grid.len(), 6);
        assert!(grid.iter().all(|row| row.len() == 7));
        assert_eq!(grid[5][2].subject, "과목2-5");
        for col in [0, 1, 3, 4, 5, 6] {
            assert_eq!(grid[5][col], Cell::sentinel());
        }
        for row in 0..6 {
            assert_eq!(grid[row][5], Cell::sentinel());
            assert_eq!(grid[row][6], Cell::sentinel());
        }
    }

    #[test]
    fn test_transpose_normalizes_none() {
        let mut input = weekdays(&[2]);
        input[0][1] = Cell::new(NONE_MARK, NONE_MARK);
        input[0][0].changed = true;

        let grid = transpose(&input);
        assert_eq!(grid[1][0].subject, EMPTY_MARK);
        assert_eq!(grid[1][0].teacher, EMPTY_MARK);
        assert!(grid[0][0].changed);
    }

    #[test]
    fn test_transpose_empty() {
        assert!(transpose(&[]).is_empty());
        assert!(transpose(&weekdays(&[0, 0])).is_empty());
    }

    #[test]
    fn test_merge_replaces_only_user_changed_cells() {
        let fresh = transpose(&weekdays(&[5, 5, 5, 5, 5]));
        let mut stored = fresh.clone();
        for row in stored.iter_mut() {
            for cell in row.iter_mut() {
                cell.subject = "옛날".to_string();
            }
        }
        stored[2][3] = Cell {
            user_changed: Some(true),
            ..Cell::new("자습", "담임")
        };

        let merged = TimetableReconciler::get_merged_timetable(&fresh, Some(stored.as_slice()));
        for (row, cells) in merged.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                if (row, col) == (2, 3) {
                    assert_eq!(cell, &stored[2][3]);
                } else {
                    assert_eq!(cell, &fresh[row][col]);
                }
            }
        }
    }

    #[test]
    fn test_user_edit_beats_server_substitution() {
        let mut fresh = transpose(&weekdays(&[3]));
        fresh[1][0].changed = true;
        let mut stored = fresh.clone();
        stored[1][0] = Cell {
            user_changed: Some(true),
            ..Cell::new("체육", "박*민")
        };

        let merged = merge(&fresh, Some(stored.as_slice()));
        assert_eq!(merged[1][0].subject, "체육");
        assert!(!merged[1][0].changed);
    }

    #[test]
    fn test_merge_with_smaller_stored_grid() {
        let fresh = transpose(&weekdays(&[6, 6]));
        let stored = vec![vec![Cell {
            user_changed: Some(true),
            ..Cell::new("자습", "-")
        }]];

        let merged = merge(&fresh, Some(stored.as_slice()));
        assert_eq!(merged.len(), 6);
        assert_eq!(merged[0][0].subject, "자습");
        assert_eq!(merged[5][1], fresh[5][1]);
    }

    #[tokio::test]
    async fn test_reconcile_persists_merged_grid() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = TimetableReconciler::new(store.clone());

        let grid = reconciler.reconcile(&weekdays(&[4, 4])).await.unwrap();
        let edited = reconciler.apply_user_edit(&grid, 0, 1, "음악", "최*희").await.unwrap();
        assert_eq!(edited[0][1].original_subject.as_deref(), Some("과목1-0"));
        assert_eq!(reconciler.load_custom().await.unwrap(), Some(edited.clone()));

        // A refresh keeps the edit
        let refreshed = reconciler.reconcile(&weekdays(&[4, 4])).await.unwrap();
        assert_eq!(refreshed[0][1].subject, "음악");
        assert_eq!(refreshed[0][0].subject, "과목0-0");
    }

    #[tokio::test]
    async fn test_second_edit_keeps_first_backup() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = TimetableReconciler::new(store);
        let grid = transpose(&weekdays(&[2]));

        let once = reconciler.apply_user_edit(&grid, 1, 0, "미술", "-").await.unwrap();
        let twice = reconciler.apply_user_edit(&once, 1, 0, "음악", "-").await.unwrap();
        assert_eq!(twice[1][0].original_subject.as_deref(), Some("과목0-1"));
    }

    #[tokio::test]
    async fn test_edit_out_of_bounds_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = TimetableReconciler::new(store.clone());
        let grid = transpose(&weekdays(&[2]));

        let err = reconciler.apply_user_edit(&grid, 2, 0, "음악", "-").await.unwrap_err();
        assert!(matches!(err, Error::CellOutOfBounds { row: 2, col: 0, rows: 2, cols: 1 }));
        assert!(store.get_string(CUSTOM_TIMETABLE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_restores_fresh_cell() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = TimetableReconciler::new(store);
        let grid = reconciler.reconcile(&weekdays(&[3, 3])).await.unwrap();
        let edited = reconciler.apply_user_edit(&grid, 2, 1, "자습", "-").await.unwrap();

        let mut updated = weekdays(&[3, 3]);
        updated[1][2] = Cell {
            changed: true,
            ..Cell::new("영어", "대체교사")
        };
        let reset = reconciler
            .reset_cell_to_original(&edited, 2, 1, || async move { Ok(updated) })
            .await
            .unwrap();

        assert_eq!(reset[2][1].subject, "영어");
        assert!(reset[2][1].changed);
        assert_eq!(reset[2][1].user_changed, Some(false));
        assert_eq!(reset[2][1].original_subject, None);
        assert_eq!(reconciler.load_custom().await.unwrap(), Some(reset));
    }

    #[tokio::test]
    async fn test_reset_after_schedule_shrank_fails() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = TimetableReconciler::new(store);
        let grid = reconciler.reconcile(&weekdays(&[7])).await.unwrap();
        let edited = reconciler.apply_user_edit(&grid, 6, 0, "자습", "-").await.unwrap();

        let err = reconciler
            .reset_cell_to_original(&edited, 6, 0, || async { Ok(weekdays(&[6])) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CellOutOfBounds { .. }));
        assert_eq!(reconciler.load_custom().await.unwrap(), Some(edited));
    }

    #[tokio::test]
    async fn test_reset_fetch_failure_fails_loud() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = TimetableReconciler::new(store);
        let grid = transpose(&weekdays(&[2]));

        let err = reconciler
            .reset_cell_to_original(&grid, 0, 0, || async { Err(ApiError::RateLimited) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api(ApiError::RateLimited)));
    }

    #[tokio::test]
    async fn test_corrupt_custom_grid_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        store.set_string(CUSTOM_TIMETABLE_KEY, "{\"oops\":1}").await.unwrap();
        let reconciler = TimetableReconciler::new(store);

        assert_eq!(reconciler.load_custom().await.unwrap(), None);
        let grid = reconciler.reconcile(&weekdays(&[1])).await.unwrap();
        assert_eq!(grid.len(), 1);
    }
}
