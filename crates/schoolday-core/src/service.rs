//! Combined data access for the UI layer.
//!
//! `SchoolService` wires the API client, cache, settings and timetable
//! reconciler together. `today()` fetches the timetable, meals and schedule
//! concurrently and reports each result separately, so one failing lookup
//! never hides the others.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};

use crate::api::{MealQuery, SchoolApi, ScheduleQuery};
use crate::cache::{CacheKey, CacheManager};
use crate::clock::Clock;
use crate::error::Result;
use crate::meals::{MealPager, PagerOptions};
use crate::models::{Cell, MealRecord, ScheduleRecord, School, TimetableGrid, YearMonth};
use crate::settings::SettingsProvider;
use crate::store::KeyValueStore;
use crate::timetable::TimetableReconciler;

/// Everything shown on the "today" screen. Each part succeeds or fails on its own.
#[derive(Debug)]
pub struct DayOverview {
    pub date: NaiveDate,
    pub timetable: Result<TimetableGrid>,
    pub meals: Result<Vec<MealRecord>>,
    pub schedule: Result<Vec<ScheduleRecord>>,
}

#[derive(Clone)]
pub struct SchoolService {
    api: Arc<dyn SchoolApi>,
    cache: CacheManager,
    settings: SettingsProvider,
    clock: Arc<dyn Clock>,
    reconciler: TimetableReconciler,
}

impl SchoolService {
    pub fn new(
        api: Arc<dyn SchoolApi>,
        store: Arc<dyn KeyValueStore>,
        settings: SettingsProvider,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            cache: CacheManager::new(store.clone(), clock.clone()),
            settings,
            clock,
            reconciler: TimetableReconciler::new(store),
        }
    }

    pub fn settings(&self) -> &SettingsProvider {
        &self.settings
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn today_date(&self) -> NaiveDate {
        self.clock.today()
    }

    /// A new meal pager sharing this service's cache and settings
    pub fn meal_pager(&self, options: PagerOptions) -> MealPager {
        MealPager::new(
            self.api.clone(),
            self.cache.clone(),
            self.settings.clone(),
            self.clock.clone(),
            options,
        )
    }

    pub async fn search_schools(&self, name: &str) -> Result<Vec<School>> {
        let key = CacheKey::Schools {
            query: name.trim().to_string(),
        };
        self.cache
            .get_or_fetch(&key, || self.api.search_schools(name.trim()))
            .await
    }

    fn class_selection(&self) -> Result<(String, u32, u32)> {
        let settings = self.settings.current();
        let (school_id, grade, class_num) = settings.require_class()?;
        Ok((school_id.to_string(), grade, class_num))
    }

    fn timetable_key(&self) -> Result<CacheKey> {
        let (school_id, grade, class_num) = self.class_selection()?;
        Ok(CacheKey::Timetable { school_id, grade, class_num })
    }

    /// The class timetable with the user's edits applied
    pub async fn timetable(&self) -> Result<TimetableGrid> {
        let (school_id, grade, class_num) = self.class_selection()?;
        let key = CacheKey::Timetable {
            school_id: school_id.clone(),
            grade,
            class_num,
        };
        let raw: Vec<Vec<Cell>> = self
            .cache
            .get_or_fetch(&key, || self.api.fetch_timetable(&school_id, grade, class_num))
            .await?;
        self.reconciler.reconcile(&raw).await
    }

    /// Drop the cached timetable and fetch it again. User edits are kept.
    pub async fn refresh_timetable(&self) -> Result<TimetableGrid> {
        self.cache.invalidate(&self.timetable_key()?).await;
        self.timetable().await
    }

    async fn current_grid(&self) -> Result<TimetableGrid> {
        match self.reconciler.load_custom().await? {
            Some(grid) => Ok(grid),
            None => self.timetable().await,
        }
    }

    pub async fn edit_cell(
        &self,
        row: usize,
        col: usize,
        subject: &str,
        teacher: &str,
    ) -> Result<TimetableGrid> {
        let grid = self.current_grid().await?;
        self.reconciler.apply_user_edit(&grid, row, col, subject, teacher).await
    }

    /// Restore a cell from an uncached fetch of the server timetable
    pub async fn reset_cell(&self, row: usize, col: usize) -> Result<TimetableGrid> {
        let (school_id, grade, class_num) = self.class_selection()?;
        let grid = self.current_grid().await?;
        self.reconciler
            .reset_cell_to_original(&grid, row, col, || {
                self.api.fetch_timetable(&school_id, grade, class_num)
            })
            .await
    }

    pub async fn meals_on(&self, date: NaiveDate) -> Result<Vec<MealRecord>> {
        let settings = self.settings.current();
        let school = settings.require_school()?;
        let key = CacheKey::Meal {
            school: school.clone(),
            year: date.year(),
            month: date.month(),
            day: Some(date.day()),
        };
        let query = MealQuery {
            school: school.clone(),
            year: date.year(),
            month: date.month(),
            day: Some(date.day()),
            show_allergy: settings.show_allergy,
            show_origin: settings.show_origin,
            show_nutrition: settings.show_nutrition,
        };
        self.cache
            .get_or_fetch(&key, || async move { self.api.fetch_meal(&query).await })
            .await
    }

    pub async fn schedule_for(&self, month: YearMonth) -> Result<Vec<ScheduleRecord>> {
        let settings = self.settings.current();
        let school = settings.require_school()?;
        let key = CacheKey::schedule_month(school, month);
        let query = ScheduleQuery {
            school: school.clone(),
            year: month.year,
            month: month.month,
            day: None,
        };
        self.cache
            .get_or_fetch(&key, || async move { self.api.fetch_schedule(&query).await })
            .await
    }

    /// Timetable, today's meals and this month's schedule, fetched concurrently
    pub async fn today(&self) -> DayOverview {
        let date = self.clock.today();
        let (timetable, meals, schedule) = tokio::join!(
            self.timetable(),
            self.meals_on(date),
            self.schedule_for(YearMonth::of(date)),
        );

        for (part, result) in [
            ("timetable", timetable.as_ref().err()),
            ("meals", meals.as_ref().err()),
            ("schedule", schedule.as_ref().err()),
        ] {
            if let Some(e) = result {
                warn!(part, error = %e, "Failed to load part of today's overview");
            }
        }
        debug!(%date, "Today's overview loaded");

        DayOverview {
            date,
            timetable,
            meals,
            schedule,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::Error;
    use crate::models::SchoolRef;
    use crate::settings::Settings;
    use crate::store::MemoryStore;
    use crate::test_support::{meal, FakeApi};

    fn service(api: Arc<FakeApi>) -> SchoolService {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at("2025-03-04T08:00:00+09:00").unwrap());
        let settings = SettingsProvider::with_settings(
            store.clone(),
            Settings {
                school: Some(SchoolRef::new("7010057", "B10")),
                grade: Some(2),
                class_num: Some(3),
                ..Default::default()
            },
        );
        SchoolService::new(api, store, settings, clock)
    }

    fn week(subject: &str) -> Vec<Vec<Cell>> {
        (0..5).map(|_| (0..6).map(|_| Cell::new(subject, "담임")).collect()).collect()
    }

    #[tokio::test]
    async fn test_today_reports_parts_independently() {
        let api = Arc::new(FakeApi::new());
        api.set_timetable(None);
        api.set_meals(2025, 3, vec![meal("2025-03-04", "중식")]);
        api.set_schedule(
            2025,
            3,
            vec![ScheduleRecord {
                date: "2025-03-04".to_string(),
                schedule: "입학식".to_string(),
            }],
        );
        let service = service(api);

        let overview = service.today().await;
        assert!(matches!(overview.timetable, Err(Error::Api(_))));
        assert_eq!(overview.meals.unwrap().len(), 1);
        assert_eq!(overview.schedule.unwrap()[0].schedule, "입학식");
    }

    #[tokio::test]
    async fn test_timetable_is_cached_and_transposed() {
        let api = Arc::new(FakeApi::new());
        api.set_timetable(Some(week("수학")));
        let service = service(api.clone());

        let grid = service.timetable().await.unwrap();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid[0].len(), 5);
        service.timetable().await.unwrap();
        assert_eq!(api.timetable_calls(), 1);
    }

    #[tokio::test]
    async fn test_edit_survives_refresh_until_reset() {
        let api = Arc::new(FakeApi::new());
        api.set_timetable(Some(week("수학")));
        let service = service(api.clone());

        service.timetable().await.unwrap();
        service.edit_cell(1, 2, "자습", "-").await.unwrap();

        api.set_timetable(Some(week("과학")));
        let refreshed = service.refresh_timetable().await.unwrap();
        assert_eq!(refreshed[1][2].subject, "자습");
        assert_eq!(refreshed[0][0].subject, "과학");

        let reset = service.reset_cell(1, 2).await.unwrap();
        assert_eq!(reset[1][2].subject, "과학");
        assert_eq!(api.timetable_calls(), 3);
    }

    #[tokio::test]
    async fn test_reset_out_of_bounds() {
        let api = Arc::new(FakeApi::new());
        api.set_timetable(Some(week("수학")));
        let service = service(api);

        let err = service.reset_cell(9, 0).await.unwrap_err();
        assert!(matches!(err, Error::CellOutOfBounds { .. }));
    }

    #[tokio::test]
    async fn test_search_results_are_cached() {
        let api = Arc::new(FakeApi::new());
        let service = service(api);

        let first = service.search_schools(" 한빛 ").await.unwrap();
        assert_eq!(first[0].name, "한빛고등학교");
        let cached: Option<Vec<School>> = service
            .cache()
            .get(&CacheKey::Schools { query: "한빛".to_string() })
            .await
            .unwrap();
        assert_eq!(cached, Some(first));
    }
}
