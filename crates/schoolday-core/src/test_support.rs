//! Fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{ApiError, MealQuery, SchoolApi, ScheduleQuery};
use crate::models::{Cell, MealRecord, ScheduleRecord, School};
use crate::store::{KeyValueStore, MemoryStore, StoreError};

pub fn meal(date: &str, kind: &str) -> MealRecord {
    MealRecord {
        date: date.to_string(),
        meal: vec![crate::models::MealItem::Plain("쌀밥".to_string())],
        kind: Some(kind.to_string()),
        calorie: None,
    }
}

fn injected() -> StoreError {
    StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "injected failure"))
}

/// Memory store whose reads or removals can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_removals: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.get_string(key).await
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_string(key, value).await
    }

    async fn remove_key(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.remove_key(key).await
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_keys().await
    }

    async fn remove_keys(&self, keys: &[String]) -> Result<(), StoreError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.remove_keys(keys).await
    }
}

/// Scripted school API.
#[derive(Default)]
pub struct FakeApi {
    meals: Mutex<HashMap<(i32, u32), Vec<MealRecord>>>,
    schedules: Mutex<HashMap<(i32, u32), Vec<ScheduleRecord>>>,
    timetable: Mutex<Option<Vec<Vec<Cell>>>>,
    meal_queries: Mutex<Vec<MealQuery>>,
    meal_delay: Mutex<Duration>,
    fail_meals: AtomicBool,
    timetable_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_meals(&self, year: i32, month: u32, records: Vec<MealRecord>) {
        self.meals.lock().unwrap().insert((year, month), records);
    }

    pub fn set_schedule(&self, year: i32, month: u32, records: Vec<ScheduleRecord>) {
        self.schedules.lock().unwrap().insert((year, month), records);
    }

    /// `None` makes timetable fetches fail
    pub fn set_timetable(&self, grid: Option<Vec<Vec<Cell>>>) {
        *self.timetable.lock().unwrap() = grid;
    }

    pub fn set_meal_delay(&self, delay: Duration) {
        *self.meal_delay.lock().unwrap() = delay;
    }

    pub fn fail_meals(&self, fail: bool) {
        self.fail_meals.store(fail, Ordering::SeqCst);
    }

    pub fn meal_queries(&self) -> Vec<MealQuery> {
        self.meal_queries.lock().unwrap().clone()
    }

    pub fn meal_calls(&self) -> usize {
        self.meal_queries.lock().unwrap().len()
    }

    pub fn timetable_calls(&self) -> usize {
        self.timetable_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchoolApi for FakeApi {
    async fn fetch_meal(&self, query: &MealQuery) -> Result<Vec<MealRecord>, ApiError> {
        self.meal_queries.lock().unwrap().push(query.clone());
        let delay = *self.meal_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_meals.load(Ordering::SeqCst) {
            return Err(ApiError::ServerError("meal service down".to_string()));
        }
        let meals = self.meals.lock().unwrap();
        Ok(meals.get(&(query.year, query.month)).cloned().unwrap_or_default())
    }

    async fn fetch_schedule(&self, query: &ScheduleQuery) -> Result<Vec<ScheduleRecord>, ApiError> {
        let schedules = self.schedules.lock().unwrap();
        Ok(schedules.get(&(query.year, query.month)).cloned().unwrap_or_default())
    }

    async fn fetch_timetable(
        &self,
        _school_id: &str,
        _grade: u32,
        _class_num: u32,
    ) -> Result<Vec<Vec<Cell>>, ApiError> {
        self.timetable_calls.fetch_add(1, Ordering::SeqCst);
        self.timetable
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApiError::ServerError("timetable service down".to_string()))
    }

    async fn search_schools(&self, name: &str) -> Result<Vec<School>, ApiError> {
        Ok(vec![School {
            name: format!("{}고등학교", name),
            school_code: "7010057".to_string(),
            region_code: "B10".to_string(),
            region_name: None,
            address: None,
        }])
    }
}
