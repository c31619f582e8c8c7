//! REST API client module for the school data service.
//!
//! This module provides the `SchoolApi` trait the rest of the crate depends
//! on and `ApiClient`, its HTTP implementation. Meal and schedule lookups
//! treat a non-success status as "nothing published"; only transport
//! failures and undecodable bodies are errors.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::models::{Cell, MealRecord, ScheduleRecord, School, SchoolRef};

pub use client::ApiClient;
pub use error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealQuery {
    pub school: SchoolRef,
    pub year: i32,
    pub month: u32,
    pub day: Option<u32>,
    pub show_allergy: bool,
    pub show_origin: bool,
    pub show_nutrition: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleQuery {
    pub school: SchoolRef,
    pub year: i32,
    pub month: u32,
    pub day: Option<u32>,
}

#[async_trait]
pub trait SchoolApi: Send + Sync {
    async fn fetch_meal(&self, query: &MealQuery) -> Result<Vec<MealRecord>, ApiError>;

    async fn fetch_schedule(&self, query: &ScheduleQuery) -> Result<Vec<ScheduleRecord>, ApiError>;

    /// Rows are weekdays (Monday first), columns are periods.
    async fn fetch_timetable(
        &self,
        school_id: &str,
        grade: u32,
        class_num: u32,
    ) -> Result<Vec<Vec<Cell>>, ApiError>;

    async fn search_schools(&self, name: &str) -> Result<Vec<School>, ApiError>;
}
