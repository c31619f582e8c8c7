//! Data models for school lookups.
//!
//! - `School`, `SchoolRef`: search results and the identifiers used in queries
//! - `MealRecord`, `MealItem`: daily meal menus, optionally with allergy codes
//! - `ScheduleRecord`: academic calendar entries
//! - `Cell`, `TimetableGrid`: class timetable cells
//! - `YearMonth`: the unit of meal and schedule pagination

pub mod meal;
pub mod month;
pub mod schedule;
pub mod school;
pub mod timetable;

pub use meal::{Allergy, AnnotatedMeal, MealItem, MealKey, MealRecord};
pub use month::YearMonth;
pub use schedule::ScheduleRecord;
pub use school::{School, SchoolRef};
pub use timetable::{Cell, TimetableGrid, EMPTY_MARK, NONE_MARK};
