use std::fmt;

use crate::models::{SchoolRef, YearMonth};

/// Prefix shared by every cache entry in the store
pub const CACHE_NAMESPACE: &str = "@cache/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Meal,
    Schedule,
    Timetable,
    Schools,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Meal => "meal",
            CacheKind::Schedule => "schedule",
            CacheKind::Timetable => "timetable",
            CacheKind::Schools => "schools",
        }
    }

    /// Prefix of every key of this kind, for bulk invalidation
    pub fn prefix(&self) -> String {
        format!("{}{}/", CACHE_NAMESPACE, self.as_str())
    }
}

/// Logical query a cache entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Meal {
        school: SchoolRef,
        year: i32,
        month: u32,
        day: Option<u32>,
    },
    Schedule {
        school: SchoolRef,
        year: i32,
        month: u32,
        day: Option<u32>,
    },
    Timetable {
        school_id: String,
        grade: u32,
        class_num: u32,
    },
    Schools {
        query: String,
    },
}

/// Escape the segment delimiter so user-supplied values cannot forge segments
fn escape(segment: &str) -> String {
    segment.replace('%', "%25").replace('/', "%2F")
}

fn day_segment(day: Option<u32>) -> String {
    day.map(|d| d.to_string()).unwrap_or_else(|| "*".to_string())
}

impl CacheKey {
    pub fn meal_month(school: &SchoolRef, month: YearMonth) -> Self {
        CacheKey::Meal {
            school: school.clone(),
            year: month.year,
            month: month.month,
            day: None,
        }
    }

    pub fn schedule_month(school: &SchoolRef, month: YearMonth) -> Self {
        CacheKey::Schedule {
            school: school.clone(),
            year: month.year,
            month: month.month,
            day: None,
        }
    }

    pub fn kind(&self) -> CacheKind {
        match self {
            CacheKey::Meal { .. } => CacheKind::Meal,
            CacheKey::Schedule { .. } => CacheKind::Schedule,
            CacheKey::Timetable { .. } => CacheKind::Timetable,
            CacheKey::Schools { .. } => CacheKind::Schools,
        }
    }

    fn segments(&self) -> Vec<String> {
        match self {
            CacheKey::Meal { school, year, month, day }
            | CacheKey::Schedule { school, year, month, day } => vec![
                escape(&school.school_id),
                escape(&school.region_id),
                year.to_string(),
                month.to_string(),
                day_segment(*day),
            ],
            CacheKey::Timetable { school_id, grade, class_num } => {
                vec![escape(school_id), grade.to_string(), class_num.to_string()]
            }
            CacheKey::Schools { query } => vec![escape(query)],
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind().prefix(), self.segments().join("/"))
    }
}
