use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allergy {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedMeal {
    pub food: String,
    #[serde(default)]
    pub allergy: Vec<Allergy>,
}

/// One dish on a menu.
///
/// The API sends a bare string when allergy display is off and an object with
/// allergy codes when it is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MealItem {
    Plain(String),
    Annotated(AnnotatedMeal),
}

impl MealItem {
    pub fn food(&self) -> &str {
        match self {
            MealItem::Plain(food) => food,
            MealItem::Annotated(meal) => &meal.food,
        }
    }

    pub fn allergies(&self) -> &[Allergy] {
        match self {
            MealItem::Plain(_) => &[],
            MealItem::Annotated(meal) => &meal.allergy,
        }
    }

    /// Display form, e.g. `우유 (2)` or `우유 (2, 5)`
    pub fn display(&self) -> String {
        let codes: Vec<&str> = self.allergies().iter().map(|a| a.code.as_str()).collect();
        if codes.is_empty() {
            self.food().to_string()
        } else {
            format!("{} ({})", self.food(), codes.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealRecord {
    /// ISO date, `YYYY-MM-DD`
    pub date: String,
    #[serde(default)]
    pub meal: Vec<MealItem>,
    /// Meal slot, e.g. `조식`, `중식`, `석식`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calorie: Option<String>,
}

/// De-duplication key for meal records: the `(date, type)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MealKey {
    pub date: String,
    pub kind: Option<String>,
}

impl MealRecord {
    pub fn key(&self) -> MealKey {
        MealKey {
            date: self.date.clone(),
            kind: self.kind.clone(),
        }
    }

    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.get(..10)?, "%Y-%m-%d").ok()
    }

    /// True when the record is dated `today` or later. Undated records are not upcoming.
    pub fn is_on_or_after(&self, today: NaiveDate) -> bool {
        self.parsed_date().map(|d| d >= today).unwrap_or(false)
    }
}
