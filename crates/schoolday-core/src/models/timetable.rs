use serde::{Deserialize, Serialize};

/// Placeholder subject/teacher for a period with no class
pub const EMPTY_MARK: &str = "-";

/// The API's spelling of "none"; normalized to `EMPTY_MARK`
pub const NONE_MARK: &str = "없음";

/// Timetable rows in period-major order: `grid[period][weekday]`.
pub type TimetableGrid = Vec<Vec<Cell>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub subject: String,
    pub teacher: String,
    /// Server-flagged substitution
    #[serde(default)]
    pub changed: bool,
    /// Local override made by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_changed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_teacher: Option<String>,
}

impl Cell {
    pub fn new(subject: impl Into<String>, teacher: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            teacher: teacher.into(),
            changed: false,
            user_changed: None,
            original_subject: None,
            original_teacher: None,
        }
    }

    /// Padding cell for periods a weekday does not have
    pub fn sentinel() -> Self {
        Self::new(EMPTY_MARK, EMPTY_MARK)
    }

    pub fn is_user_changed(&self) -> bool {
        self.user_changed == Some(true)
    }
}
