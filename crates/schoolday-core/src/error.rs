use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to encode data: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("No school selected")]
    NoSchoolSelected,

    #[error("Grade and class are not selected")]
    NoClassSelected,

    #[error("Timetable cell ({row}, {col}) is outside the {rows}x{cols} grid")]
    CellOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures worth a "try again later" notice rather than an error view
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Api(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Message shown to the user when an explicit action fails
    pub fn notice(&self) -> String {
        match self {
            Error::Api(e) if e.is_transient() => {
                "Could not reach the school data service. Showing saved data.".to_string()
            }
            Error::Api(_) => "The school data service returned an unexpected response.".to_string(),
            Error::Store(_) | Error::Encode(_) => {
                "Could not access saved data on this device.".to_string()
            }
            Error::NoSchoolSelected => "Select a school in settings first.".to_string(),
            Error::NoClassSelected => "Select a grade and class in settings first.".to_string(),
            Error::CellOutOfBounds { .. } => {
                "This period no longer exists in the school's timetable.".to_string()
            }
        }
    }
}
