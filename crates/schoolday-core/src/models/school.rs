use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct School {
    pub name: String,
    #[serde(rename = "schoolCode")]
    pub school_code: String,
    #[serde(rename = "regionCode")]
    pub region_code: String,
    #[serde(rename = "regionName", default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl School {
    pub fn to_ref(&self) -> SchoolRef {
        SchoolRef {
            school_id: self.school_code.clone(),
            region_id: self.region_code.clone(),
        }
    }
}

/// Identifies a school in meal and schedule queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchoolRef {
    #[serde(rename = "schoolId")]
    pub school_id: String,
    #[serde(rename = "regionId")]
    pub region_id: String,
}

impl SchoolRef {
    pub fn new(school_id: impl Into<String>, region_id: impl Into<String>) -> Self {
        Self {
            school_id: school_id.into(),
            region_id: region_id.into(),
        }
    }
}
