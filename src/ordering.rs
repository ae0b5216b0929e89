use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{Entry, NotebookHandle};

pub const FIELD_NAME: &str = "name";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_CREATE_TIME: &str = "create_time";
pub const FIELD_EDIT_TIME: &str = "edit_time";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
    None,
}

impl SortDirection {
    pub fn as_str(&self) -> &str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
            SortDirection::None => "none",
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            "none" | "" => Ok(SortDirection::None),
            other => Err(format!("unknown sort direction: {}", other)),
        }
    }
}

/// Which field a list is ordered by, and how.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn is_unsorted(&self) -> bool {
        self.field.trim().is_empty() || self.direction == SortDirection::None
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::new(FIELD_EDIT_TIME, SortDirection::Descending)
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unsorted() {
            write!(f, "unsorted")
        } else {
            write!(f, "{} {}", self.field, self.direction.as_str())
        }
    }
}

/// A single comparable field value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue<'a> {
    Text(&'a str),
    Time(DateTime<Utc>),
}

/// Records that can be ordered by named fields.
pub trait Sortable {
    /// `None` when the record has no such field; such values order first.
    fn sort_value(&self, field: &str) -> Option<SortValue<'_>>;
}

impl Sortable for NotebookHandle {
    fn sort_value(&self, field: &str) -> Option<SortValue<'_>> {
        match field {
            FIELD_NAME => Some(SortValue::Text(&self.name)),
            FIELD_DESCRIPTION => Some(SortValue::Text(&self.description)),
            FIELD_CREATE_TIME => Some(SortValue::Time(self.create_time)),
            FIELD_EDIT_TIME => Some(SortValue::Time(self.edit_time)),
            _ => None,
        }
    }
}

impl Sortable for Entry {
    fn sort_value(&self, field: &str) -> Option<SortValue<'_>> {
        match field {
            FIELD_NAME => Some(SortValue::Text(&self.name)),
            FIELD_CREATE_TIME => Some(SortValue::Time(self.create_time)),
            FIELD_EDIT_TIME => Some(SortValue::Time(self.edit_time)),
            _ => None,
        }
    }
}

/// Returns an ordered copy of `records`.
///
/// The sort is stable: records with equal keys keep their input order, so
/// ordering the same input twice with one `SortSpec` gives the same sequence.
pub fn order<T: Sortable + Clone>(records: &[T], spec: &SortSpec) -> Vec<T> {
    let mut data = records.to_vec();
    if spec.is_unsorted() {
        return data;
    }

    let field = spec.field.as_str();
    let descending = spec.direction == SortDirection::Descending;
    data.sort_by(|a, b| {
        let ord = a.sort_value(field).cmp(&b.sort_value(field));
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(name: &str, edited_day: u32) -> Entry {
        Entry {
            name: name.to_string(),
            create_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            edit_time: Utc.with_ymd_and_hms(2024, 2, edited_day, 0, 0, 0).unwrap(),
            content: String::new(),
        }
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn none_direction_returns_input_order() {
        let input = vec![entry("b", 3), entry("a", 1), entry("c", 2)];
        let out = order(&input, &SortSpec::new(FIELD_NAME, SortDirection::None));
        assert_eq!(out, input);

        let out = order(&input, &SortSpec::new("", SortDirection::Ascending));
        assert_eq!(out, input);
    }

    #[test]
    fn ascending_and_descending_have_complementary_extremes() {
        let input = vec![entry("b", 3), entry("a", 1), entry("c", 2)];
        let asc = order(&input, &SortSpec::new(FIELD_EDIT_TIME, SortDirection::Ascending));
        let desc = order(&input, &SortSpec::new(FIELD_EDIT_TIME, SortDirection::Descending));

        assert_eq!(names(&asc), vec!["a", "c", "b"]);
        assert_eq!(asc.first(), desc.last());
        assert_eq!(asc.last(), desc.first());
    }

    #[test]
    fn ties_keep_input_order_and_resorting_is_idempotent() {
        let input = vec![entry("x", 5), entry("y", 1), entry("z", 5), entry("w", 5)];
        let spec = SortSpec::new(FIELD_EDIT_TIME, SortDirection::Descending);

        let once = order(&input, &spec);
        assert_eq!(names(&once), vec!["x", "z", "w", "y"]);

        let twice = order(&once, &spec);
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_field_keeps_input_order() {
        let input = vec![entry("b", 3), entry("a", 1)];
        let out = order(&input, &SortSpec::new("color", SortDirection::Ascending));
        assert_eq!(out, input);
    }

    #[test]
    fn direction_parses_cli_spellings() {
        assert_eq!("asc".parse::<SortDirection>(), Ok(SortDirection::Ascending));
        assert_eq!("Descending".parse::<SortDirection>(), Ok(SortDirection::Descending));
        assert!("sideways".parse::<SortDirection>().is_err());
    }
}
