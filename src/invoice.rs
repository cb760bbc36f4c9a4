//! Invoice record and the vendors it can come from

use crate::extractor::PageSelector;
use chrono::NaiveDate;
use std::fmt;

/// Utility providers whose payment slips are understood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Edp,
    Epal,
    Gold,
}

impl Vendor {
    /// Classify a file by the vendor name it carries.
    ///
    /// Matching is case-insensitive; "edp" wins over "gold", which wins over "epal".
    pub fn from_file_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.contains("edp") {
            Some(Vendor::Edp)
        } else if name.contains("gold") {
            Some(Vendor::Gold)
        } else if name.contains("epal") {
            Some(Vendor::Epal)
        } else {
            None
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Vendor::Edp => "EDP",
            Vendor::Epal => "EPAL",
            Vendor::Gold => "Gold",
        }
    }

    /// Page holding the payment slip
    pub fn page(self) -> PageSelector {
        match self {
            Vendor::Edp => PageSelector::Last,
            Vendor::Epal | Vendor::Gold => PageSelector::First,
        }
    }

    /// Position of this vendor's events in a run
    pub(crate) fn event_order(self) -> u8 {
        match self {
            Vendor::Edp => 0,
            Vendor::Epal => 1,
            Vendor::Gold => 2,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Payment fields read from one invoice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    /// Multibanco payment reference
    pub reference: String,
    /// Multibanco payee entity
    pub entity: String,
    /// Amount as printed on the slip, currency included
    pub amount: String,
    pub due_date: NaiveDate,
    pub next_reading_date: Option<NaiveDate>,
}
