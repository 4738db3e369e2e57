//! Donor directory: projection of profile snapshots into list entries,
//! committed filtering, and the contact reveal gate.

pub mod views;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::profile::types::{str_field, BloodType};
use crate::profile::fields;
use crate::store::{Snapshot, StoredDocument};

pub use views::{DirectoryViews, ViewGuard, ViewHandle};

/// Read projection of a profile document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonorListEntry {
    pub id: String,
    pub name: String,
    pub blood_type: String,
    pub city: String,
    pub phone: Option<String>,
    pub mobile_visible: bool,
    pub email: Option<String>,
}

impl DonorListEntry {
    /// `None` unless name, blood type and city are all non-empty.
    pub fn from_document(doc: &StoredDocument) -> Option<Self> {
        let data = &doc.data;
        Some(Self {
            id: doc.id.clone(),
            name: str_field(data, fields::NAME)?,
            blood_type: str_field(data, fields::BLOOD_TYPE)?,
            city: str_field(data, fields::CITY)?,
            phone: str_field(data, fields::PHONE),
            mobile_visible: data
                .get(fields::MOBILE_VISIBILITY)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            email: str_field(data, fields::EMAIL),
        })
    }

    pub fn can_reveal(&self, field: ContactField) -> bool {
        match field {
            ContactField::Phone => self.mobile_visible && self.phone.is_some(),
            ContactField::Email => self.email.is_some(),
        }
    }

    pub fn contact(&self, field: ContactField) -> Option<&str> {
        match field {
            ContactField::Phone => self.phone.as_deref(),
            ContactField::Email => self.email.as_deref(),
        }
    }
}

/// Project a full snapshot. Incomplete documents are dropped silently.
pub fn project(docs: &[StoredDocument]) -> Vec<DonorListEntry> {
    docs.iter().filter_map(DonorListEntry::from_document).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactField {
    Phone,
    Email,
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactField::Phone => f.write_str("phone"),
            ContactField::Email => f.write_str("email"),
        }
    }
}

impl FromStr for ContactField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phone" => Ok(ContactField::Phone),
            "email" => Ok(ContactField::Email),
            other => Err(format!("Unknown contact field: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BloodTypeFilter {
    #[default]
    All,
    Only(BloodType),
}

impl FromStr for BloodTypeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "all" => Ok(BloodTypeFilter::All),
            other => other.parse().map(BloodTypeFilter::Only),
        }
    }
}

impl BloodTypeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            BloodTypeFilter::All => "all",
            BloodTypeFilter::Only(bt) => bt.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DonorFilter {
    pub blood_type: BloodTypeFilter,
    /// Trimmed; empty matches every city.
    pub city: String,
}

/// Query/form shape of a filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterParams {
    #[serde(default)]
    pub blood_type: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl DonorFilter {
    pub fn new(blood_type: BloodTypeFilter, city: &str) -> Self {
        Self {
            blood_type,
            city: city.trim().to_string(),
        }
    }

    pub fn from_params(params: &FilterParams) -> Result<Self, String> {
        let blood_type = params
            .blood_type
            .as_deref()
            .unwrap_or("all")
            .parse::<BloodTypeFilter>()?;
        Ok(Self::new(blood_type, params.city.as_deref().unwrap_or("")))
    }

    pub fn matches(&self, entry: &DonorListEntry) -> bool {
        let blood_ok = match self.blood_type {
            BloodTypeFilter::All => true,
            BloodTypeFilter::Only(bt) => entry.blood_type == bt.as_str(),
        };
        let city_ok = self.city.is_empty()
            || entry
                .city
                .to_lowercase()
                .contains(&self.city.to_lowercase());
        blood_ok && city_ok
    }

    pub fn apply<'a>(&self, entries: &'a [DonorListEntry]) -> Vec<&'a DonorListEntry> {
        entries.iter().filter(|e| self.matches(e)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Revealed {
    pub phone: bool,
    pub email: bool,
}

/// Which contact fields the viewer has explicitly revealed, per donor id.
#[derive(Debug, Clone, Default)]
pub struct RevealState {
    revealed: HashMap<String, Revealed>,
}

impl RevealState {
    /// Idempotent.
    pub fn reveal(&mut self, donor_id: &str, field: ContactField) {
        let entry = self.revealed.entry(donor_id.to_string()).or_default();
        match field {
            ContactField::Phone => entry.phone = true,
            ContactField::Email => entry.email = true,
        }
    }

    pub fn is_revealed(&self, donor_id: &str, field: ContactField) -> bool {
        self.revealed
            .get(donor_id)
            .map(|r| match field {
                ContactField::Phone => r.phone,
                ContactField::Email => r.email,
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevealError {
    #[error("Donor not found")]
    UnknownDonor,

    #[error("This contact detail is not visible")]
    NotVisible,
}

/// What a directory view currently displays.
#[derive(Debug, PartialEq)]
pub enum Listing<'a> {
    /// No snapshot has arrived yet.
    Loading,
    /// The committed filter matches nothing.
    Empty,
    Rows(Vec<Row<'a>>),
}

/// One displayed donor with contact fields gated by the reveal state.
#[derive(Debug, PartialEq)]
pub struct Row<'a> {
    pub entry: &'a DonorListEntry,
    pub phone: ContactCell<'a>,
    pub email: ContactCell<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactCell<'a> {
    Revealed(&'a str),
    Hidden,
    Disabled,
}

impl ContactCell<'_> {
    pub fn value(&self) -> Option<&str> {
        match self {
            ContactCell::Revealed(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, ContactCell::Hidden)
    }
}

/// Client-local mirror of the donor collection for one open view.
///
/// Every snapshot rebuilds the whole list. Filter inputs stay in the page's
/// form until submitted; only [`DirectoryView::search`] changes what is shown.
#[derive(Debug, Default)]
pub struct DirectoryView {
    entries: Option<Vec<DonorListEntry>>,
    committed: DonorFilter,
    reveal: RevealState,
}

impl DirectoryView {
    pub fn new(filter: DonorFilter) -> Self {
        Self {
            entries: None,
            committed: filter,
            reveal: RevealState::default(),
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.entries = Some(project(snapshot));
    }

    /// Commit a submitted filter to the displayed list. It stays in force
    /// across later snapshots.
    pub fn search(&mut self, filter: DonorFilter) {
        self.committed = filter;
    }

    pub fn entry(&self, donor_id: &str) -> Option<&DonorListEntry> {
        self.entries.as_ref()?.iter().find(|e| e.id == donor_id)
    }

    /// Reveal one contact field and return its value.
    pub fn reveal(&mut self, donor_id: &str, field: ContactField) -> Result<String, RevealError> {
        let entry = self.entry(donor_id).ok_or(RevealError::UnknownDonor)?;
        if !entry.can_reveal(field) {
            return Err(RevealError::NotVisible);
        }
        let value = entry.contact(field).unwrap_or_default().to_string();
        self.reveal.reveal(donor_id, field);
        Ok(value)
    }

    pub fn listing(&self) -> Listing<'_> {
        let Some(entries) = &self.entries else {
            return Listing::Loading;
        };
        let rows: Vec<Row<'_>> = self
            .committed
            .apply(entries)
            .into_iter()
            .map(|entry| Row {
                entry,
                phone: self.cell(entry, ContactField::Phone),
                email: self.cell(entry, ContactField::Email),
            })
            .collect();
        if rows.is_empty() {
            Listing::Empty
        } else {
            Listing::Rows(rows)
        }
    }

    fn cell<'a>(&'a self, entry: &'a DonorListEntry, field: ContactField) -> ContactCell<'a> {
        if !entry.can_reveal(field) {
            ContactCell::Disabled
        } else if self.reveal.is_revealed(&entry.id, field) {
            entry
                .contact(field)
                .map(ContactCell::Revealed)
                .unwrap_or(ContactCell::Disabled)
        } else {
            ContactCell::Hidden
        }
    }
}
