//! # Activities
//!
//! An activity is one line of raw consumption data handed over by ingestion:
//! litres of diesel, kWh on a utility bill, dollars spent on software. The
//! engine only ever reads activities, so the contract is a read-only trait.
//!
//! Callers with their own domain types implement [`Activity`] directly;
//! everyone else can use [`ActivityRecord`], which deserializes from JSON.
//!
//! ## Example
//!
//! ```rust
//! use emissions_core::activity::{Activity, ActivityRecord};
//!
//! let diesel = ActivityRecord::new("act-001", "fleet", 100.0, "L")
//!     .with_category("diesel")
//!     .with_location("US-WEST");
//!
//! assert_eq!(diesel.source(), "fleet");
//! assert_eq!(diesel.quantity(), 100.0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Read-only view of an activity record.
///
/// An activity whose `id` is blank is treated as absent and rejected with
/// [`crate::EmissionsError::NilActivity`].
pub trait Activity: Send + Sync {
    fn id(&self) -> &str;
    /// Emission source, e.g. "fleet", "electricity", "travel"
    fn source(&self) -> &str;
    /// Sub-type within the source, e.g. "diesel" or "flight-long"
    fn category(&self) -> &str;
    /// Region code, e.g. "US-WEST", "EU-FRANCE"
    fn location(&self) -> &str;
    fn quantity(&self) -> f64;
    fn unit(&self) -> &str;
    fn period_start(&self) -> Option<DateTime<Utc>>;
    fn period_end(&self) -> Option<DateTime<Utc>>;
    fn org_id(&self) -> &str;
    fn workspace_id(&self) -> &str;

    /// True when the activity carries an identifier.
    fn is_present(&self) -> bool {
        !self.id().trim().is_empty()
    }
}

/// Plain activity data, usable as-is or deserialized from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(default)]
    pub period_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub workspace_id: String,
}

impl ActivityRecord {
    /// Create an activity with the four fields every calculation needs.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        quantity: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            category: String::new(),
            location: String::new(),
            quantity,
            unit: unit.into(),
            period_start: None,
            period_end: None,
            org_id: String::new(),
            workspace_id: String::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_period(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.period_start = Some(start);
        self.period_end = Some(end);
        self
    }

    pub fn with_org(mut self, org_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        self.org_id = org_id.into();
        self.workspace_id = workspace_id.into();
        self
    }
}

impl Activity for ActivityRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn quantity(&self) -> f64 {
        self.quantity
    }

    fn unit(&self) -> &str {
        &self.unit
    }

    fn period_start(&self) -> Option<DateTime<Utc>> {
        self.period_start
    }

    fn period_end(&self) -> Option<DateTime<Utc>> {
        self.period_end
    }

    fn org_id(&self) -> &str {
        &self.org_id
    }

    fn workspace_id(&self) -> &str {
        &self.workspace_id
    }
}

macro_rules! forward_activity {
    ($($ptr:ty),*) => {
        $(
            impl<T: Activity + ?Sized> Activity for $ptr {
                fn id(&self) -> &str { (**self).id() }
                fn source(&self) -> &str { (**self).source() }
                fn category(&self) -> &str { (**self).category() }
                fn location(&self) -> &str { (**self).location() }
                fn quantity(&self) -> f64 { (**self).quantity() }
                fn unit(&self) -> &str { (**self).unit() }
                fn period_start(&self) -> Option<DateTime<Utc>> { (**self).period_start() }
                fn period_end(&self) -> Option<DateTime<Utc>> { (**self).period_end() }
                fn org_id(&self) -> &str { (**self).org_id() }
                fn workspace_id(&self) -> &str { (**self).workspace_id() }
            }
        )*
    };
}

forward_activity!(&T, Box<T>, Arc<T>);

/// An activity seen with a fallback location when its own is blank.
pub(crate) struct WithDefaultLocation<'a> {
    inner: &'a dyn Activity,
    default_location: &'a str,
}

impl<'a> WithDefaultLocation<'a> {
    pub(crate) fn new(inner: &'a dyn Activity, default_location: &'a str) -> Self {
        Self {
            inner,
            default_location,
        }
    }
}

impl Activity for WithDefaultLocation<'_> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn source(&self) -> &str {
        self.inner.source()
    }

    fn category(&self) -> &str {
        self.inner.category()
    }

    fn location(&self) -> &str {
        match self.inner.location() {
            location if location.trim().is_empty() => self.default_location,
            location => location,
        }
    }

    fn quantity(&self) -> f64 {
        self.inner.quantity()
    }

    fn unit(&self) -> &str {
        self.inner.unit()
    }

    fn period_start(&self) -> Option<DateTime<Utc>> {
        self.inner.period_start()
    }

    fn period_end(&self) -> Option<DateTime<Utc>> {
        self.inner.period_end()
    }

    fn org_id(&self) -> &str {
        self.inner.org_id()
    }

    fn workspace_id(&self) -> &str {
        self.inner.workspace_id()
    }
}
