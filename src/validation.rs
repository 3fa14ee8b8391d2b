//! Client-side form validation for lead, client, conversion and scoring
//! config submissions.
//!
//! Validation runs field by field and collects every failure. A form that
//! fails validation is never sent to the backend.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

pub const SECTORS: &[&str] = &["manufacturing", "trading", "services"];
pub const SIZES: &[&str] = &["small", "medium", "large"];
pub const SOURCES: &[&str] = &["referral", "partner", "indiamart", "justdial", "website", "cold"];
pub const STATUSES: &[&str] = &[
    "new",
    "contacted",
    "qualified",
    "proposal",
    "negotiation",
    "won",
    "lost",
];
pub const REVENUE_BANDS: &[&str] = &["0-50k", "50k-2L", "2L-5L", "5L+"];

const MAX_NAME_LEN: usize = 100;
const MAX_COMPANY_LEN: usize = 150;
const MAX_EMAIL_LEN: usize = 100;
const MAX_PHONE_LEN: usize = 20;

/// Per-field validation failures, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub fields: BTreeMap<&'static str, String>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_insert_with(|| message.into());
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex should compile")
    })
}

fn config_key_regex() -> &'static Regex {
    static CONFIG_KEY_RE: OnceLock<Regex> = OnceLock::new();
    CONFIG_KEY_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("config key regex should compile"))
}

fn required(errors: &mut ValidationErrors, field: &'static str, value: &str, label: &str, max: usize) {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, format!("{label} is required"));
    } else if value.chars().count() > max {
        errors.add(field, format!("{label} must be at most {max} characters"));
    }
}

fn optional_max(errors: &mut ValidationErrors, field: &'static str, value: Option<&str>, max: usize) {
    if let Some(value) = value {
        if value.chars().count() > max {
            errors.add(field, format!("Must be at most {max} characters"));
        }
    }
}

fn optional_email(errors: &mut ValidationErrors, value: Option<&str>) {
    if let Some(email) = value {
        if email.chars().count() > MAX_EMAIL_LEN {
            errors.add("email", format!("Must be at most {MAX_EMAIL_LEN} characters"));
        } else if !email_regex().is_match(email) {
            errors.add("email", "Invalid email address");
        }
    }
}

fn one_of(errors: &mut ValidationErrors, field: &'static str, value: &str, allowed: &[&str]) {
    if !allowed.contains(&value) {
        errors.add(field, format!("Must be one of: {}", allowed.join(", ")));
    }
}

/// Blank optional inputs are treated as absent.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Lead intake
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadForm {
    pub company: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub sector: String,
    pub size: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interested_modules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for LeadForm {
    fn default() -> Self {
        Self {
            company: String::new(),
            name: String::new(),
            email: None,
            phone: None,
            sector: "services".to_string(),
            size: "small".to_string(),
            source: "cold".to_string(),
            city: None,
            region: None,
            interested_modules: None,
            notes: None,
        }
    }
}

impl LeadForm {
    /// Trim every field and drop blank optionals.
    pub fn normalized(self) -> Self {
        Self {
            company: self.company.trim().to_string(),
            name: self.name.trim().to_string(),
            email: clean(self.email),
            phone: clean(self.phone),
            sector: self.sector.trim().to_lowercase(),
            size: self.size.trim().to_lowercase(),
            source: self.source.trim().to_lowercase(),
            city: clean(self.city),
            region: clean(self.region),
            interested_modules: clean(self.interested_modules),
            notes: clean(self.notes),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        required(&mut errors, "company", &self.company, "Company name", MAX_COMPANY_LEN);
        required(&mut errors, "name", &self.name, "Contact name", MAX_NAME_LEN);
        optional_email(&mut errors, self.email.as_deref());
        optional_max(&mut errors, "phone", self.phone.as_deref(), MAX_PHONE_LEN);
        one_of(&mut errors, "sector", &self.sector, SECTORS);
        one_of(&mut errors, "size", &self.size, SIZES);
        one_of(&mut errors, "source", &self.source, SOURCES);
        errors.into_result()
    }
}

/// Partial lead edit. Only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeadUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl LeadUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.is_empty() {
            errors.add("update", "Nothing to update");
        }
        if let Some(company) = &self.company {
            required(&mut errors, "company", company, "Company name", MAX_COMPANY_LEN);
        }
        if let Some(name) = &self.name {
            required(&mut errors, "name", name, "Contact name", MAX_NAME_LEN);
        }
        optional_email(&mut errors, self.email.as_deref());
        optional_max(&mut errors, "phone", self.phone.as_deref(), MAX_PHONE_LEN);
        if let Some(sector) = &self.sector {
            one_of(&mut errors, "sector", sector, SECTORS);
        }
        if let Some(size) = &self.size {
            one_of(&mut errors, "size", size, SIZES);
        }
        if let Some(source) = &self.source {
            one_of(&mut errors, "source", source, SOURCES);
        }
        if let Some(status) = &self.status {
            one_of(&mut errors, "status", status, STATUSES);
        }
        errors.into_result()
    }
}

// ---------------------------------------------------------------------------
// Client onboarding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientForm {
    pub company: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub sector: String,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_products: Option<String>,
    pub annual_revenue_band: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_manager: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for ClientForm {
    fn default() -> Self {
        Self {
            company: String::new(),
            name: String::new(),
            email: None,
            phone: None,
            sector: "services".to_string(),
            size: "small".to_string(),
            city: None,
            region: None,
            existing_products: None,
            annual_revenue_band: "50k-2L".to_string(),
            account_manager: None,
            notes: None,
        }
    }
}

impl ClientForm {
    pub fn normalized(self) -> Self {
        Self {
            company: self.company.trim().to_string(),
            name: self.name.trim().to_string(),
            email: clean(self.email),
            phone: clean(self.phone),
            sector: self.sector.trim().to_lowercase(),
            size: self.size.trim().to_lowercase(),
            city: clean(self.city),
            region: clean(self.region),
            existing_products: clean(self.existing_products),
            annual_revenue_band: self.annual_revenue_band.trim().to_string(),
            account_manager: clean(self.account_manager),
            notes: clean(self.notes),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        required(&mut errors, "company", &self.company, "Company name", MAX_COMPANY_LEN);
        required(&mut errors, "name", &self.name, "Primary contact name", MAX_NAME_LEN);
        optional_email(&mut errors, self.email.as_deref());
        optional_max(&mut errors, "phone", self.phone.as_deref(), MAX_PHONE_LEN);
        one_of(&mut errors, "sector", &self.sector, SECTORS);
        one_of(&mut errors, "size", &self.size, SIZES);
        one_of(&mut errors, "annual_revenue_band", &self.annual_revenue_band, REVENUE_BANDS);
        errors.into_result()
    }
}

// ---------------------------------------------------------------------------
// Conversion and scoring config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_manager: Option<String>,
    pub initial_products: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for ConversionForm {
    fn default() -> Self {
        Self {
            account_manager: None,
            initial_products: "tallyprime".to_string(),
            notes: None,
        }
    }
}

impl ConversionForm {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.initial_products.trim().is_empty() {
            errors.add("initial_products", "Initial license is required");
        }
        optional_max(&mut errors, "account_manager", self.account_manager.as_deref(), MAX_NAME_LEN);
        errors.into_result()
    }
}

pub fn validate_config_update(key: &str, value: f64) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if key.trim().is_empty() {
        errors.add("key", "Config key is required");
    } else if !config_key_regex().is_match(key) {
        errors.add("key", "Config key may only contain letters, digits and underscores");
    }
    if !value.is_finite() {
        errors.add("value", "Value must be a number");
    } else if value < 0.0 {
        errors.add("value", "Value must not be negative");
    }
    errors.into_result()
}
