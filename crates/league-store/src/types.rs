use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use league_core::scoring::ScoredRanking;
use league_core::{RankingWithMeta, TeamId};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    #[default]
    Pending,
    Paid,
    Ready,
}

impl EntryStatus {
    /// Status only ever moves forward; re-asserting the current one is fine.
    pub fn can_transition_to(self, next: EntryStatus) -> bool {
        next >= self
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Paid => "paid",
            EntryStatus::Ready => "ready",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EntryStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "paid" => Ok(EntryStatus::Paid),
            "ready" => Ok(EntryStatus::Ready),
            other => Err(StoreError::Validation(format!("unknown entry status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Paypal,
    Other,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Paypal => write!(f, "paypal"),
            PaymentMethod::Other => write!(f, "other"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paypal" => Ok(PaymentMethod::Paypal),
            "other" => Ok(PaymentMethod::Other),
            other => Err(StoreError::Validation(format!("unknown payment method: {other}"))),
        }
    }
}

/// A participant's registration for one season within one realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub short_code: String,
    pub season_id: String,
    pub realm_name: String,
    pub entrant_name: String,
    pub entrant_nickname: String,
    pub entrant_email: String,
    pub status: EntryStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_ref: Option<String>,
    /// Null until an admin approves the entry.
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }

    /// Check the fields an insert or update must never persist wrong.
    pub fn validate(&self) -> Result<(), StoreError> {
        let required = [
            ("short_code", &self.short_code),
            ("season_id", &self.season_id),
            ("realm_name", &self.realm_name),
            ("entrant_name", &self.entrant_name),
            ("entrant_nickname", &self.entrant_nickname),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(StoreError::Validation(format!("{field} must not be empty")));
            }
        }
        if !is_valid_email(&self.entrant_email) {
            return Err(StoreError::Validation(format!(
                "invalid email address: {}",
                self.entrant_email
            )));
        }
        Ok(())
    }
}

/// One `@`, something before it, and a dotted domain
/// without whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// One submitted ordering of the season's teams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPrediction {
    pub id: String,
    pub entry_id: String,
    pub rankings: Vec<TeamId>,
    pub created_at: DateTime<Utc>,
}

/// The observed league table for one (season, round).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standings {
    pub id: String,
    pub season_id: String,
    pub round_number: u32,
    pub rankings: Vec<RankingWithMeta>,
    pub finalised: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Standings {
    /// When this table was last observed.
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredEntryPrediction {
    pub entry_prediction_id: String,
    pub standings_id: String,
    pub rankings: Vec<ScoredRanking>,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Auth,
    EntryRegistration,
    MagicLogin,
    Prediction,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenType::Auth => "auth",
            TokenType::EntryRegistration => "entry_registration",
            TokenType::MagicLogin => "magic_login",
            TokenType::Prediction => "prediction",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TokenType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(TokenType::Auth),
            "entry_registration" => Ok(TokenType::EntryRegistration),
            "magic_login" => Ok(TokenType::MagicLogin),
            "prediction" => Ok(TokenType::Prediction),
            other => Err(StoreError::Validation(format!("unknown token type: {other}"))),
        }
    }
}

/// A short-lived credential issued by the authentication flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub token_type: TokenType,
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
