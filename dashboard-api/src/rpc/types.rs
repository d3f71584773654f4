//! Application types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_rpc::{RichValue, Validate, ValidationResult, ValidationRules};

/// Longest accepted Discord id.
pub const DISCORD_ID_MAX_CHARS: usize = 20;

/// Longest accepted category name.
pub const CATEGORY_NAME_MAX_CHARS: usize = 50;

// =============================================================================
// Accounts
// =============================================================================

/// Subscription plan of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    #[default]
    Free,
    Pro,
}

impl Plan {
    /// Categories a user may own.
    pub fn category_limit(&self) -> usize {
        match self {
            Self::Free => 3,
            Self::Pro => 10,
        }
    }

    /// Events a user may record per calendar month.
    pub fn monthly_event_limit(&self) -> u64 {
        match self {
            Self::Free => 100,
            Self::Pro => 1000,
        }
    }
}

/// User entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub plan: Plan,
    pub discord_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>, plan: Plan) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            plan,
            discord_id: None,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Categories
// =============================================================================

/// A named bucket events are recorded into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCategory {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Lowercase `#rrggbb`
    pub color: String,
    pub emoji: Option<String>,
    pub created_at: DateTime<Utc>,
    pub events_count: u64,
}

impl From<&EventCategory> for RichValue {
    fn from(category: &EventCategory) -> Self {
        RichValue::object([
            ("id", RichValue::from(category.id.as_str())),
            ("name", RichValue::from(category.name.as_str())),
            ("color", RichValue::from(category.color.as_str())),
            ("emoji", RichValue::from(category.emoji.clone())),
            ("createdAt", RichValue::from(category.created_at)),
            ("eventsCount", RichValue::from(category.events_count)),
        ])
    }
}

/// Fields of a category about to be created.
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
    pub emoji: Option<String>,
}

// =============================================================================
// Inputs
// =============================================================================

/// Input of `project.setDiscordID`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDiscordIdInput {
    pub discord_id: String,
}

impl Validate for SetDiscordIdInput {
    fn validate(&self) -> ValidationResult {
        ValidationRules::new()
            .max_chars("discordId", &self.discord_id, DISCORD_ID_MAX_CHARS)
            .build()
    }
}

/// Input of `category.createEventCategory`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub emoji: Option<String>,
}

impl Validate for CreateCategoryInput {
    fn validate(&self) -> ValidationResult {
        let mut rules = ValidationRules::new()
            .required("name", &self.name)
            .max_chars("name", &self.name, CATEGORY_NAME_MAX_CHARS)
            .pattern("color", &self.color, r"^#[0-9a-fA-F]{6}$", "a hex color (#rrggbb)");
        if !self.name.trim().is_empty() {
            rules = rules.pattern(
                "name",
                &self.name,
                r"^[\w ]+$",
                "letters, numbers, underscores or spaces",
            );
        }
        if let Some(emoji) = &self.emoji {
            rules = rules.required("emoji", emoji);
        }
        rules.build()
    }
}

impl From<CreateCategoryInput> for NewCategory {
    fn from(input: CreateCategoryInput) -> Self {
        Self {
            name: input.name.trim().to_string(),
            color: input.color.to_ascii_lowercase(),
            emoji: input.emoji,
        }
    }
}

/// Input of `category.deleteCategory`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteCategoryInput {
    pub name: String,
}

impl Validate for DeleteCategoryInput {
    fn validate(&self) -> ValidationResult {
        ValidationRules::new().required("name", &self.name).build()
    }
}

// =============================================================================
// General Types
// =============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Acknowledgement of a mutation without a payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, color: &str, emoji: Option<&str>) -> CreateCategoryInput {
        CreateCategoryInput {
            name: name.to_string(),
            color: color.to_string(),
            emoji: emoji.map(str::to_string),
        }
    }

    #[test]
    fn test_plan_limits() {
        assert_eq!(Plan::Free.category_limit(), 3);
        assert_eq!(Plan::Free.monthly_event_limit(), 100);
        assert_eq!(Plan::Pro.category_limit(), 10);
        assert_eq!(Plan::Pro.monthly_event_limit(), 1000);
        assert_eq!(serde_json::to_value(Plan::Pro).unwrap(), "PRO");
    }

    #[test]
    fn test_category_input_rules() {
        assert!(category("sales", "#FF6B6B", Some("💰")).validate().is_valid());
        assert!(category("user signups 2", "#00aa00", None).validate().is_valid());

        for blank in ["", "   "] {
            let result = category(blank, "#00aa00", None).validate();
            assert_eq!(result.errors().len(), 1);
            assert_eq!(result.errors()[0].code, "required");
        }

        let punctuated = category("sales!", "#00aa00", None).validate();
        assert_eq!(punctuated.errors()[0].field, "name");

        let long = category(&"a".repeat(51), "#00aa00", None).validate();
        assert_eq!(long.errors()[0].code, "max_length");

        let color = category("sales", "red", None).validate();
        assert_eq!(color.errors()[0].field, "color");

        let blank_emoji = category("sales", "#00aa00", Some(" ")).validate();
        assert_eq!(blank_emoji.errors()[0].field, "emoji");
    }

    #[test]
    fn test_new_category_normalizes() {
        let new = NewCategory::from(category(" sales ", "#FF6B6B", None));
        assert_eq!(new.name, "sales");
        assert_eq!(new.color, "#ff6b6b");
    }

    #[test]
    fn test_category_value_keeps_dates() {
        let created_at = Utc::now();
        let value = RichValue::from(&EventCategory {
            id: "c1".into(),
            user_id: "u1".into(),
            name: "sales".into(),
            color: "#ff6b6b".into(),
            emoji: None,
            created_at,
            events_count: 4,
        });
        assert_eq!(value.get("createdAt").and_then(RichValue::as_date), Some(&created_at));
        assert_eq!(value.get("emoji"), Some(&RichValue::Null));
        assert!(value.get("userId").is_none());
    }
}
