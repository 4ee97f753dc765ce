//! Content lifecycle shared by announcements, categories, links and inventory.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for titles and names.
pub const MAX_TITLE_LEN: usize = 255;

/// Publication status.
///
/// Only `draft -> published` and `published -> archived` are legal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl ContentStatus {
    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(Error::validation(
                "status",
                format!("unknown status '{other}' (expected draft, published or archived)"),
            )),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    /// Whether `self -> next` is a legal move.
    pub fn can_transition_to(&self, next: ContentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Published) | (Self::Published, Self::Archived)
        )
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: ContentStatus) -> Result<ContentStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }

    /// Archived content is read-only.
    pub fn is_editable(&self) -> bool {
        !matches!(self, Self::Archived)
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Announcement kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementKind {
    #[default]
    General,
    PlannedWork,
    Maintenance,
    Outage,
    Update,
    Information,
}

impl AnnouncementKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "general" => Ok(Self::General),
            "planned_work" => Ok(Self::PlannedWork),
            "maintenance" => Ok(Self::Maintenance),
            "outage" => Ok(Self::Outage),
            "update" => Ok(Self::Update),
            "information" => Ok(Self::Information),
            other => Err(Error::validation(
                "kind",
                format!("unknown announcement kind: {other}"),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::PlannedWork => "planned_work",
            Self::Maintenance => "maintenance",
            Self::Outage => "outage",
            Self::Update => "update",
            Self::Information => "information",
        }
    }
}

/// Announcement priority.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(Error::validation(
                "priority",
                format!("unknown priority: {other}"),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Inventory item type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryType {
    #[default]
    Server,
    Application,
}

impl InventoryType {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "server" => Ok(Self::Server),
            "application" => Ok(Self::Application),
            other => Err(Error::validation(
                "item_type",
                format!("unknown inventory type: {other}"),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Application => "application",
        }
    }
}

/// Validate a required, length-bounded text field and return it trimmed.
pub fn validate_title(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(Error::validation(
            field,
            format!("must be at most {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Validate that a link target is an absolute http(s) URL.
pub fn validate_url(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| Error::validation("url", "must start with http:// or https://"))?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(Error::validation("url", "must include a host"));
    }
    Ok(trimmed.to_string())
}

/// Validate a `#rrggbb` color.
pub fn validate_color(value: &str) -> Result<String> {
    let valid = value.len() == 7
        && value.starts_with('#')
        && value[1..].bytes().all(|b| b.is_ascii_hexdigit());
    if valid {
        Ok(value.to_ascii_lowercase())
    } else {
        Err(Error::validation("color", "must be a #rrggbb hex color"))
    }
}

/// URL slug: lowercase ASCII alphanumerics separated by single dashes.
///
/// Common Turkish letters are folded to ASCII first.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        let folded = match c {
            'ç' | 'Ç' => 'c',
            'ğ' | 'Ğ' => 'g',
            'ı' | 'I' | 'İ' => 'i',
            'ö' | 'Ö' => 'o',
            'ş' | 'Ş' => 's',
            'ü' | 'Ü' => 'u',
            other => other.to_ascii_lowercase(),
        };
        if folded.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(folded);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("item");
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ContentStatus; 3] = [
        ContentStatus::Draft,
        ContentStatus::Published,
        ContentStatus::Archived,
    ];

    #[test]
    fn test_only_forward_adjacent_transitions_are_legal() {
        let legal = [
            (ContentStatus::Draft, ContentStatus::Published),
            (ContentStatus::Published, ContentStatus::Archived),
        ];
        for from in ALL {
            for to in ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to} should be {}",
                    if expected { "legal" } else { "illegal" }
                );
                assert_eq!(from.transition(to).is_ok(), expected);
            }
        }
    }

    #[test]
    fn test_transition_error_names_both_states() {
        let err = ContentStatus::Archived
            .transition(ContentStatus::Draft)
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid status transition: archived -> draft");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(ContentStatus::parse("published").unwrap(), ContentStatus::Published);
        assert!(matches!(
            ContentStatus::parse("scheduled"),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Planned DB Maintenance!"), "planned-db-maintenance");
        assert_eq!(slugify("  Şebeke Çalışması  "), "sebeke-calismasi");
        assert_eq!(slugify("---"), "item");
    }

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("title", "  Hello ").unwrap(), "Hello");
        assert!(validate_title("title", "   ").is_err());
        assert!(validate_title("title", &"x".repeat(MAX_TITLE_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_url_and_color() {
        assert!(validate_url("https://wiki.example.com/page").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("https://").is_err());
        assert_eq!(validate_color("#A1B2C3").unwrap(), "#a1b2c3");
        assert!(validate_color("red").is_err());
    }
}
