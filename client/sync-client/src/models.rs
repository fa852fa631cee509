use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Mark one notification as read, leaving the rest untouched
pub fn mark_read(notifications: &[Notification], id: &str) -> Vec<Notification> {
    notifications
        .iter()
        .map(|n| Notification {
            read: n.read || n.id == id,
            ..n.clone()
        })
        .collect()
}

pub fn mark_all_read(notifications: &[Notification]) -> Vec<Notification> {
    notifications
        .iter()
        .map(|n| Notification {
            read: true,
            ..n.clone()
        })
        .collect()
}

pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    /// Set for business accounts
    #[serde(default)]
    pub business_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile update; `None` fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, profile: &Profile) -> Profile {
        Profile {
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| profile.display_name.clone()),
            avatar_url: self.avatar_url.clone().or_else(|| profile.avatar_url.clone()),
            bio: self.bio.clone().or_else(|| profile.bio.clone()),
            business_name: self
                .business_name
                .clone()
                .or_else(|| profile.business_name.clone()),
            ..profile.clone()
        }
    }
}
