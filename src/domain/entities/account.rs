use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::preset::ImagePreset;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub can_generate_expiring_links: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(name: &str, can_generate_expiring_links: bool) -> Self {
        let now = Utc::now();
        Plan {
            id: Uuid::new_v4(),
            name: name.to_string(),
            can_generate_expiring_links,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub plan_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: &str, plan_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            plan_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A user together with the plan they are subscribed to and the presets
/// that plan enables.
#[derive(Debug, Clone)]
pub struct Account {
    pub user: User,
    pub plan: Option<Plan>,
    pub presets: Vec<ImagePreset>,
}

impl Account {
    /// Users without a plan get no presets and no expiring links.
    pub fn can_generate_expiring_links(&self) -> bool {
        self.plan
            .as_ref()
            .is_some_and(|plan| plan.can_generate_expiring_links)
    }
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub username: String,
    pub plan: Option<String>,
    pub can_generate_expiring_links: bool,
    pub presets: Vec<String>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        AccountResponse {
            id: account.user.id,
            username: account.user.username.clone(),
            can_generate_expiring_links: account.can_generate_expiring_links(),
            plan: account.plan.map(|plan| plan.name),
            presets: account.presets.into_iter().map(|preset| preset.name).collect(),
        }
    }
}
