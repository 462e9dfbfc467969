use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    entities::{
        account::{Account, Plan, User},
        preset::ImagePreset,
    },
    errors::AppError,
    repositories::sqlx_repo::SqlxAccountRepo,
};

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// The user with their plan and the presets that plan enables.
    async fn get_account(&self, user_id: &Uuid) -> Result<Option<Account>, AppError>;
}

impl SqlxAccountRepo {
    pub fn new(pool: sqlx::PgPool) -> Self {
        SqlxAccountRepo { pool }
    }
}

#[async_trait]
impl AccountRepository for SqlxAccountRepo {
    async fn get_account(&self, user_id: &Uuid) -> Result<Option<Account>, AppError> {
        let Some(user) = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let Some(plan_id) = user.plan_id else {
            return Ok(Some(Account { user, plan: None, presets: Vec::new() }));
        };

        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await?;

        let presets = sqlx::query_as::<_, ImagePreset>(
            r#"
            SELECT p.*
            FROM image_presets p
            JOIN plan_presets pp ON pp.preset_id = p.id
            WHERE pp.plan_id = $1
            ORDER BY p.name
            "#
        )
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Account { user, plan, presets }))
    }
}
