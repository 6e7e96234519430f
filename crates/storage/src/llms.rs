//! Provider catalog and the llms registered under each provider.

use crate::{
    Llm, Provider, Result, Storage, StorageError, new_public_id, now_ms,
    types::datetime_from_millis,
};

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct ProviderRow {
    provider_id: String,
    name: String,
    api_endpoint: String,
    api_key: Option<String>,
    created_at: i64,
}

impl From<ProviderRow> for Provider {
    fn from(r: ProviderRow) -> Self {
        Self {
            provider_id: r.provider_id,
            name: r.name,
            api_endpoint: r.api_endpoint,
            api_key: r.api_key,
            created_at: datetime_from_millis(r.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct LlmRow {
    llm_id: String,
    name: String,
    provider_public_id: String,
    created_at: i64,
}

impl From<LlmRow> for Llm {
    fn from(r: LlmRow) -> Self {
        Self {
            llm_id: r.llm_id,
            name: r.name,
            provider_id: r.provider_public_id,
            created_at: datetime_from_millis(r.created_at),
        }
    }
}

/// Llm rows join their provider to expose the public provider id.
const LLM_SELECT: &str = r#"SELECT l.llm_id, l.name, p.provider_id AS provider_public_id, l.created_at
    FROM llms l JOIN providers p ON p.id = l.provider_id"#;

impl Storage {
    pub async fn create_provider(
        &self,
        name: &str,
        api_endpoint: &str,
        api_key: Option<&str>,
    ) -> Result<Provider> {
        let taken = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM providers WHERE name = ? AND deleted_at IS NULL",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        if taken.is_some() {
            return Err(StorageError::duplicate("provider", name));
        }

        let provider_id = new_public_id();
        sqlx::query(
            r#"INSERT INTO providers (provider_id, name, api_endpoint, api_key, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&provider_id)
        .bind(name)
        .bind(api_endpoint)
        .bind(api_key)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        self.get_provider(&provider_id).await
    }

    pub async fn get_provider(&self, provider_id: &str) -> Result<Provider> {
        let row = sqlx::query_as::<_, ProviderRow>(
            "SELECT * FROM providers WHERE provider_id = ? AND deleted_at IS NULL",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Into::into)
            .ok_or_else(|| StorageError::not_found("provider", provider_id))
    }

    pub async fn list_providers(&self) -> Result<Vec<Provider>> {
        let rows = sqlx::query_as::<_, ProviderRow>(
            "SELECT * FROM providers WHERE deleted_at IS NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Update a provider in place; `None` fields keep their current value.
    pub async fn update_provider(
        &self,
        provider_id: &str,
        name: Option<&str>,
        api_endpoint: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Provider> {
        let current = self.get_provider(provider_id).await?;
        let name = name.unwrap_or(&current.name);
        if name != current.name {
            let taken = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM providers WHERE name = ? AND deleted_at IS NULL AND provider_id != ?",
            )
            .bind(name)
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;
            if taken.is_some() {
                return Err(StorageError::duplicate("provider", name));
            }
        }

        sqlx::query(
            r#"UPDATE providers SET name = ?, api_endpoint = ?, api_key = ?
               WHERE provider_id = ? AND deleted_at IS NULL"#,
        )
        .bind(name)
        .bind(api_endpoint.unwrap_or(&current.api_endpoint))
        .bind(api_key.or(current.api_key.as_deref()))
        .bind(provider_id)
        .execute(&self.pool)
        .await?;

        self.get_provider(provider_id).await
    }

    pub async fn delete_provider(&self, provider_id: &str) -> Result<()> {
        let done = sqlx::query(
            "UPDATE providers SET deleted_at = ? WHERE provider_id = ? AND deleted_at IS NULL",
        )
        .bind(now_ms())
        .bind(provider_id)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(StorageError::not_found("provider", provider_id));
        }
        Ok(())
    }

    /// Register an llm under a live provider.
    pub async fn create_llm(&self, provider_id: &str, name: &str) -> Result<Llm> {
        let provider_ref = self.provider_ref(provider_id).await?;
        let llm_id = new_public_id();
        sqlx::query(
            "INSERT INTO llms (llm_id, provider_id, name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&llm_id)
        .bind(provider_ref)
        .bind(name)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        self.get_llm(&llm_id).await
    }

    pub async fn get_llm(&self, llm_id: &str) -> Result<Llm> {
        let sql = format!("{LLM_SELECT} WHERE l.llm_id = ? AND l.deleted_at IS NULL");
        let row = sqlx::query_as::<_, LlmRow>(&sql)
            .bind(llm_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Into::into)
            .ok_or_else(|| StorageError::not_found("llm", llm_id))
    }

    pub async fn list_llms(&self) -> Result<Vec<Llm>> {
        let sql = format!("{LLM_SELECT} WHERE l.deleted_at IS NULL ORDER BY l.id");
        let rows = sqlx::query_as::<_, LlmRow>(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_llms_by_provider(&self, provider_id: &str) -> Result<Vec<Llm>> {
        let provider_ref = self.provider_ref(provider_id).await?;
        let sql = format!("{LLM_SELECT} WHERE l.provider_id = ? AND l.deleted_at IS NULL ORDER BY l.id");
        let rows = sqlx::query_as::<_, LlmRow>(&sql)
            .bind(provider_ref)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn update_llm(&self, llm_id: &str, name: &str) -> Result<Llm> {
        let done = sqlx::query("UPDATE llms SET name = ? WHERE llm_id = ? AND deleted_at IS NULL")
            .bind(name)
            .bind(llm_id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StorageError::not_found("llm", llm_id));
        }
        self.get_llm(llm_id).await
    }

    pub async fn delete_llm(&self, llm_id: &str) -> Result<()> {
        let done = sqlx::query(
            "UPDATE llms SET deleted_at = ? WHERE llm_id = ? AND deleted_at IS NULL",
        )
        .bind(now_ms())
        .bind(llm_id)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(StorageError::not_found("llm", llm_id));
        }
        Ok(())
    }

    /// Public provider id → internal key, live rows only.
    pub(crate) async fn provider_ref(&self, provider_id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM providers WHERE provider_id = ? AND deleted_at IS NULL",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::not_found("provider", provider_id))
    }

    /// Public llm id → internal key, live rows only.
    pub(crate) async fn llm_ref(&self, llm_id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM llms WHERE llm_id = ? AND deleted_at IS NULL")
            .bind(llm_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found("llm", llm_id))
    }
}
