//! User rows, the recording flag, and the instruction audit records.

use crate::{
    InstructionRecord, Result, Storage, StorageError, User, new_public_id, now_ms,
    types::datetime_from_millis,
};

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub profile: Option<String>,
    pub record_instructions: i64,
    pub created_at: i64,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            user_id: r.user_id,
            username: r.username,
            display_name: r.display_name,
            profile: r.profile,
            record_instructions: r.record_instructions != 0,
            created_at: datetime_from_millis(r.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    record_id: String,
    chat_public_id: Option<String>,
    instruction: String,
    created_at: i64,
}

impl From<RecordRow> for InstructionRecord {
    fn from(r: RecordRow) -> Self {
        Self {
            record_id: r.record_id,
            chat_id: r.chat_public_id,
            instruction: r.instruction,
            timestamp: datetime_from_millis(r.created_at),
        }
    }
}

impl Storage {
    pub async fn create_user(
        &self,
        username: &str,
        display_name: &str,
        profile: Option<&str>,
    ) -> Result<User> {
        let taken = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM users WHERE username = ? AND deleted_at IS NULL",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        if taken.is_some() {
            return Err(StorageError::duplicate("user", username));
        }

        let user_id = new_public_id();
        sqlx::query(
            r#"INSERT INTO users (user_id, username, display_name, profile, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&user_id)
        .bind(username)
        .bind(display_name)
        .bind(profile)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        self.get_user(&user_id).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE user_id = ? AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Into::into)
            .ok_or_else(|| StorageError::not_found("user", user_id))
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE username = ? AND deleted_at IS NULL",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Into::into)
            .ok_or_else(|| StorageError::not_found("user", username))
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows =
            sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE deleted_at IS NULL ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Update a user in place; `None` fields keep their current value.
    pub async fn update_user(
        &self,
        user_id: &str,
        username: Option<&str>,
        display_name: Option<&str>,
        profile: Option<&str>,
    ) -> Result<User> {
        let current = self.get_user(user_id).await?;
        let username = username.unwrap_or(&current.username);
        if username != current.username {
            let taken = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM users WHERE username = ? AND deleted_at IS NULL AND user_id != ?",
            )
            .bind(username)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            if taken.is_some() {
                return Err(StorageError::duplicate("user", username));
            }
        }

        sqlx::query(
            r#"UPDATE users SET username = ?, display_name = ?, profile = ?
               WHERE user_id = ? AND deleted_at IS NULL"#,
        )
        .bind(username)
        .bind(display_name.unwrap_or(&current.display_name))
        .bind(profile.or(current.profile.as_deref()))
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        self.get_user(user_id).await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        let done = sqlx::query(
            "UPDATE users SET deleted_at = ? WHERE user_id = ? AND deleted_at IS NULL",
        )
        .bind(now_ms())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(StorageError::not_found("user", user_id));
        }
        Ok(())
    }

    pub async fn set_instruction_recording(&self, user_id: &str, enabled: bool) -> Result<()> {
        let done = sqlx::query(
            "UPDATE users SET record_instructions = ? WHERE user_id = ? AND deleted_at IS NULL",
        )
        .bind(i64::from(enabled))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(StorageError::not_found("user", user_id));
        }
        Ok(())
    }

    /// Append one audit record. An unknown chat id is recorded as no chat
    /// rather than failing the instruction being audited.
    pub async fn record_instruction(
        &self,
        user_id: &str,
        chat_id: Option<&str>,
        instruction: &str,
    ) -> Result<()> {
        let user_ref = self.user_ref(user_id).await?;
        let chat_ref = match chat_id {
            Some(chat_id) => match self.chat_ref(chat_id).await {
                Ok(id) => Some(id),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        sqlx::query(
            r#"INSERT INTO instruction_records (record_id, user_id, chat_id, instruction, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(new_public_id())
        .bind(user_ref)
        .bind(chat_ref)
        .bind(instruction)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_instruction_records(&self, user_id: &str) -> Result<Vec<InstructionRecord>> {
        let user_ref = self.user_ref(user_id).await?;
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"SELECT r.record_id, c.chat_id AS chat_public_id, r.instruction, r.created_at
               FROM instruction_records r
               LEFT JOIN chats c ON c.id = r.chat_id
               WHERE r.user_id = ?
               ORDER BY r.id"#,
        )
        .bind(user_ref)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delete all audit records for a user; returns how many went away.
    pub async fn delete_instruction_records(&self, user_id: &str) -> Result<u64> {
        let user_ref = self.user_ref(user_id).await?;
        let done = sqlx::query("DELETE FROM instruction_records WHERE user_id = ?")
            .bind(user_ref)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    /// Public user id → internal key, live rows only.
    pub(crate) async fn user_ref(&self, user_id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM users WHERE user_id = ? AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::not_found("user", user_id))
    }
}
