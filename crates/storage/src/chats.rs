//! Chats and their membership join table.

use crate::{
    Chat, Result, Storage, StorageError, User, new_public_id, now_ms,
    types::datetime_from_millis, users::UserRow,
};

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct ChatRow {
    id: i64,
    chat_id: String,
    title: String,
    created_at: i64,
}

impl Storage {
    /// Create a chat with the given member users, atomically.
    ///
    /// Every member id must name a live user; otherwise nothing is written.
    pub async fn create_chat(&self, title: &str, member_ids: &[String]) -> Result<Chat> {
        let mut txn = self.pool.begin().await?;

        let mut members = Vec::with_capacity(member_ids.len());
        for user_id in member_ids {
            let user_ref = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM users WHERE user_id = ? AND deleted_at IS NULL",
            )
            .bind(user_id)
            .fetch_optional(&mut *txn)
            .await?
            .ok_or_else(|| StorageError::not_found("user", user_id.as_str()))?;
            members.push(user_ref);
        }

        let chat_id = new_public_id();
        let done = sqlx::query("INSERT INTO chats (chat_id, title, created_at) VALUES (?, ?, ?)")
            .bind(&chat_id)
            .bind(title)
            .bind(now_ms())
            .execute(&mut *txn)
            .await?;
        let chat_ref = done.last_insert_rowid();

        for user_ref in members {
            sqlx::query("INSERT OR IGNORE INTO chat_members (chat_id, user_id) VALUES (?, ?)")
                .bind(chat_ref)
                .bind(user_ref)
                .execute(&mut *txn)
                .await?;
        }
        txn.commit().await?;

        self.get_chat(&chat_id).await
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Chat> {
        let row = sqlx::query_as::<_, ChatRow>(
            "SELECT * FROM chats WHERE chat_id = ? AND deleted_at IS NULL",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::not_found("chat", chat_id))?;
        self.render_chat(row).await
    }

    pub async fn list_chats(&self) -> Result<Vec<Chat>> {
        let rows =
            sqlx::query_as::<_, ChatRow>("SELECT * FROM chats WHERE deleted_at IS NULL ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        let mut chats = Vec::with_capacity(rows.len());
        for row in rows {
            chats.push(self.render_chat(row).await?);
        }
        Ok(chats)
    }

    /// Chats the given user is a member of.
    pub async fn list_chats_by_user(&self, user_id: &str) -> Result<Vec<Chat>> {
        let user_ref = self.user_ref(user_id).await?;
        let rows = sqlx::query_as::<_, ChatRow>(
            r#"SELECT c.* FROM chats c
               JOIN chat_members cm ON cm.chat_id = c.id
               WHERE cm.user_id = ? AND c.deleted_at IS NULL
               ORDER BY c.id"#,
        )
        .bind(user_ref)
        .fetch_all(&self.pool)
        .await?;
        let mut chats = Vec::with_capacity(rows.len());
        for row in rows {
            chats.push(self.render_chat(row).await?);
        }
        Ok(chats)
    }

    pub async fn update_chat(&self, chat_id: &str, title: &str) -> Result<Chat> {
        let done =
            sqlx::query("UPDATE chats SET title = ? WHERE chat_id = ? AND deleted_at IS NULL")
                .bind(title)
                .bind(chat_id)
                .execute(&self.pool)
                .await?;
        if done.rows_affected() == 0 {
            return Err(StorageError::not_found("chat", chat_id));
        }
        self.get_chat(chat_id).await
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let done = sqlx::query(
            "UPDATE chats SET deleted_at = ? WHERE chat_id = ? AND deleted_at IS NULL",
        )
        .bind(now_ms())
        .bind(chat_id)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(StorageError::not_found("chat", chat_id));
        }
        Ok(())
    }

    async fn render_chat(&self, row: ChatRow) -> Result<Chat> {
        let members = sqlx::query_as::<_, UserRow>(
            r#"SELECT u.* FROM users u
               JOIN chat_members cm ON cm.user_id = u.id
               WHERE cm.chat_id = ? AND u.deleted_at IS NULL
               ORDER BY u.id"#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Chat {
            chat_id: row.chat_id,
            title: row.title,
            users: members.into_iter().map(User::from).collect(),
            created_at: datetime_from_millis(row.created_at),
        })
    }

    /// Public chat id → internal key, live rows only.
    pub(crate) async fn chat_ref(&self, chat_id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM chats WHERE chat_id = ? AND deleted_at IS NULL")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::not_found("chat", chat_id))
    }
}
