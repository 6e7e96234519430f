//! Chat message history.
//!
//! Messages are append-only; regeneration history slicing works off the
//! record-creation order (timestamp, then insertion order for ties).

use crate::{Message, Result, Storage, StorageError, new_public_id, now_ms, types::datetime_from_millis};

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct MessageRow {
    message_id: String,
    chat_public_id: String,
    user_public_id: String,
    llm_public_id: Option<String>,
    role: String,
    content: String,
    created_at: i64,
}

impl From<MessageRow> for Message {
    fn from(r: MessageRow) -> Self {
        Self {
            message_id: r.message_id,
            chat_id: r.chat_public_id,
            user_id: r.user_public_id,
            llm_id: r.llm_public_id,
            role: r.role,
            content: r.content,
            created_at: datetime_from_millis(r.created_at),
        }
    }
}

const MESSAGE_SELECT: &str = r#"SELECT m.message_id, c.chat_id AS chat_public_id,
       u.user_id AS user_public_id, l.llm_id AS llm_public_id,
       m.role, m.content, m.created_at
    FROM messages m
    JOIN chats c ON c.id = m.chat_id
    JOIN users u ON u.id = m.user_id
    LEFT JOIN llms l ON l.id = m.llm_id"#;

impl Storage {
    pub async fn create_message(
        &self,
        chat_id: &str,
        user_id: &str,
        llm_id: Option<&str>,
        role: &str,
        content: &str,
    ) -> Result<Message> {
        let chat_ref = self.chat_ref(chat_id).await?;
        let user_ref = self.user_ref(user_id).await?;
        let llm_ref = match llm_id {
            Some(llm_id) => Some(self.llm_ref(llm_id).await?),
            None => None,
        };

        let message_id = new_public_id();
        sqlx::query(
            r#"INSERT INTO messages (message_id, chat_id, user_id, llm_id, role, content, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&message_id)
        .bind(chat_ref)
        .bind(user_ref)
        .bind(llm_ref)
        .bind(role)
        .bind(content)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        self.get_message(&message_id).await
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Message> {
        let sql = format!("{MESSAGE_SELECT} WHERE m.message_id = ?");
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Into::into)
            .ok_or_else(|| StorageError::not_found("message", message_id))
    }

    /// Full history of a chat in record-creation order.
    pub async fn list_messages_by_chat(&self, chat_id: &str) -> Result<Vec<Message>> {
        let chat_ref = self.chat_ref(chat_id).await?;
        let sql = format!("{MESSAGE_SELECT} WHERE m.chat_id = ? ORDER BY m.created_at, m.id");
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(chat_ref)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Messages of the target's chat strictly older than the target itself.
    ///
    /// The target and everything created at or after it is excluded; within
    /// one timestamp, insertion order decides.
    pub async fn list_messages_before(&self, message_id: &str) -> Result<Vec<Message>> {
        let target = sqlx::query_as::<_, (i64, i64, i64)>(
            "SELECT id, chat_id, created_at FROM messages WHERE message_id = ?",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::not_found("message", message_id))?;
        let (target_ref, chat_ref, target_at) = target;

        let sql = format!(
            r#"{MESSAGE_SELECT}
               WHERE m.chat_id = ? AND (m.created_at < ? OR (m.created_at = ? AND m.id < ?))
               ORDER BY m.created_at, m.id"#
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(chat_ref)
            .bind(target_at)
            .bind(target_at)
            .bind(target_ref)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, crate::Chat};

    async fn seeded() -> (Storage, String, Chat) {
        let storage = Storage::in_memory().await.unwrap();
        let user = storage.create_user("alice", "Alice", None).await.unwrap();
        let chat = storage.create_chat("T", &[user.user_id.clone()]).await.unwrap();
        (storage, user.user_id, chat)
    }

    async fn backdate(storage: &Storage, message_id: &str, at: i64) {
        sqlx::query("UPDATE messages SET created_at = ? WHERE message_id = ?")
            .bind(at)
            .bind(message_id)
            .execute(storage.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_and_list_in_order() {
        let (storage, user_id, chat) = seeded().await;
        let first = storage
            .create_message(&chat.chat_id, &user_id, None, "user", "hi")
            .await
            .unwrap();
        let second = storage
            .create_message(&chat.chat_id, &user_id, None, "assistant", "hello")
            .await
            .unwrap();
        backdate(&storage, &first.message_id, 100).await;
        backdate(&storage, &second.message_id, 200).await;

        let all = storage.list_messages_by_chat(&chat.chat_id).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "hi");
        assert_eq!(all[0].role, "user");
        assert_eq!(all[1].content, "hello");
    }

    #[tokio::test]
    async fn messages_before_cuts_strictly_at_the_target() {
        let (storage, user_id, chat) = seeded().await;
        let mut ids = Vec::new();
        for (at, content) in [(100, "m1"), (200, "m2"), (300, "m3")] {
            let msg = storage
                .create_message(&chat.chat_id, &user_id, None, "user", content)
                .await
                .unwrap();
            backdate(&storage, &msg.message_id, at).await;
            ids.push(msg.message_id);
        }

        let before_last = storage.list_messages_before(&ids[2]).await.unwrap();
        assert_eq!(
            before_last.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            ["m1", "m2"]
        );
        assert!(storage.list_messages_before(&ids[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn equal_timestamps_fall_back_to_insertion_order() {
        let (storage, user_id, chat) = seeded().await;
        let first = storage
            .create_message(&chat.chat_id, &user_id, None, "user", "question")
            .await
            .unwrap();
        let second = storage
            .create_message(&chat.chat_id, &user_id, None, "assistant", "answer")
            .await
            .unwrap();
        backdate(&storage, &first.message_id, 100).await;
        backdate(&storage, &second.message_id, 100).await;

        let history = storage.list_messages_before(&second.message_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "question");
        assert!(storage.list_messages_before(&first.message_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_validates_all_references() {
        let (storage, user_id, chat) = seeded().await;
        assert!(storage
            .create_message("no-chat", &user_id, None, "user", "x")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(storage
            .create_message(&chat.chat_id, "no-user", None, "user", "x")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(storage
            .create_message(&chat.chat_id, &user_id, Some("no-llm"), "user", "x")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn message_carries_public_llm_id() {
        let (storage, user_id, chat) = seeded().await;
        let provider = storage.create_provider("p", "http://a", None).await.unwrap();
        let llm = storage.create_llm(&provider.provider_id, "llama3").await.unwrap();

        let msg = storage
            .create_message(&chat.chat_id, &user_id, Some(&llm.llm_id), "assistant", "hi")
            .await
            .unwrap();
        assert_eq!(msg.llm_id.as_deref(), Some(llm.llm_id.as_str()));
        assert_eq!(msg.chat_id, chat.chat_id);
        assert_eq!(msg.user_id, user_id);

        let loaded = storage.get_message(&msg.message_id).await.unwrap();
        assert_eq!(loaded.llm_id.as_deref(), Some(llm.llm_id.as_str()));
    }
}
