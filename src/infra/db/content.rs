use async_trait::async_trait;

use crate::{
    application::repos::{ContentSource, RepoError},
    domain::content::{ContentId, ContentRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ContentRow {
    id: i64,
    title: String,
    body_markdown: String,
}

impl From<ContentRow> for ContentRecord {
    fn from(row: ContentRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            body_markdown: row.body_markdown,
        }
    }
}

#[async_trait]
impl ContentSource for PostgresRepositories {
    async fn find_content(&self, id: ContentId) -> Result<Option<ContentRecord>, RepoError> {
        let row = sqlx::query_as::<_, ContentRow>(
            r#"
            SELECT id, title, body_markdown
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ContentRecord::from))
    }
}
