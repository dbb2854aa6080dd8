use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, types::Json};
use ts_rs::TS;
use uuid::Uuid;

use super::like_pattern;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Note {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    #[ts(type = "Array<string>")]
    pub tags: Json<Vec<String>>,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateNote {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_pinned: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateNote {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub project_id: Option<Option<Uuid>>,
    pub tags: Option<Vec<String>>,
    pub is_pinned: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct NoteFilter {
    pub project_id: Option<Uuid>,
    pub search: Option<String>,
    pub tag: Option<String>,
}

/// Trimmed, de-duplicated, empty tags dropped; first occurrence wins.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !normalized.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            normalized.push(tag.to_string());
        }
    }
    normalized
}

impl Note {
    pub async fn create(
        pool: &SqlitePool,
        user_id: Uuid,
        data: &CreateNote,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let tags = Json(normalize_tags(&data.tags));
        let now = Utc::now();
        sqlx::query_as!(
            Note,
            r#"INSERT INTO notes (id, user_id, project_id, title, content, tags, is_pinned, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
               RETURNING id as "id!: Uuid", user_id as "user_id!: Uuid", project_id as "project_id: Uuid", title, content,
                         tags as "tags!: Json<Vec<String>>", is_pinned as "is_pinned!: bool", created_at as "created_at!: DateTime<Utc>",
                         updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            user_id,
            data.project_id,
            data.title,
            data.content,
            tags,
            data.is_pinned,
            now
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Note,
            r#"SELECT id as "id!: Uuid", user_id as "user_id!: Uuid", project_id as "project_id: Uuid", title, content,
                      tags as "tags!: Json<Vec<String>>", is_pinned as "is_pinned!: bool", created_at as "created_at!: DateTime<Utc>",
                      updated_at as "updated_at!: DateTime<Utc>"
               FROM notes WHERE id = $1 AND user_id = $2"#,
            id,
            user_id
        )
        .fetch_optional(pool)
        .await
    }

    /// Pinned notes first, then most recently updated.
    pub async fn find_by_user(
        pool: &SqlitePool,
        user_id: Uuid,
        filter: &NoteFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM notes WHERE user_id = ");
        query.push_bind(user_id);

        if let Some(project_id) = filter.project_id {
            query.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = like_pattern(search);
            query
                .push(" AND (title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR content LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(tag) = filter.tag.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query
                .push(" AND EXISTS (SELECT 1 FROM json_each(notes.tags) WHERE json_each.value = ")
                .push_bind(tag.to_string())
                .push(" COLLATE NOCASE)");
        }

        query.push(" ORDER BY is_pinned DESC, updated_at DESC");
        query.build_query_as::<Note>().fetch_all(pool).await
    }

    pub async fn update(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
        update: &UpdateNote,
    ) -> Result<Option<Self>, sqlx::Error> {
        let Some(existing) = Self::find_by_id(pool, user_id, id).await? else {
            return Ok(None);
        };
        let tags = match &update.tags {
            Some(tags) => normalize_tags(tags),
            None => existing.tags.0,
        };
        let title = update.title.clone().unwrap_or(existing.title);
        let content = update.content.clone().unwrap_or(existing.content);
        let project_id = update.project_id.unwrap_or(existing.project_id);
        let tags = Json(tags);
        let is_pinned = update.is_pinned.unwrap_or(existing.is_pinned);
        let now = Utc::now();

        sqlx::query_as!(
            Note,
            r#"UPDATE notes
               SET title = $3, content = $4, project_id = $5, tags = $6, is_pinned = $7, updated_at = $8
               WHERE id = $1 AND user_id = $2
               RETURNING id as "id!: Uuid", user_id as "user_id!: Uuid", project_id as "project_id: Uuid", title, content,
                         tags as "tags!: Json<Vec<String>>", is_pinned as "is_pinned!: bool", created_at as "created_at!: DateTime<Utc>",
                         updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            user_id,
            title,
            content,
            project_id,
            tags,
            is_pinned,
            now
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM notes WHERE id = $1 AND user_id = $2", id, user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{project::Project, test_support};

    fn note(title: &str, content: &str, tags: &[&str], is_pinned: bool) -> CreateNote {
        CreateNote {
            title: title.to_string(),
            content: content.to_string(),
            project_id: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            is_pinned,
        }
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = vec![
            " rust ".to_string(),
            "Rust".to_string(),
            "".to_string(),
            "web".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["rust".to_string(), "web".to_string()]);
    }

    #[tokio::test]
    async fn pinned_notes_come_first_and_filters_apply() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "sam").await;
        Note::create(&db.pool, user.id, &note("Groceries", "eggs", &["home"], false), Uuid::new_v4())
            .await
            .unwrap();
        let pinned = Note::create(
            &db.pool,
            user.id,
            &note("Ideas", "a rust rewrite", &["work", "ideas"], true),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let all = Note::find_by_user(&db.pool, user.id, &NoteFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, pinned.id);

        let tagged = Note::find_by_user(
            &db.pool,
            user.id,
            &NoteFilter {
                tag: Some("WORK".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(tagged.len(), 1);

        let searched = Note::find_by_user(
            &db.pool,
            user.id,
            &NoteFilter {
                search: Some("eggs".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].title, "Groceries");
    }

    #[tokio::test]
    async fn deleting_the_project_detaches_notes() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "tom").await;
        let project = test_support::project(&db, user.id, "Docs", None).await;
        let mut data = note("Outline", "", &[], false);
        data.project_id = Some(project.id);
        let created = Note::create(&db.pool, user.id, &data, Uuid::new_v4()).await.unwrap();

        Project::delete(&db.pool, project.id).await.unwrap();

        let reloaded = Note::find_by_id(&db.pool, user.id, created.id)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.project_id.is_none());
    }
}
