use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::context::Context;
use crate::db::aggregate;
use crate::db::query::{author_profile, Statement};
use crate::db::{ErrorKind, Repository, Result};
use crate::profile::Profile;
use crate::repository::CommentRepository;
use crate::utils::{null_as_default, serialize_date};

lazy_static! {
    static ref COMMENT_AGGREGATE: String = format!(
        "JSON_BUILD_OBJECT(
        'id', c.id,
        'body', c.body,
        'created_at', c.created_at,
        'updated_at', c.updated_at,
        'author', {author}
    )",
        author = author_profile("c.author_id")
    );
    static ref SELECT_COMMENTS: String = format!(
        "SELECT {aggregate} AS aggregate
FROM comment c
JOIN article a ON c.article_id = a.id
WHERE a.slug = @slug
ORDER BY c.created_at, c.id",
        aggregate = COMMENT_AGGREGATE.as_str()
    );
    static ref INSERT_COMMENT: String = format!(
        "INSERT INTO comment AS c (body, author_id, article_id)
SELECT @body, @viewer, a.id FROM article a WHERE a.slug = @slug
RETURNING {aggregate} AS aggregate",
        aggregate = COMMENT_AGGREGATE.as_str()
    );
}

static DELETE_COMMENT: &str = "DELETE FROM comment c
USING article a
WHERE c.id = @comment_id
AND c.article_id = a.id
AND a.slug = @slug
AND c.author_id = @viewer";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: i32,
    pub body: String,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: DateTime<Utc>,
    #[serde(deserialize_with = "null_as_default")]
    pub author: Profile,
}

impl CommentRepository for Repository {
    fn get_comments(&self, ctx: &Context, viewer: Uuid, slug: &str) -> Result<Vec<Comment>> {
        let statement = Statement::new(SELECT_COMMENTS.as_str())
            .bind("viewer", viewer)
            .bind("slug", slug);
        self.within(ctx, "get_comments", |tx| {
            let rows = tx.fetch_aggregates(&statement)?;
            aggregate::collect_rows("comment", rows)
        })
    }

    #[instrument(skip(self, ctx, body))]
    fn add_comment(&self, ctx: &Context, viewer: Uuid, slug: &str, body: &str) -> Result<Comment> {
        let statement = Statement::new(INSERT_COMMENT.as_str())
            .bind("body", body)
            .bind("viewer", viewer)
            .bind("slug", slug);
        self.within(ctx, "add_comment", |tx| {
            // no row comes back when the article does not exist
            let rows = tx.fetch_aggregates(&statement)?;
            aggregate::collect_exactly_one("comment", rows).map_err(|err| {
                if err.is_not_found() {
                    ErrorKind::NotFound("article").into()
                } else {
                    err
                }
            })
        })
    }

    #[instrument(skip(self, ctx))]
    fn delete_comment(&self, ctx: &Context, viewer: Uuid, slug: &str, id: i32) -> Result<()> {
        let statement = Statement::new(DELETE_COMMENT)
            .bind("comment_id", id)
            .bind("slug", slug)
            .bind("viewer", viewer);
        self.within(ctx, "delete_comment", |tx| match tx.execute(&statement)? {
            0 => Err(ErrorKind::NotFound("comment").into()),
            _ => Ok(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::query::Param;

    #[test]
    fn comments_are_listed_oldest_first() {
        assert!(SELECT_COMMENTS.ends_with("ORDER BY c.created_at, c.id"));
    }

    #[test]
    fn insert_shares_the_viewer_placeholder() {
        let statement = Statement::new(INSERT_COMMENT.as_str())
            .bind("body", "Thank you so much!")
            .bind("viewer", Uuid::nil())
            .bind("slug", "how-to-train-your-dragon");
        let (sql, params) = statement.render().unwrap();
        assert!(!sql.contains('@'));
        assert!(sql.contains("SELECT $1, $2, a.id FROM article a WHERE a.slug = $3"));
        // the author's `following` flag reuses $2
        assert!(sql.contains("follower_id = $2"));
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], Param::Text("Thank you so much!".into()));
    }

    #[test]
    fn delete_is_scoped_to_author_article_and_id() {
        let statement = Statement::new(DELETE_COMMENT)
            .bind("comment_id", 7)
            .bind("slug", "dragons")
            .bind("viewer", Uuid::nil());
        let (_, params) = statement.render().unwrap();
        assert_eq!(params[0], Param::Int(7));
        assert_eq!(params.len(), 3);
    }
}
