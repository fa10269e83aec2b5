use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::update as diesel_update;
use serde::{Deserialize, Serialize};
use slug::slugify;
use tracing::instrument;
use uuid::Uuid;

use crate::context::Context;
use crate::db::aggregate;
use crate::db::query::{ArticleQuery, Statement};
use crate::db::schema::article;
use crate::db::tx::{Batch, Transaction};
use crate::db::{ErrorKind, QueryResultExt, Repository, Result, ResultExt};
use crate::profile::Profile;
use crate::repository::ArticleRepository;
use crate::tag::Tag;
use crate::types::{ArticleFilter, Page};
use crate::utils::{dedup_preserving_order, null_as_default, serialize_date};

static INSERT_ARTICLE: &str = "INSERT INTO article (id, slug, title, description, body, author_id)
VALUES (@article_id, @slug, @title, @description, @body, @author_id)";

static UPSERT_TAGS: &str = "INSERT INTO tag (id, name)
SELECT * FROM UNNEST(@tag_ids::uuid[], @tag_names::text[])
ON CONFLICT (name) DO NOTHING";

static ASSOCIATE_TAGS: &str = "INSERT INTO article_tag (article_id, tag_id)
SELECT @article_id, id FROM tag WHERE name = ANY(@tag_names)
ON CONFLICT DO NOTHING";

static FAVORITE_ARTICLE: &str = "INSERT INTO article_favorite (article_id, appuser_id)
SELECT a.id, @viewer FROM article a WHERE a.slug = @slug
ON CONFLICT DO NOTHING";

static UNFAVORITE_ARTICLE: &str = "DELETE FROM article_favorite af
USING article a
WHERE af.article_id = a.id AND a.slug = @slug AND af.appuser_id = @viewer";

/// An article with its tags, favorite state and author, as seen by one
/// viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Article {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tag_list: Vec<Tag>,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: DateTime<Utc>,
    pub favorited: bool,
    pub favorites_count: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub author: Profile,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub description: String,
    pub body: String,
    #[serde(default)]
    pub tag_list: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, AsChangeset)]
#[diesel(table_name = article)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
}

impl ArticleChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.body.is_none()
    }
}

pub fn slug_from_title(title: &str) -> String {
    slugify(title)
}

fn load_article(tx: &mut Transaction, viewer: Uuid, slug: &str) -> Result<Article> {
    let statement = ArticleQuery::new(viewer).slug(slug).compose();
    let rows = tx.fetch_aggregates(&statement)?;
    aggregate::collect_exactly_one("article", rows)
}

fn article_batch(article_id: Uuid, slug: &str, author: Uuid, new_article: NewArticle) -> Batch {
    // sorted so concurrent creators take tag row locks in the same order
    let mut tag_names = dedup_preserving_order(new_article.tag_list);
    tag_names.sort();
    let insert = Statement::new(INSERT_ARTICLE)
        .bind("article_id", article_id)
        .bind("slug", slug)
        .bind("title", new_article.title)
        .bind("description", new_article.description)
        .bind("body", new_article.body)
        .bind("author_id", author);
    let batch = Batch::new().queue("insert article", insert);
    if tag_names.is_empty() {
        return batch;
    }

    // one candidate id per distinct tag; unused when the tag already exists
    let tag_ids: Vec<Uuid> = tag_names.iter().map(|_| Uuid::now_v7()).collect();
    batch
        .queue(
            "upsert tags",
            Statement::new(UPSERT_TAGS)
                .bind("tag_ids", tag_ids)
                .bind("tag_names", tag_names.clone()),
        )
        .queue(
            "associate tags",
            Statement::new(ASSOCIATE_TAGS)
                .bind("article_id", article_id)
                .bind("tag_names", tag_names),
        )
}

impl ArticleRepository for Repository {
    fn get_articles(
        &self,
        ctx: &Context,
        viewer: Uuid,
        filter: &ArticleFilter,
        page: Page,
    ) -> Result<Vec<Article>> {
        let statement = ArticleQuery::new(viewer).filter(filter).page(page).compose();
        self.within(ctx, "get_articles", |tx| {
            let rows = tx.fetch_aggregates(&statement)?;
            aggregate::collect_rows("article", rows)
        })
    }

    fn get_article(&self, ctx: &Context, viewer: Uuid, slug: &str) -> Result<Article> {
        self.within(ctx, "get_article", |tx| load_article(tx, viewer, slug))
    }

    fn get_feed_articles(&self, ctx: &Context, viewer: Uuid, page: Page) -> Result<Vec<Article>> {
        let statement = ArticleQuery::new(viewer).feed().page(page).compose();
        self.within(ctx, "get_feed_articles", |tx| {
            let rows = tx.fetch_aggregates(&statement)?;
            aggregate::collect_rows("article", rows)
        })
    }

    #[instrument(skip(self, ctx, new_article), fields(title = %new_article.title))]
    fn create_article(&self, ctx: &Context, viewer: Uuid, new_article: NewArticle) -> Result<Article> {
        let article_id = Uuid::now_v7();
        let slug = slug_from_title(&new_article.title);
        let batch = article_batch(article_id, &slug, viewer, new_article);

        self.within(ctx, "create_article", |tx| {
            batch.exec(tx)?;
            load_article(tx, viewer, &slug).chain_err(|| "could not read article after create")
        })
    }

    #[instrument(skip(self, ctx, changes))]
    fn update_article(
        &self,
        ctx: &Context,
        viewer: Uuid,
        slug: &str,
        changes: ArticleChanges,
    ) -> Result<Article> {
        if changes.is_empty() {
            return Err(ErrorKind::NoFieldsToUpdate("update_article").into());
        }

        self.within(ctx, "update_article", |tx| {
            let owned = article::table
                .filter(article::slug.eq(slug))
                .filter(article::author_id.eq(viewer));
            let updated = diesel_update(owned)
                .set((&changes, article::updated_at.eq(Utc::now())))
                .execute(tx.conn()?)
                .classify("update_article", "article")?;
            if updated == 0 {
                return Err(ErrorKind::NotFound("article").into());
            }
            load_article(tx, viewer, slug).chain_err(|| "could not read article after update")
        })
    }

    #[instrument(skip(self, ctx))]
    fn delete_article(&self, ctx: &Context, viewer: Uuid, slug: &str) -> Result<()> {
        self.within(ctx, "delete_article", |tx| {
            let owned = article::table
                .filter(article::slug.eq(slug))
                .filter(article::author_id.eq(viewer));
            let deleted = diesel::delete(owned)
                .execute(tx.conn()?)
                .classify("delete_article", "article")?;
            match deleted {
                0 => Err(ErrorKind::NotFound("article").into()),
                _ => Ok(()),
            }
        })
    }

    #[instrument(skip(self, ctx))]
    fn favorite_article(&self, ctx: &Context, viewer: Uuid, slug: &str) -> Result<Article> {
        let statement = Statement::new(FAVORITE_ARTICLE)
            .bind("viewer", viewer)
            .bind("slug", slug);
        self.within(ctx, "favorite_article", |tx| {
            tx.execute(&statement)?;
            load_article(tx, viewer, slug)
        })
    }

    #[instrument(skip(self, ctx))]
    fn unfavorite_article(&self, ctx: &Context, viewer: Uuid, slug: &str) -> Result<Article> {
        let statement = Statement::new(UNFAVORITE_ARTICLE)
            .bind("viewer", viewer)
            .bind("slug", slug);
        self.within(ctx, "unfavorite_article", |tx| {
            tx.execute(&statement)?;
            load_article(tx, viewer, slug)
        })
    }
}
