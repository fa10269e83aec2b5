//! The persistence surface the service layer programs against.
//!
//! Every call takes the request `Context` first; `viewer` is the id of the
//! user the result is computed for (`types::ANONYMOUS_VIEWER` when nobody
//! is logged in).

use uuid::Uuid;

use crate::article::{Article, ArticleChanges, NewArticle};
use crate::comment::Comment;
use crate::context::Context;
use crate::db::Result;
use crate::profile::Profile;
use crate::tag::Tag;
use crate::types::{ArticleFilter, Page};
use crate::users::models::{User, UserChanges};

pub trait ArticleRepository {
    fn get_articles(
        &self,
        ctx: &Context,
        viewer: Uuid,
        filter: &ArticleFilter,
        page: Page,
    ) -> Result<Vec<Article>>;

    fn get_article(&self, ctx: &Context, viewer: Uuid, slug: &str) -> Result<Article>;

    /// Articles by authors `viewer` follows, newest first.
    fn get_feed_articles(&self, ctx: &Context, viewer: Uuid, page: Page) -> Result<Vec<Article>>;

    fn create_article(&self, ctx: &Context, viewer: Uuid, article: NewArticle) -> Result<Article>;

    /// Only the author can update; anyone else gets `NotFound`.
    fn update_article(
        &self,
        ctx: &Context,
        viewer: Uuid,
        slug: &str,
        changes: ArticleChanges,
    ) -> Result<Article>;

    fn delete_article(&self, ctx: &Context, viewer: Uuid, slug: &str) -> Result<()>;

    fn favorite_article(&self, ctx: &Context, viewer: Uuid, slug: &str) -> Result<Article>;

    fn unfavorite_article(&self, ctx: &Context, viewer: Uuid, slug: &str) -> Result<Article>;
}

pub trait TagRepository {
    fn get_tags(&self, ctx: &Context) -> Result<Vec<Tag>>;
}

pub trait CommentRepository {
    /// Oldest first.
    fn get_comments(&self, ctx: &Context, viewer: Uuid, slug: &str) -> Result<Vec<Comment>>;

    fn add_comment(&self, ctx: &Context, viewer: Uuid, slug: &str, body: &str) -> Result<Comment>;

    fn delete_comment(&self, ctx: &Context, viewer: Uuid, slug: &str, id: i32) -> Result<()>;
}

pub trait ProfileRepository {
    fn get_profile(&self, ctx: &Context, viewer: Uuid, username: &str) -> Result<Profile>;

    fn follow_user(&self, ctx: &Context, viewer: Uuid, username: &str) -> Result<Profile>;

    fn unfollow_user(&self, ctx: &Context, viewer: Uuid, username: &str) -> Result<Profile>;
}

pub trait UserRepository {
    fn register_user(
        &self,
        ctx: &Context,
        id: Uuid,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User>;

    /// `password` is compared with the stored credential as is.
    fn auth_user(&self, ctx: &Context, email: &str, password: &str) -> Result<User>;

    fn get_user(&self, ctx: &Context, username: &str) -> Result<User>;

    fn get_current_user(&self, ctx: &Context, id: Uuid) -> Result<User>;

    fn update_user(&self, ctx: &Context, id: Uuid, changes: UserChanges) -> Result<User>;
}

/// Everything the service layer needs from storage.
pub trait AppRepository:
    ArticleRepository + TagRepository + CommentRepository + ProfileRepository + UserRepository
{
}

impl<T> AppRepository for T where
    T: ArticleRepository + TagRepository + CommentRepository + ProfileRepository + UserRepository
{
}
