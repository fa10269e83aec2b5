#![recursion_limit = "1024"]

#[macro_use]
extern crate diesel;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;

pub mod article;
pub mod comment;
pub mod config;
pub mod context;
pub mod db;
pub mod profile;
pub mod repository;
pub mod tag;
pub mod types;
pub mod users;
pub mod utils;

pub use crate::article::{Article, ArticleChanges, NewArticle};
pub use crate::comment::Comment;
pub use crate::config::Config;
pub use crate::context::Context;
pub use crate::db::{Error, ErrorKind, Repository, Result};
pub use crate::profile::Profile;
pub use crate::repository::{
    AppRepository, ArticleRepository, CommentRepository, ProfileRepository, TagRepository,
    UserRepository,
};
pub use crate::tag::Tag;
pub use crate::types::{ArticleFilter, Page, ANONYMOUS_VIEWER};
pub use crate::users::models::{User, UserChanges};
