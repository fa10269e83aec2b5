use serde::Deserialize;
use uuid::Uuid;

/// Viewer id of an unauthenticated request: nobody follows or favorites as
/// the nil id, so every viewer-relative flag comes out false.
pub const ANONYMOUS_VIEWER: Uuid = Uuid::nil();

/// Optional narrowing of an article listing. Absent fields do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArticleFilter {
    pub author: Option<String>,
    pub tag: Option<String>,
    pub favorited: Option<String>,
}

impl ArticleFilter {
    pub fn by_author<S: Into<String>>(author: S) -> Self {
        ArticleFilter {
            author: Some(author.into()),
            ..ArticleFilter::default()
        }
    }

    pub fn by_tag<S: Into<String>>(tag: S) -> Self {
        ArticleFilter {
            tag: Some(tag.into()),
            ..ArticleFilter::default()
        }
    }

    pub fn favorited_by<S: Into<String>>(username: S) -> Self {
        ArticleFilter {
            favorited: Some(username.into()),
            ..ArticleFilter::default()
        }
    }
}

/// Limit/offset pagination; `offset` only applies together with `limit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Page { limit, offset }
    }

    pub fn limit(limit: i64) -> Self {
        Page {
            limit: Some(limit),
            offset: None,
        }
    }
}
