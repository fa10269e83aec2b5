use std::fmt;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::db::schema::tag;
use crate::db::{QueryResultExt, Repository, Result};
use crate::repository::TagRepository;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub String);

impl Tag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'a> From<&'a str> for Tag {
    fn from(name: &'a str) -> Self {
        Tag(name.to_owned())
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag(name)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TagRepository for Repository {
    fn get_tags(&self, ctx: &Context) -> Result<Vec<Tag>> {
        self.within(ctx, "get_tags", |tx| {
            let names = tag::table
                .select(tag::name)
                .order(tag::name.asc())
                .load::<String>(tx.conn()?)
                .classify("get_tags", "tag")?;
            Ok(names.into_iter().map(Tag).collect())
        })
    }
}
