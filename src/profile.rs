use diesel::insert_into;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::context::Context;
use crate::db::aggregate;
use crate::db::query::{profile_object, Statement};
use crate::db::schema::appuser_follows;
use crate::db::{QueryResultExt, Repository, Result};
use crate::repository::ProfileRepository;
use crate::users::models::User;
use crate::utils::null_as_default;

lazy_static! {
    static ref SELECT_PROFILE: String = format!(
        "SELECT {profile} AS aggregate
FROM appuser u
WHERE u.username = @username",
        profile = profile_object("u")
    );
}

/// A user as seen by a viewer. Never stored; `following` is relative to the
/// viewer the profile was read for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub bio: String,
    #[serde(deserialize_with = "null_as_default")]
    pub image: String,
    pub following: bool,
}

impl ProfileRepository for Repository {
    fn get_profile(&self, ctx: &Context, viewer: Uuid, username: &str) -> Result<Profile> {
        let statement = Statement::new(SELECT_PROFILE.as_str())
            .bind("viewer", viewer)
            .bind("username", username);
        self.within(ctx, "get_profile", |tx| {
            let rows = tx.fetch_aggregates(&statement)?;
            aggregate::collect_exactly_one("profile", rows)
        })
    }

    #[instrument(skip(self, ctx))]
    fn follow_user(&self, ctx: &Context, viewer: Uuid, username: &str) -> Result<Profile> {
        self.within(ctx, "follow_user", |tx| {
            let followee = User::load_by_name(tx.conn()?, username).classify("follow_user", "profile")?;
            insert_into(appuser_follows::table)
                .values((
                    appuser_follows::follower_id.eq(viewer),
                    appuser_follows::followee_id.eq(followee.id),
                ))
                .on_conflict((appuser_follows::follower_id, appuser_follows::followee_id))
                .do_nothing()
                .execute(tx.conn()?)
                .classify("follow_user", "profile")?;
            Ok(followee.profile(true))
        })
    }

    #[instrument(skip(self, ctx))]
    fn unfollow_user(&self, ctx: &Context, viewer: Uuid, username: &str) -> Result<Profile> {
        self.within(ctx, "unfollow_user", |tx| {
            let followee = User::load_by_name(tx.conn()?, username).classify("unfollow_user", "profile")?;
            diesel::delete(
                appuser_follows::table
                    .filter(appuser_follows::follower_id.eq(viewer))
                    .filter(appuser_follows::followee_id.eq(followee.id)),
            )
            .execute(tx.conn()?)
            .classify("unfollow_user", "profile")?;
            Ok(followee.profile(false))
        })
    }
}
