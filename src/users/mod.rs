use chrono::Utc;
use diesel::insert_into;
use diesel::prelude::*;
use diesel::update as diesel_update;
use tracing::instrument;
use uuid::Uuid;

use crate::context::Context;
use crate::db::schema::appuser;
use crate::db::{ErrorKind, QueryResultExt, Repository, Result};
use crate::repository::UserRepository;

pub mod models;

use self::models::{NewUser, User, UserChanges};

impl UserRepository for Repository {
    #[instrument(skip(self, ctx, password))]
    fn register_user(
        &self,
        ctx: &Context,
        id: Uuid,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User> {
        let new_user = NewUser {
            id,
            username,
            email,
            password,
        };
        self.within(ctx, "register_user", |tx| {
            insert_into(appuser::table)
                .values(&new_user)
                .returning(User::as_returning())
                .get_result(tx.conn()?)
                .classify("register_user", "user")
        })
    }

    fn auth_user(&self, ctx: &Context, email: &str, password: &str) -> Result<User> {
        self.within(ctx, "auth_user", |tx| {
            appuser::table
                .filter(appuser::email.eq(email))
                .filter(appuser::pwd.eq(password))
                .select(User::as_select())
                .first(tx.conn()?)
                .classify("auth_user", "user")
        })
    }

    fn get_user(&self, ctx: &Context, username: &str) -> Result<User> {
        self.within(ctx, "get_user", |tx| {
            User::load_by_name(tx.conn()?, username).classify("get_user", "user")
        })
    }

    fn get_current_user(&self, ctx: &Context, id: Uuid) -> Result<User> {
        self.within(ctx, "get_current_user", |tx| {
            appuser::table
                .find(id)
                .select(User::as_select())
                .first(tx.conn()?)
                .classify("get_current_user", "user")
        })
    }

    #[instrument(skip(self, ctx, changes))]
    fn update_user(&self, ctx: &Context, id: Uuid, changes: UserChanges) -> Result<User> {
        if changes.is_empty() {
            return Err(ErrorKind::NoFieldsToUpdate("update_user").into());
        }
        self.within(ctx, "update_user", |tx| {
            diesel_update(appuser::table.find(id))
                .set((&changes, appuser::updated_at.eq(Utc::now())))
                .returning(User::as_returning())
                .get_result(tx.conn()?)
                .classify("update_user", "user")
        })
    }
}
