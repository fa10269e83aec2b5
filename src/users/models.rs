use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::schema::appuser;
use crate::profile::Profile;
use crate::utils::serialize_date;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = appuser)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    #[diesel(column_name = pwd)]
    pub password: String,
    pub bio: Option<String>,
    #[diesel(column_name = img)]
    pub image: Option<String>,
    #[serde(serialize_with = "serialize_date")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_date")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// This user as seen by someone whose follow state is `following`.
    pub fn profile(&self, following: bool) -> Profile {
        Profile {
            username: self.username.clone(),
            bio: self.bio.clone().unwrap_or_default(),
            image: self.image.clone().unwrap_or_default(),
            following,
        }
    }

    pub(crate) fn load_by_name(conn: &mut PgConnection, name: &str) -> QueryResult<User> {
        appuser::table
            .filter(appuser::username.eq(name))
            .select(User::as_select())
            .first(conn)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = appuser)]
pub struct NewUser<'a> {
    pub id: Uuid,
    pub username: &'a str,
    pub email: &'a str,
    #[diesel(column_name = pwd)]
    pub password: &'a str,
}

/// Fields left `None` keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, AsChangeset)]
#[diesel(table_name = appuser)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    #[diesel(column_name = pwd)]
    pub password: Option<String>,
    pub bio: Option<String>,
    #[diesel(column_name = img)]
    pub image: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.bio.is_none()
            && self.image.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn jake() -> User {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        User {
            id: Uuid::now_v7(),
            username: "jake".into(),
            email: "jake@jake.jake".into(),
            password: "jakejake".into(),
            bio: None,
            image: Some("https://i.stack.imgur.com/xHWG8.jpg".into()),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn profile_fills_missing_bio_with_empty() {
        let profile = jake().profile(true);
        assert_eq!(profile.username, "jake");
        assert_eq!(profile.bio, "");
        assert_eq!(profile.image, "https://i.stack.imgur.com/xHWG8.jpg");
        assert!(profile.following);
    }

    #[test]
    fn password_is_never_serialized() {
        let json = serde_json::to_value(jake()).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["email"], "jake@jake.jake");
    }

    #[test]
    fn changes_without_fields_are_empty() {
        assert!(UserChanges::default().is_empty());
        let changes = UserChanges {
            bio: Some("I like to skateboard".into()),
            ..UserChanges::default()
        };
        assert!(!changes.is_empty());
    }
}
