use diesel::prelude::*;
use diesel::sql_types::Json;
use serde::de::DeserializeOwned;

use crate::db::{ErrorKind, Result, ResultExt};

/// A row holding one JSON aggregate in its `aggregate` column.
#[derive(Debug, QueryableByName)]
pub struct AggregateRow {
    #[diesel(sql_type = Json)]
    pub aggregate: serde_json::Value,
}

impl From<serde_json::Value> for AggregateRow {
    fn from(aggregate: serde_json::Value) -> Self {
        AggregateRow { aggregate }
    }
}

/// Malformed payloads fail the whole read.
pub fn decode<T: DeserializeOwned>(entity: &'static str, row: AggregateRow) -> Result<T> {
    serde_json::from_value(row.aggregate).chain_err(|| ErrorKind::Decode(entity))
}

pub fn collect_rows<T: DeserializeOwned>(
    entity: &'static str,
    rows: Vec<AggregateRow>,
) -> Result<Vec<T>> {
    rows.into_iter().map(|row| decode(entity, row)).collect()
}

pub fn collect_exactly_one<T: DeserializeOwned>(
    entity: &'static str,
    rows: Vec<AggregateRow>,
) -> Result<T> {
    let mut rows = rows.into_iter();
    match (rows.next(), rows.next()) {
        (None, _) => Err(ErrorKind::NotFound(entity).into()),
        (Some(row), None) => decode(entity, row),
        (Some(_), Some(_)) => Err(ErrorKind::Ambiguous(entity).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Article;
    use crate::comment::Comment;
    use crate::profile::Profile;
    use crate::tag::Tag;
    use serde_json::json;

    fn article_json() -> serde_json::Value {
        json!({
            "id": "0190a6b2-7c1e-7d3a-9b4f-1f2e3d4c5b6a",
            "slug": "how-to-train-your-dragon",
            "title": "How to train your dragon",
            "description": "Ever wonder how?",
            "body": "It takes a Jacobian",
            "tag_list": ["dragons", "training"],
            "created_at": "2024-05-01T12:34:56.123456+00:00",
            "updated_at": "2024-05-01T12:34:56.123456+00:00",
            "favorited": false,
            "favorites_count": 0,
            "author": {
                "username": "jake",
                "bio": "I work at statefarm",
                "image": null,
                "following": false
            }
        })
    }

    #[test]
    fn decodes_a_full_article() {
        let article: Article = decode("article", article_json().into()).unwrap();
        assert_eq!(article.slug, "how-to-train-your-dragon");
        assert_eq!(article.tag_list, vec![Tag::from("dragons"), Tag::from("training")]);
        assert_eq!(article.author.username, "jake");
        assert_eq!(article.author.image, "");
        assert!(!article.favorited);
    }

    #[test]
    fn null_tag_list_decodes_to_empty() {
        let mut payload = article_json();
        payload["tag_list"] = serde_json::Value::Null;
        let article: Article = decode("article", payload.into()).unwrap();
        assert!(article.tag_list.is_empty());
    }

    #[test]
    fn absent_fields_decode_to_zero_values() {
        let profile: Profile = decode("profile", json!({ "username": "anna" }).into()).unwrap();
        assert_eq!(
            profile,
            Profile {
                username: "anna".into(),
                ..Profile::default()
            }
        );
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let mut payload = article_json();
        payload["favorites_count"] = json!("many");
        let err = decode::<Article>("article", payload.into()).unwrap_err();
        match *err.kind() {
            ErrorKind::Decode(entity) => assert_eq!(entity, "article"),
            ref other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn exactly_one_rejects_zero_and_many() {
        let none = collect_exactly_one::<Comment>("comment", Vec::new()).unwrap_err();
        assert!(none.is_not_found());

        let rows = vec![article_json().into(), article_json().into()];
        let many = collect_exactly_one::<Article>("article", rows).unwrap_err();
        match *many.kind() {
            ErrorKind::Ambiguous(entity) => assert_eq!(entity, "article"),
            ref other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn collect_rows_fails_on_any_bad_row() {
        let rows = vec![article_json().into(), json!({ "title": 7 }).into()];
        assert!(collect_rows::<Article>("article", rows).is_err());
    }
}
