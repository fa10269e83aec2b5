table! {
    appuser (id) {
        id -> Uuid,
        username -> Text,
        email -> Text,
        pwd -> Text,
        bio -> Nullable<Text>,
        img -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    appuser_follows (follower_id, followee_id) {
        follower_id -> Uuid,
        followee_id -> Uuid,
    }
}

table! {
    article (id) {
        id -> Uuid,
        slug -> Text,
        title -> Text,
        description -> Text,
        body -> Text,
        author_id -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    tag (id) {
        id -> Uuid,
        name -> Text,
    }
}

table! {
    article_tag (article_id, tag_id) {
        article_id -> Uuid,
        tag_id -> Uuid,
    }
}

table! {
    article_favorite (article_id, appuser_id) {
        article_id -> Uuid,
        appuser_id -> Uuid,
    }
}

table! {
    comment (id) {
        id -> Int4,
        body -> Text,
        author_id -> Uuid,
        article_id -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

joinable!(article -> appuser (author_id));
joinable!(article_tag -> article (article_id));
joinable!(article_tag -> tag (tag_id));
joinable!(article_favorite -> article (article_id));
joinable!(comment -> article (article_id));

allow_tables_to_appear_in_same_query!(
    appuser,
    appuser_follows,
    article,
    tag,
    article_tag,
    article_favorite,
    comment,
);
