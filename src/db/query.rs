//! Parameterized statements and the article aggregate query.
//!
//! Statements are written with named parameters (`@viewer`, `@slug`) and
//! rendered to Postgres positional placeholders right before they are sent.
//! Values never enter the SQL text; the text only varies with which
//! predicates are present.

use diesel::pg::Pg;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_query;
use diesel::sql_types::{Array, BigInt, Integer, Text, Uuid as SqlUuid};
use regex::Regex;
use uuid::Uuid;

use crate::db::{ErrorKind, Result};
use crate::types::{ArticleFilter, Page};

pub type BoundQuery = BoxedSqlQuery<'static, Pg, SqlQuery>;

lazy_static! {
    static ref NAMED_PARAM: Regex = Regex::new(r"@[A-Za-z_][A-Za-z0-9_]*").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Uuid(Uuid),
    Text(String),
    Int(i32),
    BigInt(i64),
    UuidArray(Vec<Uuid>),
    TextArray(Vec<String>),
}

impl Param {
    fn bind_to(self, query: BoundQuery) -> BoundQuery {
        match self {
            Param::Uuid(value) => query.bind::<SqlUuid, _>(value),
            Param::Text(value) => query.bind::<Text, _>(value),
            Param::Int(value) => query.bind::<Integer, _>(value),
            Param::BigInt(value) => query.bind::<BigInt, _>(value),
            Param::UuidArray(values) => query.bind::<Array<SqlUuid>, _>(values),
            Param::TextArray(values) => query.bind::<Array<Text>, _>(values),
        }
    }
}

impl From<Uuid> for Param {
    fn from(value: Uuid) -> Self {
        Param::Uuid(value)
    }
}

impl<'a> From<&'a str> for Param {
    fn from(value: &'a str) -> Self {
        Param::Text(value.to_owned())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::BigInt(value)
    }
}

impl From<Vec<Uuid>> for Param {
    fn from(values: Vec<Uuid>) -> Self {
        Param::UuidArray(values)
    }
}

impl From<Vec<String>> for Param {
    fn from(values: Vec<String>) -> Self {
        Param::TextArray(values)
    }
}

/// SQL text with named parameters and the values bound to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    sql: String,
    args: Vec<(&'static str, Param)>,
}

impl Statement {
    pub fn new<S: Into<String>>(sql: S) -> Self {
        Statement {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn bind<P: Into<Param>>(mut self, name: &'static str, value: P) -> Self {
        self.set(name, value);
        self
    }

    /// Binds `name`, replacing an earlier value.
    pub fn set<P: Into<Param>>(&mut self, name: &'static str, value: P) {
        let value = value.into();
        match self.args.iter_mut().find(|(bound, _)| *bound == name) {
            Some(arg) => arg.1 = value,
            None => self.args.push((name, value)),
        }
    }

    pub fn param_count(&self) -> usize {
        self.args.len()
    }

    pub fn value(&self, name: &str) -> Option<&Param> {
        self.args
            .iter()
            .find(|(bound, _)| *bound == name)
            .map(|(_, value)| value)
    }

    /// Rewrites `@name` to `$n` in order of first use. Repeated names share
    /// a placeholder; names without a value fail.
    pub fn render(&self) -> Result<(String, Vec<Param>)> {
        let mut sql = String::with_capacity(self.sql.len());
        let mut names: Vec<&str> = Vec::new();
        let mut params = Vec::new();
        let mut last = 0;

        for found in NAMED_PARAM.find_iter(&self.sql) {
            let name = &found.as_str()[1..];
            let position = match names.iter().position(|seen| *seen == name) {
                Some(index) => index + 1,
                None => {
                    let value = self
                        .value(name)
                        .ok_or_else(|| ErrorKind::UnboundParameter(name.to_owned()))?;
                    names.push(name);
                    params.push(value.clone());
                    names.len()
                }
            };
            sql.push_str(&self.sql[last..found.start()]);
            sql.push('$');
            sql.push_str(&position.to_string());
            last = found.end();
        }
        sql.push_str(&self.sql[last..]);

        Ok((sql, params))
    }

    pub fn to_query(&self) -> Result<BoundQuery> {
        let (sql, params) = self.render()?;
        Ok(params
            .into_iter()
            .fold(sql_query(sql).into_boxed::<Pg>(), |query, param| {
                param.bind_to(query)
            }))
    }
}

/// WHERE clause built from (template, bound values) pairs joined with AND.
#[derive(Debug, Default)]
pub struct Predicates {
    clauses: Vec<&'static str>,
    args: Vec<(&'static str, Param)>,
}

impl Predicates {
    /// A predicate whose parameters are bound on the statement itself.
    pub fn and(&mut self, template: &'static str) -> &mut Self {
        self.clauses.push(template);
        self
    }

    pub fn and_bind<P: Into<Param>>(
        &mut self,
        template: &'static str,
        name: &'static str,
        value: P,
    ) -> &mut Self {
        self.clauses.push(template);
        self.args.push((name, value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn append_to(self, statement: &mut Statement) {
        if self.clauses.is_empty() {
            return;
        }
        statement.push_sql("\nWHERE ");
        statement.push_sql(&self.clauses.join("\n  AND "));
        for (name, value) in self.args {
            statement.set(name, value);
        }
    }
}

/// JSON object for the user aliased `alias`, `following` relative to `@viewer`.
pub fn profile_object(alias: &str) -> String {
    format!(
        "JSON_BUILD_OBJECT(
            'username', {alias}.username,
            'bio', {alias}.bio,
            'image', {alias}.img,
            'following', EXISTS(
                SELECT 1
                FROM appuser_follows
                WHERE follower_id = @viewer
                AND followee_id = {alias}.id
            )
        )",
        alias = alias
    )
}

/// Sub-select producing the profile of the user whose id is in `author_column`.
pub fn author_profile(author_column: &str) -> String {
    format!(
        "(SELECT {profile} FROM appuser u WHERE u.id = {author_column})",
        profile = profile_object("u"),
        author_column = author_column
    )
}

lazy_static! {
    static ref ARTICLE_AGGREGATE: String = format!(
        "SELECT
    JSON_BUILD_OBJECT(
        'id', a.id,
        'slug', a.slug,
        'title', a.title,
        'description', a.description,
        'body', a.body,
        'tag_list', (
            SELECT JSON_AGG(tag.name ORDER BY tag.name)
            FROM article_tag
            JOIN tag ON article_tag.tag_id = tag.id
            WHERE article_tag.article_id = a.id
        ),
        'created_at', a.created_at,
        'updated_at', a.updated_at,
        'favorited', EXISTS(
            SELECT 1
            FROM article_favorite
            WHERE article_id = a.id
            AND appuser_id = @viewer
        ),
        'favorites_count', (
            SELECT COUNT(*)
            FROM article_favorite
            WHERE article_id = a.id
        ),
        'author', {author}
    ) AS aggregate
FROM article a",
        author = author_profile("a.author_id")
    );
}

const TAG_FILTER: &str = "EXISTS(
    SELECT 1
    FROM article_tag
    JOIN tag ON article_tag.tag_id = tag.id
    WHERE article_tag.article_id = a.id AND tag.name = @tag
)";

const AUTHOR_FILTER: &str = "EXISTS(
    SELECT 1
    FROM appuser
    WHERE username = @author
    AND id = a.author_id
)";

const FAVORITED_FILTER: &str = "EXISTS(
    SELECT 1
    FROM article_favorite af
    JOIN appuser au ON af.appuser_id = au.id
    WHERE af.article_id = a.id AND au.username = @favorited
)";

const FEED_FILTER: &str = "EXISTS(
    SELECT 1
    FROM appuser_follows
    WHERE follower_id = @viewer
    AND followee_id = a.author_id
)";

/// The one query behind single-article, list and feed reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArticleQuery<'a> {
    viewer: Uuid,
    slug: Option<&'a str>,
    author: Option<&'a str>,
    tag: Option<&'a str>,
    favorited: Option<&'a str>,
    feed: bool,
    page: Page,
}

impl<'a> ArticleQuery<'a> {
    pub fn new(viewer: Uuid) -> Self {
        ArticleQuery {
            viewer,
            ..ArticleQuery::default()
        }
    }

    pub fn slug(mut self, slug: &'a str) -> Self {
        self.slug = Some(slug);
        self
    }

    pub fn filter(mut self, filter: &'a ArticleFilter) -> Self {
        self.author = filter.author.as_deref();
        self.tag = filter.tag.as_deref();
        self.favorited = filter.favorited.as_deref();
        self
    }

    /// Restricts the result to authors the viewer follows.
    pub fn feed(mut self) -> Self {
        self.feed = true;
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    pub fn compose(&self) -> Statement {
        let mut statement = Statement::new(ARTICLE_AGGREGATE.as_str()).bind("viewer", self.viewer);

        let mut predicates = Predicates::default();
        if let Some(slug) = self.slug {
            predicates.and_bind("a.slug = @slug", "slug", slug);
        }
        if let Some(tag) = self.tag {
            predicates.and_bind(TAG_FILTER, "tag", tag);
        }
        if let Some(author) = self.author {
            predicates.and_bind(AUTHOR_FILTER, "author", author);
        }
        if let Some(favorited) = self.favorited {
            predicates.and_bind(FAVORITED_FILTER, "favorited", favorited);
        }
        if self.feed {
            predicates.and(FEED_FILTER);
        }
        predicates.append_to(&mut statement);

        if self.slug.is_none() {
            statement.push_sql("\nORDER BY a.created_at DESC, a.id");
        }

        // offset without limit is ignored
        if let Some(limit) = self.page.limit {
            statement.push_sql("\nLIMIT @limit");
            statement.set("limit", limit);
            if let Some(offset) = self.page.offset {
                statement.push_sql(" OFFSET @offset");
                statement.set("offset", offset);
            }
        }

        statement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer() -> Uuid {
        Uuid::parse_str("0190a6b2-7c1e-7d3a-9b4f-1f2e3d4c5b6a").unwrap()
    }

    #[test]
    fn repeated_names_share_a_placeholder() {
        let statement = Statement::new("SELECT @a, @b, @a")
            .bind("a", "first")
            .bind("b", 2i64);
        let (sql, params) = statement.render().unwrap();
        assert_eq!(sql, "SELECT $1, $2, $1");
        assert_eq!(params, vec![Param::Text("first".into()), Param::BigInt(2)]);
    }

    #[test]
    fn unbound_name_is_an_error() {
        let err = Statement::new("SELECT @missing").render().unwrap_err();
        match *err.kind() {
            ErrorKind::UnboundParameter(ref name) => assert_eq!(name, "missing"),
            ref other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn casts_and_unused_bindings_are_left_alone() {
        let statement = Statement::new("SELECT * FROM UNNEST(@ids::uuid[], @names::text[])")
            .bind("ids", vec![viewer()])
            .bind("names", vec!["rust".to_owned()])
            .bind("unused", 1i32);
        let (sql, params) = statement.render().unwrap();
        assert_eq!(sql, "SELECT * FROM UNNEST($1::uuid[], $2::text[])");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn set_replaces_an_earlier_value() {
        let mut statement = Statement::new("SELECT @x").bind("x", 1i32);
        statement.set("x", 2i32);
        assert_eq!(statement.value("x"), Some(&Param::Int(2)));
    }

    #[test]
    fn no_filters_means_no_where_clause() {
        let statement = ArticleQuery::new(viewer()).compose();
        let (sql, params) = statement.render().unwrap();
        assert!(!sql.contains("WHERE a.") && !sql.contains("\nWHERE"));
        assert!(sql.ends_with("ORDER BY a.created_at DESC, a.id"));
        assert_eq!(params, vec![Param::Uuid(viewer())]);
    }

    #[test]
    fn slug_lookup_is_an_equality_predicate_without_ordering() {
        let statement = ArticleQuery::new(viewer()).slug("how-to-train-your-dragon").compose();
        let (sql, params) = statement.render().unwrap();
        assert!(sql.contains("\nWHERE a.slug = $2"));
        assert!(!sql.contains("ORDER BY a.created_at"));
        assert_eq!(params[1], Param::Text("how-to-train-your-dragon".into()));
    }

    #[test]
    fn filters_are_joined_with_and_in_fixed_order() {
        let filter = ArticleFilter {
            author: Some("jake".into()),
            tag: Some("dragons".into()),
            favorited: Some("anna".into()),
        };
        let statement = ArticleQuery::new(viewer()).filter(&filter).compose();
        let (sql, params) = statement.render().unwrap();

        let where_clause = &sql[sql.find("\nWHERE ").unwrap()..];
        assert_eq!(where_clause.matches("\n  AND ").count(), 2);
        assert!(where_clause.contains("tag.name = $2"));
        assert!(where_clause.contains("username = $3"));
        assert!(where_clause.contains("au.username = $4"));
        assert_eq!(
            params,
            vec![
                Param::Uuid(viewer()),
                Param::Text("dragons".into()),
                Param::Text("jake".into()),
                Param::Text("anna".into()),
            ]
        );
    }

    #[test]
    fn user_values_never_reach_the_sql_text() {
        let filter = ArticleFilter {
            author: Some("x' OR 1=1 --".into()),
            ..ArticleFilter::default()
        };
        let statement = ArticleQuery::new(viewer()).filter(&filter).compose();
        let (sql, _) = statement.render().unwrap();
        assert!(!sql.contains("OR 1=1"));
    }

    #[test]
    fn feed_reuses_the_viewer_parameter() {
        let statement = ArticleQuery::new(viewer()).feed().compose();
        let (sql, params) = statement.render().unwrap();
        assert!(sql.contains("WHERE EXISTS(\n    SELECT 1\n    FROM appuser_follows\n    WHERE follower_id = $1"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn offset_requires_limit() {
        let offset_only = ArticleQuery::new(viewer())
            .page(Page {
                limit: None,
                offset: Some(20),
            })
            .compose();
        let (sql, params) = offset_only.render().unwrap();
        assert!(!sql.contains("OFFSET"));
        assert!(!sql.contains("LIMIT"));
        assert_eq!(params.len(), 1);

        let both = ArticleQuery::new(viewer())
            .page(Page {
                limit: Some(10),
                offset: Some(20),
            })
            .compose();
        let (sql, params) = both.render().unwrap();
        assert!(sql.ends_with("LIMIT $2 OFFSET $3"));
        assert_eq!(&params[1..], &[Param::BigInt(10), Param::BigInt(20)]);
    }

    #[test]
    fn viewer_relative_fields_are_computed_in_the_query() {
        let (sql, _) = ArticleQuery::new(viewer()).compose().render().unwrap();
        assert!(sql.contains("AND appuser_id = $1"));
        assert!(sql.contains("WHERE follower_id = $1"));
        assert!(sql.contains("JSON_AGG(tag.name ORDER BY tag.name)"));
    }
}
