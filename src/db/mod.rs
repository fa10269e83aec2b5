use std::error::Error as StdError;
use std::fmt;

use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;
use diesel::result::{DatabaseErrorKind, Error as DieselError, QueryResult};
use tracing::{info, warn};

use crate::config::Config;
use crate::context::Context;

pub mod aggregate;
pub mod query;
pub mod schema;
pub mod tx;

use self::query::Statement;
use self::tx::Transaction;

// An alias to the type for a pool of Diesel Postgres connections.
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub type Connection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

error_chain! {
    foreign_links {
        Var(::std::env::VarError);
        R2D2(r2d2::Error);
        ParseInt(::std::num::ParseIntError);
    }

    errors {
        NotFound(entity: &'static str) {
            description("entity not found")
            display("{} not found", entity)
        }
        Ambiguous(entity: &'static str) {
            description("more than one row matched")
            display("more than one {} matched", entity)
        }
        Conflict(operation: &'static str) {
            description("uniqueness violation")
            display("{}: uniqueness violation", operation)
        }
        NoFieldsToUpdate(operation: &'static str) {
            description("no fields to update")
            display("{}: no fields to update", operation)
        }
        Transaction(operation: &'static str, phase: &'static str, rollback: Option<String>) {
            description("transaction failed")
            display(
                "{}: transaction failed during {}{}",
                operation,
                phase,
                match rollback {
                    Some(err) => format!(" (rollback also failed: {})", err),
                    None => String::new(),
                }
            )
        }
        Decode(entity: &'static str) {
            description("malformed aggregate")
            display("could not decode {} aggregate", entity)
        }
        Query(operation: &'static str) {
            description("query failed")
            display("{}: query failed", operation)
        }
        Cancelled(operation: &'static str) {
            description("operation cancelled")
            display("{}: cancelled or deadline exceeded", operation)
        }
        UnboundParameter(name: String) {
            description("statement references an unbound parameter")
            display("no value bound for parameter @{}", name)
        }
    }
}

impl Error {
    /// First kind along the cause chain that is not a plain message.
    pub fn root_kind(&self) -> &ErrorKind {
        let mut current = self;
        loop {
            match *current.kind() {
                ErrorKind::Msg(_) => {}
                ref kind => return kind,
            }
            match StdError::source(current).and_then(|cause| cause.downcast_ref::<Error>()) {
                Some(cause) => current = cause,
                None => return current.kind(),
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root_kind(), ErrorKind::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.root_kind(), ErrorKind::Conflict(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_kind(), ErrorKind::Cancelled(_))
    }

    pub fn is_no_fields_to_update(&self) -> bool {
        matches!(self.root_kind(), ErrorKind::NoFieldsToUpdate(_))
    }
}

/// Maps a diesel failure onto the repository taxonomy, keeping the diesel
/// error as the cause.
pub fn classify(operation: &'static str, entity: &'static str, err: DieselError) -> Error {
    let kind = match err {
        DieselError::NotFound => return ErrorKind::NotFound(entity).into(),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            ErrorKind::Conflict(operation)
        }
        DieselError::DatabaseError(_, ref info) if info.message().contains("statement timeout") => {
            ErrorKind::Cancelled(operation)
        }
        _ => ErrorKind::Query(operation),
    };
    Error::with_chain(err, kind)
}

pub trait QueryResultExt<T> {
    fn classify(self, operation: &'static str, entity: &'static str) -> Result<T>;
}

impl<T> QueryResultExt<T> for QueryResult<T> {
    fn classify(self, operation: &'static str, entity: &'static str) -> Result<T> {
        self.map_err(|err| classify(operation, entity, err))
    }
}

pub fn init_pool(config: &Config) -> Result<Pool> {
    let manager = ConnectionManager::<PgConnection>::new(config.database_url.as_str());
    let pool = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(config.connect_timeout)
        .build(manager)
        .chain_err(|| format!("could not create pool for {}", config.sanitized_url()))?;
    info!(
        url = %config.sanitized_url(),
        max_size = config.pool_size,
        "database pool ready"
    );
    Ok(pool)
}

/// Handle the service layer holds; every call borrows one pooled connection
/// and runs in its own transaction.
#[derive(Clone)]
pub struct Repository {
    pool: Pool,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.pool.state();
        f.debug_struct("Repository")
            .field("connections", &state.connections)
            .field("idle_connections", &state.idle_connections)
            .finish()
    }
}

impl Repository {
    pub fn new(pool: Pool) -> Self {
        Repository { pool }
    }

    pub fn connect(config: &Config) -> Result<Self> {
        Ok(Repository::new(init_pool(config)?))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// One round trip to the store, for an external health check.
    pub fn ping(&self, ctx: &Context) -> Result<()> {
        self.within(ctx, "ping", |tx| {
            tx.execute(&Statement::new("SELECT 1"))?;
            Ok(())
        })
    }

    // Pool acquisition waits no longer than the request deadline.
    fn conn(&self, ctx: &Context, operation: &'static str) -> Result<Connection> {
        ctx.check(operation)?;
        let conn = match ctx.remaining() {
            Some(remaining) => self.pool.get_timeout(remaining),
            None => self.pool.get(),
        };
        conn.map_err(|err| match ctx.check(operation) {
            Err(cancelled) => cancelled,
            Ok(()) => Error::with_chain(err, ErrorKind::Query(operation)),
        })
    }

    /// Runs `f` inside a transaction: committed when `f` succeeds, rolled
    /// back otherwise. A failed rollback is reported together with the
    /// error that caused it.
    pub(crate) fn within<T, F>(&self, ctx: &Context, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let mut conn = self.conn(ctx, operation)?;
        let mut tx = Transaction::begin(&mut conn, ctx, operation)?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                let err = tx.rollback(err);
                warn!(operation, error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }
}
