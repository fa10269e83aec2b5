use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::pg::PgConnection;
use diesel::RunQueryDsl;
use tracing::{debug, warn};

use crate::context::Context;
use crate::db::aggregate::AggregateRow;
use crate::db::query::Statement;
use crate::db::{classify, Error, ErrorKind, Result};

/// An open transaction on a pooled connection.
///
/// `commit` and `rollback` close it; if neither ran (early return, panic)
/// it is rolled back on drop.
pub struct Transaction<'c> {
    conn: &'c mut PgConnection,
    ctx: &'c Context,
    operation: &'static str,
    open: bool,
}

impl<'c> Transaction<'c> {
    pub fn begin(
        conn: &'c mut PgConnection,
        ctx: &'c Context,
        operation: &'static str,
    ) -> Result<Transaction<'c>> {
        ctx.check(operation)?;
        AnsiTransactionManager::begin_transaction(&mut *conn)
            .map_err(|err| Error::with_chain(err, ErrorKind::Transaction(operation, "begin", None)))?;

        let mut tx = Transaction {
            conn,
            ctx,
            operation,
            open: true,
        };
        if let Some(remaining) = ctx.remaining() {
            // 0 would disable the timeout
            let millis = remaining.as_millis().max(1) as i64;
            tx.execute(
                &Statement::new("SELECT set_config('statement_timeout', @timeout, true)")
                    .bind("timeout", millis.to_string()),
            )?;
        }
        Ok(tx)
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// The connection for a diesel DSL query, once the context allows
    /// another round trip.
    pub fn conn(&mut self) -> Result<&mut PgConnection> {
        self.ctx.check(self.operation)?;
        Ok(&mut *self.conn)
    }

    pub fn execute(&mut self, statement: &Statement) -> Result<usize> {
        let query = statement.to_query()?;
        let operation = self.operation;
        debug!(operation, sql = statement.sql(), params = statement.param_count(), "execute");
        query
            .execute(self.conn()?)
            .map_err(|err| classify(operation, "row", err))
    }

    pub fn fetch_aggregates(&mut self, statement: &Statement) -> Result<Vec<AggregateRow>> {
        let query = statement.to_query()?;
        let operation = self.operation;
        debug!(operation, sql = statement.sql(), params = statement.param_count(), "fetch aggregates");
        query
            .load::<AggregateRow>(self.conn()?)
            .map_err(|err| classify(operation, "row", err))
    }

    pub fn commit(mut self) -> Result<()> {
        self.open = false;
        AnsiTransactionManager::commit_transaction(&mut *self.conn).map_err(|err| {
            Error::with_chain(err, ErrorKind::Transaction(self.operation, "commit", None))
        })
    }

    /// Rolls back and hands `cause` back, or a `Transaction` error carrying
    /// both `cause` and the rollback failure.
    pub fn rollback(mut self, cause: Error) -> Error {
        self.open = false;
        match AnsiTransactionManager::rollback_transaction(&mut *self.conn) {
            Ok(()) => cause,
            Err(err) => Error::with_chain(
                cause,
                ErrorKind::Transaction(self.operation, "rollback", Some(err.to_string())),
            ),
        }
    }
}

impl<'c> Drop for Transaction<'c> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        warn!(operation = self.operation, "transaction dropped while open, rolling back");
        if let Err(err) = AnsiTransactionManager::rollback_transaction(&mut *self.conn) {
            warn!(operation = self.operation, error = %err, "rollback on drop failed");
        }
    }
}

/// Statements queued to run in order inside one transaction.
#[derive(Debug, Default)]
pub struct Batch {
    statements: Vec<(&'static str, Statement)>,
}

impl Batch {
    pub fn new() -> Self {
        Batch::default()
    }

    /// Queues `statement`; `phase` names it in errors.
    pub fn queue(mut self, phase: &'static str, statement: Statement) -> Self {
        self.statements.push((phase, statement));
        self
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statement(&self, phase: &str) -> Option<&Statement> {
        self.statements
            .iter()
            .find(|(queued, _)| *queued == phase)
            .map(|(_, statement)| statement)
    }

    pub fn phases(&self) -> Vec<&'static str> {
        self.statements.iter().map(|(phase, _)| *phase).collect()
    }

    /// Runs every statement, stopping at the first failure. Conflicts and
    /// cancellations keep their kind; anything else becomes a
    /// `Transaction` error naming the phase.
    pub fn exec(self, tx: &mut Transaction) -> Result<()> {
        for (phase, statement) in self.statements {
            if let Err(err) = tx.execute(&statement) {
                return Err(match *err.kind() {
                    ErrorKind::Conflict(_) | ErrorKind::Cancelled(_) => err,
                    _ => Error::with_chain(err, ErrorKind::Transaction(tx.operation(), phase, None)),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keeps_queue_order() {
        let batch = Batch::new()
            .queue("insert article", Statement::new("SELECT 1"))
            .queue("upsert tags", Statement::new("SELECT 2"))
            .queue("associate tags", Statement::new("SELECT 3"));
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.phases(), vec!["insert article", "upsert tags", "associate tags"]);
    }

    #[test]
    fn transaction_error_names_operation_and_phase() {
        let err: Error = ErrorKind::Transaction("create_article", "upsert tags", None).into();
        assert_eq!(
            err.to_string(),
            "create_article: transaction failed during upsert tags"
        );
    }
}
