//! The front-end command dispatcher of a MySQL-wire-compatible proxy.
//!
//! This crate owns the command phase of a client connection: it reads framed
//! MySQL command packets, drives a per-connection state machine, and streams
//! result sets (or OK/ERR responses) back to the client. Everything that
//! understands SQL lives behind collaborator traits: an [`Executor`] runs
//! queries, a [`TenantManager`] says which schemas a tenant may use, a
//! [`SqlParser`] turns prepared text into an opaque AST handle, and a
//! [`Trace`] receives optimizer hints. The handshake and authentication
//! exchange happen before a connection is handed in, so a [`Conn`] starts
//! life already knowing its tenant.
//!
//! Prepared statements are tracked in a process-wide [`StatementRegistry`]
//! shared by every connection; the registry hands out monotonic statement
//! ids and owns the descriptors, including each statement's bind-variable
//! lifecycle.
//!
//! ```no_run
//! use msql_gate::*;
//! use std::io;
//! use std::net;
//! use std::sync::Arc;
//! use std::thread;
//!
//! struct Gate;
//!
//! impl Executor for Gate {
//!     fn use_db(&self, _: &CommandContext) -> Result<(), SqlError> {
//!         Ok(())
//!     }
//!     fn field_list(&self, _: &CommandContext) -> Result<Vec<Column>, SqlError> {
//!         Ok(Vec::new())
//!     }
//!     fn com_query(
//!         &self,
//!         _: &CommandContext,
//!         results: &mut dyn FnMut(QueryItem) -> io::Result<()>,
//!     ) -> io::Result<()> {
//!         results(Ok(QueryOutcome {
//!             result: Some(Box::new(Done)),
//!             warnings: 0,
//!         }))
//!     }
//!     fn com_stmt_execute(
//!         &self,
//!         _: &mut CommandContext,
//!     ) -> Result<(Option<Box<dyn ExecResult>>, u16), SqlError> {
//!         Ok((Some(Box::new(Done)), 0))
//!     }
//! }
//!
//! struct Done;
//! impl ExecResult for Done {
//!     fn rows_affected(&self) -> u64 {
//!         0
//!     }
//!     fn last_insert_id(&self) -> u64 {
//!         0
//!     }
//!     fn dataset(&mut self) -> Result<Option<Box<dyn Dataset>>, SqlError> {
//!         Ok(None)
//!     }
//! }
//!
//! struct StaticTenants;
//! impl TenantManager for StaticTenants {
//!     fn clusters(&self, _tenant: &str) -> Vec<String> {
//!         vec!["app".to_owned()]
//!     }
//! }
//!
//! struct Verbatim;
//! struct Opaque;
//! impl ParsedStatement for Opaque {
//!     fn hints(&self) -> Vec<String> {
//!         Vec::new()
//!     }
//! }
//! impl SqlParser for Verbatim {
//!     fn parse_one(&self, _sql: &str) -> Result<Box<dyn ParsedStatement>, SqlError> {
//!         Ok(Box::new(Opaque))
//!     }
//! }
//!
//! let dispatcher = Dispatcher::new(
//!     Arc::new(Gate),
//!     Arc::new(StaticTenants),
//!     Arc::new(Verbatim),
//!     Arc::new(NoTrace),
//!     Arc::new(StatementRegistry::default()),
//! );
//!
//! let listener = net::TcpListener::bind("127.0.0.1:3307").unwrap();
//! for stream in listener.incoming() {
//!     let stream = stream.unwrap();
//!     let d = dispatcher.clone();
//!     thread::spawn(move || {
//!         let read = stream.try_clone().unwrap();
//!         let mut conn = Conn::new(
//!             read,
//!             stream,
//!             ConnOptions {
//!                 tenant: "acme".to_owned(),
//!                 ..ConnOptions::default()
//!             },
//!         );
//!         let _ = d.serve(&mut conn);
//!     });
//! }
//! ```
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]

// Note to developers: decent overviews of the protocol live at
//
//   https://github.com/cwarden/mysql-proxy/blob/master/doc/protocol.rst
//
// and
//
//   https://mariadb.com/kb/en/library/clientserver-protocol/

extern crate mysql_common as myc;

use std::io;
use std::sync::Arc;

pub use crate::myc::constants::{CapabilityFlags, ColumnFlags, ColumnType, StatusFlags};
pub use crate::myc::value::Value;

mod commands;
mod conn;
mod dispatcher;
mod error;
mod errorcodes;
mod hint;
mod packet;
mod params;
mod resultset;
mod stmt;
mod value;
mod writers;

pub use crate::conn::{Conn, ConnOptions};
pub use crate::dispatcher::Dispatcher;
pub use crate::error::SqlError;
pub use crate::errorcodes::ErrorKind;
pub use crate::hint::{Hint, HintArg, HintKind};
pub use crate::stmt::{BindState, Statement, StatementRegistry};
pub use crate::value::ToMysqlValue;

/// Meta-information about a single column, used either to describe a
/// prepared statement parameter or an output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// This column's associated table.
    ///
    /// Note that this is *technically* the table's alias.
    pub table: String,
    /// This column's name.
    ///
    /// Note that this is *technically* the column's alias.
    pub column: String,
    /// This column's type.
    pub coltype: ColumnType,
    /// Any flags associated with this column.
    ///
    /// Of particular interest are `ColumnFlags::UNSIGNED_FLAG` and
    /// `ColumnFlags::NOT_NULL_FLAG`.
    pub colflags: ColumnFlags,
}

/// Everything a handler knows about the command it is running.
///
/// Built per command and discarded when the handler returns. The raw packet
/// bytes are copied in so they survive the read buffer being recycled.
pub struct CommandContext {
    /// The connection the command arrived on.
    pub connection_id: u32,
    /// The connection's authenticated tenant.
    pub tenant: String,
    /// The schema selected on the connection, if any.
    pub schema: Option<String>,
    /// The raw command packet, command byte included.
    pub data: Vec<u8>,
    /// The prepared statement bound to this command (COM_STMT_EXECUTE).
    pub stmt: Option<Arc<Statement>>,
}

/// One result produced by the executor.
pub struct QueryOutcome {
    /// The result handle. `None` means the executor produced nothing, which
    /// the dispatcher surfaces to the client as an error.
    pub result: Option<Box<dyn ExecResult>>,
    /// Warning count to report alongside the result.
    pub warnings: u16,
}

/// What the executor hands the dispatcher per result set: an outcome, or an
/// error to relay to the client.
pub type QueryItem = Result<QueryOutcome, SqlError>;

/// Runs SQL on behalf of the dispatcher.
///
/// One instance is shared by every connection; implementations synchronize
/// internally.
pub trait Executor: Send + Sync {
    /// `COM_INIT_DB` passed the tenant check: make `ctx.schema` current.
    fn use_db(&self, ctx: &CommandContext) -> Result<(), SqlError>;

    /// `COM_FIELD_LIST`: the columns of the table named in the command.
    fn field_list(&self, ctx: &CommandContext) -> Result<Vec<Column>, SqlError>;

    /// `COM_QUERY`: run the SQL in `ctx.data`, calling `results` once per
    /// result set.
    ///
    /// Per-result failures go through `results` as `Err` items so the
    /// remaining results can still be delivered. An error returned by
    /// `results` is a failed client write and must be propagated back out
    /// unchanged; an error returned by this method itself tears the
    /// connection down.
    fn com_query(
        &self,
        ctx: &CommandContext,
        results: &mut dyn FnMut(QueryItem) -> io::Result<()>,
    ) -> io::Result<()>;

    /// `COM_STMT_EXECUTE`: run the statement in `ctx.stmt` with its bound
    /// variables, returning one result and a warning count.
    fn com_stmt_execute(
        &self,
        ctx: &mut CommandContext,
    ) -> Result<(Option<Box<dyn ExecResult>>, u16), SqlError>;
}

/// The authorization view the dispatcher needs: which clusters (schemas) a
/// tenant may select.
pub trait TenantManager: Send + Sync {
    /// The clusters `tenant` may `USE`, as exact-match names.
    fn clusters(&self, tenant: &str) -> Vec<String>;
}

/// Parses SQL text at prepare time.
pub trait SqlParser: Send + Sync {
    /// Parse exactly one statement.
    fn parse_one(&self, sql: &str) -> Result<Box<dyn ParsedStatement>, SqlError>;
}

/// An opaque parsed statement handle.
///
/// The dispatcher never looks inside it beyond asking for hint strings; it
/// travels on the statement descriptor for the executor's benefit.
pub trait ParsedStatement: Send + Sync {
    /// Raw optimizer hint strings attached to the statement, in source
    /// order.
    fn hints(&self) -> Vec<String>;
}

/// Receives the optimizer hints of each prepared statement, e.g. to pick up
/// a trace context.
pub trait Trace: Send + Sync {
    /// Called once per successful prepare.
    fn extract(&self, ctx: &CommandContext, hints: &[Hint]);
}

/// A [`Trace`] that ignores everything.
pub struct NoTrace;

impl Trace for NoTrace {
    fn extract(&self, _: &CommandContext, _: &[Hint]) {}
}

/// A result handle obtained from the executor.
pub trait ExecResult {
    /// Rows affected by a write.
    fn rows_affected(&self) -> u64;

    /// The insert id of the most recent insertion, or 0.
    fn last_insert_id(&self) -> u64;

    /// The streamable dataset, or `None` for a write-only result.
    ///
    /// Called at most once per result.
    fn dataset(&mut self) -> Result<Option<Box<dyn Dataset>>, SqlError>;
}

/// A streamable result set. Dropping it closes it; it is handed out boxed
/// and dropped by the streamer exactly once.
pub trait Dataset {
    /// Ordered column metadata.
    fn fields(&self) -> &[Column];

    /// The next row, or `None` at the end of the set. Cells must line up
    /// with [`fields`](Dataset::fields).
    fn next_row(&mut self) -> Result<Option<Vec<Value>>, SqlError>;
}
