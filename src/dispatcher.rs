//! The per-connection command loop.

use crate::commands::{self, Command};
use crate::conn::Conn;
use crate::errorcodes::ErrorKind;
use crate::hint::Hint;
use crate::myc::constants::{CapabilityFlags, StatusFlags};
use crate::params;
use crate::resultset::{self, RowEncoding};
use crate::stmt::{Statement, StatementRegistry};
use crate::writers;
use crate::{CommandContext, Executor, QueryItem, SqlParser, TenantManager, Trace};
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::{debug, error};

/// Routes command packets to handlers for any number of connections.
///
/// Cheap to clone; one instance is shared by every connection task. All
/// process-wide state (the statement registry, the collaborators) lives
/// here, handed in at construction.
pub struct Dispatcher<E, T, P, X> {
    executor: Arc<E>,
    tenants: Arc<T>,
    parser: Arc<P>,
    trace: Arc<X>,
    stmts: Arc<StatementRegistry>,
}

impl<E, T, P, X> Clone for Dispatcher<E, T, P, X> {
    fn clone(&self) -> Self {
        Dispatcher {
            executor: Arc::clone(&self.executor),
            tenants: Arc::clone(&self.tenants),
            parser: Arc::clone(&self.parser),
            trace: Arc::clone(&self.trace),
            stmts: Arc::clone(&self.stmts),
        }
    }
}

impl<E, T, P, X> Dispatcher<E, T, P, X>
where
    E: Executor,
    T: TenantManager,
    P: SqlParser,
    X: Trace,
{
    /// Assemble a dispatcher from its collaborators and the shared
    /// statement registry.
    pub fn new(
        executor: Arc<E>,
        tenants: Arc<T>,
        parser: Arc<P>,
        trace: Arc<X>,
        stmts: Arc<StatementRegistry>,
    ) -> Self {
        Dispatcher {
            executor,
            tenants,
            parser,
            trace,
            stmts,
        }
    }

    /// The shared statement registry.
    pub fn statements(&self) -> &Arc<StatementRegistry> {
        &self.stmts
    }

    /// Drive `conn`'s command loop until the client quits, the stream ends,
    /// or a write fails.
    ///
    /// Collaborator errors are written to the client as ERR packets and the
    /// loop continues; only transport failures come back as `Err`, at which
    /// point the caller tears the connection down.
    pub fn serve<R: Read, W: Write>(&self, conn: &mut Conn<R, W>) -> io::Result<()> {
        while let Some(seq) = conn.reader.next()? {
            conn.writer.set_seq(seq.wrapping_add(1));
            if self.dispatch(conn)? {
                break;
            }
        }
        Ok(())
    }

    /// Handle one command. Returns `true` when the connection should close.
    fn dispatch<R: Read, W: Write>(&self, conn: &mut Conn<R, W>) -> io::Result<bool> {
        let data = conn.reader.payload().to_vec();
        let cmd = match commands::parse(&data) {
            Ok((_, cmd)) => cmd,
            Err(_) => {
                error!(
                    conn = conn.connection_id(),
                    cmd = data.first().copied().unwrap_or(0),
                    "unknown command byte"
                );
                conn.recycle_read_packet();
                let caps = conn.capabilities();
                conn.buffered(|c| {
                    writers::write_err(
                        ErrorKind::ER_UNKNOWN_COM_ERROR,
                        b"error handling packet",
                        &mut c.writer,
                        caps,
                    )
                })?;
                return Ok(false);
            }
        };

        match cmd {
            Command::InitDb(db) => {
                let db = String::from_utf8_lossy(db).into_owned();
                self.handle_init_db(conn, db, data)?;
            }
            Command::Query(_) => {
                self.handle_query(conn, data)?;
            }
            Command::ListFields(_) => {
                self.handle_field_list(conn, data)?;
            }
            Command::Prepare(sql) => {
                let sql = String::from_utf8_lossy(sql).into_owned();
                self.handle_prepare(conn, sql, data)?;
            }
            Command::Execute(_) => {
                self.handle_stmt_execute(conn, data)?;
            }
            Command::Close(id) => {
                conn.recycle_read_packet();
                debug!(conn = conn.connection_id(), stmt = id, "closing statement");
                self.stmts.remove(id);
                // no response to COM_STMT_CLOSE
            }
            Command::StmtReset(id) => {
                self.handle_stmt_reset(conn, id)?;
            }
            Command::SetOption(op) => {
                self.handle_set_option(conn, op)?;
            }
            Command::Ping => {
                conn.recycle_read_packet();
                conn.buffered(|c| {
                    let status = c.status_flags();
                    writers::write_ok_packet(&mut c.writer, 0, 0, status, 0)
                })?;
            }
            Command::Quit => {
                conn.recycle_read_packet();
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn context<R: Read, W: Write>(
        &self,
        conn: &Conn<R, W>,
        data: Vec<u8>,
        stmt: Option<Arc<Statement>>,
    ) -> CommandContext {
        CommandContext {
            connection_id: conn.connection_id(),
            tenant: conn.tenant().to_owned(),
            schema: conn.schema().map(str::to_owned),
            data,
            stmt,
        }
    }

    fn handle_init_db<R: Read, W: Write>(
        &self,
        conn: &mut Conn<R, W>,
        db: String,
        data: Vec<u8>,
    ) -> io::Result<()> {
        conn.recycle_read_packet();

        conn.buffered(|c| {
            let caps = c.capabilities();
            let allowed = self
                .tenants
                .clusters(c.tenant())
                .iter()
                .any(|cluster| *cluster == db);

            if !allowed {
                let msg = format!("Unknown database '{}'", db);
                return writers::write_err(
                    ErrorKind::ER_BAD_DB_ERROR,
                    msg.as_bytes(),
                    &mut c.writer,
                    caps,
                );
            }

            c.set_schema(db);
            let ctx = self.context(c, data, None);
            match self.executor.use_db(&ctx) {
                Ok(()) => {
                    let status = c.status_flags();
                    writers::write_ok_packet(&mut c.writer, 0, 0, status, 0)
                }
                Err(e) => {
                    error!(conn = c.connection_id(), error = %e, "use_db failed");
                    writers::write_err_from(&e, &mut c.writer, caps)
                }
            }
        })
    }

    fn handle_query<R: Read, W: Write>(
        &self,
        conn: &mut Conn<R, W>,
        data: Vec<u8>,
    ) -> io::Result<()> {
        conn.recycle_read_packet();
        let ctx = self.context(conn, data, None);

        // Hold each result back one step: when the next one arrives, the
        // previous is known not to be last and is written with
        // SERVER_MORE_RESULTS_EXISTS set.
        let mut prev: Option<QueryItem> = None;
        self.executor.com_query(&ctx, &mut |item| {
            if let Some(p) = prev.take() {
                conn.buffered(|c| resultset::write_query_result(c, p, true, RowEncoding::Text))?;
            }
            prev = Some(item);
            Ok(())
        })?;

        if let Some(p) = prev.take() {
            conn.buffered(|c| resultset::write_query_result(c, p, false, RowEncoding::Text))?;
        }
        Ok(())
    }

    fn handle_field_list<R: Read, W: Write>(
        &self,
        conn: &mut Conn<R, W>,
        data: Vec<u8>,
    ) -> io::Result<()> {
        conn.recycle_read_packet();
        let ctx = self.context(conn, data, None);

        conn.buffered(|c| {
            let caps = c.capabilities();
            let fields = match self.executor.field_list(&ctx) {
                Err(e) => {
                    error!(conn = c.connection_id(), error = %e, "field list failed");
                    return writers::write_err_from(&e, &mut c.writer, caps);
                }
                Ok(fields) => fields,
            };

            for field in &fields {
                writers::write_column_definition(field, &mut c.writer)?;
            }
            writers::write_eof_packet(
                &mut c.writer,
                StatusFlags::SERVER_STATUS_AUTOCOMMIT,
                0,
            )
        })
    }

    fn handle_prepare<R: Read, W: Write>(
        &self,
        conn: &mut Conn<R, W>,
        sql: String,
        data: Vec<u8>,
    ) -> io::Result<()> {
        conn.recycle_read_packet();
        let id = self.stmts.next_id();

        conn.buffered(|c| {
            let caps = c.capabilities();

            let ast = match self.parser.parse_one(&sql) {
                Err(e) => {
                    error!(conn = c.connection_id(), error = %e, "parse failed at prepare");
                    return writers::write_err_from(&e, &mut c.writer, caps);
                }
                Ok(ast) => ast,
            };

            let mut hints = Vec::new();
            for raw in ast.hints() {
                match Hint::parse(&raw) {
                    Err(e) => {
                        error!(conn = c.connection_id(), error = %e, "bad optimizer hint");
                        return writers::write_err_from(&e, &mut c.writer, caps);
                    }
                    Ok(h) => hints.push(h),
                }
            }

            let stmt = self.stmts.store(Statement::new(id, sql, hints, ast));
            let ctx = self.context(c, data, Some(Arc::clone(&stmt)));
            self.trace.extract(&ctx, stmt.hints());

            let deprecate_eof = c.deprecate_eof();
            writers::write_prepare_ok(id, stmt.params_count(), &mut c.writer, deprecate_eof)
        })
    }

    fn handle_stmt_execute<R: Read, W: Write>(
        &self,
        conn: &mut Conn<R, W>,
        data: Vec<u8>,
    ) -> io::Result<()> {
        let parsed = params::parse_stmt_execute(&self.stmts, &data[1..]);
        conn.recycle_read_packet();

        // The executor mutates bind variables while it runs; a fresh map is
        // installed on the way out no matter how the response went.
        let reset = parsed.as_ref().ok().map(|req| Arc::clone(&req.stmt));

        let out = conn.buffered(|c| {
            let caps = c.capabilities();
            let req = match parsed {
                Err(e) => {
                    error!(conn = c.connection_id(), error = %e, "bad COM_STMT_EXECUTE");
                    return writers::write_err_from(&e, &mut c.writer, caps);
                }
                Ok(req) => req,
            };

            let mut ctx = self.context(c, data, Some(Arc::clone(&req.stmt)));
            let item: QueryItem = self
                .executor
                .com_stmt_execute(&mut ctx)
                .map(|(result, warnings)| crate::QueryOutcome { result, warnings });
            resultset::write_query_result(c, item, false, RowEncoding::Binary)
        });

        if let Some(stmt) = reset {
            stmt.reset_bind_vars();
        }
        out
    }

    fn handle_stmt_reset<R: Read, W: Write>(
        &self,
        conn: &mut Conn<R, W>,
        id: Option<u32>,
    ) -> io::Result<()> {
        conn.recycle_read_packet();
        conn.buffered(|c| {
            if let Some(id) = id {
                if let Some(stmt) = self.stmts.load(id) {
                    stmt.clear_bind_vars();
                }
            }
            let status = c.status_flags();
            writers::write_ok_packet(&mut c.writer, 0, 0, status, 0)
        })
    }

    fn handle_set_option<R: Read, W: Write>(
        &self,
        conn: &mut Conn<R, W>,
        op: Option<u16>,
    ) -> io::Result<()> {
        conn.recycle_read_packet();
        conn.buffered(|c| {
            let caps = c.capabilities();
            match op {
                Some(0) => {
                    c.set_capability(CapabilityFlags::CLIENT_MULTI_STATEMENTS, true);
                    let status = c.status_flags();
                    resultset::write_end_result(c, status, 0)
                }
                Some(1) => {
                    c.set_capability(CapabilityFlags::CLIENT_MULTI_STATEMENTS, false);
                    let status = c.status_flags();
                    resultset::write_end_result(c, status, 0)
                }
                other => {
                    error!(
                        conn = c.connection_id(),
                        operation = other.map(i64::from).unwrap_or(-1),
                        "unhandled COM_SET_OPTION operation"
                    );
                    writers::write_err(
                        ErrorKind::ER_UNKNOWN_COM_ERROR,
                        b"error handling packet: unknown COM_SET_OPTION operation",
                        &mut c.writer,
                        caps,
                    )
                }
            }
        })
    }
}
