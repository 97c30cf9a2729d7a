//! The cursor-like execution surface the driver populates.
use std::sync::Arc;

use crate::{
    paramstyle::ParamStyle,
    statement::PreparedStatement,
    types::Value,
};

/// Caller-supplied stream for COPY transfers.
///
/// `COPY ... FROM stdin` reads from an [`In`][CopyStream::In] stream in
/// 8 KiB chunks; `COPY ... TO stdout` writes every data message verbatim
/// to an [`Out`][CopyStream::Out] stream.
pub enum CopyStream {
    In(Box<dyn std::io::Read + Send>),
    Out(Box<dyn std::io::Write + Send>),
}

/// Execution state for one statement at a time.
///
/// The driver fills in decoded rows, the two row counters and the
/// prepared statement reference; result-set iteration conventions on top
/// of this are the caller's business.
pub struct Cursor {
    paramstyle: ParamStyle,
    pub(crate) rows: Vec<Vec<Value>>,
    pub(crate) row_count: i64,
    pub(crate) redshift_row_count: i64,
    pub(crate) copy_stream: Option<CopyStream>,
    pub(crate) ps: Option<Arc<PreparedStatement>>,
}

impl Cursor {
    /// A cursor in the default `format` paramstyle.
    pub fn new() -> Self {
        Self::with_paramstyle(ParamStyle::default())
    }

    pub fn with_paramstyle(paramstyle: ParamStyle) -> Self {
        Self {
            paramstyle,
            rows: Vec::new(),
            row_count: -1,
            redshift_row_count: -1,
            copy_stream: None,
            ps: None,
        }
    }

    /// The placeholder dialect queries through this cursor use.
    pub fn paramstyle(&self) -> ParamStyle {
        self.paramstyle
    }

    /// Decoded rows buffered by the last execution.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Take ownership of the buffered rows.
    pub fn take_rows(&mut self) -> Vec<Vec<Value>> {
        std::mem::take(&mut self.rows)
    }

    /// Rows affected as reported by the command tag, `-1` when the
    /// server did not report a count.
    pub fn row_count(&self) -> i64 {
        self.row_count
    }

    /// Like [`row_count`][Self::row_count], but for `SELECT` the count is
    /// derived from the buffered rows, which the server does not report.
    pub fn redshift_row_count(&self) -> i64 {
        self.redshift_row_count
    }

    /// The prepared statement backing the last execution.
    pub fn prepared_statement(&self) -> Option<&PreparedStatement> {
        self.ps.as_deref()
    }

    /// Supply the stream for a COPY statement. Consumed by the next
    /// COPY response.
    pub fn set_copy_stream(&mut self, stream: CopyStream) {
        self.copy_stream = Some(stream);
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("paramstyle", &self.paramstyle)
            .field("rows", &self.rows.len())
            .field("row_count", &self.row_count)
            .field("redshift_row_count", &self.redshift_row_count)
            .field("ps", &self.ps)
            .finish()
    }
}
