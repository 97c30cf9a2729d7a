//! Two-phase commit verbs, layered over the extended-query driver.
use crate::{
    Result,
    connection::Connection,
    cursor::Cursor,
    error::Error,
    paramstyle::Params,
    types::Value,
};

/// A distributed transaction identifier.
///
/// Only `gtrid` is transmitted; `format_id` and `bqual` exist for
/// interface compatibility with transaction managers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xid {
    pub format_id: i32,
    pub gtrid: String,
    pub bqual: String,
}

impl Connection {
    /// Create a transaction id.
    pub fn xid(format_id: i32, gtrid: impl Into<String>, bqual: impl Into<String>) -> Xid {
        Xid { format_id, gtrid: gtrid.into(), bqual: bqual.into() }
    }

    /// Begin a TPC transaction with the given transaction id.
    ///
    /// Should be called outside of a transaction. With autocommit on, a
    /// transaction block is opened explicitly.
    pub fn tpc_begin(&mut self, xid: Xid) -> Result<()> {
        self.xid = Some(xid);
        if self.autocommit() {
            let mut cursor = Cursor::new();
            self.execute(&mut cursor, "begin transaction", Params::None)?;
        }
        Ok(())
    }

    /// First phase: `PREPARE TRANSACTION` under the stored xid.
    pub fn tpc_prepare(&mut self) -> Result<()> {
        let gtrid = match &self.xid {
            Some(xid) if !xid.gtrid.is_empty() => xid.gtrid.clone(),
            _ => return Err(Error::Interface("malformed transaction id".into())),
        };
        let mut cursor = Cursor::new();
        self.execute(
            &mut cursor,
            &format!("PREPARE TRANSACTION '{gtrid}';"),
            Params::None,
        )
    }

    /// Commit a TPC transaction.
    ///
    /// With no argument, commits the transaction previously prepared
    /// under the stored xid; called before `tpc_prepare`, a single-phase
    /// commit is performed. With an xid, commits that transaction, for
    /// use in recovery.
    pub fn tpc_commit(&mut self, xid: Option<Xid>) -> Result<()> {
        let Some(xid) = xid.or_else(|| self.xid.clone()) else {
            return Err(Error::Programming("cannot tpc_commit() without a TPC transaction".into()));
        };

        let previous_autocommit = self.autocommit();
        self.set_autocommit(true);
        let result = (|| {
            if self.tpc_recover()?.iter().any(|pending| pending.gtrid == xid.gtrid) {
                let mut cursor = Cursor::new();
                self.execute(
                    &mut cursor,
                    &format!("COMMIT PREPARED '{}';", xid.gtrid),
                    Params::None,
                )
            } else {
                // nothing was prepared, a single-phase commit suffices
                self.commit()
            }
        })();
        self.set_autocommit(previous_autocommit);
        self.xid = None;
        result
    }

    /// Roll back a TPC transaction, before or after `tpc_prepare`. With
    /// an xid, rolls back that transaction, for use in recovery.
    pub fn tpc_rollback(&mut self, xid: Option<Xid>) -> Result<()> {
        let Some(xid) = xid.or_else(|| self.xid.clone()) else {
            return Err(Error::Programming(
                "cannot tpc_rollback() without a TPC prepared transaction".into(),
            ));
        };

        let previous_autocommit = self.autocommit();
        self.set_autocommit(true);
        let result = (|| {
            if self.tpc_recover()?.iter().any(|pending| pending.gtrid == xid.gtrid) {
                let mut cursor = Cursor::new();
                self.execute(
                    &mut cursor,
                    &format!("ROLLBACK PREPARED '{}';", xid.gtrid),
                    Params::None,
                )
            } else {
                self.rollback()
            }
        })();
        self.set_autocommit(previous_autocommit);
        self.xid = None;
        result
    }

    /// Transaction ids pending on the server, suitable for
    /// [`tpc_commit`][Connection::tpc_commit] or
    /// [`tpc_rollback`][Connection::tpc_rollback].
    pub fn tpc_recover(&mut self) -> Result<Vec<Xid>> {
        let previous_autocommit = self.autocommit();
        self.set_autocommit(true);
        let result = self.run("select xact_id FROM stl_undone", Params::None);
        self.set_autocommit(previous_autocommit);

        Ok(result?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter_map(|value| match value {
                Value::Int(id) => Some(Self::xid(0, id.to_string(), "")),
                Value::Text(id) => Some(Self::xid(0, id, "")),
                Value::Numeric(id) => Some(Self::xid(0, id, "")),
                _ => None,
            })
            .collect())
    }
}
