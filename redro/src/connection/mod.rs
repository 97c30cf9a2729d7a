//! The connection engine.
//!
//! A [`Connection`] owns the byte stream, the negotiated protocol
//! version, the codec tables, the prepared-statement cache, and the
//! bounded notice/notification/parameter-status buffers. One connection
//! serves one caller at a time; every [`execute`][Connection::execute]
//! writes its pipeline and fully drains the response before returning.
use std::{
    io::{Read, Write},
    sync::Arc,
};

use bytes::{BufMut, BytesMut};

use crate::{
    Result,
    auth::Authenticator,
    common::{Fifo, debug, warning},
    cursor::{CopyStream, Cursor},
    error::Error,
    ext::{BufMutExt, UsizeExt},
    paramstyle::{self, ParamStyle, Params},
    protocol::{
        BackendMessage, ClientProtocolVersion, ProtocolError, ServerError, backend, frontend,
    },
    row::{self, FieldDescription},
    statement::{PreparedStatement, StatementCache, StatementKey},
    stream::BufferedStream,
    types::{self, CodecTable, Param, Value, oid},
};

mod config;

pub use config::{Config, TlsMode};

/// Bound of the notice, notification and parameter-status buffers.
const FIFO_CAPACITY: usize = 100;

/// COPY input is forwarded in chunks of this size.
const COPY_CHUNK: usize = 8192;

// Verbs whose command tag carries a row count, by server generation.
// SELECT is a vendor extension, its count is derived from buffered rows.
const COMMANDS_WITH_COUNT: &[&str] =
    &["INSERT", "DELETE", "UPDATE", "MOVE", "FETCH", "COPY", "SELECT"];
const COMMANDS_WITH_COUNT_PRE_9_0: &[&str] =
    &["INSERT", "DELETE", "UPDATE", "MOVE", "FETCH", "COPY"];
const COMMANDS_WITH_COUNT_PRE_8_2: &[&str] = &["INSERT", "DELETE", "UPDATE", "MOVE"];

const DRIVER_VERSION: &str = concat!("redro ", env!("CARGO_PKG_VERSION"));

/// A reported server version, compared major-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion(pub u32, pub u32, pub u32);

impl ServerVersion {
    fn parse(value: &str) -> Option<Self> {
        let digits: String = value
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = digits.split('.').map(|p| p.parse().ok());
        let major = parts.next().flatten()?;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Some(Self(major, minor, patch))
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

// Server-reported encodings whose host name differs.
fn normalize_client_encoding(value: &str) -> String {
    let lower = value.to_ascii_lowercase();
    match lower.as_str() {
        "unicode" | "utf8" => "utf-8".into(),
        "sql_ascii" => "ascii".into(),
        "alt" => "cp866".into(),
        "euc_cn" => "gb2312".into(),
        "koi8" | "koi8r" => "koi8-r".into(),
        "tcvn" => "cp1258".into(),
        _ => lower,
    }
}

/// A synchronous connection to one backend.
pub struct Connection {
    stream: BufferedStream,
    closed: bool,

    user: String,

    requested_protocol: ClientProtocolVersion,
    protocol: ClientProtocolVersion,
    server_protocol_reported: bool,
    codecs: CodecTable,
    client_encoding: String,
    server_version: Option<ServerVersion>,
    commands_with_count: &'static [&'static str],

    parameter_statuses: Fifo<(String, String)>,
    notices: Fifo<ServerError>,
    notifications: Fifo<(i32, String)>,
    backend_key_data: Option<backend::BackendKeyData>,

    caches: StatementCache,
    max_prepared_statements: usize,

    in_transaction: bool,
    autocommit: bool,
    pub(crate) xid: Option<crate::tpc::Xid>,

    // deferred ErrorResponse, raised once the drain reaches ReadyForQuery
    error: Option<Error>,
    // a completed ALTER/CREATE schedules a global cache invalidation
    invalidate_statements: bool,
    // collects RowDescription during the Parse/Describe round trip
    pending_row_desc: Option<Vec<FieldDescription>>,
}

impl Connection {
    /// Connect, negotiate TLS when configured, and run the startup and
    /// authentication dialog to `ReadyForQuery`.
    pub fn connect(config: Config) -> Result<Self> {
        if config.user.is_empty() && config.web_identity_token.is_none() {
            return Err(Error::Interface("the user connection parameter is required".into()));
        }

        debug!("establishing a connection to {}:{}", config.host, config.port);
        #[allow(unused_mut)]
        let mut stream = BufferedStream::connect(&config.host, config.port, config.timeout)?;

        if config.ssl {
            #[cfg(feature = "tls")]
            stream.secure(&config.host, config.ssl_mode, config.ca_file.as_deref())?;
            #[cfg(not(feature = "tls"))]
            return Err(Error::Interface(
                "ssl requested but the driver was built without the tls feature".into(),
            ));
        }

        let protocol = config.client_protocol_version;
        let mut me = Self {
            stream,
            closed: false,
            user: config.user.clone(),
            requested_protocol: protocol,
            protocol,
            server_protocol_reported: false,
            codecs: CodecTable::new(protocol),
            client_encoding: "utf-8".into(),
            server_version: None,
            commands_with_count: COMMANDS_WITH_COUNT,
            parameter_statuses: Fifo::new(FIFO_CAPACITY),
            notices: Fifo::new(FIFO_CAPACITY),
            notifications: Fifo::new(FIFO_CAPACITY),
            backend_key_data: None,
            caches: StatementCache::default(),
            max_prepared_statements: config.max_prepared_statements,
            in_transaction: false,
            autocommit: false,
            xid: None,
            error: None,
            invalidate_statements: false,
            pending_row_desc: None,
        };
        me.startup(&config)?;
        Ok(me)
    }

    fn startup(&mut self, config: &Config) -> Result<()> {
        // Native identity-provider plugins flag the idp type and may omit
        // the user, which the server derives from the token.
        let plugin_basename = config
            .credentials_provider
            .as_deref()
            .map(|p| p.rsplit('.').next().unwrap_or(p));
        let idp_type = plugin_basename
            .filter(|p| {
                matches!(
                    *p,
                    "BasicJwtCredentialsProvider" | "BrowserAzureOAuth2CredentialsProvider"
                )
            })
            .map(|_| "AzureAD");

        let protocol_text = self.requested_protocol.as_i32().to_string();
        let os_version = format!("{} {}", std::env::consts::OS, std::env::consts::ARCH);

        self.stream.send_startup(frontend::Startup {
            user: (!config.user.is_empty()).then_some(config.user.as_str()),
            database: Some(&config.database),
            application_name: config.application_name.as_deref(),
            replication: config.replication.as_deref(),
            client_protocol_version: &protocol_text,
            driver_version: DRIVER_VERSION,
            os_version: &os_version,
            plugin_name: config.credentials_provider.as_deref(),
            idp_type,
            provider_name: config.provider_name.as_deref(),
        });
        let flushed = self.stream.flush();
        self.guard(flushed)?;

        let mut authenticator = Authenticator::new(
            config.user.as_bytes(),
            config.password.as_deref().map(str::as_bytes),
            config.web_identity_token.as_deref(),
        );

        loop {
            let received = self.stream.recv::<BackendMessage>();
            match self.guard(received)? {
                BackendMessage::Authentication(auth) => {
                    authenticator.handle(&mut self.stream, auth)?;
                }
                BackendMessage::ParameterStatus(status) => self.handle_parameter_status(status),
                BackendMessage::BackendKeyData(key) => self.backend_key_data = Some(key),
                BackendMessage::NoticeResponse(notice) => self.push_notice(notice),
                BackendMessage::ErrorResponse(err) => {
                    return Err(ServerError::parse(err.body)?.into());
                }
                BackendMessage::ReadyForQuery(ready) => {
                    self.in_transaction = ready.tx_status != b'I';
                    break;
                }
                other => {
                    return Err(
                        ProtocolError::unexpected_phase(other.msgtype(), "startup phase").into()
                    );
                }
            }
        }

        // The server never reported a protocol version: it predates the
        // negotiation, demote silently to the base protocol.
        if self.protocol > ClientProtocolVersion::BaseServer && !self.server_protocol_reported {
            debug!("server_protocol_version not received from server");
            self.protocol = ClientProtocolVersion::BaseServer;
            self.codecs = CodecTable::new(self.protocol);
        }
        Ok(())
    }

    /// Execute `(sql, params)` through `cursor`.
    ///
    /// The query is rewritten from the cursor's paramstyle, parameter
    /// types are inspected and encoded, the statement is parsed and
    /// described on first use, then bound and executed, and the inbound
    /// stream is drained into the cursor.
    pub fn execute<P: Into<Params>>(
        &mut self,
        cursor: &mut Cursor,
        sql: &str,
        params: P,
    ) -> Result<()> {
        self.ensure_open()?;
        let params = params.into();
        let style = cursor.paramstyle();

        let (rewritten, materializer) = {
            let shard = self.caches.shard(style);
            match shard.rewrites.get(sql) {
                Some(hit) => hit.clone(),
                None => {
                    let converted = paramstyle::convert(style, sql)?;
                    shard.rewrites.put(sql.to_string(), converted.clone());
                    converted
                }
            }
        };

        let args = materializer.make_args(&params)?;
        let specs = args.iter().map(types::inspect).collect::<Result<Vec<_>>>()?;

        // Encode every argument before anything reaches the wire, so
        // array shape errors surface with the connection still clean.
        let mut encoded = Vec::with_capacity(args.len());
        for (value, spec) in args.iter().zip(&specs) {
            encoded.push(spec.encoder.encode(value)?);
        }

        let signature: Vec<_> = specs.iter().map(|spec| spec.oid).collect();
        let key = (sql.to_string(), signature);

        let cached = self.caches.shard(style).statements.get(&key).cloned();
        let ps = match cached {
            Some(hit) => hit,
            None => self.prepare(cursor, style, &key, &rewritten, &specs)?,
        };
        cursor.ps = Some(Arc::clone(&ps));

        cursor.rows.clear();
        cursor.row_count = -1;
        cursor.redshift_row_count = -1;

        let mut bind = BytesMut::with_capacity(ps.bind_1.len() + ps.bind_2.len() + 64);
        bind.extend_from_slice(&ps.bind_1);
        for value in &encoded {
            match value {
                None => bind.put_i32(-1),
                Some(bytes) => {
                    bind.put_i32(bytes.len() as i32);
                    bind.extend_from_slice(bytes);
                }
            }
        }
        bind.extend_from_slice(&ps.bind_2);

        let sent = (|| {
            self.stream.send(frontend::Bind { body: &bind[..] });
            self.stream.send(frontend::Flush);
            self.stream.send(frontend::Execute { portal: "", row_limit: 0 });
            self.stream.send(frontend::Flush);
            self.stream.send(frontend::Sync);
            self.stream.flush()
        })();
        self.guard(sent)?;

        self.drain(cursor)
    }

    /// Parse and describe a statement the cache does not hold yet.
    fn prepare(
        &mut self,
        cursor: &mut Cursor,
        style: ParamStyle,
        key: &StatementKey,
        rewritten: &str,
        specs: &[Param],
    ) -> Result<Arc<PreparedStatement>> {
        let num = self.caches.next_statement_num();
        let name = format!("redro_statement_{}_{}", std::process::id(), num);
        debug!("preparing {name}: {rewritten}");

        let sent = (|| {
            self.stream.send(frontend::Parse {
                prepare_name: &name,
                sql: rewritten,
                oids_len: specs.len().to_u16(),
                // Parse does not accept the -1 "no type" marker, send the
                // unknown pseudo type instead
                oids: specs
                    .iter()
                    .map(|spec| if spec.oid == -1 { oid::UNKNOWN } else { spec.oid }),
            });
            self.stream.send(frontend::Flush);
            self.stream.send(frontend::Describe { kind: b'S', name: &name });
            self.stream.send(frontend::Flush);
            self.stream.send(frontend::Sync);
            self.stream.flush()
        })();
        self.guard(sent)?;

        self.pending_row_desc = Some(Vec::new());
        let drained = self.drain(cursor);
        let row_desc = self.pending_row_desc.take().unwrap_or_default();
        drained?;

        let mut bind_1 = BytesMut::new();
        bind_1.put_nul_string(""); // the unnamed portal
        bind_1.put_nul_string(&name);
        bind_1.put_u16(specs.len().to_u16());
        for spec in specs {
            bind_1.put_i16(spec.format.format_code());
        }
        bind_1.put_u16(specs.len().to_u16());

        let mut bind_2 = BytesMut::new();
        bind_2.put_u16(row_desc.len().to_u16());
        for field in &row_desc {
            bind_2.put_i16(field.decoder_format.format_code());
        }

        let ps = Arc::new(PreparedStatement {
            name,
            statement_num: num,
            row_desc,
            params: specs.to_vec(),
            bind_1: bind_1.freeze(),
            bind_2: bind_2.freeze(),
        });

        // Over capacity: close every statement in this shard and start
        // over with just the new one.
        if self.caches.shard(style).statements.len() >= self.max_prepared_statements {
            let evicted: Vec<_> = self
                .caches
                .shard(style)
                .statements
                .drain()
                .map(|(_, old)| old)
                .collect();
            for old in evicted {
                self.close_statement(&old.name)?;
            }
        }
        self.caches
            .shard(style)
            .statements
            .insert(key.clone(), Arc::clone(&ps));
        Ok(ps)
    }

    /// Drain inbound messages to `ReadyForQuery`, then settle deferred
    /// work: raise a recorded `ErrorResponse`, run a scheduled cache
    /// invalidation.
    fn drain(&mut self, cursor: &mut Cursor) -> Result<()> {
        let result = self.drain_inner(cursor);
        let deferred = self.error.take();
        result?;
        if self.invalidate_statements {
            self.invalidate_statements = false;
            self.invalidate_prepared_statements()?;
        }
        match deferred {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn drain_inner(&mut self, cursor: &mut Cursor) -> Result<()> {
        loop {
            let received = self.stream.recv::<BackendMessage>();
            match self.guard(received)? {
                BackendMessage::ReadyForQuery(ready) => {
                    self.in_transaction = ready.tx_status != b'I';
                    return Ok(());
                }
                BackendMessage::NoticeResponse(notice) => self.push_notice(notice),
                BackendMessage::NotificationResponse(n) => {
                    self.notifications.push((n.process_id, n.condition));
                }
                BackendMessage::ParameterStatus(status) => self.handle_parameter_status(status),
                BackendMessage::BackendKeyData(key) => self.backend_key_data = Some(key),
                BackendMessage::RowDescription(desc) => {
                    let extended =
                        self.protocol >= ClientProtocolVersion::ExtendedResultMetadata;
                    let fields = row::parse_row_description(desc.body, extended, &self.codecs)?;
                    match &mut self.pending_row_desc {
                        Some(slot) => *slot = fields,
                        None => {
                            self.error = Some(Error::Interface(
                                "row description outside a statement describe".into(),
                            ));
                        }
                    }
                }
                BackendMessage::DataRow(data) => match &cursor.ps {
                    Some(ps) => cursor.rows.push(row::decode_data_row(data.body, &ps.row_desc)?),
                    None => {
                        self.error = Some(Error::Interface(
                            "data row without a prepared statement".into(),
                        ));
                    }
                },
                BackendMessage::CommandComplete(complete) => {
                    self.handle_command_complete(&complete.tag, cursor);
                }
                BackendMessage::EmptyQueryResponse(_) => {
                    self.error = Some(Error::Programming("query was empty".into()));
                }
                BackendMessage::ErrorResponse(err) => {
                    self.error = Some(ServerError::parse(err.body)?.into());
                }
                BackendMessage::CopyInResponse(_) => self.handle_copy_in(cursor)?,
                BackendMessage::CopyOutResponse(_) => {
                    if !matches!(cursor.copy_stream, Some(CopyStream::Out(_))) {
                        return Err(Error::Interface(
                            "an output stream is required for the COPY OUT response".into(),
                        ));
                    }
                }
                BackendMessage::CopyData(data) => {
                    if let Some(CopyStream::Out(out)) = &mut cursor.copy_stream {
                        let written = out.write_all(&data.data).map_err(Error::Io);
                        self.guard(written)?;
                    }
                }
                BackendMessage::Authentication(_) => {
                    return Err(
                        ProtocolError::unexpected_phase(b'R', "an extended query cycle").into()
                    );
                }
                // completion indicators carry no state the driver needs
                BackendMessage::CopyDone(_)
                | BackendMessage::ParseComplete(_)
                | BackendMessage::BindComplete(_)
                | BackendMessage::CloseComplete(_)
                | BackendMessage::PortalSuspended(_)
                | BackendMessage::NoData(_)
                | BackendMessage::ParameterDescription(_) => {}
            }
        }
    }

    fn handle_command_complete(&mut self, tag: &str, cursor: &mut Cursor) {
        let command = tag.split(' ').next().unwrap_or_default();
        let count = tag.rsplit(' ').next().and_then(|w| w.parse::<i64>().ok());

        match count {
            Some(count) if self.commands_with_count.contains(&command) => {
                if cursor.row_count == -1 {
                    cursor.row_count = count;
                } else {
                    cursor.row_count += count;
                }
                cursor.redshift_row_count = cursor.row_count;
            }
            _ if command == "SELECT" => {
                // the server does not report a SELECT count, derive it
                // from what was buffered
                cursor.redshift_row_count = cursor.rows.len() as i64;
            }
            _ => {}
        }

        if matches!(command, "ALTER" | "CREATE") {
            self.invalidate_statements = true;
        }
    }

    fn handle_parameter_status(&mut self, status: backend::ParameterStatus) {
        let backend::ParameterStatus { name, value } = status;
        match name.as_str() {
            "client_encoding" => self.client_encoding = normalize_client_encoding(&value),
            "server_protocol_version" => {
                self.server_protocol_reported = true;
                if let Ok(reported) = value.as_str().parse::<i32>() {
                    if reported != self.protocol.as_i32() {
                        let adopted = ClientProtocolVersion::from_i32(reported)
                            .unwrap_or(ClientProtocolVersion::BaseServer);
                        warning!(
                            "server indicated the {} transfer protocol will be used rather \
                             than the requested {}",
                            adopted.name(),
                            self.protocol.name(),
                        );
                        self.protocol = adopted;
                        self.codecs = CodecTable::new(adopted);
                    }
                }
            }
            "server_version" => {
                if let Some(version) = ServerVersion::parse(&value) {
                    if version < ServerVersion(8, 2, 0) {
                        self.commands_with_count = COMMANDS_WITH_COUNT_PRE_8_2;
                    } else if version < ServerVersion(9, 0, 0) {
                        self.commands_with_count = COMMANDS_WITH_COUNT_PRE_9_0;
                    }
                    self.server_version = Some(version);
                }
            }
            _ => {}
        }
        self.parameter_statuses.push((name, value));
    }

    fn push_notice(&mut self, notice: backend::NoticeResponse) {
        match ServerError::parse(notice.body) {
            Ok(fields) => self.notices.push(fields),
            Err(_err) => debug!("undecodable notice: {_err}"),
        }
    }

    fn handle_copy_in(&mut self, cursor: &mut Cursor) -> Result<()> {
        let Some(CopyStream::In(input)) = &mut cursor.copy_stream else {
            return Err(Error::Interface(
                "an input stream is required for the COPY IN response".into(),
            ));
        };

        let mut chunk = [0u8; COPY_CHUNK];
        loop {
            let n = input.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            self.stream.send(frontend::CopyData { data: &chunk[..n] });
            let flushed = self.stream.flush();
            self.guard(flushed)?;
        }

        self.stream.send(frontend::CopyDone);
        self.stream.send(frontend::Sync);
        let flushed = self.stream.flush();
        self.guard(flushed)
    }

    /// Close a server-side prepared statement and drain the response.
    fn close_statement(&mut self, name: &str) -> Result<()> {
        let sent = (|| {
            self.stream.send(frontend::Close { kind: b'S', name });
            self.stream.send(frontend::Flush);
            self.stream.send(frontend::Sync);
            self.stream.flush()
        })();
        self.guard(sent)?;

        let mut scratch = Cursor::new();
        self.drain_inner(&mut scratch)?;
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// A completed `ALTER`/`CREATE` invalidates every cached statement
    /// across all paramstyles.
    fn invalidate_prepared_statements(&mut self) -> Result<()> {
        for ps in self.caches.drain_statements() {
            self.close_statement(&ps.name)?;
        }
        Ok(())
    }

    /// Execute on an internal scratch cursor and return the buffered
    /// rows. Placeholders use the `named` dialect.
    pub fn run<P: Into<Params>>(&mut self, sql: &str, params: P) -> Result<Vec<Vec<Value>>> {
        let mut cursor = Cursor::with_paramstyle(ParamStyle::Named);
        self.execute(&mut cursor, sql, params)?;
        Ok(cursor.take_rows())
    }

    /// Commit the current transaction.
    pub fn commit(&mut self) -> Result<()> {
        let mut cursor = Cursor::new();
        self.execute(&mut cursor, "commit", Params::None)
    }

    /// Roll back the current transaction. A no-op outside a transaction.
    pub fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        let mut cursor = Cursor::new();
        self.execute(&mut cursor, "rollback", Params::None)
    }

    /// Send `Terminate` and close the stream. Further operations fail
    /// with an interface error.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.stream.send(frontend::Terminate);
        let _ = self.stream.flush();
        self.stream.shutdown();
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Interface("connection is closed".into()));
        }
        Ok(())
    }

    /// Socket failures leave the connection unusable.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(Error::Io(_))) {
            self.closed = true;
        }
        result
    }

    /// Whether the last `ReadyForQuery` reported an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Whether transaction control is left to the server.
    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    pub fn set_autocommit(&mut self, autocommit: bool) {
        self.autocommit = autocommit;
    }

    /// The transfer protocol in effect after negotiation.
    pub fn protocol_version(&self) -> ClientProtocolVersion {
        self.protocol
    }

    /// The negotiated client encoding, normalized to host naming.
    pub fn client_encoding(&self) -> &str {
        &self.client_encoding
    }

    /// The reported server version, when one was received.
    pub fn server_version(&self) -> Option<ServerVersion> {
        self.server_version
    }

    /// Cancellation key data received during startup.
    pub fn backend_key_data(&self) -> Option<&backend::BackendKeyData> {
        self.backend_key_data.as_ref()
    }

    /// The most recent 100 parameter status reports, oldest first.
    pub fn parameter_statuses(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameter_statuses
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// The most recent 100 notices, oldest first.
    pub fn notices(&self) -> impl Iterator<Item = &ServerError> {
        self.notices.iter()
    }

    /// The most recent 100 notifications, oldest first.
    pub fn notifications(&self) -> impl Iterator<Item = (i32, &str)> {
        self.notifications
            .iter()
            .map(|(pid, condition)| (*pid, condition.as_str()))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("stream", &self.stream)
            .field("closed", &self.closed)
            .field("user", &self.user)
            .field("protocol", &self.protocol)
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn server_version_ordering() {
        let v = ServerVersion::parse("8.0.2").unwrap();
        assert_eq!(v, ServerVersion(8, 0, 2));
        assert!(v < ServerVersion(8, 2, 0));
        assert!(ServerVersion::parse("8.2.5").unwrap() >= ServerVersion(8, 2, 0));
        assert_eq!(
            ServerVersion::parse("9.0.1 redshift").unwrap(),
            ServerVersion(9, 0, 1),
        );
        assert!(ServerVersion::parse("devel").is_none());
    }

    #[test]
    fn encoding_normalization() {
        assert_eq!(normalize_client_encoding("UNICODE"), "utf-8");
        assert_eq!(normalize_client_encoding("UTF8"), "utf-8");
        assert_eq!(normalize_client_encoding("SQL_ASCII"), "ascii");
        assert_eq!(normalize_client_encoding("LATIN1"), "latin1");
    }
}
