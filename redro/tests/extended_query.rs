//! End-to-end drives against a scripted in-process backend.
use std::sync::{Arc, Mutex};

use redro::{
    ClientProtocolVersion, Config, Connection, CopyStream, Cursor, ErrorKind, ParamStyle, Params,
    ServerVersion, Value,
};

use mock::{Backend, MockServer, Query};

#[test]
fn cleartext_login_and_select_one() {
    let server = MockServer::start(|be: &mut Backend| {
        let params = be.read_startup();
        assert_eq!(params.get("user").map(String::as_str), Some("alice"));
        assert_eq!(params.get("database").map(String::as_str), Some("db"));
        assert!(params.contains_key("driver_version"));
        assert!(params.contains_key("os_version"));
        assert_eq!(params.get("client_protocol_version").map(String::as_str), Some("1"));

        be.auth_request(3, &[]);
        let (code, body) = be.read_message().unwrap();
        assert_eq!(code, b'p');
        assert_eq!(body, b"swordfish\0");
        be.auth_request(0, &[]);

        be.parameter_status("client_encoding", "UTF8");
        be.parameter_status("server_version", "8.0.2");
        be.backend_key_data(7, 42);
        be.ready_for_query(b'I');

        be.serve_script(|sql| {
            assert_eq!(sql, "SELECT 1");
            Query {
                columns: vec![("?column?".into(), 23)],
                rows: vec![vec![Some(1i32.to_be_bytes().to_vec())]],
                tag: "SELECT".into(),
            }
        });
    });

    let mut conn = Connection::connect(server.config("alice", "swordfish", "db")).unwrap();

    // no server_protocol_version report: silently demoted to base
    assert_eq!(conn.protocol_version(), ClientProtocolVersion::BaseServer);
    assert_eq!(conn.server_version(), Some(ServerVersion(8, 0, 2)));
    assert_eq!(conn.client_encoding(), "utf-8");
    assert_eq!(conn.backend_key_data().unwrap().process_id, 7);

    let mut cursor = Cursor::with_paramstyle(ParamStyle::Qmark);
    conn.execute(&mut cursor, "SELECT 1", Params::None).unwrap();

    assert_eq!(cursor.rows(), &[vec![Value::Int(1)]]);
    assert_eq!(cursor.row_count(), -1);
    assert_eq!(cursor.redshift_row_count(), 1);

    conn.close().unwrap();
    server.finish();
}

#[test]
fn md5_login_sends_salted_hash() {
    let server = MockServer::start(|be: &mut Backend| {
        be.read_startup();
        be.auth_request(5, &[0xde, 0xad, 0xbe, 0xef]);

        let (code, body) = be.read_message().unwrap();
        assert_eq!(code, b'p');
        assert_eq!(body, b"md53e1d73ba00a55e8805aa0277d29996c5\0");

        be.auth_request(0, &[]);
        be.ready_for_query(b'I');
    });

    let mut conn = Connection::connect(server.config("alice", "secret", "db")).unwrap();
    conn.close().unwrap();
    server.finish();
}

#[test]
fn named_placeholders_deduplicate_on_the_wire() {
    let server = MockServer::start(|be: &mut Backend| {
        be.trust_startup();
        be.serve_script(|sql| {
            assert_eq!(sql, "SELECT $1 + $1 + $2");
            Query {
                columns: vec![("?column?".into(), 23)],
                rows: vec![vec![Some(4i32.to_be_bytes().to_vec())]],
                tag: "SELECT".into(),
            }
        });
    });

    let mut conn = Connection::connect(server.config("u", "p", "db")).unwrap();
    let mut cursor = Cursor::with_paramstyle(ParamStyle::Named);
    conn.execute(
        &mut cursor,
        "SELECT :x + :x + :y",
        Params::from_iter([("x", 1i32), ("y", 2i32)]),
    )
    .unwrap();
    assert_eq!(cursor.rows(), &[vec![Value::Int(4)]]);
    conn.close().unwrap();

    // the Bind payload carried exactly the two deduplicated arguments,
    // as big-endian SMALLINTs
    let bind = server.messages(b'B').pop().unwrap();
    let after_portal = 1; // unnamed portal
    let name_end = after_portal + bind[after_portal..].iter().position(|b| *b == 0).unwrap() + 1;
    let mut cells = &bind[name_end..];
    let nfmt = u16::from_be_bytes([cells[0], cells[1]]) as usize;
    cells = &cells[2 + nfmt * 2..];
    let nparams = u16::from_be_bytes([cells[0], cells[1]]);
    assert_eq!(nparams, 2);
    cells = &cells[2..];
    assert_eq!(&cells[..8], &[0, 0, 0, 2, 0, 1, 0, 0, 0, 2, 0, 2][..8]);

    server.finish();
}

#[test]
fn statement_cache_flushes_at_capacity() {
    let server = MockServer::start(|be: &mut Backend| {
        be.trust_startup();
        be.serve_script(|_| Query {
            columns: vec![("n".into(), 23)],
            rows: vec![vec![Some(0i32.to_be_bytes().to_vec())]],
            tag: "SELECT".into(),
        });
    });

    let mut config = server.config("u", "p", "db");
    config.max_prepared_statements = 2;
    let mut conn = Connection::connect(config).unwrap();

    let mut cursor = Cursor::with_paramstyle(ParamStyle::Qmark);
    conn.execute(&mut cursor, "SELECT 1", Params::None).unwrap();
    conn.execute(&mut cursor, "SELECT 2", Params::None).unwrap();
    assert!(server.messages(b'C').is_empty(), "nothing closed below capacity");

    // the third distinct statement flushes the prior two
    conn.execute(&mut cursor, "SELECT 3", Params::None).unwrap();
    assert_eq!(server.messages(b'C').len(), 2);

    // and the survivor is cached: re-executing it does not re-Parse
    conn.execute(&mut cursor, "SELECT 3", Params::None).unwrap();
    assert_eq!(server.parse_count("SELECT 3"), 1);

    conn.close().unwrap();
    server.finish();
}

#[test]
fn completed_ddl_invalidates_every_cached_statement() {
    let server = MockServer::start(|be: &mut Backend| {
        be.trust_startup();
        be.serve_script(|sql| {
            if sql.starts_with("CREATE") {
                Query { columns: vec![], rows: vec![], tag: "CREATE TABLE".into() }
            } else {
                Query {
                    columns: vec![("n".into(), 23)],
                    rows: vec![vec![Some(0i32.to_be_bytes().to_vec())]],
                    tag: "SELECT".into(),
                }
            }
        });
    });

    let mut conn = Connection::connect(server.config("u", "p", "db")).unwrap();
    let mut cursor = Cursor::with_paramstyle(ParamStyle::Qmark);

    conn.execute(&mut cursor, "SELECT 1", Params::None).unwrap();
    assert_eq!(server.parse_count("SELECT 1"), 1);

    conn.execute(&mut cursor, "CREATE TABLE t (a int)", Params::None).unwrap();
    // both cached statements were closed
    assert_eq!(server.messages(b'C').len(), 2);

    // the cached text is re-Parsed after the invalidation
    conn.execute(&mut cursor, "SELECT 1", Params::None).unwrap();
    assert_eq!(server.parse_count("SELECT 1"), 2);

    conn.close().unwrap();
    server.finish();
}

#[test]
fn tpc_commit_prepared_round_trip() {
    let server = MockServer::start(|be: &mut Backend| {
        be.trust_startup();
        be.serve_script(|sql| {
            if sql == "select xact_id FROM stl_undone" {
                Query {
                    columns: vec![("xact_id".into(), 20)],
                    rows: vec![vec![Some(123i64.to_be_bytes().to_vec())]],
                    tag: "SELECT".into(),
                }
            } else {
                Query { columns: vec![], rows: vec![], tag: "COMMIT".into() }
            }
        });
    });

    let mut conn = Connection::connect(server.config("u", "p", "db")).unwrap();

    conn.tpc_begin(Connection::xid(0, "123", "")).unwrap();
    conn.tpc_prepare().unwrap();
    conn.tpc_commit(None).unwrap();
    conn.close().unwrap();

    let sqls = server.parsed_sqls();
    assert!(sqls.contains(&"PREPARE TRANSACTION '123';".to_string()), "{sqls:?}");
    assert!(sqls.contains(&"COMMIT PREPARED '123';".to_string()), "{sqls:?}");
    server.finish();
}

#[test]
fn copy_in_forwards_caller_stream() {
    let server = MockServer::start(|be: &mut Backend| {
        be.trust_startup();

        // Parse/Describe cycle
        let group = be.read_group().unwrap();
        assert!(group.iter().any(|(c, _)| *c == b'P'));
        be.send(b'1', &[]);
        be.send(b'n', &[]);
        be.ready_for_query(b'I');

        // Bind/Execute cycle answered with CopyInResponse
        be.read_group().unwrap();
        be.send(b'2', &[]);
        be.send(b'G', &[0, 0, 0]);

        let mut received = Vec::new();
        loop {
            let (code, body) = be.read_message().unwrap();
            match code {
                b'd' => received.extend_from_slice(&body),
                b'c' => break,
                other => panic!("unexpected message {:?} during copy", other as char),
            }
        }
        assert_eq!(received, b"1,a\n2,b\n");

        // the driver follows CopyDone with its own Sync
        let (code, _) = be.read_message().unwrap();
        assert_eq!(code, b'S');

        be.command_complete("COPY 2");
        be.ready_for_query(b'I');
    });

    let mut conn = Connection::connect(server.config("u", "p", "db")).unwrap();
    let mut cursor = Cursor::with_paramstyle(ParamStyle::Qmark);
    cursor.set_copy_stream(CopyStream::In(Box::new(&b"1,a\n2,b\n"[..])));
    conn.execute(&mut cursor, "COPY t FROM stdin WITH csv", Params::None).unwrap();
    assert_eq!(cursor.row_count(), 2);
    server.finish();
}

#[test]
fn copy_out_requires_and_fills_caller_stream() {
    let server = MockServer::start(|be: &mut Backend| {
        be.trust_startup();

        let group = be.read_group().unwrap();
        assert!(group.iter().any(|(c, _)| *c == b'P'));
        be.send(b'1', &[]);
        be.send(b'n', &[]);
        be.ready_for_query(b'I');

        be.read_group().unwrap();
        be.send(b'2', &[]);
        be.send(b'H', &[0, 0, 0]);
        be.send(b'd', b"1,a\n");
        be.send(b'd', b"2,b\n");
        be.send(b'c', &[]);
        be.command_complete("COPY 2");
        be.ready_for_query(b'I');
    });

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);
    impl std::io::Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let mut conn = Connection::connect(server.config("u", "p", "db")).unwrap();
    let mut cursor = Cursor::with_paramstyle(ParamStyle::Qmark);
    let sink = Sink::default();
    cursor.set_copy_stream(CopyStream::Out(Box::new(sink.clone())));
    conn.execute(&mut cursor, "COPY t TO stdout WITH csv", Params::None).unwrap();

    assert_eq!(*sink.0.lock().unwrap(), b"1,a\n2,b\n");
    assert_eq!(cursor.row_count(), 2);
    server.finish();
}

#[test]
fn extended_metadata_reaches_the_row_description() {
    let server = MockServer::start(|be: &mut Backend| {
        be.read_startup();
        be.auth_request(0, &[]);
        // confirm the requested protocol so the client keeps extended
        // result metadata on
        be.parameter_status("server_protocol_version", "1");
        be.ready_for_query(b'I');
        be.extended = true;

        be.serve_script(|_| Query {
            columns: vec![("id".into(), 23)],
            rows: vec![vec![Some(5i32.to_be_bytes().to_vec())]],
            tag: "SELECT".into(),
        });
    });

    let mut conn = Connection::connect(server.config("u", "p", "db")).unwrap();
    assert_eq!(conn.protocol_version(), ClientProtocolVersion::ExtendedResultMetadata);

    let mut cursor = Cursor::with_paramstyle(ParamStyle::Qmark);
    conn.execute(&mut cursor, "SELECT id FROM t", Params::None).unwrap();
    assert_eq!(cursor.rows(), &[vec![Value::Int(5)]]);

    let ps = cursor.prepared_statement().unwrap();
    let field = &ps.row_description()[0];
    assert_eq!(field.schema_name.as_ref().unwrap().as_str(), "public");
    assert_eq!(field.table_name.as_ref().unwrap().as_str(), "t");
    assert_eq!(field.catalog_name.as_ref().unwrap().as_str(), "dev");
    assert!(field.nullable);

    conn.close().unwrap();
    server.finish();
}

#[test]
fn startup_error_maps_to_interface_kind() {
    let server = MockServer::start(|be: &mut Backend| {
        be.read_startup();
        be.error_response("28000", "password authentication failed for user \"u\"");
    });

    let err = Connection::connect(server.config("u", "bad", "db")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interface);
    assert_eq!(err.as_server().unwrap().code(), "28000");
    server.finish();
}

#[test]
fn deferred_error_is_raised_after_ready_for_query() {
    let server = MockServer::start(|be: &mut Backend| {
        be.trust_startup();

        let group = be.read_group().unwrap();
        assert!(group.iter().any(|(c, _)| *c == b'P'));
        be.error_response("42601", "syntax error at or near \"BOGUS\"");
        be.ready_for_query(b'I');

        // the connection stays usable afterwards
        be.serve_script(|_| Query {
            columns: vec![("n".into(), 23)],
            rows: vec![vec![Some(9i32.to_be_bytes().to_vec())]],
            tag: "SELECT".into(),
        });
    });

    let mut conn = Connection::connect(server.config("u", "p", "db")).unwrap();
    let mut cursor = Cursor::with_paramstyle(ParamStyle::Qmark);

    let err = conn.execute(&mut cursor, "BOGUS", Params::None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Programming);

    conn.execute(&mut cursor, "SELECT 9", Params::None).unwrap();
    assert_eq!(cursor.rows(), &[vec![Value::Int(9)]]);

    conn.close().unwrap();
    server.finish();
}

mod mock {
    use std::{
        collections::HashMap,
        io::{Read, Write},
        net::{TcpListener, TcpStream},
        sync::{Arc, Mutex},
        thread::JoinHandle,
    };

    use redro::Config;

    /// Scripted response for one statement.
    pub struct Query {
        pub columns: Vec<(String, i32)>,
        pub rows: Vec<Vec<Option<Vec<u8>>>>,
        pub tag: String,
    }

    /// The backend half of one connection.
    pub struct Backend {
        stream: TcpStream,
        /// Emit extended result metadata in row descriptions.
        pub extended: bool,
        log: Arc<Mutex<Vec<(u8, Vec<u8>)>>>,
    }

    pub struct MockServer {
        port: u16,
        handle: Option<JoinHandle<()>>,
        log: Arc<Mutex<Vec<(u8, Vec<u8>)>>>,
    }

    impl MockServer {
        pub fn start(handler: impl FnOnce(&mut Backend) + Send + 'static) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let log = Arc::new(Mutex::new(Vec::new()));
            let backend_log = Arc::clone(&log);

            let handle = std::thread::spawn(move || {
                let (stream, _) = listener.accept().unwrap();
                let mut backend = Backend { stream, extended: false, log: backend_log };
                handler(&mut backend);
            });

            Self { port, handle: Some(handle), log }
        }

        pub fn config(&self, user: &str, password: &str, database: &str) -> Config {
            let mut config = Config::new(user, password, database);
            config.host = "127.0.0.1".into();
            config.port = self.port;
            config.ssl = false;
            config
        }

        /// Frontend message bodies of the given type, in arrival order.
        pub fn messages(&self, code: u8) -> Vec<Vec<u8>> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == code)
                .map(|(_, body)| body.clone())
                .collect()
        }

        /// Statement texts received in Parse messages.
        pub fn parsed_sqls(&self) -> Vec<String> {
            self.messages(b'P')
                .iter()
                .map(|body| {
                    let (_name, rest) = split_nul(body);
                    split_nul(rest).0.to_string()
                })
                .collect()
        }

        pub fn parse_count(&self, sql: &str) -> usize {
            self.parsed_sqls().iter().filter(|s| *s == sql).count()
        }

        /// Propagate any assertion failure from the backend thread.
        pub fn finish(mut self) {
            self.handle.take().unwrap().join().unwrap();
        }
    }

    fn split_nul(buf: &[u8]) -> (&str, &[u8]) {
        let end = buf.iter().position(|b| *b == 0).unwrap();
        (std::str::from_utf8(&buf[..end]).unwrap(), &buf[end + 1..])
    }

    impl Backend {
        /// Read the startup message into its parameter pairs.
        pub fn read_startup(&mut self) -> HashMap<String, String> {
            let mut len = [0u8; 4];
            self.stream.read_exact(&mut len).unwrap();
            let len = i32::from_be_bytes(len) as usize;
            let mut body = vec![0u8; len - 4];
            self.stream.read_exact(&mut body).unwrap();

            assert_eq!(&body[..4], 196_608i32.to_be_bytes());
            let mut params = HashMap::new();
            let mut rest = &body[4..];
            while rest.first().copied().unwrap_or(0) != 0 {
                let (key, after) = split_nul(rest);
                let (value, after) = split_nul(after);
                params.insert(key.to_string(), value.to_string());
                rest = after;
            }
            params
        }

        /// Startup that authenticates everyone.
        pub fn trust_startup(&mut self) {
            self.read_startup();
            self.auth_request(0, &[]);
            self.parameter_status("client_encoding", "UTF8");
            self.backend_key_data(1, 2);
            self.ready_for_query(b'I');
        }

        pub fn read_message(&mut self) -> Option<(u8, Vec<u8>)> {
            let mut header = [0u8; 5];
            self.stream.read_exact(&mut header).ok()?;
            let len = i32::from_be_bytes(header[1..].try_into().unwrap()) as usize;
            let mut body = vec![0u8; len - 4];
            self.stream.read_exact(&mut body).ok()?;
            self.log.lock().unwrap().push((header[0], body.clone()));
            Some((header[0], body))
        }

        /// Read frontend messages through the next Sync. `None` on
        /// Terminate or disconnect.
        pub fn read_group(&mut self) -> Option<Vec<(u8, Vec<u8>)>> {
            let mut group = Vec::new();
            loop {
                let (code, body) = self.read_message()?;
                match code {
                    b'X' => return None,
                    b'S' => {
                        group.push((code, body));
                        return Some(group);
                    }
                    _ => group.push((code, body)),
                }
            }
        }

        /// Serve extended-query cycles until the client disconnects,
        /// answering from `script` keyed by statement text.
        pub fn serve_script(&mut self, script: impl Fn(&str) -> Query) {
            let mut statements: HashMap<String, String> = HashMap::new();

            while let Some(group) = self.read_group() {
                if let Some((_, body)) = group.iter().find(|(c, _)| *c == b'P') {
                    let (name, rest) = split_nul(body);
                    let (sql, _) = split_nul(rest);
                    statements.insert(name.to_string(), sql.to_string());

                    let query = script(sql);
                    self.send(b'1', &[]);
                    if query.columns.is_empty() {
                        self.send(b'n', &[]);
                    } else {
                        self.row_description(&query.columns);
                    }
                    self.ready_for_query(b'I');
                } else if group.iter().any(|(c, _)| *c == b'C') {
                    self.send(b'3', &[]);
                    self.ready_for_query(b'I');
                } else if let Some((_, body)) = group.iter().find(|(c, _)| *c == b'B') {
                    let (_portal, rest) = split_nul(body);
                    let (name, _) = split_nul(rest);
                    let sql = statements.get(name).cloned().unwrap_or_default();

                    let query = script(&sql);
                    self.send(b'2', &[]);
                    for row in &query.rows {
                        self.data_row(row);
                    }
                    self.command_complete(&query.tag);
                    self.ready_for_query(b'I');
                }
            }
        }

        pub fn send(&mut self, code: u8, body: &[u8]) {
            let mut msg = Vec::with_capacity(5 + body.len());
            msg.push(code);
            msg.extend_from_slice(&(body.len() as i32 + 4).to_be_bytes());
            msg.extend_from_slice(body);
            self.stream.write_all(&msg).unwrap();
        }

        pub fn auth_request(&mut self, code: i32, extra: &[u8]) {
            let mut body = code.to_be_bytes().to_vec();
            body.extend_from_slice(extra);
            self.send(b'R', &body);
        }

        pub fn parameter_status(&mut self, name: &str, value: &str) {
            let mut body = Vec::new();
            body.extend_from_slice(name.as_bytes());
            body.push(0);
            body.extend_from_slice(value.as_bytes());
            body.push(0);
            self.send(b'S', &body);
        }

        pub fn backend_key_data(&mut self, process_id: i32, secret_key: i32) {
            let mut body = process_id.to_be_bytes().to_vec();
            body.extend_from_slice(&secret_key.to_be_bytes());
            self.send(b'K', &body);
        }

        pub fn ready_for_query(&mut self, status: u8) {
            self.send(b'Z', &[status]);
        }

        pub fn row_description(&mut self, columns: &[(String, i32)]) {
            let mut body = (columns.len() as u16).to_be_bytes().to_vec();
            for (label, oid) in columns {
                body.extend_from_slice(label.as_bytes());
                body.push(0);
                body.extend_from_slice(&0i32.to_be_bytes()); // table oid
                body.extend_from_slice(&0i16.to_be_bytes()); // attr num
                body.extend_from_slice(&oid.to_be_bytes());
                body.extend_from_slice(&(-1i16).to_be_bytes()); // type size
                body.extend_from_slice(&(-1i32).to_be_bytes()); // type modifier
                body.extend_from_slice(&0i16.to_be_bytes()); // format code

                if self.extended {
                    for name in ["public", "t", label.as_str(), "dev"] {
                        body.extend_from_slice(name.as_bytes());
                        body.push(0);
                    }
                    body.extend_from_slice(&1u16.to_be_bytes()); // nullable
                }
            }
            self.send(b'T', &body);
        }

        pub fn data_row(&mut self, cells: &[Option<Vec<u8>>]) {
            let mut body = (cells.len() as u16).to_be_bytes().to_vec();
            for cell in cells {
                match cell {
                    None => body.extend_from_slice(&(-1i32).to_be_bytes()),
                    Some(bytes) => {
                        body.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                        body.extend_from_slice(bytes);
                    }
                }
            }
            self.send(b'D', &body);
        }

        pub fn command_complete(&mut self, tag: &str) {
            let mut body = tag.as_bytes().to_vec();
            body.push(0);
            self.send(b'C', &body);
        }

        fn error_fields(code: &str, message: &str) -> Vec<u8> {
            let mut body = Vec::new();
            for (field, value) in [(b'S', "ERROR"), (b'V', "ERROR"), (b'C', code), (b'M', message)]
            {
                body.push(field);
                body.extend_from_slice(value.as_bytes());
                body.push(0);
            }
            body.push(0);
            body
        }

        /// An `ErrorResponse`. Inside a query cycle the caller still owes
        /// the `ReadyForQuery`.
        pub fn error_response(&mut self, code: &str, message: &str) {
            let body = Self::error_fields(code, message);
            self.send(b'E', &body);
        }
    }
}
