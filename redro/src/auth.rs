//! The authentication sub-dialog.
//!
//! Triggered by `AuthenticationRequest` messages during startup. Six
//! mutually exclusive flows are implemented: trust (no-op), cleartext,
//! MD5-salted, SCRAM-SHA-256 SASL, the extensible salted digest, and the
//! identity-provider token passthrough.
use hmac::{Hmac, Mac};
use md5::{Digest as _, Md5};
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use sha2::{Digest as _, Sha256};

use crate::{
    Result,
    common::debug,
    error::Error,
    protocol::{backend::Authentication, frontend},
    stream::BufferedStream,
};

/// Outcome of one authentication request.
pub(crate) enum AuthFlow {
    /// Keep reading, the dialog is not settled yet.
    Continue,
    /// `AuthenticationOk` was received.
    Done,
}

/// Credentials and in-flight SASL state for one startup.
pub(crate) struct Authenticator<'a> {
    user: &'a [u8],
    password: Option<&'a [u8]>,
    web_identity_token: Option<&'a str>,
    scram: Option<ScramSha256>,
}

impl<'a> Authenticator<'a> {
    pub(crate) fn new(
        user: &'a [u8],
        password: Option<&'a [u8]>,
        web_identity_token: Option<&'a str>,
    ) -> Self {
        Self { user, password, web_identity_token, scram: None }
    }

    fn password(&self, flow: &str) -> Result<&'a [u8]> {
        self.password.ok_or_else(|| {
            Error::Interface(
                format!("server requesting {flow} authentication, but no password was provided")
                    .into(),
            )
        })
    }

    /// Answer one `AuthenticationRequest`.
    ///
    /// Failures raise immediately, the startup dialog does not continue
    /// past a refused mechanism.
    pub(crate) fn handle(
        &mut self,
        io: &mut BufferedStream,
        auth: Authentication,
    ) -> Result<AuthFlow> {
        match auth {
            Authentication::Ok => return Ok(AuthFlow::Done),
            Authentication::CleartextPassword => {
                let password = self.password("password")?;
                io.send(frontend::PasswordMessage { password });
                io.flush()?;
            }
            Authentication::MD5Password { salt } => {
                let password = self.password("MD5 password")?;
                let pwd = md5_password(self.user, password, salt);
                io.send(frontend::PasswordMessage { password: pwd.as_bytes() });
                io.flush()?;
            }
            Authentication::Sasl { mechanisms } => {
                let password = self.password("SASL")?;
                let advertised: Vec<&str> = mechanisms
                    .split(|b| *b == 0)
                    .filter(|m| !m.is_empty())
                    .filter_map(|m| std::str::from_utf8(m).ok())
                    .collect();
                if !advertised.contains(&ScramSha256::MECHANISM) {
                    return Err(Error::Interface(
                        "server does not advertise the SCRAM-SHA-256 SASL mechanism".into(),
                    ));
                }
                let scram = self.scram.insert(ScramSha256::new(password));
                let first = scram.client_first();
                io.send(frontend::SaslInitialResponse {
                    mechanism: ScramSha256::MECHANISM,
                    data: first.as_bytes(),
                });
                io.flush()?;
            }
            Authentication::SaslContinue { data } => {
                let server_first = std::str::from_utf8(&data)
                    .map_err(|_| Error::Interface("non utf8 SASL challenge".into()))?;
                let scram = self.scram.as_mut().ok_or_else(|| {
                    Error::Interface("SASL challenge without a SASL exchange in progress".into())
                })?;
                let client_final = scram.client_final(server_first)?;
                io.send(frontend::SaslResponse { data: client_final.as_bytes() });
                io.flush()?;
            }
            Authentication::SaslFinal { data } => {
                let server_final = std::str::from_utf8(&data)
                    .map_err(|_| Error::Interface("non utf8 SASL outcome".into()))?;
                let scram = self.scram.as_mut().ok_or_else(|| {
                    Error::Interface("SASL outcome without a SASL exchange in progress".into())
                })?;
                scram.verify_server_final(server_final)?;
            }
            Authentication::Digest { algorithm, salt, server_nonce } => {
                debug!("extensible digest request, algorithm {algorithm}");
                let password = self.password("password-based")?;
                if !(0..DIGEST_ALGORITHMS.len() as i32).contains(&algorithm) {
                    return Err(Error::Interface(
                        format!(
                            "server requested password-based authentication, \
                             but requested algorithm {algorithm} is not supported"
                        )
                        .into(),
                    ));
                }
                let client_nonce = millis_since_epoch().to_string();
                let digest =
                    extensible_digest(password, &salt, &server_nonce, client_nonce.as_bytes());
                io.send(frontend::DigestResponse {
                    digest: &digest,
                    client_nonce: client_nonce.as_bytes(),
                });
                io.flush()?;
            }
            Authentication::IdpToken => {
                debug!("identity provider token request");
                let token = self.web_identity_token.ok_or_else(|| {
                    Error::Interface(
                        "the server requested token-based authentication, \
                         but no token was provided"
                            .into(),
                    )
                })?;
                io.send(frontend::IdpTokenResponse { token });
                io.flush()?;
            }
            Authentication::Unsupported(code) => {
                return Err(Error::Interface(
                    format!("authentication method {code} not supported").into(),
                ));
            }
            Authentication::Unknown(code) => {
                return Err(Error::Interface(
                    format!("authentication method {code} not recognized").into(),
                ));
            }
        }
        Ok(AuthFlow::Continue)
    }
}

/// `md5` + hex(md5(hex(md5(password ‖ user)) ‖ salt))
pub(crate) fn md5_password(user: &[u8], password: &[u8], salt: [u8; 4]) -> String {
    let mut md5 = Md5::new();
    md5.update(password);
    md5.update(user);
    let inner = md5.finalize_reset();
    md5.update(format!("{inner:x}"));
    md5.update(salt);
    format!("md5{:x}", md5.finalize())
}

// The digest algorithm table. Only SHA256 is defined.
const DIGEST_ALGORITHMS: [&str; 1] = ["SHA256"];

/// The extensible salted digest:
/// `SHA256(SHA256(password ‖ salt) ‖ server_nonce ‖ client_nonce)`.
pub(crate) fn extensible_digest(
    password: &[u8],
    salt: &[u8],
    server_nonce: &[u8],
    client_nonce: &[u8],
) -> [u8; 32] {
    let salted: [u8; 32] = Sha256::new()
        .chain_update(password)
        .chain_update(salt)
        .finalize()
        .into();
    Sha256::new()
        .chain_update(salted)
        .chain_update(server_nonce)
        .chain_update(client_nonce)
        .finalize()
        .into()
}

fn millis_since_epoch() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

type HmacSha256 = Hmac<Sha256>;

/// Client side of the SCRAM-SHA-256 three-message exchange.
///
/// <https://datatracker.ietf.org/doc/html/rfc5802>
pub(crate) struct ScramSha256 {
    password: Vec<u8>,
    client_nonce: String,
    // set after the server-first message
    salted_password: [u8; 32],
    auth_message: String,
}

impl ScramSha256 {
    pub(crate) const MECHANISM: &'static str = "SCRAM-SHA-256";

    // no channel binding
    const GS2_HEADER: &'static str = "n,,";

    pub(crate) fn new(password: &[u8]) -> Self {
        let client_nonce = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        Self::with_nonce(password, client_nonce)
    }

    fn with_nonce(password: &[u8], client_nonce: String) -> Self {
        Self {
            password: password.to_vec(),
            client_nonce,
            salted_password: [0; 32],
            auth_message: String::new(),
        }
    }

    /// `n,,n=,r=<client nonce>`. The user name is carried by the startup
    /// message, not the SASL exchange.
    pub(crate) fn client_first(&self) -> String {
        format!("{}n=,r={}", Self::GS2_HEADER, self.client_nonce)
    }

    /// Consume the server-first message, producing the client-final
    /// message carrying the proof.
    pub(crate) fn client_final(&mut self, server_first: &str) -> Result<String> {
        let invalid = |what: &str| Error::Interface(format!("invalid SASL {what}").into());

        let mut parts = server_first.splitn(3, ',');
        let server_nonce = parts
            .next()
            .and_then(|v| v.strip_prefix("r="))
            .ok_or_else(|| invalid("nonce"))?;
        if !server_nonce.starts_with(&self.client_nonce) {
            return Err(invalid("nonce"));
        }
        let salt = parts
            .next()
            .and_then(|v| v.strip_prefix("s="))
            .and_then(|v| base64::decode(v).ok())
            .ok_or_else(|| invalid("salt"))?;
        let iterations = parts
            .next()
            .and_then(|v| v.strip_prefix("i="))
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|i| *i > 0)
            .ok_or_else(|| invalid("iteration count"))?;

        self.salted_password = hi(&self.password, &salt, iterations);

        let client_key = hmac(&self.salted_password, b"Client Key");
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();
        let channel_binding = base64::encode(Self::GS2_HEADER);

        self.auth_message = format!(
            "n=,r={},{},c={},r={}",
            self.client_nonce, server_first, channel_binding, server_nonce,
        );

        let client_signature = hmac(&stored_key, self.auth_message.as_bytes());
        let mut client_proof = client_key;
        for (proof, signature) in client_proof.iter_mut().zip(client_signature) {
            *proof ^= signature;
        }

        Ok(format!(
            "c={},r={},p={}",
            channel_binding,
            server_nonce,
            base64::encode(client_proof),
        ))
    }

    /// Verify the server signature from the SASL outcome message.
    pub(crate) fn verify_server_final(&mut self, server_final: &str) -> Result<()> {
        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(Error::Interface(format!("SASL authentication failed: {err}").into()));
        }
        let verifier = server_final
            .strip_prefix("v=")
            .and_then(|v| base64::decode(v).ok())
            .ok_or_else(|| Error::Interface("unexpected SASL outcome payload".into()))?;

        let server_key = hmac(&self.salted_password, b"Server Key");
        let mut mac = HmacSha256::new_from_slice(&server_key).expect("hmac accepts any key size");
        mac.update(self.auth_message.as_bytes());
        mac.verify_slice(&verifier)
            .map_err(|_| Error::Interface("failed to verify SASL server signature".into()))
    }
}

fn hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// `Hi(password, salt, i)`, PBKDF2 with HMAC-SHA-256.
fn hi(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut prev = {
        let mut mac = HmacSha256::new_from_slice(password).expect("hmac accepts any key size");
        mac.update(salt);
        mac.update(&[0, 0, 0, 1]);
        let out: [u8; 32] = mac.finalize().into_bytes().into();
        out
    };
    let mut result = prev;

    for _ in 1..iterations {
        prev = hmac(password, &prev);
        for (acc, next) in result.iter_mut().zip(prev) {
            *acc ^= next;
        }
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn md5_exchange_payload() {
        // salt 0xDEADBEEF, password "secret", user "alice"
        assert_eq!(
            md5_password(b"alice", b"secret", [0xde, 0xad, 0xbe, 0xef]),
            "md53e1d73ba00a55e8805aa0277d29996c5",
        );
    }

    #[test]
    fn scram_exchange_vector() {
        // RFC 7677 parameters with the empty-username client-first the
        // driver sends.
        let mut scram =
            ScramSha256::with_nonce(b"pencil", "rOprNGfwEbeRWgbNEkqO".into());
        assert_eq!(scram.client_first(), "n,,n=,r=rOprNGfwEbeRWgbNEkqO");

        let client_final = scram
            .client_final(
                "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                 s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",
            )
            .unwrap();
        assert_eq!(
            client_final,
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
             p=qvT2SWdEH5Q06albL+hjSYuUhCG7VndFyzIb7CK4n9k=",
        );

        scram
            .verify_server_final("v=3HO6Qt1M4MKJrmlKaoOqLAI0/0TV0HZe7J9H3MBtSOg=")
            .unwrap();
        assert!(scram.verify_server_final("v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=").is_err());
        assert!(scram.verify_server_final("e=invalid-proof").is_err());
    }

    #[test]
    fn scram_rejects_foreign_nonce() {
        let mut scram = ScramSha256::with_nonce(b"pencil", "abc".into());
        assert!(scram.client_final("r=zzz,s=AAAA,i=4096").is_err());
    }

    #[test]
    fn digest_vector() {
        let digest = extensible_digest(
            b"secret",
            &[0x01, 0x02, 0x03, 0x04],
            b"servernonce",
            b"1700000000000",
        );
        assert_eq!(
            crate::types::hex_encode(&digest),
            "26fb2445cdab56c8f46318903b709955df119af984e9f04182876a175eca8b7c",
        );
    }
}
