use super::message::dot_stuff;
use super::{tls, NotifyError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rustls::ClientConfig;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{System, SystemExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// True when an EHLO reply lists `keyword` as an extension.
    pub fn advertises(&self, keyword: &str) -> bool {
        self.lines.iter().skip(1).any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|k| k.eq_ignore_ascii_case(keyword))
        })
    }
}

trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Minimal SMTP client. Every read and write is bounded by `timeout`.
pub struct SmtpClient {
    stream: BufReader<Box<dyn Transport>>,
    host: String,
    timeout: Duration,
    ca_file: Option<PathBuf>,
    secure: bool,
}

impl SmtpClient {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, NotifyError> {
        let addr = format!("{host}:{port}");
        let stream = time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| NotifyError::Timeout { step: "connect" })?
            .map_err(|source| NotifyError::Connect { addr, source })?;
        let stream: Box<dyn Transport> = Box::new(stream);
        Ok(Self {
            stream: BufReader::new(stream),
            host: host.to_string(),
            timeout,
            ca_file: None,
            secure: false,
        })
    }

    pub fn with_ca_file(mut self, ca_file: Option<PathBuf>) -> Self {
        self.ca_file = ca_file;
        self
    }

    /// Runs a full session: greeting, EHLO/HELO, STARTTLS when offered,
    /// optional AUTH PLAIN, the envelope, DATA and QUIT.
    pub async fn send_mail(
        mut self,
        credentials: Option<&Credentials>,
        from: &str,
        to: &[String],
        message: &str,
    ) -> Result<(), NotifyError> {
        self.expect_reply("greeting", &[220]).await?;
        let hello = self.hello().await?;

        if hello.advertises("STARTTLS") {
            match tls::client_config(self.ca_file.as_deref()) {
                Ok(config) => {
                    self = self.starttls(config).await?;
                    self.hello().await?;
                }
                Err(err) if credentials.is_none() => {
                    warn!(
                        error = %err,
                        "smtp server offers STARTTLS but no trust roots, staying in plaintext"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(creds) = credentials {
            if !self.secure {
                return Err(NotifyError::InsecureAuth);
            }
            let token = auth_plain_token(&creds.username, &creds.password);
            self.command("AUTH", &format!("AUTH PLAIN {token}"), &[235])
                .await?;
        }

        self.command("MAIL FROM", &format!("MAIL FROM:<{from}>"), &[250])
            .await?;
        for rcpt in to {
            self.command("RCPT TO", &format!("RCPT TO:<{rcpt}>"), &[250, 251])
                .await?;
        }
        self.command("DATA", "DATA", &[354]).await?;

        let mut payload = dot_stuff(message);
        payload.push_str(".\r\n");
        self.write("message body", payload.as_bytes()).await?;
        self.expect_reply("message body", &[250]).await?;

        if let Err(err) = self.command("QUIT", "QUIT", &[221]).await {
            // the message is already accepted
            warn!(error = %err, "smtp quit failed");
        }
        Ok(())
    }

    async fn hello(&mut self) -> Result<Reply, NotifyError> {
        let name = local_name();
        match self.command("EHLO", &format!("EHLO {name}"), &[250]).await {
            Err(NotifyError::Rejected { .. }) => {
                debug!("EHLO rejected, trying HELO");
                self.command("HELO", &format!("HELO {name}"), &[250]).await
            }
            other => other,
        }
    }

    async fn starttls(mut self, config: Arc<ClientConfig>) -> Result<Self, NotifyError> {
        self.command("STARTTLS", "STARTTLS", &[220]).await?;
        if !self.stream.buffer().is_empty() {
            return Err(NotifyError::Malformed(
                "data pipelined after STARTTLS reply".to_string(),
            ));
        }
        let name = tls::server_name(&self.host)?;
        let plain = self.stream.into_inner();
        let handshake = TlsConnector::from(config).connect(name, plain);
        let upgraded = time::timeout(self.timeout, handshake)
            .await
            .map_err(|_| NotifyError::Timeout { step: "STARTTLS" })?
            .map_err(NotifyError::Handshake)?;
        debug!(host = %self.host, "smtp connection upgraded to TLS");

        let stream: Box<dyn Transport> = Box::new(upgraded);
        Ok(Self {
            stream: BufReader::new(stream),
            secure: true,
            ..self
        })
    }

    async fn command(
        &mut self,
        step: &'static str,
        line: &str,
        accept: &[u16],
    ) -> Result<Reply, NotifyError> {
        let mut buf = String::with_capacity(line.len() + 2);
        buf.push_str(line);
        buf.push_str("\r\n");
        self.write(step, buf.as_bytes()).await?;
        self.expect_reply(step, accept).await
    }

    async fn write(&mut self, step: &'static str, bytes: &[u8]) -> Result<(), NotifyError> {
        let timeout = self.timeout;
        let stream = self.stream.get_mut();
        bounded(timeout, step, async {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await
    }

    async fn expect_reply(
        &mut self,
        step: &'static str,
        accept: &[u16],
    ) -> Result<Reply, NotifyError> {
        let reply = self.read_reply(step).await?;
        if accept.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(NotifyError::Rejected {
                step,
                code: reply.code,
                text: reply.text(),
            })
        }
    }

    /// Reads one possibly multi-line reply (`250-...` continuation lines).
    async fn read_reply(&mut self, step: &'static str) -> Result<Reply, NotifyError> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let timeout = self.timeout;
            let n = bounded(timeout, step, self.stream.read_line(&mut line)).await?;
            if n == 0 {
                return Err(NotifyError::Closed { step });
            }
            let (code, more, rest) = parse_reply_line(&line)?;
            lines.push(rest.to_string());
            if !more {
                return Ok(Reply { code, lines });
            }
        }
    }
}

async fn bounded<T, F>(timeout: Duration, step: &'static str, fut: F) -> Result<T, NotifyError>
where
    F: Future<Output = std::io::Result<T>>,
{
    time::timeout(timeout, fut)
        .await
        .map_err(|_| NotifyError::Timeout { step })?
        .map_err(NotifyError::from)
}

/// Splits `250-text` / `250 text` into code, continuation flag and text.
pub fn parse_reply_line(line: &str) -> Result<(u16, bool, &str), NotifyError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let malformed = || NotifyError::Malformed(line.to_string());
    let code = line
        .get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(malformed)?;
    match line.as_bytes().get(3) {
        None => Ok((code, false, "")),
        Some(b' ') => Ok((code, false, &line[4..])),
        Some(b'-') => Ok((code, true, &line[4..])),
        Some(_) => Err(malformed()),
    }
}

pub fn auth_plain_token(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{username}\0{password}"))
}

fn local_name() -> String {
    System::new()
        .host_name()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
