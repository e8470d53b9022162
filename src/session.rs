//! SMTP session state machine
//!
//! One [`Session`] exists per connection. It consumes framed lines one at a
//! time and answers each with a [`Step`]. Parsing, validation and state
//! changes are synchronous; only the connection shell awaits anything.
//!
//! ```text
//! Uninitialized ──HELO/EHLO──▶ Command ──DATA──▶ DataCapture
//!                                 ▲                   │
//!                                 └─────── "." ───────┘
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::envelope::Envelope;
use crate::proto::smtp::{CRLF, Command, DATA_TERMINATOR, Response, ResponseCode, parse_path_param};
use crate::store::EnvelopeStore;

/// What the session is currently reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No successful HELO/EHLO yet
    Uninitialized,
    /// Reading commands
    Command,
    /// Collecting message lines after DATA
    DataCapture,
}

/// Per-line protocol failures.
///
/// Each one becomes a single response; none of them ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Bad sequence of commands: {0}")]
    BadSequence(&'static str),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("{0} not implemented")]
    NotImplemented(String),

    #[error("Syntax error, command unrecognized")]
    Unrecognized,
}

impl SessionError {
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Self::BadSequence(_) => ResponseCode::BAD_SEQUENCE,
            Self::InvalidParameter(_) => ResponseCode::PARAMETER_ERROR,
            Self::NotImplemented(_) => ResponseCode::NOT_IMPLEMENTED,
            Self::Unrecognized => ResponseCode::COMMAND_UNRECOGNIZED,
        }
    }

    pub fn to_response(&self) -> Response {
        Response::new(self.response_code(), self.to_string())
    }
}

/// Outcome of feeding one line to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send the response and keep reading
    Reply(Response),
    /// Send the response, then close the connection
    ReplyAndClose(Response),
    /// Nothing to send (a payload line was captured)
    Silent,
}

/// Protocol state for one connection
pub struct Session {
    server_name: String,
    store: Arc<dyn EnvelopeStore>,
    mode: Mode,
    extended: bool,
    pending: Option<Envelope>,
    data: Vec<String>,
}

impl Session {
    pub fn new(server_name: impl Into<String>, store: Arc<dyn EnvelopeStore>) -> Self {
        Self {
            server_name: server_name.into(),
            store,
            mode: Mode::Uninitialized,
            extended: false,
            pending: None,
            data: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether the last greeting was EHLO
    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// The envelope being built, if any
    pub fn pending_envelope(&self) -> Option<&Envelope> {
        self.pending.as_ref()
    }

    /// Banner sent when the connection opens
    pub fn banner(&self) -> Response {
        Response::ready(&self.server_name)
    }

    /// Interpret one framed line
    pub fn handle_line(&mut self, line: &str) -> Step {
        if self.mode == Mode::DataCapture {
            return self.capture_line(line);
        }

        trace!(line, "Command line");
        match self.dispatch(line) {
            Ok(step) => step,
            Err(err) => {
                debug!(error = %err, "Command rejected");
                Step::Reply(err.to_response())
            }
        }
    }

    fn dispatch(&mut self, line: &str) -> Result<Step, SessionError> {
        let (command, params) = Command::parse(line).ok_or(SessionError::Unrecognized)?;

        match command {
            Command::Helo => self.handle_helo(params),
            Command::Ehlo => self.handle_ehlo(params),
            Command::Mail => self.handle_mail(params),
            Command::Rcpt => self.handle_rcpt(params),
            Command::Data => self.handle_data(params),
            Command::Rset => self.handle_rset(params),
            Command::Noop => {
                no_params(command, params)?;
                Ok(Step::Reply(Response::ok()))
            }
            Command::Quit => {
                no_params(command, params)?;
                Ok(Step::ReplyAndClose(Response::goodbye()))
            }
            Command::Vrfy => match params {
                None => Err(SessionError::InvalidParameter(
                    "VRFY requires an argument".to_string(),
                )),
                Some(_) => Err(SessionError::NotImplemented(command.to_string())),
            },
            Command::Help => {
                no_params(command, params)?;
                Ok(Step::Reply(Response::help()))
            }
            Command::Unknown => {
                let token = line.split_whitespace().next().unwrap_or(line);
                Err(SessionError::NotImplemented(token.to_ascii_uppercase()))
            }
        }
    }

    fn handle_helo(&mut self, params: Option<&str>) -> Result<Step, SessionError> {
        no_params(Command::Helo, params)?;
        self.start_over(false);

        Ok(Step::Reply(Response::new(
            ResponseCode::OK,
            self.server_name.clone(),
        )))
    }

    fn handle_ehlo(&mut self, params: Option<&str>) -> Result<Step, SessionError> {
        self.start_over(true);

        let greeting = match params.and_then(|p| p.split_whitespace().next()) {
            Some(client) => format!("{} greets {client}", self.server_name),
            None => self.server_name.clone(),
        };
        Ok(Step::Reply(Response::new(ResponseCode::OK, greeting)))
    }

    fn handle_mail(&mut self, params: Option<&str>) -> Result<Step, SessionError> {
        if self.mode == Mode::Uninitialized {
            return Err(SessionError::BadSequence("send HELO or EHLO first"));
        }
        if self.pending.is_some() {
            return Err(SessionError::BadSequence("sender already specified"));
        }

        let from = path_param(Command::Mail, params, "FROM")?;
        debug!(from, "Envelope started");
        self.pending = Some(Envelope::new(from));

        Ok(Step::Reply(Response::ok()))
    }

    fn handle_rcpt(&mut self, params: Option<&str>) -> Result<Step, SessionError> {
        let Some(envelope) = self.pending.as_mut() else {
            return Err(SessionError::BadSequence("need MAIL before RCPT"));
        };

        let to = path_param(Command::Rcpt, params, "TO")?;
        debug!(to, "Recipient added");
        envelope.add_recipient(to);

        Ok(Step::Reply(Response::ok()))
    }

    fn handle_data(&mut self, params: Option<&str>) -> Result<Step, SessionError> {
        no_params(Command::Data, params)?;

        let Some(envelope) = self.pending.as_ref() else {
            return Err(SessionError::BadSequence("need MAIL before DATA"));
        };
        if envelope.recipients().is_empty() {
            return Err(SessionError::BadSequence("need RCPT before DATA"));
        }

        self.data.clear();
        self.mode = Mode::DataCapture;

        Ok(Step::Reply(Response::start_input()))
    }

    fn handle_rset(&mut self, params: Option<&str>) -> Result<Step, SessionError> {
        no_params(Command::Rset, params)?;

        if self.pending.take().is_some() {
            debug!("Pending envelope discarded");
        }
        Ok(Step::Reply(Response::ok()))
    }

    /// HELO/EHLO: drop any transaction and (re)enter command mode
    fn start_over(&mut self, extended: bool) {
        if self.pending.take().is_some() {
            debug!("Pending envelope discarded by new greeting");
        }
        self.extended = extended;
        self.mode = Mode::Command;
    }

    fn capture_line(&mut self, line: &str) -> Step {
        match line.strip_prefix(DATA_TERMINATOR) {
            Some("") => self.finish_capture(),
            Some(unstuffed) => {
                self.data.push(unstuffed.to_owned());
                Step::Silent
            }
            None => {
                self.data.push(line.to_owned());
                Step::Silent
            }
        }
    }

    fn finish_capture(&mut self) -> Step {
        self.mode = Mode::Command;
        let body = std::mem::take(&mut self.data).join(CRLF);

        // handle_data only enters capture with an envelope pending, and
        // nothing clears it until capture ends
        debug_assert!(self.pending.is_some(), "data capture without a pending envelope");
        let Some(envelope) = self.pending.take() else {
            return Step::Reply(SessionError::BadSequence("no envelope in progress").to_response());
        };

        let envelope = envelope.with_body(body);
        debug_assert!(envelope.is_complete());
        let (from, recipients) = (envelope.from().to_owned(), envelope.recipients().len());
        let id = self.store.add(envelope);
        info!(%id, from = %from, recipients, "Envelope accepted");

        Step::Reply(Response::new(
            ResponseCode::OK,
            format!("OK: queued as {id}"),
        ))
    }
}

fn no_params(command: Command, params: Option<&str>) -> Result<(), SessionError> {
    match params {
        Some(_) => Err(SessionError::InvalidParameter(format!(
            "{command} takes no parameters"
        ))),
        None => Ok(()),
    }
}

fn path_param<'a>(
    command: Command,
    params: Option<&'a str>,
    keyword: &str,
) -> Result<&'a str, SessionError> {
    params
        .and_then(|p| parse_path_param(p, keyword))
        .ok_or_else(|| {
            SessionError::InvalidParameter(format!("Syntax: {command} {keyword}:<address>"))
        })
}
