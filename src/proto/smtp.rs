//! SMTP protocol constants, command grammar and responses

use std::fmt;

/// Line terminator on the wire
pub const CRLF: &str = "\r\n";

/// A line holding only this character ends data capture
pub const DATA_TERMINATOR: char = '.';

/// SMTP response codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u16);

impl ResponseCode {
    pub const HELP: Self = Self(214);
    pub const READY: Self = Self(220);
    pub const CLOSING: Self = Self(221);
    pub const OK: Self = Self(250);
    pub const START_INPUT: Self = Self(354);
    pub const COMMAND_UNRECOGNIZED: Self = Self(500);
    pub const PARAMETER_ERROR: Self = Self(501);
    pub const NOT_IMPLEMENTED: Self = Self(502);
    pub const BAD_SEQUENCE: Self = Self(503);

    /// Message substituted when a response carries no text of its own
    pub fn default_message(self) -> Option<&'static str> {
        let message = match self {
            Self::HELP => "Help message follows",
            Self::READY => "Service ready",
            Self::CLOSING => "Closing transmission channel",
            Self::OK => "OK",
            Self::START_INPUT => "Start mail input; end with <CRLF>.<CRLF>",
            Self::COMMAND_UNRECOGNIZED => "Syntax error, command unrecognized",
            Self::PARAMETER_ERROR => "Syntax error in parameters or arguments",
            Self::NOT_IMPLEMENTED => "Command not implemented",
            Self::BAD_SEQUENCE => "Bad sequence of commands",
            _ => return None,
        };
        Some(message)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SMTP commands understood by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Helo,
    Ehlo,
    Mail,
    Rcpt,
    Data,
    Rset,
    Noop,
    Quit,
    Vrfy,
    Help,
    Unknown,
}

impl Command {
    /// Every recognized command, in the order HELP lists them
    pub const RECOGNIZED: [Command; 10] = [
        Self::Ehlo,
        Self::Helo,
        Self::Mail,
        Self::Rcpt,
        Self::Data,
        Self::Rset,
        Self::Noop,
        Self::Quit,
        Self::Vrfy,
        Self::Help,
    ];

    fn from_token(token: &str) -> Self {
        Self::RECOGNIZED
            .into_iter()
            .find(|cmd| token.eq_ignore_ascii_case(cmd.as_str()))
            .unwrap_or(Self::Unknown)
    }

    /// Split a line into a command and its optional parameter string.
    ///
    /// The token runs up to the first whitespace character. A remainder that
    /// is empty or blank counts as no parameter. Returns `None` when the line
    /// has no token at all.
    pub fn parse(line: &str) -> Option<(Self, Option<&str>)> {
        let (token, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        if token.is_empty() {
            return None;
        }

        let params = Some(rest.trim()).filter(|p| !p.is_empty());
        Some((Self::from_token(token), params))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Helo => "HELO",
            Self::Ehlo => "EHLO",
            Self::Mail => "MAIL",
            Self::Rcpt => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
            Self::Vrfy => "VRFY",
            Self::Help => "HELP",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the address from a `KEYWORD:<address>` parameter.
///
/// The keyword is matched case-insensitively and may be followed by one
/// space. Anything after the closing bracket, an empty address, or stray
/// brackets or whitespace inside it make the parameter malformed.
pub fn parse_path_param<'a>(params: &'a str, keyword: &str) -> Option<&'a str> {
    let (kw, rest) = params.split_once(':')?;
    if !kw.eq_ignore_ascii_case(keyword) {
        return None;
    }

    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    let address = rest.strip_prefix('<')?.strip_suffix('>')?;

    let malformed = |c: char| c == '<' || c == '>' || c.is_whitespace();
    if address.is_empty() || address.contains(malformed) {
        return None;
    }

    Some(address)
}

/// One logical SMTP response: a code plus zero or more text lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    code: ResponseCode,
    lines: Vec<String>,
}

impl Response {
    /// Create a single-line response
    pub fn new(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![message.into()],
        }
    }

    /// Create a response whose text is the code's default message
    pub fn from_code(code: ResponseCode) -> Self {
        Self {
            code,
            lines: Vec::new(),
        }
    }

    /// Create a multi-line response (last line has space after code)
    pub fn multi_line<I, S>(code: ResponseCode, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            code,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn code(&self) -> ResponseCode {
        self.code
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Connection banner
    pub fn ready(server_name: &str) -> Self {
        Self::new(ResponseCode::READY, format!("{server_name} ready"))
    }

    pub fn ok() -> Self {
        Self::from_code(ResponseCode::OK)
    }

    /// Intermediate reply to DATA
    pub fn start_input() -> Self {
        Self::from_code(ResponseCode::START_INPUT)
    }

    pub fn goodbye() -> Self {
        Self::new(ResponseCode::CLOSING, "Bye")
    }

    /// HELP text listing every recognized command
    pub fn help() -> Self {
        let commands: Vec<&str> = Command::RECOGNIZED.iter().map(Command::as_str).collect();
        Self::new(ResponseCode::HELP, format!("Commands: {}", commands.join(" ")))
    }
}

impl fmt::Display for Response {
    /// Wire form, CRLF included after every line
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lines.is_empty() {
            return match self.code.default_message() {
                Some(message) => write!(f, "{} {message}{CRLF}", self.code),
                None => write!(f, "{}{CRLF}", self.code),
            };
        }

        let last = self.lines.len() - 1;
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            write!(f, "{}{sep}{line}{CRLF}", self.code)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("HELO"), Some((Command::Helo, None)));
        assert_eq!(Command::parse("ehlo client.local"), Some((Command::Ehlo, Some("client.local"))));
        assert_eq!(Command::parse("MaIl FROM:<a@x>"), Some((Command::Mail, Some("FROM:<a@x>"))));
        assert_eq!(Command::parse("QUIT   "), Some((Command::Quit, None)));
        assert_eq!(Command::parse("FOO bar"), Some((Command::Unknown, Some("bar"))));
    }

    #[test]
    fn test_command_parse_without_token() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse(" HELO"), None);
    }

    #[test]
    fn test_path_param() {
        assert_eq!(parse_path_param("FROM:<a@x>", "FROM"), Some("a@x"));
        assert_eq!(parse_path_param("from:<a@x>", "FROM"), Some("a@x"));
        assert_eq!(parse_path_param("To: <b@y>", "TO"), Some("b@y"));
    }

    #[test]
    fn test_path_param_malformed() {
        assert_eq!(parse_path_param("TO:<b@y>", "FROM"), None);
        assert_eq!(parse_path_param("FROM:<>", "FROM"), None);
        assert_eq!(parse_path_param("FROM:a@x", "FROM"), None);
        assert_eq!(parse_path_param("FROM:<a@x> SIZE=10", "FROM"), None);
        assert_eq!(parse_path_param("FROM:  <a@x>", "FROM"), None);
        assert_eq!(parse_path_param("FROM <a@x>", "FROM"), None);
        assert_eq!(parse_path_param("FROM:<a b>", "FROM"), None);
    }

    #[test]
    fn test_response_single_line() {
        assert_eq!(Response::new(ResponseCode::OK, "Done").to_string(), "250 Done\r\n");
        assert_eq!(Response::goodbye().to_string(), "221 Bye\r\n");
    }

    #[test]
    fn test_response_multiline() {
        let resp = Response::multi_line(ResponseCode::OK, ["mail.example.com", "8BITMIME", "HELP"]);
        assert_eq!(
            resp.to_string(),
            "250-mail.example.com\r\n250-8BITMIME\r\n250 HELP\r\n"
        );
    }

    #[test]
    fn test_response_default_message() {
        assert_eq!(Response::ok().to_string(), "250 OK\r\n");
        assert_eq!(
            Response::from_code(ResponseCode::BAD_SEQUENCE).to_string(),
            "503 Bad sequence of commands\r\n"
        );
        assert_eq!(Response::from_code(ResponseCode(299)).to_string(), "299\r\n");
    }

    #[test]
    fn test_help_lists_commands() {
        let resp = Response::help();
        assert_eq!(resp.code(), ResponseCode::HELP);
        assert_eq!(
            resp.lines(),
            ["Commands: EHLO HELO MAIL RCPT DATA RSET NOOP QUIT VRFY HELP"]
        );
    }
}
