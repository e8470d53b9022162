//! Envelope: one submission attempt (sender, recipients, body)

use std::fmt;

/// Identifier assigned to an envelope when it is created.
///
/// ULIDs sort by creation time, so listing ids in order replays arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvelopeId(ulid::Ulid);

impl EnvelopeId {
    /// Generate a new unique id
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EnvelopeId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(Self)
    }
}

/// Sender, recipients and body of one submission.
///
/// The sender is fixed at creation, recipients only grow, and the body is
/// set once through [`Envelope::with_body`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    id: EnvelopeId,
    from: String,
    recipients: Vec<String>,
    body: Option<String>,
}

impl Envelope {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            id: EnvelopeId::generate(),
            from: from.into(),
            recipients: Vec::new(),
            body: None,
        }
    }

    pub fn id(&self) -> EnvelopeId {
        self.id
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn add_recipient(&mut self, recipient: impl Into<String>) {
        self.recipients.push(recipient.into());
    }

    /// Attach the captured payload, finishing the envelope
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        debug_assert!(self.body.is_none(), "envelope body set twice");
        self.body = Some(body.into());
        self
    }

    /// Sender set, at least one recipient, body captured
    pub fn is_complete(&self) -> bool {
        !self.from.is_empty() && !self.recipients.is_empty() && self.body.is_some()
    }
}
