//! The in-band command grammar.
//!
//! A message body beginning with [`SIGIL`] is a command:
//! `<sigil><command char><optional argument>`.
//!
//! | char | effect |
//! |------|--------|
//! | `_`  | clear notice; the caller must truncate history first |
//! | `b`  | alert ("bong") notice |
//! | `e`  | emote notice embedding the argument verbatim |
//!
//! Anything else is unrecognized and must be dropped by the caller.

use std::fmt;

use crate::record::{NewRecord, RecordKind};

pub const SIGIL: char = '$';

/// Prefix applied to every system record body so display layers can style
/// it apart from user text.
pub const SYSTEM_MARKER: &str = "---> ";

/// A recognised command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Clear,
  Alert,
  Emote(String),
}

/// A sigil-prefixed body whose command char is missing or not recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCommand(pub Option<char>);

impl fmt::Display for UnknownCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.0 {
      Some(c) => write!(f, "{SIGIL}{c}"),
      None => write!(f, "{SIGIL}"),
    }
  }
}

impl Command {
  /// Classify `body`. Returns `None` when the body is plain chat.
  pub fn parse(body: &str) -> Option<Result<Self, UnknownCommand>> {
    let rest = body.strip_prefix(SIGIL)?;
    let mut chars = rest.chars();
    let command = match chars.next() {
      Some('_') => Ok(Self::Clear),
      Some('b') => Ok(Self::Alert),
      Some('e') => Ok(Self::Emote(chars.as_str().to_owned())),
      other => Err(UnknownCommand(other)),
    };
    Some(command)
  }

  pub fn kind(&self) -> RecordKind {
    match self {
      Self::Clear => RecordKind::Clear,
      Self::Alert => RecordKind::Alert,
      Self::Emote(_) => RecordKind::Emote,
    }
  }

  /// The displayed body of the notice this command produces.
  pub fn notice_body(&self) -> String {
    match self {
      Self::Clear => format!("{SYSTEM_MARKER}CLEAR"),
      Self::Alert => format!("{SYSTEM_MARKER}BONG"),
      Self::Emote(arg) => format!("{SYSTEM_MARKER}{arg}"),
    }
  }
}

/// What the hub should do with an inbound draft.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
  /// Plain chat; append unchanged.
  Chat(NewRecord),
  /// A system notice to append. If `clears_history` is set the history must
  /// be truncated before the notice is appended.
  System {
    record:         NewRecord,
    clears_history: bool,
  },
  /// Drop the message; nothing is appended or broadcast.
  Unrecognized(UnknownCommand),
}

/// Classify and transform an inbound draft. Author fields and timestamps
/// pass through unchanged.
pub fn interpret(draft: NewRecord) -> Interpretation {
  match Command::parse(&draft.body) {
    None => Interpretation::Chat(draft),
    Some(Err(unknown)) => Interpretation::Unrecognized(unknown),
    Some(Ok(command)) => Interpretation::System {
      clears_history: command == Command::Clear,
      record:         NewRecord {
        body: command.notice_body(),
        kind: command.kind(),
        ..draft
      },
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::identity::AuthorId;

  fn draft(body: &str) -> NewRecord {
    NewRecord::chat("Ann", AuthorId::derive(Some("10.0.0.1")), body)
  }

  #[test]
  fn plain_text_passes_through() {
    let d = draft("hello $b");
    assert_eq!(interpret(d.clone()), Interpretation::Chat(d));
  }

  #[test]
  fn alert_keeps_author() {
    let Interpretation::System { record, clears_history } = interpret(draft("$b"))
    else {
      panic!("expected a system record");
    };
    assert!(!clears_history);
    assert_eq!(record.kind, RecordKind::Alert);
    assert_eq!(record.author_name, "Ann");
    assert_eq!(record.author_id, AuthorId::derive(Some("10.0.0.1")));
    assert_eq!(record.body, "---> BONG");
  }

  #[test]
  fn clear_signals_truncation() {
    let Interpretation::System { record, clears_history } = interpret(draft("$_"))
    else {
      panic!("expected a system record");
    };
    assert!(clears_history);
    assert_eq!(record.kind, RecordKind::Clear);
    assert_eq!(record.body, "---> CLEAR");
  }

  #[test]
  fn emote_embeds_argument_verbatim() {
    let Interpretation::System { record, .. } = interpret(draft("$e  #ff00ff <b>"))
    else {
      panic!("expected a system record");
    };
    assert_eq!(record.kind, RecordKind::Emote);
    assert_eq!(record.body, "--->   #ff00ff <b>");
  }

  #[test]
  fn empty_emote_is_still_an_emote() {
    assert_eq!(Command::parse("$e"), Some(Ok(Command::Emote(String::new()))));
  }

  #[test]
  fn unknown_and_truncated_commands() {
    assert_eq!(
      interpret(draft("$z")),
      Interpretation::Unrecognized(UnknownCommand(Some('z')))
    );
    assert_eq!(
      interpret(draft("$")),
      Interpretation::Unrecognized(UnknownCommand(None))
    );
    assert_eq!(UnknownCommand(Some('z')).to_string(), "$z");
  }

  #[test]
  fn command_char_is_case_sensitive() {
    assert_eq!(Command::parse("$B"), Some(Err(UnknownCommand(Some('B')))));
  }

  #[test]
  fn multibyte_argument_is_preserved() {
    assert_eq!(
      Command::parse("$eüber 🎉"),
      Some(Ok(Command::Emote("über 🎉".to_owned())))
    );
  }
}
