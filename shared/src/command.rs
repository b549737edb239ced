//! Command lexicon and matcher
//!
//! Free text received from a principal is normalized and resolved against a
//! fixed vocabulary of commands. Each command owns a dictionary of utterance
//! patterns: exact utterances and `re:`-prefixed regular expressions.
//!
//! Resolution order:
//! 1. exact utterance hit across all commands
//! 2. regular expression full match, commands tried in enumeration order
//!
//! When two commands match the same text the first in enumeration order wins.

use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

/// The fixed command vocabulary, in enumeration (tie-break) order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    AreYouThere,
    GoSecure,
    StopSecure,
    GoToSleep,
    Reboot,
    SweepRoom,
    TakeThree,
    Temperature,
    Ip,
    ChangeMaster,
    CancelChangeMaster,
}

impl CommandKind {
    /// All commands in enumeration order
    pub const ALL: [CommandKind; 11] = [
        CommandKind::AreYouThere,
        CommandKind::GoSecure,
        CommandKind::StopSecure,
        CommandKind::GoToSleep,
        CommandKind::Reboot,
        CommandKind::SweepRoom,
        CommandKind::TakeThree,
        CommandKind::Temperature,
        CommandKind::Ip,
        CommandKind::ChangeMaster,
        CommandKind::CancelChangeMaster,
    ];

    /// Static dictionary backing this command
    fn dictionary(self) -> &'static str {
        match self {
            CommandKind::AreYouThere => include_str!("../lexicon/are-you-there.dictionary"),
            CommandKind::GoSecure => include_str!("../lexicon/go-secure.dictionary"),
            CommandKind::StopSecure => include_str!("../lexicon/stop-secure.dictionary"),
            CommandKind::GoToSleep => include_str!("../lexicon/go-to-sleep.dictionary"),
            CommandKind::Reboot => include_str!("../lexicon/reboot.dictionary"),
            CommandKind::SweepRoom => include_str!("../lexicon/sweep-room.dictionary"),
            CommandKind::TakeThree => include_str!("../lexicon/take-three.dictionary"),
            CommandKind::Temperature => include_str!("../lexicon/temperature.dictionary"),
            CommandKind::Ip => include_str!("../lexicon/ip.dictionary"),
            CommandKind::ChangeMaster => include_str!("../lexicon/change-master.dictionary"),
            CommandKind::CancelChangeMaster => {
                include_str!("../lexicon/cancel-change-master.dictionary")
            }
        }
    }
}

/// Errors raised while loading a lexicon
#[derive(Error, Debug)]
pub enum LexiconError {
    #[error("Malformed pattern for {command:?}: {pattern:?} ({source})")]
    MalformedPattern {
        command: CommandKind,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A command together with its normalized match patterns
#[derive(Debug)]
pub struct Command {
    kind: CommandKind,
    exact: HashSet<String>,
    patterns: Vec<Regex>,
}

impl Command {
    /// Build a command from dictionary text
    pub fn from_dictionary(kind: CommandKind, dictionary: &str) -> Result<Self, LexiconError> {
        let mut exact = HashSet::new();
        let mut patterns = Vec::new();

        for line in dictionary.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(pattern) = line.strip_prefix("re:") {
                let anchored = format!("^(?:{})$", pattern.trim());
                let regex = Regex::new(&anchored).map_err(|source| {
                    LexiconError::MalformedPattern {
                        command: kind,
                        pattern: pattern.to_string(),
                        source,
                    }
                })?;
                patterns.push(regex);
            } else {
                let utterance = normalize(line);
                if !utterance.is_empty() {
                    exact.insert(utterance);
                }
            }
        }

        Ok(Self {
            kind,
            exact,
            patterns,
        })
    }

    /// The command kind
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    fn matches_exact(&self, instruction: &str) -> bool {
        self.exact.contains(instruction)
    }

    fn matches_pattern(&self, instruction: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(instruction))
    }
}

/// Immutable set of commands, loaded once at startup
#[derive(Debug)]
pub struct Lexicon {
    commands: Vec<Command>,
}

impl Lexicon {
    /// Load the built-in dictionaries
    pub fn builtin() -> Result<Self, LexiconError> {
        let commands = CommandKind::ALL
            .iter()
            .map(|kind| Command::from_dictionary(*kind, kind.dictionary()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { commands })
    }

    /// Build a lexicon from explicit dictionaries, kept in the given order
    pub fn from_dictionaries<'a>(
        dictionaries: impl IntoIterator<Item = (CommandKind, &'a str)>,
    ) -> Result<Self, LexiconError> {
        let commands = dictionaries
            .into_iter()
            .map(|(kind, text)| Command::from_dictionary(kind, text))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { commands })
    }

    /// Resolve free text to a command, if any
    pub fn match_text(&self, text: &str) -> Option<CommandKind> {
        let instruction = normalize(text);
        if instruction.is_empty() {
            return None;
        }

        if let Some(cmd) = self.commands.iter().find(|c| c.matches_exact(&instruction)) {
            return Some(cmd.kind());
        }

        self.commands
            .iter()
            .find(|c| c.matches_pattern(&instruction))
            .map(Command::kind)
    }
}

/// Normalize an utterance: keep ASCII letters, digits and whitespace,
/// collapse whitespace runs, lowercase
pub fn normalize(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace())
        .collect();

    kept.split_ascii_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicon() -> Lexicon {
        Lexicon::builtin().expect("builtin lexicon loads")
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Go Secure!!"), "go secure");
        assert_eq!(normalize("  Take\t3,  please? "), "take 3 please");
        assert_eq!(normalize("?!"), "");
    }

    #[test]
    fn test_exact_utterances() {
        let lex = lexicon();
        let cases = [
            ("Are you there?", CommandKind::AreYouThere),
            ("Go Secure!!", CommandKind::GoSecure),
            ("stop secure", CommandKind::StopSecure),
            ("Go to sleep.", CommandKind::GoToSleep),
            ("REBOOT", CommandKind::Reboot),
            ("Sweep room", CommandKind::SweepRoom),
            ("Take 3", CommandKind::TakeThree),
            ("Temperature?", CommandKind::Temperature),
            ("IP", CommandKind::Ip),
            ("Change master", CommandKind::ChangeMaster),
            ("Cancel change master", CommandKind::CancelChangeMaster),
        ];

        for (text, expected) in cases {
            assert_eq!(lex.match_text(text), Some(expected), "text: {text}");
        }
    }

    #[test]
    fn test_every_dictionary_utterance_resolves_to_its_command() {
        let lex = lexicon();
        for kind in CommandKind::ALL {
            let utterances = kind
                .dictionary()
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("re:"));

            for utterance in utterances {
                assert_eq!(lex.match_text(utterance), Some(kind), "utterance: {utterance}");
            }
        }
    }

    #[test]
    fn test_regex_variants() {
        let lex = lexicon();
        let cases = [
            ("Hey, are you up?", CommandKind::AreYouThere),
            ("Please turn on secure mode", CommandKind::GoSecure),
            ("guard the house", CommandKind::GoSecure),
            ("please end monitoring mode", CommandKind::StopSecure),
            ("shutdown now", CommandKind::GoToSleep),
            ("restart yourself", CommandKind::Reboot),
            ("please take a video", CommandKind::SweepRoom),
            ("take three pictures", CommandKind::TakeThree),
            ("What's the temp?", CommandKind::Temperature),
            ("what is your IP address", CommandKind::Ip),
            ("please switch the master", CommandKind::ChangeMaster),
            ("abort the change of master", CommandKind::CancelChangeMaster),
        ];

        for (text, expected) in cases {
            assert_eq!(lex.match_text(text), Some(expected), "text: {text}");
        }
    }

    #[test]
    fn test_no_match() {
        let lex = lexicon();
        for text in ["", "   ", "!!!", "yes", "no", "bob@example.com", "make me a sandwich"] {
            assert_eq!(lex.match_text(text), None, "text: {text}");
        }
    }

    #[test]
    fn test_exact_hit_beats_earlier_regex() {
        let lex = Lexicon::from_dictionaries([
            (CommandKind::AreYouThere, "re:.*"),
            (CommandKind::Temperature, "temp"),
        ])
        .unwrap();

        assert_eq!(lex.match_text("temp"), Some(CommandKind::Temperature));
        assert_eq!(lex.match_text("anything"), Some(CommandKind::AreYouThere));
    }

    #[test]
    fn test_regex_tie_break_is_enumeration_order() {
        let lex = Lexicon::from_dictionaries([
            (CommandKind::GoSecure, "re:secure.*"),
            (CommandKind::StopSecure, "re:.*secure.*"),
        ])
        .unwrap();

        assert_eq!(lex.match_text("secure now"), Some(CommandKind::GoSecure));
        assert_eq!(lex.match_text("not secure"), Some(CommandKind::StopSecure));
    }

    #[test]
    fn test_malformed_pattern_is_load_error() {
        let result = Lexicon::from_dictionaries([(CommandKind::Ip, "ip\nre:(unclosed")]);
        assert!(matches!(
            result,
            Err(LexiconError::MalformedPattern {
                command: CommandKind::Ip,
                ..
            })
        ));
    }
}
