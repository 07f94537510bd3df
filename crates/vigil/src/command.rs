use alloc::string::{String, ToString};

/// Control channel verbs understood by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// `USER <name>`
    User,
    /// `PASS <secret>`
    Pass,
    /// `AUTH <mechanism>`, always refused.
    Auth,
    /// `PWD`
    Pwd,
    /// `CWD <dir>`
    Cwd,
    /// `CDUP`
    Cdup,
    /// `MKD <dir>`
    Mkd,
    /// `RMD <dir>`
    Rmd,
    /// `DELE <file>`
    Dele,
    /// `RNFR <path>`
    Rnfr,
    /// `RNTO <path>`
    Rnto,
    /// `LIST [<dir>]`
    List,
    /// `MLSD [<dir>]`
    Mlsd,
    /// `TYPE <type>`
    Type,
    /// `MODE <mode>`
    Mode,
    /// `STRU <structure>`
    Stru,
    /// `PASV`
    Pasv,
    /// `FEAT`
    Feat,
    /// `SYST`
    Syst,
    /// `NOOP`
    Noop,
    /// `ABOR`
    Abor,
    /// `RETR <file>`
    Retr,
    /// `STOR <file>`
    Stor,
    /// `QUIT`
    Quit,
    /// Any other verb.
    Unknown,
}

impl Verb {
    /// Parses a verb, ignoring ASCII case.
    #[must_use]
    pub fn parse(verb: &str) -> Self {
        const VERBS: &[(&str, Verb)] = &[
            ("USER", Verb::User),
            ("PASS", Verb::Pass),
            ("AUTH", Verb::Auth),
            ("PWD", Verb::Pwd),
            ("CWD", Verb::Cwd),
            ("CDUP", Verb::Cdup),
            ("MKD", Verb::Mkd),
            ("RMD", Verb::Rmd),
            ("DELE", Verb::Dele),
            ("RNFR", Verb::Rnfr),
            ("RNTO", Verb::Rnto),
            ("LIST", Verb::List),
            ("MLSD", Verb::Mlsd),
            ("TYPE", Verb::Type),
            ("MODE", Verb::Mode),
            ("STRU", Verb::Stru),
            ("PASV", Verb::Pasv),
            ("FEAT", Verb::Feat),
            ("SYST", Verb::Syst),
            ("NOOP", Verb::Noop),
            ("ABOR", Verb::Abor),
            ("RETR", Verb::Retr),
            ("STOR", Verb::Stor),
            ("QUIT", Verb::Quit),
        ];

        VERBS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(verb))
            .map_or(Self::Unknown, |(_, parsed)| *parsed)
    }
}

/// A parsed control channel line: `VERB[ ARGUMENT]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: Verb,
    name: String,
    argument: String,
}

impl Command {
    /// Parses a control channel line.
    ///
    /// Line terminators and surrounding blanks are removed. The argument is
    /// everything after the first space, so it may contain spaces itself.
    /// Returns [`None`] for blank lines.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_matches(|c: char| c == '\r' || c == '\n' || c == ' ');
        if line.is_empty() {
            return None;
        }

        let (name, argument) = line.split_once(' ').unwrap_or((line, ""));

        Some(Self {
            verb: Verb::parse(name),
            name: name.to_ascii_uppercase(),
            argument: argument.trim().to_string(),
        })
    }

    /// Returns the verb.
    #[must_use]
    pub const fn verb(&self) -> Verb {
        self.verb
    }

    /// Returns the verb as received, in upper case.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the argument, empty when absent.
    #[must_use]
    pub fn argument(&self) -> &str {
        &self.argument
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, Verb};

    #[test]
    fn parse_verbs() {
        assert_eq!(Verb::parse("RETR"), Verb::Retr);
        assert_eq!(Verb::parse("retr"), Verb::Retr);
        assert_eq!(Verb::parse("XRETR"), Verb::Unknown);
    }

    #[test]
    fn parse_line() {
        let command = Command::parse("STOR my file.bin\r\n").unwrap();
        assert_eq!(command.verb(), Verb::Stor);
        assert_eq!(command.name(), "STOR");
        assert_eq!(command.argument(), "my file.bin");

        let command = Command::parse("pwd\r\n").unwrap();
        assert_eq!(command.verb(), Verb::Pwd);
        assert_eq!(command.argument(), "");

        let command = Command::parse("SITE CHMOD 777 a").unwrap();
        assert_eq!(command.verb(), Verb::Unknown);
        assert_eq!(command.name(), "SITE");
    }

    #[test]
    fn blank_line() {
        assert!(Command::parse("\r\n").is_none());
        assert!(Command::parse("   ").is_none());
    }
}
