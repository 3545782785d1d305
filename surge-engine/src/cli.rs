use clap::Parser;

/// Command line of the `surge` runner
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "surge")]
#[command(version, about = "Concurrent load generation and performance statistics for HTTP services")]
pub struct Cli {
    /// Concurrent virtual users for every scenario
    #[arg(long, value_name = "N")]
    pub users: Option<usize>,

    /// Duration of every scenario in seconds
    #[arg(long, value_name = "SECONDS")]
    pub duration: Option<u64>,

    /// Base URL of the target service
    #[arg(long, value_name = "BASE_URL")]
    pub url: Option<String>,

    /// Configuration file, without extension [default: config/default]
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,
}

/// Configuration read when `--config` is not given; it may be absent
pub const DEFAULT_CONFIG_PATH: &str = "config/default";

/// Flags that take a value
const VALUE_FLAGS: [&str; 4] = ["--users", "--duration", "--url", "--config"];
const SWITCHES: [&str; 4] = ["-h", "--help", "-V", "--version"];

impl Cli {
    /// Parse, keeping unknown arguments aside instead of failing on them
    pub fn parse_lenient<I, S>(args: I) -> Result<(Self, Vec<String>), clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (known, unknown) = split_known_args(args);
        let cli = Self::try_parse_from(known)?;
        Ok((cli, unknown))
    }

    pub fn config_path(&self) -> &str {
        self.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH)
    }

    /// Only an explicitly named config file must exist
    pub fn config_required(&self) -> bool {
        self.config.is_some()
    }
}

/// Help and version output, which end the process successfully
pub fn is_informational(err: &clap::Error) -> bool {
    matches!(
        err.kind(),
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
    )
}

/// Separate arguments `Cli` understands from everything else.
///
/// The first argument is the program name and is always kept. Unknown flags do
/// not consume the token after them.
pub fn split_known_args<I, S>(args: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = args.into_iter().map(Into::<String>::into);
    let mut known: Vec<String> = args.next().into_iter().collect();
    let mut unknown = Vec::new();

    while let Some(arg) = args.next() {
        let flag = arg.split_once('=').map_or(arg.as_str(), |(flag, _)| flag);

        if VALUE_FLAGS.iter().any(|f| *f == flag) {
            let inline_value = arg.contains('=');
            known.push(arg);
            if !inline_value {
                if let Some(value) = args.next() {
                    known.push(value);
                }
            }
        } else if SWITCHES.iter().any(|f| *f == arg) {
            known.push(arg);
        } else {
            unknown.push(arg);
        }
    }

    (known, unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let (cli, unknown) = Cli::parse_lenient(["surge"]).unwrap();
        assert_eq!(cli.users, None);
        assert_eq!(cli.duration, None);
        assert_eq!(cli.url, None);
        assert_eq!(cli.config_path(), DEFAULT_CONFIG_PATH);
        assert!(!cli.config_required());
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_all_flags() {
        let (cli, _) = Cli::parse_lenient([
            "surge",
            "--users",
            "25",
            "--duration=45",
            "--url",
            "http://localhost:3000",
            "--config",
            "config/ci",
        ])
        .unwrap();
        assert_eq!(cli.users, Some(25));
        assert_eq!(cli.duration, Some(45));
        assert_eq!(cli.url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(cli.config_path(), "config/ci");
        assert!(cli.config_required());
    }

    #[test]
    fn test_unknown_flags_are_set_aside() {
        let (cli, unknown) =
            Cli::parse_lenient(["surge", "--verbose", "--users", "3", "--color=always", "extra"])
                .unwrap();
        assert_eq!(cli.users, Some(3));
        assert_eq!(unknown, vec!["--verbose", "--color=always", "extra"]);
    }

    #[test]
    fn test_bad_value_is_an_error() {
        let err = Cli::parse_lenient(["surge", "--users", "many"]).unwrap_err();
        assert!(!is_informational(&err));
    }

    #[test]
    fn test_help_and_version_are_informational() {
        let help = Cli::parse_lenient(["surge", "--help"]).unwrap_err();
        assert!(is_informational(&help));
        let version = Cli::parse_lenient(["surge", "--version"]).unwrap_err();
        assert!(is_informational(&version));
    }

    #[test]
    fn test_split_keeps_program_name() {
        let (known, unknown) = split_known_args(["surge", "-x"]);
        assert_eq!(known, vec!["surge"]);
        assert_eq!(unknown, vec!["-x"]);
    }
}
