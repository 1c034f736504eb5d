//! Platform-dependent command prefix

/// Leading tokens needed to hand a command string to the platform shell
///
/// Selected once and then injected into the executor, so the OS name is never
/// re-read per execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformPrefix {
    tokens: Vec<String>,
    windows: bool,
}

const LEGACY_WINDOWS: [&str; 3] = ["windows 95", "windows 98", "windows me"];

impl PlatformPrefix {
    /// Select the prefix for an operating system name
    ///
    /// Non-Windows systems get no prefix: the command string is spawned as the
    /// program itself. Windows 95/98/ME use `command.com /C`, every other
    /// Windows uses `cmd.exe /C`.
    #[must_use]
    pub fn from_os_name(os_name: &str) -> Self {
        let name = os_name.trim().to_lowercase();

        if !name.contains("windows") {
            return Self {
                tokens: Vec::new(),
                windows: false,
            };
        }

        let shell = if LEGACY_WINDOWS.contains(&name.as_str()) {
            "command.com"
        } else {
            "cmd.exe"
        };

        Self {
            tokens: vec![shell.to_string(), "/C".to_string()],
            windows: true,
        }
    }

    /// Prefix for the operating system this binary was built for
    #[must_use]
    pub fn detect() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Use an explicit token list, e.g. `["sh", "-c"]`
    ///
    /// A list starting with `cmd.exe` or `command.com` counts as Windows.
    #[must_use]
    pub fn custom<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let windows = tokens
            .first()
            .is_some_and(|t| t.eq_ignore_ascii_case("cmd.exe") || t.eq_ignore_ascii_case("command.com"));
        Self { tokens, windows }
    }

    /// POSIX shell prefix (`sh -c`)
    #[must_use]
    pub fn posix_shell() -> Self {
        Self::custom(["sh", "-c"])
    }

    /// The prefix tokens
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether the prefix targets a Windows command interpreter
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.windows
    }

    /// Prefix tokens followed by `command` as a single token
    #[must_use]
    pub fn command_line(&self, command: &str) -> Vec<String> {
        let mut line = Vec::with_capacity(self.tokens.len() + 1);
        line.extend(self.tokens.iter().cloned());
        line.push(command.to_string());
        line
    }
}

impl Default for PlatformPrefix {
    fn default() -> Self {
        Self::detect()
    }
}
