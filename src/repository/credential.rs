//! Repository URLs, fetch refspecs and the credentials that tie them together.

use std::fmt;

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use url::Url;

use crate::error::HarnessError;

/// Transport a repository URL uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoUrlType {
    /// `ssh://` or SCP-style `user@host:path`.
    Ssh,
    /// `http://` or `https://`.
    Https,
    /// `file://`, used for local fixtures.
    File,
}

impl RepoUrlType {
    /// Lowercase label used in logs and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Https => "https",
            Self::File => "file",
        }
    }
}

/// A parsed source-control URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryUrl {
    raw: String,
    url_type: RepoUrlType,
}

impl RepositoryUrl {
    /// Parses a repository URL, accepting SCP-style SSH addresses.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Setup`] when the URL is blank, malformed or
    /// uses an unsupported scheme.
    pub fn parse(raw: &str) -> Result<Self, HarnessError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(setup(raw, "repository URL is empty"));
        }

        if is_scp_style(trimmed) {
            return Ok(Self {
                raw: trimmed.to_owned(),
                url_type: RepoUrlType::Ssh,
            });
        }

        let parsed = Url::parse(trimmed).map_err(|error| setup(raw, &error.to_string()))?;
        let url_type = match parsed.scheme() {
            "ssh" | "git+ssh" => RepoUrlType::Ssh,
            "http" | "https" => RepoUrlType::Https,
            "file" => RepoUrlType::File,
            other => return Err(setup(raw, &format!("unsupported scheme '{other}'"))),
        };
        if url_type != RepoUrlType::File && parsed.host_str().is_none_or(str::is_empty) {
            return Err(setup(raw, "repository URL has no host"));
        }

        Ok(Self {
            raw: trimmed.to_owned(),
            url_type,
        })
    }

    /// The URL exactly as it is registered with the control plane.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.raw.as_str()
    }

    /// Transport inferred from the URL.
    #[must_use]
    pub const fn url_type(&self) -> RepoUrlType {
        self.url_type
    }
}

impl fmt::Display for RepositoryUrl {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.raw)
    }
}

/// SCP-style SSH: `user@host:path`, with the colon after the `@` and no `://`.
fn is_scp_style(url: &str) -> bool {
    let (Some(at_pos), Some(colon_pos)) = (url.find('@'), url.find(':')) else {
        return false;
    };
    if colon_pos <= at_pos {
        return false;
    }
    if url.get(colon_pos..colon_pos.saturating_add(3)) == Some("://") {
        return false;
    }
    url.get(at_pos.saturating_add(1)..colon_pos)
        .is_some_and(|host| !host.is_empty())
        && url
            .get(colon_pos.saturating_add(1)..)
            .is_some_and(|path| !path.is_empty())
}

/// A fetch refspec, passed to the control plane unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refspec(String);

impl Refspec {
    /// Accepts any non-blank refspec without embedded whitespace.
    ///
    /// The harness does not interpret refspecs; it only rejects values that
    /// could never be a single fetch rule.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Setup`] for blank values or values containing
    /// whitespace.
    pub fn new(url: &RepositoryUrl, value: &str) -> Result<Self, HarnessError> {
        if value.is_empty() || value.chars().any(char::is_whitespace) {
            return Err(setup(
                url.as_str(),
                &format!("'{value}' is not a valid fetch refspec"),
            ));
        }
        Ok(Self(value.to_owned()))
    }

    /// Borrow the refspec text.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// How the controller authenticates against the repository.
#[derive(Clone, PartialEq, Eq)]
pub enum RepositoryAuth {
    /// No credentials; public or local repositories.
    Anonymous,
    /// SSH private key, PEM/OpenSSH encoded.
    SshKey {
        /// Private key material.
        private_key: String,
    },
    /// HTTPS basic auth using a token as the password.
    Token {
        /// Username sent with the token.
        username: String,
        /// Access token.
        token: String,
    },
}

impl RepositoryAuth {
    /// Reads an SSH private key from disk.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] when the key file cannot be read, and
    /// [`HarnessError::Configuration`] when it is empty.
    pub fn ssh_key_from_file(path: &Utf8Path) -> Result<Self, HarnessError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path.file_name().ok_or_else(|| HarnessError::Configuration {
            message: format!("SSH key path '{path}' has no file name"),
        })?;

        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|error| {
            HarnessError::Io {
                message: format!("failed to open '{parent}': {error}"),
            }
        })?;
        let private_key = dir
            .read_to_string(file_name)
            .map_err(|error| HarnessError::Io {
                message: format!("failed to read SSH key '{path}': {error}"),
            })?;

        if private_key.trim().is_empty() {
            return Err(HarnessError::Configuration {
                message: format!("SSH key '{path}' is empty"),
            });
        }
        Ok(Self::SshKey { private_key })
    }

    /// Short label for logs; never includes secret material.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::SshKey { .. } => "ssh-key",
            Self::Token { .. } => "token",
        }
    }

    const fn suits(&self, url_type: RepoUrlType) -> bool {
        match self {
            Self::Anonymous => true,
            Self::SshKey { .. } => matches!(url_type, RepoUrlType::Ssh),
            Self::Token { .. } => matches!(url_type, RepoUrlType::Https),
        }
    }
}

impl fmt::Debug for RepositoryAuth {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => formatter.write_str("Anonymous"),
            Self::SshKey { .. } => formatter
                .debug_struct("SshKey")
                .field("private_key", &"<redacted>")
                .finish(),
            Self::Token { username, .. } => formatter
                .debug_struct("Token")
                .field("username", username)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// A repository registration: URL, credentials and fetch refspecs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryCredential {
    url: RepositoryUrl,
    auth: RepositoryAuth,
    refspecs: Vec<Refspec>,
    insecure_ignore_host_key: bool,
}

impl RepositoryCredential {
    /// Builds a credential, checking the auth method suits the URL transport.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Setup`] when an SSH key is paired with a
    /// non-SSH URL or a token with a non-HTTPS URL, or a refspec is invalid.
    pub fn new(
        url: RepositoryUrl,
        auth: RepositoryAuth,
        refspecs: &[&str],
    ) -> Result<Self, HarnessError> {
        if !auth.suits(url.url_type()) {
            return Err(setup(
                url.as_str(),
                &format!(
                    "{} credentials cannot be used with a {} URL",
                    auth.kind(),
                    url.url_type().as_str()
                ),
            ));
        }

        let parsed = refspecs
            .iter()
            .map(|refspec| Refspec::new(&url, refspec))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            url,
            auth,
            refspecs: parsed,
            insecure_ignore_host_key: false,
        })
    }

    /// Skips SSH host key verification on the controller side.
    #[must_use]
    pub fn with_insecure_ignore_host_key(self, insecure: bool) -> Self {
        Self {
            insecure_ignore_host_key: insecure,
            ..self
        }
    }

    /// Repository URL.
    #[must_use]
    pub const fn url(&self) -> &RepositoryUrl {
        &self.url
    }

    /// Transport inferred from the URL.
    #[must_use]
    pub const fn url_type(&self) -> RepoUrlType {
        self.url.url_type()
    }

    /// Credentials presented to the repository.
    #[must_use]
    pub const fn auth(&self) -> &RepositoryAuth {
        &self.auth
    }

    /// Fetch refspecs, in the order supplied.
    #[must_use]
    pub fn refspecs(&self) -> &[Refspec] {
        &self.refspecs
    }

    /// True when no refspecs were supplied and the controller's default applies.
    #[must_use]
    pub const fn uses_default_refspecs(&self) -> bool {
        self.refspecs.is_empty()
    }

    /// Whether SSH host key verification is skipped.
    #[must_use]
    pub const fn insecure_ignore_host_key(&self) -> bool {
        self.insecure_ignore_host_key
    }
}

pub(crate) fn setup(url: &str, message: &str) -> HarnessError {
    HarnessError::Setup {
        url: url.to_owned(),
        message: message.to_owned(),
    }
}
