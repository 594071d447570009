//! Application specs and the draft they are built from.
//!
//! An [`ApplicationDraft`] accumulates settings through pure `with_*`
//! transitions. Freezing a draft yields an immutable [`ApplicationSpec`] with
//! a fresh, generation-suffixed name, so repeated `create` calls in one test
//! always produce independent application resources. Drafts started with
//! [`ApplicationDraft::for_case`] also carry a per-case token, which keeps
//! same-named cases and re-runs apart.

use std::fmt;

use crate::error::HarnessError;

/// Default target revision used when a test does not pin one.
pub const DEFAULT_REVISION: &str = "HEAD";
/// Default source path inside the repository.
pub const DEFAULT_PATH: &str = ".";
/// Default project applications are created in.
pub const DEFAULT_PROJECT: &str = "default";
/// In-cluster API server address used as the default destination.
pub const DEFAULT_DESTINATION_SERVER: &str = "https://kubernetes.default.svc";

const MAX_NAME_LENGTH: usize = 63;
const GENERATION_SUFFIX_ROOM: usize = 6;
const MAX_TOKEN_LENGTH: usize = 24;

/// Validated application resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApplicationName(String);

impl ApplicationName {
    /// Validates a resource name: lowercase alphanumerics and `-`, starting
    /// and ending with an alphanumeric, at most 63 characters.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidSpec`] when the name breaks those rules.
    pub fn new(value: impl Into<String>) -> Result<Self, HarnessError> {
        let name = value.into();
        let well_formed = !name.is_empty()
            && name.len() <= MAX_NAME_LENGTH
            && name.chars().all(|character| {
                character.is_ascii_lowercase() || character.is_ascii_digit() || character == '-'
            })
            && !name.starts_with('-')
            && !name.ends_with('-');

        if well_formed {
            Ok(Self(name))
        } else {
            Err(HarnessError::InvalidSpec {
                message: format!("'{name}' is not a valid application name"),
            })
        }
    }

    /// Borrow the name.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ApplicationName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Derives a name stem from free text such as a test case name.
///
/// Non-alphanumeric runs collapse to a single `-`; the stem leaves room for
/// the generation suffix added on each freeze.
#[must_use]
pub fn name_stem(case_name: &str) -> String {
    let limit = MAX_NAME_LENGTH.saturating_sub(GENERATION_SUFFIX_ROOM);
    or_default_stem(sanitise(case_name, limit))
}

/// Derives a name stem ending in `token`, an identifier unique to one case.
///
/// Cases sharing a name, and re-runs of the same case, then never address
/// the same application. The case name is shortened first so the token
/// always survives.
#[must_use]
pub fn unique_name_stem(case_name: &str, token: &str) -> String {
    let suffix = sanitise(token, MAX_TOKEN_LENGTH);
    if suffix.is_empty() {
        return name_stem(case_name);
    }

    let limit = MAX_NAME_LENGTH
        .saturating_sub(GENERATION_SUFFIX_ROOM)
        .saturating_sub(suffix.len())
        .saturating_sub(1);
    let base = or_default_stem(sanitise(case_name, limit));
    format!("{base}-{suffix}")
}

fn sanitise(text: &str, limit: usize) -> String {
    let mut stem = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() {
            stem.push(character.to_ascii_lowercase());
        } else if !stem.ends_with('-') {
            stem.push('-');
        }
    }

    let truncated: String = stem.trim_matches('-').chars().take(limit).collect();
    truncated.trim_end_matches('-').to_owned()
}

fn or_default_stem(stem: String) -> String {
    if stem.is_empty() {
        "app".to_owned()
    } else {
        stem
    }
}

/// Cluster and namespace an application deploys into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// API server URL of the target cluster.
    pub server: String,
    /// Namespace the manifests are applied to.
    pub namespace: String,
}

impl Default for Destination {
    fn default() -> Self {
        Self {
            server: DEFAULT_DESTINATION_SERVER.to_owned(),
            namespace: "default".to_owned(),
        }
    }
}

/// Immutable snapshot of an application, as submitted to the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationSpec {
    name: ApplicationName,
    source_repo_url: String,
    source_path: String,
    target_revision: String,
    destination: Destination,
    project: String,
}

impl ApplicationSpec {
    /// Resource name.
    #[must_use]
    pub const fn name(&self) -> &ApplicationName {
        &self.name
    }

    /// Repository the controller fetches from.
    #[must_use]
    pub const fn source_repo_url(&self) -> &str {
        self.source_repo_url.as_str()
    }

    /// Path inside the repository.
    #[must_use]
    pub const fn source_path(&self) -> &str {
        self.source_path.as_str()
    }

    /// Revision the controller resolves and syncs.
    #[must_use]
    pub const fn target_revision(&self) -> &str {
        self.target_revision.as_str()
    }

    /// Deployment destination.
    #[must_use]
    pub const fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Project the application belongs to.
    #[must_use]
    pub const fn project(&self) -> &str {
        self.project.as_str()
    }
}

/// Mutable, under-construction form of an [`ApplicationSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationDraft {
    stem: String,
    generation: u32,
    repo_url: Option<String>,
    path: String,
    revision: String,
    destination: Destination,
    project: String,
}

impl ApplicationDraft {
    /// Starts a draft whose frozen specs are named after `case_name`.
    #[must_use]
    pub fn new(case_name: &str) -> Self {
        Self {
            stem: name_stem(case_name),
            generation: 0,
            repo_url: None,
            path: DEFAULT_PATH.to_owned(),
            revision: DEFAULT_REVISION.to_owned(),
            destination: Destination::default(),
            project: DEFAULT_PROJECT.to_owned(),
        }
    }

    /// Starts a draft for one case whose names also carry `token`.
    ///
    /// See [`unique_name_stem`].
    #[must_use]
    pub fn for_case(case_name: &str, token: &str) -> Self {
        Self {
            stem: unique_name_stem(case_name, token),
            ..Self::new(case_name)
        }
    }

    /// Sets the source repository URL.
    #[must_use]
    pub fn with_repo_url(self, repo_url: impl Into<String>) -> Self {
        Self {
            repo_url: Some(repo_url.into()),
            ..self
        }
    }

    /// Sets the path inside the repository.
    #[must_use]
    pub fn with_path(self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..self
        }
    }

    /// Sets the target revision.
    #[must_use]
    pub fn with_revision(self, revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            ..self
        }
    }

    /// Sets the destination cluster API server.
    #[must_use]
    pub fn with_destination_server(self, server: impl Into<String>) -> Self {
        Self {
            destination: Destination {
                server: server.into(),
                ..self.destination
            },
            ..self
        }
    }

    /// Sets the destination namespace.
    #[must_use]
    pub fn with_destination_namespace(self, namespace: impl Into<String>) -> Self {
        Self {
            destination: Destination {
                namespace: namespace.into(),
                ..self.destination
            },
            ..self
        }
    }

    /// Sets the project.
    #[must_use]
    pub fn with_project(self, project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..self
        }
    }

    /// Repository URL, if one has been set.
    #[must_use]
    pub fn repo_url(&self) -> Option<&str> {
        self.repo_url.as_deref()
    }

    /// Number of specs frozen from this draft so far.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Checks the submission invariants without freezing.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidSpec`] when the repository URL or the
    /// target revision is missing or blank, or the destination is incomplete.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let repo_url = self.repo_url.as_deref().map(str::trim).unwrap_or_default();
        if repo_url.is_empty() {
            return Err(invalid("source repository URL is required"));
        }
        if self.revision.trim().is_empty() {
            return Err(invalid("target revision must not be empty"));
        }
        if self.destination.server.trim().is_empty()
            || self.destination.namespace.trim().is_empty()
        {
            return Err(invalid("destination server and namespace are required"));
        }
        if self.project.trim().is_empty() {
            return Err(invalid("project must not be empty"));
        }
        Ok(())
    }

    /// Freezes the draft into a spec with the next generation's name.
    ///
    /// The returned draft keeps every setting and advances the generation, so
    /// freezing again never reuses a name.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidSpec`] when [`Self::validate`] fails.
    pub fn freeze(self) -> Result<(ApplicationSpec, Self), HarnessError> {
        self.validate()?;

        let generation = self.generation.saturating_add(1);
        let name = ApplicationName::new(format!("{}-{generation}", self.stem))?;
        let spec = ApplicationSpec {
            name,
            source_repo_url: self.repo_url.clone().unwrap_or_default(),
            source_path: self.path.clone(),
            target_revision: self.revision.clone(),
            destination: self.destination.clone(),
            project: self.project.clone(),
        };

        Ok((spec, Self { generation, ..self }))
    }
}

fn invalid(message: &str) -> HarnessError {
    HarnessError::InvalidSpec {
        message: message.to_owned(),
    }
}
