//! Experiment Definition - static declaration of an experiment

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;

use crate::config::validate_host;
use crate::{Error, Result};

const TEST_SUFFIX: &str = "_test";

fn first_cap() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("static regex"))
}

fn all_cap() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"))
}

/// Normalize a compound-word identifier into an experiment name.
///
/// `CompoundNameTest` becomes `compound_name`: words are split on case
/// boundaries, lowercased, joined with underscores, and a trailing `_test`
/// marker is dropped. Already-normalized names pass through unchanged.
///
/// ```rust
/// use sixpack_participation::experiment::derive_name;
///
/// assert_eq!(derive_name("CompoundNameTest"), "compound_name");
/// assert_eq!(derive_name("compound_name"), "compound_name");
/// ```
#[must_use]
pub fn derive_name(raw: &str) -> String {
    let split = first_cap().replace_all(raw, "${1}_${2}");
    let mut name = all_cap().replace_all(&split, "${1}_${2}").to_lowercase();
    // Repeated markers are stripped too, so the result is a fixed point.
    while name.ends_with(TEST_SUFFIX) {
        name.truncate(name.len() - TEST_SUFFIX.len());
    }
    name
}

/// Ordered set of alternative names. The first one is the control.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alternatives {
    names: Vec<String>,
}

impl Alternatives {
    /// Build an alternative set, rejecting duplicate names.
    ///
    /// An empty set is accepted here; participation against it fails later.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if a name appears twice.
    pub fn new<I, T>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut collected: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if collected.contains(&name) {
                return Err(Error::Configuration(format!(
                    "alternative {name:?} is declared more than once"
                )));
            }
            collected.push(name);
        }
        Ok(Self { names: collected })
    }

    /// The control alternative, if any are declared.
    #[must_use]
    pub fn control(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    /// Look up an alternative by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.names.iter().map(String::as_str).find(|n| *n == name)
    }

    /// Check whether `name` is one of the declared alternatives.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Names as a slice, in declaration order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.names
    }

    /// Number of declared alternatives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

type ClientIdFn<S> = dyn Fn(&S) -> Option<String> + Send + Sync;

/// How to derive a client identifier from a subject.
///
/// Pairs the attribute name (used in error messages) with an accessor
/// that reads it from the subject.
pub struct Identity<S> {
    attribute: String,
    accessor: Arc<ClientIdFn<S>>,
}

impl<S> Identity<S> {
    /// Create an identity from an attribute name and its accessor.
    pub fn new<F>(attribute: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&S) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            attribute: attribute.into(),
            accessor: Arc::new(accessor),
        }
    }

    /// Attribute name this identity reads.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl<S> Clone for Identity<S> {
    fn clone(&self) -> Self {
        Self {
            attribute: self.attribute.clone(),
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<S> fmt::Debug for Identity<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("attribute", &self.attribute)
            .finish_non_exhaustive()
    }
}

/// Declaration of an experiment: its name, alternatives, and operating mode.
///
/// Definitions are built once and reused for every subject.
///
/// ```rust
/// use sixpack_participation::experiment::{ExperimentDefinition, Identity};
///
/// struct User {
///     id: u64,
/// }
///
/// let definition = ExperimentDefinition::builder("ButtonColorTest")
///     .alternatives(["RED", "BLUE"])
///     .identity(Identity::new("id", |u: &User| Some(u.id.to_string())))
///     .local_caching(true)
///     .build()?;
///
/// assert_eq!(definition.name(), "button_color");
/// assert_eq!(definition.control(), Some("RED"));
/// assert_eq!(definition.client_id(&User { id: 7 })?, "7");
/// # Ok::<(), sixpack_participation::Error>(())
/// ```
pub struct ExperimentDefinition<S> {
    name: String,
    alternatives: Alternatives,
    identity: Option<Identity<S>>,
    local_caching: bool,
    server_authoritative: bool,
    host: Option<String>,
    timeout: Option<Duration>,
}

impl<S> ExperimentDefinition<S> {
    /// Create a builder from a readable identifier such as `CheckoutFlowTest`.
    #[must_use]
    pub fn builder(identifier: &str) -> ExperimentDefinitionBuilder<S> {
        ExperimentDefinitionBuilder::new(identifier)
    }

    /// Get the derived experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the declared alternatives.
    #[must_use]
    pub const fn alternatives(&self) -> &Alternatives {
        &self.alternatives
    }

    /// Look up a declared alternative by name.
    #[must_use]
    pub fn alternative(&self, name: &str) -> Option<&str> {
        self.alternatives.get(name)
    }

    /// Get the control alternative.
    #[must_use]
    pub fn control(&self) -> Option<&str> {
        self.alternatives.control()
    }

    /// Get the identity accessor, if one is configured.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity<S>> {
        self.identity.as_ref()
    }

    /// Whether decisions are cached in the local participation store.
    #[must_use]
    pub const fn local_caching(&self) -> bool {
        self.local_caching
    }

    /// Whether the remote service's own randomization is trusted.
    #[must_use]
    pub const fn server_authoritative(&self) -> bool {
        self.server_authoritative
    }

    /// Remote host override for this experiment.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Remote timeout override for this experiment.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Resolve the client identifier for `subject`.
    ///
    /// # Errors
    ///
    /// - `Error::Configuration` if no identity attribute is configured
    /// - `Error::Identity` if the attribute is absent or empty on the subject
    pub fn client_id(&self, subject: &S) -> Result<String> {
        let identity = self.identity.as_ref().ok_or_else(|| {
            Error::Configuration(format!(
                "experiment {:?} needs a unique attribute to compute the client ID",
                self.name
            ))
        })?;

        match (identity.accessor)(subject) {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(Error::Identity(format!(
                "unique attribute {:?} does not yield a usable identifier",
                identity.attribute
            ))),
        }
    }
}

// Manual impls: derives would require `S: Clone` / `S: Debug`.
impl<S> Clone for ExperimentDefinition<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            alternatives: self.alternatives.clone(),
            identity: self.identity.clone(),
            local_caching: self.local_caching,
            server_authoritative: self.server_authoritative,
            host: self.host.clone(),
            timeout: self.timeout,
        }
    }
}

impl<S> fmt::Debug for ExperimentDefinition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentDefinition")
            .field("name", &self.name)
            .field("alternatives", &self.alternatives)
            .field("identity", &self.identity)
            .field("local_caching", &self.local_caching)
            .field("server_authoritative", &self.server_authoritative)
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder for `ExperimentDefinition`.
pub struct ExperimentDefinitionBuilder<S> {
    name: String,
    alternatives: Vec<String>,
    identity: Option<Identity<S>>,
    local_caching: bool,
    server_authoritative: bool,
    host: Option<String>,
    timeout: Option<Duration>,
}

impl<S> ExperimentDefinitionBuilder<S> {
    /// Create a new builder; the name is derived once, here.
    #[must_use]
    pub fn new(identifier: &str) -> Self {
        Self {
            name: derive_name(identifier),
            alternatives: Vec::new(),
            identity: None,
            local_caching: false,
            server_authoritative: true,
            host: None,
            timeout: None,
        }
    }

    /// Set the alternatives, control first.
    #[must_use]
    pub fn alternatives<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.alternatives = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set how the client identifier is read from a subject.
    #[must_use]
    pub fn identity(mut self, identity: Identity<S>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Enable or disable local caching of decisions.
    #[must_use]
    pub const fn local_caching(mut self, enabled: bool) -> Self {
        self.local_caching = enabled;
        self
    }

    /// Trust (or not) the remote service's randomization.
    #[must_use]
    pub const fn server_authoritative(mut self, authoritative: bool) -> Self {
        self.server_authoritative = authoritative;
        self
    }

    /// Route this experiment to a specific remote host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Use a specific remote timeout for this experiment.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the definition.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if an alternative is declared twice,
    /// the host override is not an HTTP URL, or the timeout override is zero.
    pub fn build(self) -> Result<ExperimentDefinition<S>> {
        if let Some(host) = &self.host {
            validate_host(&format!("{} host", self.name), host)?;
        }
        if self.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::Configuration(format!(
                "{} timeout must be greater than 0",
                self.name
            )));
        }

        Ok(ExperimentDefinition {
            name: self.name,
            alternatives: Alternatives::new(self.alternatives)?,
            identity: self.identity,
            local_caching: self.local_caching,
            server_authoritative: self.server_authoritative,
            host: self.host,
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Subject {
        pk: Option<String>,
    }

    fn pk_identity() -> Identity<Subject> {
        Identity::new("pk", |s: &Subject| s.pk.clone())
    }

    #[test]
    fn test_derive_name_splits_and_drops_test_marker() {
        assert_eq!(derive_name("CompoundNameTest"), "compound_name");
        assert_eq!(derive_name("DefaultTest"), "default");
        assert_eq!(derive_name("HTTPRetryTest"), "http_retry");
        assert_eq!(derive_name("Checkout2StepTest"), "checkout2_step");
    }

    #[test]
    fn test_derive_name_idempotent() {
        let once = derive_name("CompoundNameTest");
        assert_eq!(derive_name(&once), once);
    }

    #[test]
    fn test_derive_name_strips_repeated_marker() {
        assert_eq!(derive_name("FooTestTest"), "foo");
        assert_eq!(derive_name("TestTest"), "test");
    }

    #[test]
    fn test_derive_name_keeps_inner_test() {
        assert_eq!(derive_name("TestimonialBanner"), "testimonial_banner");
        assert_eq!(derive_name("ATestOfThings"), "a_test_of_things");
    }

    #[test]
    fn test_alternatives_reject_duplicates() {
        let err = Alternatives::new(["A", "B", "A"]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_alternatives_accessors() {
        let alts = Alternatives::new(["FIRST", "SECOND"]).unwrap();
        assert_eq!(alts.control(), Some("FIRST"));
        assert_eq!(alts.get("SECOND"), Some("SECOND"));
        assert!(alts.get("THIRD").is_none());
        assert_eq!(alts.iter().collect::<Vec<_>>(), vec!["FIRST", "SECOND"]);
    }

    #[test]
    fn test_client_id_without_identity_is_configuration_error() {
        let def = ExperimentDefinition::<Subject>::builder("NoIdTest")
            .alternatives(["A"])
            .build()
            .unwrap();
        let err = def.client_id(&Subject { pk: Some("1".into()) }).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_client_id_empty_value_is_identity_error() {
        let def = ExperimentDefinition::builder("EmptyIdTest")
            .alternatives(["A"])
            .identity(pk_identity())
            .build()
            .unwrap();

        for pk in [None, Some(String::new()), Some("  ".to_string())] {
            let err = def.client_id(&Subject { pk }).unwrap_err();
            assert!(matches!(err, Error::Identity(_)));
        }
    }

    #[test]
    fn test_client_id_uses_accessor() {
        let def = ExperimentDefinition::builder("UsesAttrTest")
            .identity(pk_identity())
            .build()
            .unwrap();
        assert_eq!(def.client_id(&Subject { pk: Some("5".into()) }).unwrap(), "5");
    }

    #[test]
    fn test_builder_defaults() {
        let def = ExperimentDefinition::<Subject>::builder("DefaultTest")
            .build()
            .unwrap();
        assert_eq!(def.name(), "default");
        assert!(def.alternatives().is_empty());
        assert!(!def.local_caching());
        assert!(def.server_authoritative());
        assert!(def.host().is_none());
        assert!(def.timeout().is_none());
    }

    #[test]
    fn test_builder_rejects_invalid_host_override() {
        for host in ["ftp://sixpack.example.com", "localhost:5000", "  "] {
            let err = ExperimentDefinition::<Subject>::builder("HostTest")
                .host(host)
                .build()
                .unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{host:?}");
        }
    }

    #[test]
    fn test_builder_rejects_zero_timeout_override() {
        let err = ExperimentDefinition::<Subject>::builder("TimeoutTest")
            .timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_builder_accepts_valid_overrides() {
        let def = ExperimentDefinition::<Subject>::builder("OverrideTest")
            .host("https://sixpack.example.com")
            .timeout(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(def.host(), Some("https://sixpack.example.com"));
        assert_eq!(def.timeout(), Some(Duration::from_millis(250)));
    }
}
