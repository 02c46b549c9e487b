//! Namespace-partitioned OpenID message

use crate::error::{MessageError, Result};
use crate::kvform;
use crate::namespace::{Field, Namespace, OPENID_PREFIX, OPENID1_NS, ProtocolVersion};
use std::collections::BTreeMap;
use tracing::debug;

/// An OpenID protocol message.
///
/// Fields are keyed by `(namespace, key)`. The protocol namespace holds the
/// `openid.*` fields, [`Namespace::Bare`] holds every other query parameter,
/// and extension namespaces are reached through aliases declared with
/// `openid.ns.<alias>`.
///
/// # Example
///
/// ```rust
/// use openid_message::{Field, Message, Namespace, ProtocolVersion};
///
/// let message = Message::from_post_args([
///     ("openid.ns", "http://specs.openid.net/auth/2.0"),
///     ("openid.mode", "id_res"),
///     ("openid.ns.sreg", "http://openid.net/extensions/sreg/1.1"),
///     ("openid.sreg.nickname", "alice"),
///     ("session", "abc"),
/// ])?;
///
/// assert_eq!(message.protocol_version(), Some(ProtocolVersion::OpenId2));
/// assert_eq!(message.get(Field::Mode), Some("id_res"));
/// assert_eq!(message.get_arg(&Namespace::Bare, "session"), Some("abc"));
/// assert_eq!(message.get_aliased_arg("sreg.nickname"), Some("alice"));
/// # Ok::<(), openid_message::MessageError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Protocol namespace URI
    openid_ns: String,
    /// Whether the namespace was implied (OpenID 1 without `openid.ns`)
    implicit_ns: bool,
    /// All fields, keyed by namespace then key
    args: BTreeMap<(Namespace, String), String>,
    /// Extension alias -> namespace URI
    aliases: BTreeMap<String, String>,
}

impl Message {
    /// Create an empty message for the given protocol version
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            openid_ns: version.namespace().to_string(),
            implicit_ns: version == ProtocolVersion::OpenId1,
            args: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Create an empty message with an arbitrary (possibly unknown) namespace URI
    pub fn with_namespace(uri: impl Into<String>) -> Self {
        Self {
            openid_ns: uri.into(),
            implicit_ns: false,
            args: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Parse query or form arguments.
    ///
    /// Keys starting with `openid.` are protocol or extension fields; all
    /// other keys land in [`Namespace::Bare`].
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::AliasConflict`] if an alias is declared twice
    /// with different URIs.
    pub fn from_post_args<I, K, V>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut openid_args = Vec::new();
        let mut bare_args = Vec::new();
        for (key, value) in args {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key.strip_prefix(OPENID_PREFIX) {
                Some(stripped) => openid_args.push((stripped.to_string(), value.to_string())),
                None => bare_args.push((key.to_string(), value.to_string())),
            }
        }

        let mut message = Self::from_openid_args(openid_args)?;
        for (key, value) in bare_args {
            message.args.insert((Namespace::Bare, key), value);
        }
        Ok(message)
    }

    /// Parse protocol arguments given without the `openid.` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::AliasConflict`] if an alias is declared twice
    /// with different URIs.
    pub fn from_openid_args<I, K, V>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let pairs: Vec<(String, String)> = args
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();

        let mut message = match pairs.iter().find(|(k, _)| k == "ns") {
            Some((_, uri)) => Self::with_namespace(uri.clone()),
            None => Self {
                openid_ns: OPENID1_NS.to_string(),
                implicit_ns: true,
                args: BTreeMap::new(),
                aliases: BTreeMap::new(),
            },
        };

        // Alias declarations first, so field placement does not depend on order
        for (key, value) in &pairs {
            if let Some(alias) = key.strip_prefix("ns.") {
                message.declare_alias(alias, value)?;
            }
        }

        for (key, value) in pairs {
            if key == "ns" || key.starts_with("ns.") {
                continue;
            }
            if let Some((alias, rest)) = key.split_once('.')
                && let Some(uri) = message.aliases.get(alias).cloned()
            {
                message
                    .args
                    .insert((Namespace::Uri(uri), rest.to_string()), value);
                continue;
            }
            message.args.insert((Namespace::OpenId, key), value);
        }

        Ok(message)
    }

    /// Parse a key-value form body (direct response)
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid key-value form.
    pub fn from_kv_form(body: &str) -> Result<Self> {
        Self::from_openid_args(kvform::decode(body)?)
    }

    /// Protocol namespace URI of this message
    pub fn namespace(&self) -> &str {
        &self.openid_ns
    }

    /// Protocol version, or `None` if the namespace is not an OpenID one
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        ProtocolVersion::from_namespace(&self.openid_ns)
    }

    /// Bind an extension alias to a namespace URI
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::AliasConflict`] if the alias is already bound
    /// to a different URI.
    pub fn declare_alias(&mut self, alias: &str, uri: &str) -> Result<()> {
        match self.aliases.get(alias) {
            Some(existing) if existing != uri => Err(MessageError::AliasConflict {
                alias: alias.to_string(),
                existing: existing.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                self.aliases.insert(alias.to_string(), uri.to_string());
                Ok(())
            }
        }
    }

    /// Value of a protocol field
    pub fn get(&self, field: Field) -> Option<&str> {
        self.get_arg(&Namespace::OpenId, field.as_str())
    }

    /// Whether a protocol field is present
    pub fn has(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    /// Value of a protocol field that must be present
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MissingField`] if the field is absent.
    pub fn require(&self, field: Field) -> Result<&str> {
        self.require_arg(&Namespace::OpenId, field.as_str())
    }

    /// Set a protocol field
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.set_arg(Namespace::OpenId, field.as_str(), value);
    }

    /// Value of any field by namespace and key
    pub fn get_arg(&self, namespace: &Namespace, key: &str) -> Option<&str> {
        self.args
            .get(&(namespace.clone(), key.to_string()))
            .map(String::as_str)
    }

    /// Value of any field that must be present
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MissingField`] if the field is absent.
    pub fn require_arg(&self, namespace: &Namespace, key: &str) -> Result<&str> {
        self.get_arg(namespace, key)
            .ok_or_else(|| MessageError::MissingField {
                namespace: namespace.clone(),
                key: key.to_string(),
            })
    }

    /// Whether any field is present
    pub fn has_arg(&self, namespace: &Namespace, key: &str) -> bool {
        self.get_arg(namespace, key).is_some()
    }

    /// Set any field.
    ///
    /// Setting a field in an undeclared extension namespace declares a
    /// generated alias for it.
    pub fn set_arg(&mut self, namespace: Namespace, key: &str, value: impl Into<String>) {
        if let Namespace::Uri(uri) = &namespace
            && !self.aliases.values().any(|bound| bound == uri)
        {
            let alias = format!("ext{}", self.aliases.len());
            debug!(alias = %alias, uri = %uri, "Declaring generated namespace alias");
            self.aliases.insert(alias, uri.clone());
        }
        self.args.insert((namespace, key.to_string()), value.into());
    }

    /// All fields of one namespace
    pub fn args(&self, namespace: &Namespace) -> BTreeMap<&str, &str> {
        self.args
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, key), value)| (key.as_str(), value.as_str()))
            .collect()
    }

    /// Resolve a logical field name as it appears in `openid.signed`.
    ///
    /// - `ns` is the protocol namespace URI
    /// - `ns.<alias>` is the URI bound to `alias`
    /// - `<alias>.<key>` is an extension field when `alias` is declared
    /// - anything else is a protocol-namespace field
    pub fn get_aliased_arg(&self, name: &str) -> Option<&str> {
        if name == "ns" {
            return Some(&self.openid_ns);
        }
        if let Some(alias) = name.strip_prefix("ns.") {
            return self.aliases.get(alias).map(String::as_str);
        }
        if let Some((alias, key)) = name.split_once('.')
            && let Some(uri) = self.aliases.get(alias)
        {
            return self.get_arg(&Namespace::Uri(uri.clone()), key);
        }
        self.get_arg(&Namespace::OpenId, name)
    }

    fn alias_for(&self, uri: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(_, bound)| bound.as_str() == uri)
            .map(|(alias, _)| alias.as_str())
    }

    /// Protocol and extension fields keyed without the `openid.` prefix
    pub fn to_openid_args(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if !self.implicit_ns {
            out.insert("ns".to_string(), self.openid_ns.clone());
        }
        for (alias, uri) in &self.aliases {
            out.insert(format!("ns.{alias}"), uri.clone());
        }
        for ((namespace, key), value) in &self.args {
            match namespace {
                Namespace::Bare => {}
                Namespace::OpenId => {
                    out.insert(key.clone(), value.clone());
                }
                Namespace::Uri(uri) => {
                    if let Some(alias) = self.alias_for(uri) {
                        out.insert(format!("{alias}.{key}"), value.clone());
                    }
                }
            }
        }
        out
    }

    /// Every field in query/form argument shape
    pub fn to_post_args(&self) -> BTreeMap<String, String> {
        let mut out: BTreeMap<String, String> = self
            .to_openid_args()
            .into_iter()
            .map(|(key, value)| (format!("{OPENID_PREFIX}{key}"), value))
            .collect();
        for (key, value) in self.args(&Namespace::Bare) {
            out.insert(key.to_string(), value.to_string());
        }
        out
    }

    /// `application/x-www-form-urlencoded` body of [`Message::to_post_args`]
    pub fn to_url_encoded(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.to_post_args())
            .finish()
    }

    /// Key-value form body of [`Message::to_openid_args`]
    ///
    /// # Errors
    ///
    /// Returns an error if a key or value cannot be encoded.
    pub fn to_kv_form(&self) -> Result<String> {
        let args = self.to_openid_args();
        kvform::encode(args.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}
