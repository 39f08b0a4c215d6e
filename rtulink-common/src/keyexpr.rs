use crate::tags::Tag;

/// Default key expression prefix for the hosted address space.
pub const KEY_PREFIX: &str = "rtulink";

/// Object under which every device tag is hosted.
pub const DEVICE_OBJECT: &str = "Dispositivo1";

/// Builder for address-space key expressions.
///
/// Key expressions follow the pattern:
/// `<prefix>/Dispositivo1/<node_name>`
#[derive(Debug, Clone)]
pub struct KeyExprBuilder {
    prefix: String,
}

impl Default for KeyExprBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyExprBuilder {
    pub fn new() -> Self {
        Self::with_prefix(KEY_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key expression for one tag.
    ///
    /// # Example
    /// ```
    /// use rtulink_common::keyexpr::KeyExprBuilder;
    /// use rtulink_common::tags::Tag;
    ///
    /// let key = KeyExprBuilder::new().tag(Tag::Potentiometer);
    /// assert_eq!(key, "rtulink/Dispositivo1/Potenciometro");
    /// ```
    pub fn tag(&self, tag: Tag) -> String {
        format!("{}/{}/{}", self.prefix, DEVICE_OBJECT, tag.node_name())
    }

    /// Wildcard matching every tag of the device; used to browse.
    ///
    /// # Example
    /// ```
    /// use rtulink_common::keyexpr::KeyExprBuilder;
    ///
    /// assert_eq!(KeyExprBuilder::new().device_wildcard(), "rtulink/Dispositivo1/*");
    /// ```
    pub fn device_wildcard(&self) -> String {
        format!("{}/{}/*", self.prefix, DEVICE_OBJECT)
    }

    /// Liveliness token held by the address-space host.
    pub fn alive_key(&self) -> String {
        format!("{}/@/alive", self.prefix)
    }

    /// Host status document.
    pub fn status_key(&self) -> String {
        format!("{}/@/status", self.prefix)
    }
}

/// Parse a tag key expression into its prefix and tag.
///
/// Returns `None` unless the key ends in `Dispositivo1/<known node>`.
pub fn parse_tag_key(key: &str) -> Option<ParsedTagKey<'_>> {
    let (rest, node) = key.rsplit_once('/')?;
    let (prefix, object) = rest.rsplit_once('/')?;
    if object != DEVICE_OBJECT || prefix.is_empty() {
        return None;
    }
    let tag = Tag::from_node_name(node)?;
    Some(ParsedTagKey { prefix, tag })
}

/// Parsed components of a tag key expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTagKey<'a> {
    pub prefix: &'a str,
    pub tag: Tag,
}
