//! Typed payloads for the `initialize` handshake and the tool-call methods.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Name and version of a client or server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Product name
    pub name: String,
    /// Product version
    pub version: String,
}

impl Implementation {
    /// Create a new implementation descriptor
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// One optional feature advertised during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capability {
    /// Feature name (`tools`, `resources`, `roots`, ...)
    pub name: String,
    /// Whether the feature supports subscriptions
    pub subscribe: bool,
    /// Whether the peer emits list-changed notifications for it
    pub list_changed: bool,
}

impl Capability {
    /// A capability with both flags cleared.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the `subscribe` flag.
    #[must_use]
    pub fn with_subscribe(mut self, subscribe: bool) -> Self {
        self.subscribe = subscribe;
        self
    }

    /// Set the `listChanged` flag.
    #[must_use]
    pub fn with_list_changed(mut self, list_changed: bool) -> Self {
        self.list_changed = list_changed;
        self
    }
}

/// Ordered collection of capabilities with unique names.
///
/// On the wire this is a JSON object keyed by capability name:
///
/// ```json
/// {"tools": {"subscribe": false, "listChanged": true}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    entries: Vec<Capability>,
}

impl CapabilitySet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`CapabilitySet::insert`].
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.insert(capability);
        self
    }

    /// Insert a capability, replacing (in place) any existing entry with the same name.
    ///
    /// Returns the replaced entry.
    pub fn insert(&mut self, capability: Capability) -> Option<Capability> {
        match self.entries.iter_mut().find(|c| c.name == capability.name) {
            Some(existing) => Some(std::mem::replace(existing, capability)),
            None => {
                self.entries.push(capability);
                None
            }
        }
    }

    /// Remove a capability by name.
    pub fn remove(&mut self, name: &str) -> Option<Capability> {
        let index = self.entries.iter().position(|c| c.name == name)?;
        Some(self.entries.remove(index))
    }

    /// Look up a capability by name.
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.iter().find(|c| c.name == name)
    }

    /// Returns `true` if a capability with this name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Capability> {
        self.entries.iter()
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Self::new();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

impl<'a> IntoIterator for &'a CapabilitySet {
    type Item = &'a Capability;
    type IntoIter = std::slice::Iter<'a, Capability>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CapabilityFlags {
    subscribe: bool,
    list_changed: bool,
}

impl Serialize for CapabilitySet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for capability in &self.entries {
            map.serialize_entry(
                &capability.name,
                &CapabilityFlags {
                    subscribe: capability.subscribe,
                    list_changed: capability.list_changed,
                },
            )?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let object = Map::<String, Value>::deserialize(deserializer)?;
        let mut set = Self::new();
        for (name, value) in object {
            // peers may advertise a capability as `{}` or with extra keys; only the two flags matter
            let flag = |key: &str| -> Result<bool, D::Error> {
                match value.get(key) {
                    None | Some(Value::Null) => Ok(false),
                    Some(Value::Bool(b)) => Ok(*b),
                    Some(other) => Err(D::Error::custom(format!(
                        "capability `{}`: `{}` must be a boolean, got {}",
                        name, key, other
                    ))),
                }
            };
            let capability = Capability {
                subscribe: flag("subscribe")?,
                list_changed: flag("listChanged")?,
                name: name.clone(),
            };
            set.insert(capability);
        }
        Ok(set)
    }
}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol revision the client speaks
    pub protocol_version: String,
    /// Client capability set
    pub capabilities: CapabilitySet,
    /// Client identity
    pub client_info: Implementation,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol revision
    pub protocol_version: String,
    /// Server capability set
    #[serde(default)]
    pub capabilities: CapabilitySet,
    /// Server identity
    pub server_info: Implementation,
    /// Optional usage hints from the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// A tool exposed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique tool name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the arguments object
    #[serde(default)]
    pub input_schema: Value,
}

/// Parameters of `tools/list`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListToolsParams {
    /// Pagination cursor from a previous page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// Tools on this page
    #[serde(default)]
    pub tools: Vec<Tool>,
    /// Cursor for the next page, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool to invoke
    pub name: String,
    /// Arguments object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Result of `tools/call`. Content blocks are passed through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content blocks produced by the tool
    #[serde(default)]
    pub content: Vec<Value>,
    /// Set when the tool itself reported failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Returns `true` if the tool reported an error.
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}
