//! Output ports on workflow nodes.
//!
//! A port is a named outgoing connection point. Trigger, Delay and Business
//! nodes expose a single implicit port named `output`; Decision nodes expose
//! the two named ports `yes` and `no`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The name of an outgoing port on a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(String);

impl PortId {
    /// Name of the implicit single output port.
    pub const OUTPUT: &'static str = "output";
    /// Decision port taken when the condition is truthy.
    pub const YES: &'static str = "yes";
    /// Decision port taken when the condition is falsy.
    pub const NO: &'static str = "no";

    /// Creates a port id from any string.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The implicit output port shared by all single-successor nodes.
    #[must_use]
    pub fn output() -> Self {
        Self::new(Self::OUTPUT)
    }

    /// The Decision `yes` port.
    #[must_use]
    pub fn yes() -> Self {
        Self::new(Self::YES)
    }

    /// The Decision `no` port.
    #[must_use]
    pub fn no() -> Self {
        Self::new(Self::NO)
    }

    /// Selects the Decision port for a condition result.
    #[must_use]
    pub fn for_condition(result: bool) -> Self {
        if result { Self::yes() } else { Self::no() }
    }

    /// Returns the port name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PortId {
    fn default() -> Self {
        Self::output()
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl PartialEq<str> for PortId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
