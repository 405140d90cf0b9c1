use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::value::Value;

/// Exception names the analyzer can attribute to analyzed code.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and
/// `Into<&'static str>` implementations; the string form matches the
/// variant name exactly (`ReferenceError` -> "ReferenceError").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
pub enum ExcKind {
    /// Use of a name with no binding in any enclosing scope. The only
    /// exception the evaluator itself generates (unknown call receivers).
    ReferenceError,
}

/// A potential runtime exception observed during evaluation, together with
/// the path condition that reaches it.
///
/// Raised records are data in the value lattice, not control flow: binary
/// operations propagate them, and `add_raised` bubbles them up the context
/// graph to the program root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raised {
    pub exception: ExcKind,
    pub message: String,
    /// Condition under which the exception can occur; `None` means it
    /// occurs whenever the enclosing code runs.
    pub condition: Option<Box<Value>>,
}

impl Raised {
    pub fn new(exception: ExcKind, message: impl Into<String>, condition: Option<&Value>) -> Self {
        Self {
            exception,
            message: message.into(),
            condition: condition.map(|value| Box::new(value.clone())),
        }
    }
}
