use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    ast::{BinaryOp, UnaryOp},
    context::{ContextId, Contexts},
    raised::Raised,
};

/// The kind of one abstract possibility.
///
/// Kind and payload are deliberately decoupled: binary operations pick the
/// result kind from the operand kinds first and compute the payload second,
/// so a comparison like `1 < 2` keeps the left operand's `int` kind while
/// carrying a boolean payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Float,
    Str,
    Bool,
    /// Type unknown, value unknown (e.g. an unbound parameter).
    Variant,
    /// An abstract class instance; the payload names the `Reference`
    /// context that records per-instance state.
    Reference,
    /// A potential runtime exception flowing through expressions.
    Raised,
    /// A number known only to lie in a range, from `@returns {random}`.
    Random,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Bool => "bool",
            Self::Variant => "variant",
            Self::Reference => "reference",
            Self::Raised => "raised",
            Self::Random => "random",
        })
    }
}

/// The payload of one abstract possibility: an exact scalar, a two-bound
/// range, or one of the structured payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Int(i64),
    /// Inclusive integer bounds, kept in the order they were computed.
    IntSpan(i64, i64),
    Float(f64),
    FloatSpan(f64, f64),
    Str(String),
    Bool(bool),
    /// The unknown payload. Falsy: nothing is known to be there.
    Variant,
    Reference(ContextId),
    Raised(Raised),
}

impl Payload {
    /// Truthiness mirrors the source language: zero, the empty string, and
    /// the unknown payload are falsy; ranges are always truthy (some value
    /// in them is).
    pub fn truthy(&self) -> bool {
        match self {
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Bool(b) => *b,
            Self::Variant => false,
            Self::IntSpan(..) | Self::FloatSpan(..) | Self::Reference(_) | Self::Raised(_) => true,
        }
    }

    pub fn is_span(&self) -> bool {
        matches!(self, Self::IntSpan(..) | Self::FloatSpan(..))
    }

    /// The two bounds of a span payload as scalar payloads.
    fn span_bounds(&self) -> Option<(Self, Self)> {
        match self {
            Self::IntSpan(a, b) => Some((Self::Int(*a), Self::Int(*b))),
            Self::FloatSpan(a, b) => Some((Self::Float(*a), Self::Float(*b))),
            _ => None,
        }
    }

    fn as_num(&self) -> Option<Num> {
        match self {
            Self::Int(n) => Some(Num::Int(*n)),
            Self::Bool(b) => Some(Num::Int(i64::from(*b))),
            Self::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::IntSpan(a, b) => write!(f, "{a}..{b}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::FloatSpan(a, b) => write!(f, "{a}..{b}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Variant => f.write_str("?"),
            Self::Reference(id) => write!(f, "@{}", id.index()),
            Self::Raised(raised) => write!(f, "{}: {}", raised.exception, raised.message),
        }
    }
}

/// One abstract possibility: a kind, a payload, and the path condition
/// under which the possibility is reachable (`None` = unconditional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueItem {
    pub kind: ValueKind,
    pub payload: Payload,
    pub condition: Option<Box<Value>>,
}

impl ValueItem {
    pub fn new(kind: ValueKind, payload: Payload, condition: Option<&Value>) -> Self {
        Self {
            kind,
            payload,
            condition: condition.map(|c| Box::new(c.clone())),
        }
    }
}

impl fmt::Display for ValueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Variant => write!(f, "{}", self.kind)?,
            payload => write!(f, "{}({payload})", self.kind)?,
        }
        if let Some(condition) = &self.condition {
            write!(f, " when {condition}")?;
        }
        Ok(())
    }
}

/// An abstract value: the disjunction of every possibility an expression
/// may produce, each tagged with the condition that reaches it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Value {
    items: SmallVec<[ValueItem; 1]>,
}

impl Value {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(kind: ValueKind, payload: Payload, condition: Option<&Value>) -> Self {
        let mut value = Self::empty();
        value.items.push(ValueItem::new(kind, payload, condition));
        value
    }

    /// The unconditional unknown.
    pub fn variant() -> Self {
        Self::single(ValueKind::Variant, Payload::Variant, None)
    }

    pub fn items(&self) -> &[ValueItem] {
        &self.items
    }

    pub fn push(&mut self, item: ValueItem) {
        self.items.push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True iff every possibility is truthy and none is an exception.
    pub fn is_true(&self) -> bool {
        self.items
            .iter()
            .all(|item| item.kind != ValueKind::Raised && item.payload.truthy())
    }

    /// True iff every possibility is falsy or an exception.
    pub fn is_false(&self) -> bool {
        self.items
            .iter()
            .all(|item| item.kind == ValueKind::Raised || !item.payload.truthy())
    }

    pub fn has_raised(&self) -> bool {
        self.items.iter().any(|item| item.kind == ValueKind::Raised)
    }

    /// The unique kinds present, in first-seen order, with references
    /// rendered as `@ClassName`.
    pub fn kinds(&self, contexts: &Contexts) -> Vec<String> {
        let mut kinds = Vec::new();
        for item in &self.items {
            let name = match (&item.kind, &item.payload) {
                (ValueKind::Reference, Payload::Reference(id)) => {
                    format!("@{}", contexts.reference_class_name(*id))
                }
                (kind, _) => kind.to_string(),
            };
            if !kinds.contains(&name) {
                kinds.push(name);
            }
        }
        kinds
    }

    /// Concatenates the possibilities of `values` into one Value, in order.
    ///
    /// With `halt_if_true`, the scan stops after the first item whose
    /// condition is absent or always true: an unconditional return
    /// dominates everything declared after it. The result is then passed
    /// through [`Value::influence`] with the owner's annotated return type.
    pub fn combine(ret_type: Option<&str>, values: &[Self], halt_if_true: bool) -> Self {
        let mut ret = Self::empty();
        'scan: for value in values {
            for item in &value.items {
                let halts = item.condition.as_deref().is_none_or(Self::is_true);
                ret.items.push(item.clone());
                if halt_if_true && halts {
                    break 'scan;
                }
            }
        }
        Self::influence(ret_type, ret)
    }

    /// Pushes the value toward an annotated type.
    ///
    /// Only `random` has influence semantics: every numeric scalar becomes
    /// a `random` in `[0.0, 1.0]`, and numeric ranges keep their bounds but
    /// take the `random` kind. Other annotations pass the value through.
    pub fn influence(new_type: Option<&str>, value: Self) -> Self {
        if new_type != Some("random") {
            return value;
        }
        let mut ret = Self::empty();
        for item in value.items {
            let item = match item.payload {
                Payload::Int(_) | Payload::Float(_) => ValueItem {
                    kind: ValueKind::Random,
                    payload: Payload::FloatSpan(0.0, 1.0),
                    condition: item.condition,
                },
                Payload::IntSpan(..) | Payload::FloatSpan(..) => ValueItem {
                    kind: ValueKind::Random,
                    ..item
                },
                _ => item,
            };
            ret.items.push(item);
        }
        ret
    }

    /// Like [`Value::influence`] but only relabels kinds; payloads are
    /// never widened.
    pub fn coerce(new_type: Option<&str>, value: Self) -> Self {
        if new_type != Some("random") {
            return value;
        }
        let mut ret = Self::empty();
        for item in value.items {
            ret.items.push(ValueItem {
                kind: ValueKind::Random,
                ..item
            });
        }
        ret
    }

    /// Applies a binary operator across every pair of possibilities.
    ///
    /// Result kind per pair: a raised side wins; otherwise a `variant`
    /// left takes the right kind, any float makes float, a `bool` left
    /// takes a non-bool right's kind, and the left kind wins the rest.
    /// The result condition is the left item's.
    pub fn binary(&self, rhs: &Self, op: BinaryOp) -> Self {
        let mut out = Self::empty();
        for l in &self.items {
            for r in &rhs.items {
                out.items.push(binary_item(l, r, op));
            }
        }
        out
    }

    pub fn unary(&self, op: UnaryOp) -> Self {
        let mut out = Self::empty();
        for item in &self.items {
            out.items.push(ValueItem {
                kind: item.kind,
                payload: unary_payload(op, &item.payload),
                condition: item.condition.clone(),
            });
        }
        out
    }

    /// The conjunction used for condition stacking: `a.and(b)` is
    /// `binary(And)`, whose payload keeps `b` where `a` is truthy and `a`
    /// where it is not.
    pub fn and(&self, rhs: &Self) -> Self {
        self.binary(rhs, BinaryOp::And)
    }

    /// A stable string identity, used to key condition-tallied maps (two
    /// conditions are the same bucket iff they render the same).
    pub fn fingerprint(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{item}")?;
        }
        f.write_str("]")
    }
}

fn binary_item(l: &ValueItem, r: &ValueItem, op: BinaryOp) -> ValueItem {
    // A raised operand propagates: the result is that exception, reachable
    // under the left item's condition.
    if l.kind == ValueKind::Raised {
        return ValueItem {
            kind: ValueKind::Raised,
            payload: l.payload.clone(),
            condition: l.condition.clone(),
        };
    }
    if r.kind == ValueKind::Raised {
        return ValueItem {
            kind: ValueKind::Raised,
            payload: r.payload.clone(),
            condition: l.condition.clone(),
        };
    }

    let kind = if l.kind == ValueKind::Variant {
        r.kind
    } else if l.kind == ValueKind::Float || r.kind == ValueKind::Float {
        ValueKind::Float
    } else if l.kind == ValueKind::Bool && r.kind != ValueKind::Bool {
        r.kind
    } else {
        l.kind
    };

    let lp = coerce_payload(&l.payload, l.kind, kind);
    let rp = coerce_payload(&r.payload, r.kind, kind);
    let payload = if kind == ValueKind::Variant {
        lp
    } else {
        apply(op, &lp, &rp)
    };
    ValueItem {
        kind,
        payload,
        condition: l.condition.clone(),
    }
}

/// Converts an operand's payload toward the selected result kind. Only the
/// numeric kinds convert; a `variant` payload becomes that kind's zero.
fn coerce_payload(payload: &Payload, from: ValueKind, to: ValueKind) -> Payload {
    if from == to {
        return payload.clone();
    }
    match to {
        ValueKind::Float => match payload {
            Payload::Variant => Payload::Float(0.0),
            Payload::Int(n) => Payload::Float(*n as f64),
            Payload::Bool(b) => Payload::Float(f64::from(u8::from(*b))),
            Payload::IntSpan(a, b) => Payload::FloatSpan(*a as f64, *b as f64),
            other => other.clone(),
        },
        ValueKind::Int => match payload {
            Payload::Variant => Payload::Int(0),
            Payload::Float(f) => Payload::Int(*f as i64),
            Payload::Bool(b) => Payload::Int(i64::from(*b)),
            Payload::FloatSpan(a, b) => Payload::IntSpan(*a as i64, *b as i64),
            other => other.clone(),
        },
        _ => payload.clone(),
    }
}

/// Applies an operator over payloads, mapping over range bounds where one
/// side is a span. A span on both sides keeps the left span unchanged.
fn apply(op: BinaryOp, lp: &Payload, rp: &Payload) -> Payload {
    match (lp.span_bounds(), rp.span_bounds()) {
        (Some(_), Some(_)) => lp.clone(),
        (Some((a, b)), None) => join_bounds(scalar_apply(op, &a, rp), scalar_apply(op, &b, rp)),
        (None, Some((a, b))) => join_bounds(scalar_apply(op, lp, &a), scalar_apply(op, lp, &b)),
        (None, None) => scalar_apply(op, lp, rp),
    }
}

/// Rejoins per-bound results into a span, collapsing when the bounds
/// agree. Bound pairs no span can hold degrade to the unknown payload.
fn join_bounds(a: Payload, b: Payload) -> Payload {
    if a == b {
        return a;
    }
    match (a, b) {
        (Payload::Int(a), Payload::Int(b)) => Payload::IntSpan(a, b),
        (Payload::Float(a), Payload::Float(b)) => Payload::FloatSpan(a, b),
        (Payload::Int(a), Payload::Float(b)) => Payload::FloatSpan(a as f64, b),
        (Payload::Float(a), Payload::Int(b)) => Payload::FloatSpan(a, b as f64),
        (Payload::Bool(a), Payload::Bool(b)) => Payload::IntSpan(i64::from(a), i64::from(b)),
        _ => Payload::Variant,
    }
}

fn scalar_apply(op: BinaryOp, lp: &Payload, rp: &Payload) -> Payload {
    match op {
        BinaryOp::And => {
            if lp.truthy() {
                rp.clone()
            } else {
                lp.clone()
            }
        }
        BinaryOp::Or => {
            if lp.truthy() {
                lp.clone()
            } else {
                rp.clone()
            }
        }
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne => {
            compare(op, lp, rp)
        }
        BinaryOp::Add => match (lp, rp) {
            (Payload::Str(a), Payload::Str(b)) => {
                let mut s = a.clone();
                s.push_str(b);
                Payload::Str(s)
            }
            _ => numeric_apply(op, lp, rp),
        },
        _ => numeric_apply(op, lp, rp),
    }
}

fn compare(op: BinaryOp, lp: &Payload, rp: &Payload) -> Payload {
    use std::cmp::Ordering;

    let ordering = match (lp, rp) {
        (Payload::Str(a), Payload::Str(b)) => Some(a.cmp(b)),
        _ => match (lp.as_num(), rp.as_num()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Some(a.cmp(&b)),
            (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
            _ => None,
        },
    };
    match (ordering, op) {
        (Some(ord), BinaryOp::Lt) => Payload::Bool(ord == Ordering::Less),
        (Some(ord), BinaryOp::Gt) => Payload::Bool(ord == Ordering::Greater),
        (Some(ord), BinaryOp::Le) => Payload::Bool(ord != Ordering::Greater),
        (Some(ord), BinaryOp::Ge) => Payload::Bool(ord != Ordering::Less),
        (Some(ord), BinaryOp::Eq) => Payload::Bool(ord == Ordering::Equal),
        (Some(ord), BinaryOp::Ne) => Payload::Bool(ord != Ordering::Equal),
        // Unrelated types are never equal; their ordering is unknowable.
        (None, BinaryOp::Eq) => Payload::Bool(false),
        (None, BinaryOp::Ne) => Payload::Bool(true),
        _ => Payload::Variant,
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(f) => f,
        }
    }
}

/// Integer arithmetic wraps (two's complement); float follows IEEE-754.
/// Anything the operator cannot accept yields the unknown payload.
fn numeric_apply(op: BinaryOp, lp: &Payload, rp: &Payload) -> Payload {
    let (Some(l), Some(r)) = (lp.as_num(), rp.as_num()) else {
        return Payload::Variant;
    };
    if let (Num::Int(a), Num::Int(b)) = (l, r) {
        return match op {
            BinaryOp::Add => Payload::Int(a.wrapping_add(b)),
            BinaryOp::Sub => Payload::Int(a.wrapping_sub(b)),
            BinaryOp::Mul => Payload::Int(a.wrapping_mul(b)),
            // True division always measures in floats.
            BinaryOp::Div => {
                if b == 0 {
                    Payload::Variant
                } else {
                    Payload::Float(a as f64 / b as f64)
                }
            }
            BinaryOp::FloorDiv => {
                if b == 0 {
                    Payload::Variant
                } else {
                    Payload::Int(floor_div(a, b))
                }
            }
            BinaryOp::Mod => {
                if b == 0 {
                    Payload::Variant
                } else {
                    Payload::Int(a.wrapping_sub(floor_div(a, b).wrapping_mul(b)))
                }
            }
            BinaryOp::Pow => int_pow(a, b),
            BinaryOp::Shl => {
                if (0..64).contains(&b) {
                    Payload::Int(a.wrapping_shl(b as u32))
                } else {
                    Payload::Variant
                }
            }
            BinaryOp::Shr => {
                if (0..64).contains(&b) {
                    Payload::Int(a.wrapping_shr(b as u32))
                } else {
                    Payload::Variant
                }
            }
            BinaryOp::Xor => Payload::Int(a ^ b),
            _ => Payload::Variant,
        };
    }

    let (a, b) = (l.as_f64(), r.as_f64());
    match op {
        BinaryOp::Add => Payload::Float(a + b),
        BinaryOp::Sub => Payload::Float(a - b),
        BinaryOp::Mul => Payload::Float(a * b),
        BinaryOp::Div => Payload::Float(a / b),
        BinaryOp::FloorDiv => Payload::Float((a / b).floor()),
        BinaryOp::Mod => Payload::Float(a - (a / b).floor() * b),
        BinaryOp::Pow => Payload::Float(a.powf(b)),
        _ => Payload::Variant,
    }
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a % b != 0 && (a < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

fn int_pow(a: i64, b: i64) -> Payload {
    if b < 0 {
        return Payload::Float((a as f64).powf(b as f64));
    }
    match u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp)) {
        Some(n) => Payload::Int(n),
        None => Payload::Float((a as f64).powf(b as f64)),
    }
}

fn unary_payload(op: UnaryOp, payload: &Payload) -> Payload {
    match op {
        UnaryOp::Neg => match payload {
            Payload::Int(n) => Payload::Int(n.wrapping_neg()),
            Payload::Float(f) => Payload::Float(-f),
            Payload::Bool(b) => Payload::Int(-i64::from(*b)),
            Payload::IntSpan(a, b) => Payload::IntSpan(a.wrapping_neg(), b.wrapping_neg()),
            Payload::FloatSpan(a, b) => Payload::FloatSpan(-a, -b),
            _ => Payload::Variant,
        },
        UnaryOp::Pos => match payload {
            Payload::Int(_)
            | Payload::Float(_)
            | Payload::Bool(_)
            | Payload::IntSpan(..)
            | Payload::FloatSpan(..) => payload.clone(),
            _ => Payload::Variant,
        },
        UnaryOp::BitNot => match payload {
            Payload::Int(n) => Payload::Int(!n),
            Payload::Bool(b) => Payload::Int(!i64::from(*b)),
            Payload::IntSpan(a, b) => Payload::IntSpan(!a, !b),
            _ => Payload::Variant,
        },
        UnaryOp::Not => Payload::Bool(!payload.truthy()),
    }
}
