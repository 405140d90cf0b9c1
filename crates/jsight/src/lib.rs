#![doc = include_str!("../../../README.md")]

mod analyzer;
mod annotate;
pub mod ast;
mod call;
mod context;
mod expand;
mod jsdoc;
mod lexer;
mod parse;
mod raised;
mod render;
mod value;

pub use crate::{
    analyzer::{Analysis, Analyzer},
    call::MAX_CALL_DEPTH,
    context::{Annotation, CallTally, ConditionalCalls, Context, ContextId, ContextKind, Contexts, Scope},
    parse::ParseError,
    raised::{ExcKind, Raised},
    render::{
        ClassReport, ConditionalReport, FunctionReport, InstantiatesReport, PropertyReport, RaisedReport, Report,
        VariableReport,
    },
    value::{Payload, Value, ValueItem, ValueKind},
};
