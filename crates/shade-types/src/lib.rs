//! Shared leaf types for the shadec compiler core.
//!
//! This crate carries everything the rest of the pipeline agrees on before an
//! IR exists: the shader type system (scalar/vector/matrix/array/struct/object
//! classes with register sizing and conversion predicates), the target profile
//! catalog, compile options, and the diagnostic types that every later stage
//! reports through.
//!
//! Invariants:
//! * `TypeId`s are only meaningful against the `TypeTable` that produced them;
//!   one table exists per compilation context.
//! * Type equality is structural, never identity-based.
//! * Diagnostics never abort; the sink latches the first error code and the
//!   pipeline checks the latch between stages.

pub mod diag;
pub mod options;
pub mod profile;
pub mod ty;

pub use diag::{Diagnostic, DiagnosticSink, ErrorCode, Severity, SourceLocation};
pub use options::{CompileFlags, CompileOptions};
pub use profile::{ProfileInfo, ShaderStage, all_profiles, find_profile};
pub use ty::{
    BaseType, CommonTypeError, Modifiers, SamplerDim, StructField, Type, TypeClass, TypeExtra,
    TypeId, TypeTable,
};

/// A semantic annotation binding a shader input/output to an external slot,
/// e.g. `COLOR1` is `{ name: "color", index: 1 }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Semantic {
    pub name: String,
    pub index: u32,
}

impl Semantic {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl std::fmt::Display for Semantic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.index)
    }
}

/// A user register reservation (`register(c7)`, `register(b2)`, ...): a
/// register-file letter plus an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegReservation {
    pub kind: char,
    pub index: u32,
}

impl RegReservation {
    pub fn new(kind: char, index: u32) -> Self {
        Self { kind, index }
    }
}

impl std::fmt::Display for RegReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_display_appends_index() {
        assert_eq!(Semantic::new("texcoord", 3).to_string(), "texcoord3");
    }

    #[test]
    fn reservation_display() {
        assert_eq!(RegReservation::new('b', 2).to_string(), "b2");
    }
}
