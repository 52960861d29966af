//! Compile options passed alongside the source text.

use crate::ty::Modifiers;
use bitflags::bitflags;

bitflags! {
    /// Option mask accepted by the public compile entry point.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompileFlags: u32 {
        const PACK_MATRIX_ROW_MAJOR = 1 << 0;
        const PACK_MATRIX_COLUMN_MAJOR = 1 << 1;
        const BACKWARD_COMPATIBILITY = 1 << 2;
        const UNBOUNDED_DESCRIPTOR_ARRAYS = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub flags: CompileFlags,
}

impl CompileOptions {
    pub fn new(flags: CompileFlags) -> Self {
        Self { flags }
    }

    /// Matrix majority applied to declarations that don't specify one.
    /// Column-major is the language default.
    pub fn default_majority(&self) -> Modifiers {
        if self.flags.contains(CompileFlags::PACK_MATRIX_ROW_MAJOR) {
            Modifiers::ROW_MAJOR
        } else {
            Modifiers::COLUMN_MAJOR
        }
    }
}
