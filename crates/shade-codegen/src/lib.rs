//! The shadec middle end.
//!
//! Takes a typed IR built by a parser frontend and drives it to a fully
//! register-annotated program: semantic lowering splits the
//! externally-visible variables, a fixed-point sequence of rewrites
//! simplifies the body, liveness assigns intervals, and the allocators map
//! everything onto target registers. The annotated program plus its tables
//! are handed to a [`backend::Backend`] chosen by the caller.

pub mod alloc;
pub mod backend;
pub mod copyprop;
pub mod driver;
pub mod fold;
pub mod liveness;
pub mod lower;
pub mod semantics;
pub mod xform;

pub use backend::{Backend, BackendInput, EmitError};
pub use driver::{CompileError, Frontend, compile_function, compile_with_backend, run_passes};
