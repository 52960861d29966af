//! Reference emitters and the public compile entry point.
//!
//! The middle end treats emitters as opaque collaborators behind
//! [`shade_codegen::Backend`]; this crate provides the reference set — the
//! legacy token-stream writer, the chunked container writer, and the
//! experimental GLSL text emitter — plus [`compile_shader`], which looks the
//! profile up and picks an emitter by major version.

pub mod d3dbc;
pub mod dxbc;
pub mod glsl;
pub mod regs;

pub use d3dbc::LegacyBackend;
pub use dxbc::ModernBackend;
pub use glsl::GlslBackend;

use shade_codegen::{Backend, CompileError, Frontend, driver};
use shade_ir::Context;
use shade_types::{CompileOptions, Diagnostic, find_profile};

/// A successful compilation: the byte blob plus any non-fatal diagnostics.
#[derive(Debug)]
pub struct ShaderCode {
    pub bytes: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, thiserror::Error)]
pub enum CompileShaderError {
    #[error("unknown profile '{0}'")]
    UnknownProfile(String),
    #[error("frontend failed: {code}")]
    Frontend {
        code: shade_types::ErrorCode,
        diagnostics: Vec<Diagnostic>,
    },
    #[error(transparent)]
    Compile(#[from] CompileFailure),
}

#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct CompileFailure {
    pub source: CompileError,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile `source` for `profile_name`, delegating parsing to `frontend`
/// and choosing the emitter by profile version (below 4: legacy token
/// stream; 4 and up: container). The entry point defaults to `main`.
pub fn compile_shader(
    source: &str,
    profile_name: &str,
    entry_point: Option<&str>,
    options: CompileOptions,
    frontend: &mut dyn Frontend,
) -> Result<ShaderCode, CompileShaderError> {
    let Some(profile) = find_profile(profile_name) else {
        return Err(CompileShaderError::UnknownProfile(profile_name.to_string()));
    };
    let entry_point = entry_point.unwrap_or("main");
    tracing::debug!(
        target: "emit.compile",
        profile = profile.name,
        entry_point,
        "compiling shader"
    );

    let mut ctx = Context::new(profile, options);
    if let Err(code) = frontend.parse(&mut ctx, source, entry_point) {
        return Err(CompileShaderError::Frontend {
            code,
            diagnostics: ctx.diags.into_diagnostics(),
        });
    }

    let backend: Box<dyn Backend> = if profile.is_legacy() {
        Box::new(LegacyBackend)
    } else {
        Box::new(ModernBackend)
    };

    match driver::compile_with_backend(&mut ctx, entry_point, backend.as_ref()) {
        Ok(bytes) => Ok(ShaderCode {
            bytes,
            diagnostics: ctx.diags.into_diagnostics(),
        }),
        Err(source) => Err(CompileShaderError::Compile(CompileFailure {
            source,
            diagnostics: ctx.diags.into_diagnostics(),
        })),
    }
}
