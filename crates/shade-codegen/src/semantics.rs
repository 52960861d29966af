//! Semantic usage tables for both register generations.
//!
//! Legacy targets validate semantic names against the fixed declaration
//! usage set and map a few of them onto dedicated hardware registers. Newer
//! targets accept arbitrary user semantics and reserve the `sv_` namespace
//! for system values.

use shade_types::{Semantic, ShaderStage};

/// Declaration usages understood by legacy targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyUsage {
    Position,
    BlendWeight,
    BlendIndices,
    Normal,
    PointSize,
    Texcoord,
    Tangent,
    Binormal,
    TessFactor,
    PositionT,
    Color,
    Fog,
    Depth,
    Sample,
}

/// Dedicated registers some semantics map onto, bypassing the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinRegister {
    /// Vertex rasterizer position (`oPos`).
    VsPosition,
    /// Vertex fog factor (`oFog`).
    VsFog,
    /// Vertex point size (`oPts`).
    VsPointSize,
    /// Pixel color target `oC<n>`.
    PsColorOut(u32),
    /// Pixel depth output (`oDepth`).
    PsDepthOut,
    /// System-value position input.
    SvPosition,
    /// System-value render target `o<n>`.
    SvTarget(u32),
    /// System-value depth output.
    SvDepth,
    /// Vertex id input.
    SvVertexId,
    /// Instance id input.
    SvInstanceId,
}

/// Parse a legacy semantic into its usage. `None` means the name is invalid
/// for legacy targets.
pub fn legacy_usage_from_semantic(semantic: &Semantic) -> Option<(LegacyUsage, u32)> {
    let usage = match semantic.name.to_ascii_lowercase().as_str() {
        "position" | "sv_position" => LegacyUsage::Position,
        "blendweight" => LegacyUsage::BlendWeight,
        "blendindices" => LegacyUsage::BlendIndices,
        "normal" => LegacyUsage::Normal,
        "psize" => LegacyUsage::PointSize,
        "texcoord" => LegacyUsage::Texcoord,
        "tangent" => LegacyUsage::Tangent,
        "binormal" => LegacyUsage::Binormal,
        "tessfactor" => LegacyUsage::TessFactor,
        "positiont" => LegacyUsage::PositionT,
        "color" | "sv_target" => LegacyUsage::Color,
        "fog" => LegacyUsage::Fog,
        "depth" | "sv_depth" => LegacyUsage::Depth,
        "sample" => LegacyUsage::Sample,
        _ => return None,
    };
    Some((usage, semantic.index))
}

/// The dedicated register a legacy semantic maps onto, if any. Everything
/// else goes through the auto-assigned `v#`/`o#` counters.
pub fn legacy_register_from_semantic(
    stage: ShaderStage,
    output: bool,
    semantic: &Semantic,
) -> Option<BuiltinRegister> {
    let (usage, index) = legacy_usage_from_semantic(semantic)?;
    match (stage, output, usage) {
        (ShaderStage::Vertex, true, LegacyUsage::Position | LegacyUsage::PositionT) => {
            Some(BuiltinRegister::VsPosition)
        }
        (ShaderStage::Vertex, true, LegacyUsage::Fog) => Some(BuiltinRegister::VsFog),
        (ShaderStage::Vertex, true, LegacyUsage::PointSize) => Some(BuiltinRegister::VsPointSize),
        (ShaderStage::Pixel, true, LegacyUsage::Color) => Some(BuiltinRegister::PsColorOut(index)),
        (ShaderStage::Pixel, true, LegacyUsage::Depth) => Some(BuiltinRegister::PsDepthOut),
        _ => None,
    }
}

/// Validate a semantic for the newer targets. System-value names must be
/// known; user semantics pass through. Returns the builtin register, if the
/// semantic has one, and whether the semantic index selects the register.
pub fn sm4_register_from_semantic(
    stage: ShaderStage,
    output: bool,
    semantic: &Semantic,
) -> Result<Option<(BuiltinRegister, bool)>, ()> {
    let name = semantic.name.to_ascii_lowercase();
    if !name.starts_with("sv_") {
        return Ok(None);
    }
    match (stage, output, name.as_str()) {
        (ShaderStage::Pixel, true, "sv_target" | "sv_color") => {
            Ok(Some((BuiltinRegister::SvTarget(semantic.index), true)))
        }
        (ShaderStage::Pixel, true, "sv_depth") => Ok(Some((BuiltinRegister::SvDepth, false))),
        (ShaderStage::Pixel, false, "sv_position") => {
            Ok(Some((BuiltinRegister::SvPosition, false)))
        }
        // Vertex-shader position output travels through a regular `o#`.
        (ShaderStage::Vertex, true, "sv_position") => Ok(None),
        (ShaderStage::Vertex, false, "sv_vertexid") => {
            Ok(Some((BuiltinRegister::SvVertexId, false)))
        }
        (ShaderStage::Vertex, false, "sv_instanceid") => {
            Ok(Some((BuiltinRegister::SvInstanceId, false)))
        }
        (_, _, "sv_position" | "sv_target" | "sv_depth") => Ok(None),
        _ => Err(()),
    }
}
