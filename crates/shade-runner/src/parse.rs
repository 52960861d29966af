//! Line-oriented parser for shader-test directive files.

use crate::*;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("line {line}: unknown section '{header}'")]
    UnknownSection { line: usize, header: String },
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
}

fn malformed(line: usize, message: impl Into<String>) -> RunnerError {
    RunnerError::Malformed {
        line,
        message: message.into(),
    }
}

/// Strip a leading token (plus following whitespace); `None` when the line
/// doesn't start with it.
fn match_string<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(token)?;
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) && !token.ends_with(':') {
        return None;
    }
    Some(rest.trim_start())
}

fn parse_u32(line: usize, token: impl AsRef<str>) -> Result<u32, RunnerError> {
    let token = token.as_ref();
    token
        .parse()
        .map_err(|_| malformed(line, format!("malformed integer '{token}'")))
}

fn parse_f32(line: usize, token: impl AsRef<str>) -> Result<f32, RunnerError> {
    let token = token.as_ref();
    token
        .parse()
        .map_err(|_| malformed(line, format!("malformed float '{token}'")))
}

fn parse_f64(line: usize, token: impl AsRef<str>) -> Result<f64, RunnerError> {
    let token = token.as_ref();
    token
        .parse()
        .map_err(|_| malformed(line, format!("malformed number '{token}'")))
}

/// Tokenize, treating parentheses and commas as whitespace so `(1, 2, 3)`
/// and `1 2 3` read the same.
fn tuple_tokens(text: &str) -> Vec<&str> {
    text.split(['(', ')', ',', ' ', '\t'])
        .filter(|t| !t.is_empty())
        .collect()
}

fn parse_model(line: usize, token: &str) -> Result<ShaderModel, RunnerError> {
    let mut parts = token.splitn(2, '.');
    let major = parse_u32(line, parts.next().unwrap_or(""))?;
    let minor = match parts.next() {
        Some(minor) => parse_u32(line, minor)?,
        None => 0,
    };
    Ok(ShaderModel::new(major, minor))
}

fn parse_comparison(line: usize, text: &str) -> Result<ComparisonFunc, RunnerError> {
    let normalized: String = text
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect();
    Ok(match normalized.as_str() {
        "never" => ComparisonFunc::Never,
        "less" => ComparisonFunc::Less,
        "equal" => ComparisonFunc::Equal,
        "lessequal" => ComparisonFunc::LessEqual,
        "greater" => ComparisonFunc::Greater,
        "notequal" => ComparisonFunc::NotEqual,
        "greaterequal" => ComparisonFunc::GreaterEqual,
        "always" => ComparisonFunc::Always,
        _ => return Err(malformed(line, format!("unknown comparison func '{text}'"))),
    })
}

fn parse_address_mode(line: usize, token: impl AsRef<str>) -> Result<AddressMode, RunnerError> {
    let token = token.as_ref();
    Ok(match token {
        "border" => AddressMode::Border,
        "clamp" => AddressMode::Clamp,
        "mirror_once" => AddressMode::MirrorOnce,
        "mirror" => AddressMode::Mirror,
        "wrap" => AddressMode::Wrap,
        _ => return Err(malformed(line, format!("unknown address mode '{token}'"))),
    })
}

/// One guard expression between parentheses: `sm>=4`, `sm<6`, or a
/// `|`-alternation of backend names.
fn parse_guard(line: usize, text: &str) -> Result<Vec<Guard>, RunnerError> {
    let mut guards = Vec::new();
    let mut backends = Vec::new();
    for term in text.split('|').map(str::trim) {
        if let Some(rest) = term.strip_prefix("sm>=") {
            guards.push(Guard::MinModel(parse_model(line, rest.trim())?));
        } else if let Some(rest) = term.strip_prefix("sm<") {
            guards.push(Guard::MaxModelExclusive(parse_model(line, rest.trim())?));
        } else if term.chars().all(|c| c.is_ascii_alphanumeric()) && !term.is_empty() {
            backends.push(term.to_string());
        } else {
            return Err(malformed(line, format!("invalid qualifier argument '{term}'")));
        }
    }
    if !backends.is_empty() {
        guards.push(Guard::Backends(backends));
    }
    Ok(guards)
}

fn parse_shader_qualifiers(line: usize, text: &str) -> Result<ShaderQualifiers, RunnerError> {
    let mut qualifiers = ShaderQualifiers::default();
    let mut rest = text.trim();
    while !rest.is_empty() {
        let (token, tail) = match rest.find(char::is_whitespace) {
            Some(pos) => (&rest[..pos], rest[pos..].trim_start()),
            None => (rest, ""),
        };
        let (word, guard) = match token.find('(') {
            Some(pos) => {
                let args = token[pos..]
                    .strip_prefix('(')
                    .and_then(|a| a.strip_suffix(')'))
                    .ok_or_else(|| malformed(line, format!("unterminated qualifier '{token}'")))?;
                (&token[..pos], Some(args))
            }
            None => (token, None),
        };
        match word {
            "todo" => qualifiers.todo = true,
            "fail" => qualifiers.fail = true,
            "notimpl" => qualifiers.notimpl = true,
            "" => {}
            _ => return Err(malformed(line, format!("unknown modifier '{word}'"))),
        }
        if let Some(args) = guard {
            qualifiers.guards.extend(parse_guard(line, args)?);
        }
        rest = tail;
    }
    Ok(qualifiers)
}

enum SectionStart {
    Require,
    Shader(ShaderStageKind, ShaderQualifiers),
    Resource(ResourceKind, u32),
    Sampler(u32),
    InputLayout,
    Test,
}

fn parse_section_header(line: usize, header: &str) -> Result<SectionStart, RunnerError> {
    const STAGES: &[(&str, ShaderStageKind)] = &[
        ("pixel shader", ShaderStageKind::Pixel),
        ("vertex shader", ShaderStageKind::Vertex),
        ("compute shader", ShaderStageKind::Compute),
        ("hull shader", ShaderStageKind::Hull),
        ("domain shader", ShaderStageKind::Domain),
        ("geometry shader", ShaderStageKind::Geometry),
        ("effect", ShaderStageKind::Effect),
    ];
    for (name, stage) in STAGES {
        if let Some(rest) = match_string(header, name) {
            return Ok(SectionStart::Shader(
                *stage,
                parse_shader_qualifiers(line, rest)?,
            ));
        }
    }

    if header == "require" {
        return Ok(SectionStart::Require);
    }
    if header == "test" {
        return Ok(SectionStart::Test);
    }
    if header == "input layout" {
        return Ok(SectionStart::InputLayout);
    }
    if header == "dsv" {
        return Ok(SectionStart::Resource(ResourceKind::Dsv, 0));
    }
    const RESOURCES: &[(&str, ResourceKind)] = &[
        ("srv", ResourceKind::Srv),
        ("uav", ResourceKind::Uav),
        ("rtv", ResourceKind::Rtv),
        ("vb", ResourceKind::VertexBuffer),
    ];
    for (name, kind) in RESOURCES {
        if let Some(rest) = match_string(header, name) {
            return Ok(SectionStart::Resource(*kind, parse_u32(line, rest)?));
        }
    }
    if let Some(rest) = match_string(header, "sampler") {
        return Ok(SectionStart::Sampler(parse_u32(line, rest)?));
    }

    Err(RunnerError::UnknownSection {
        line,
        header: header.to_string(),
    })
}

fn parse_require_line(line: usize, text: &str) -> Result<RequireDirective, RunnerError> {
    if let Some(rest) = match_string(text, "shader model >=") {
        return Ok(RequireDirective::MinShaderModel(parse_model(line, rest)?));
    }
    if let Some(rest) = match_string(text, "shader model <") {
        return Ok(RequireDirective::MaxShaderModelExclusive(parse_model(
            line, rest,
        )?));
    }
    if let Some(rest) = match_string(text, "options:") {
        return Ok(RequireDirective::Options(
            rest.split_whitespace().map(str::to_string).collect(),
        ));
    }
    if let Some(rest) = match_string(text, "format") {
        let mut tokens = rest.split_whitespace();
        let format = tokens
            .next()
            .ok_or_else(|| malformed(line, "format requirement without a format"))?;
        let caps: Vec<String> = tokens.map(str::to_string).collect();
        if caps.is_empty() {
            return Err(malformed(line, "format requirement without capabilities"));
        }
        return Ok(RequireDirective::FormatCap {
            format: format.to_string(),
            caps,
        });
    }
    if !text.contains(char::is_whitespace) {
        return Ok(RequireDirective::Capability(text.to_string()));
    }
    Err(malformed(line, format!("unknown require directive '{text}'")))
}

fn parse_resource_line(
    line: usize,
    text: &str,
    block: &mut ResourceBlock,
) -> Result<(), RunnerError> {
    if let Some(rest) = match_string(text, "format") {
        block.format = Some(rest.to_string());
        return Ok(());
    }
    if let Some(rest) = match_string(text, "stride") {
        block.stride = Some(parse_u32(line, rest)?);
        return Ok(());
    }
    if let Some(rest) = match_string(text, "levels") {
        block.levels = Some(parse_u32(line, rest)?);
        return Ok(());
    }
    if let Some(rest) = match_string(text, "size") {
        let tokens = tuple_tokens(rest);
        block.size = match tokens.as_slice() {
            [w] => Some((parse_u32(line, w)?, 1)),
            [w, h] => Some((parse_u32(line, w)?, parse_u32(line, h)?)),
            // A leading dimensionality word, e.g. `(2d, 4, 4)`.
            [_, w, h] => Some((parse_u32(line, w)?, parse_u32(line, h)?)),
            _ => return Err(malformed(line, format!("malformed resource size '{rest}'"))),
        };
        return Ok(());
    }
    block
        .values
        .extend(tuple_tokens(text).into_iter().map(str::to_string));
    Ok(())
}

fn parse_sampler_line(
    line: usize,
    text: &str,
    block: &mut SamplerBlock,
) -> Result<(), RunnerError> {
    if let Some(rest) = match_string(text, "filter") {
        block.filter = Some(rest.to_string());
        return Ok(());
    }
    if let Some(rest) = match_string(text, "address") {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let [u, v, w] = tokens.as_slice() else {
            return Err(malformed(line, format!("malformed address modes '{rest}'")));
        };
        block.address = Some((
            parse_address_mode(line, u)?,
            parse_address_mode(line, v)?,
            parse_address_mode(line, w)?,
        ));
        return Ok(());
    }
    if let Some(rest) = match_string(text, "comparison") {
        block.comparison = Some(parse_comparison(line, rest)?);
        return Ok(());
    }
    Err(malformed(line, format!("unknown sampler directive '{text}'")))
}

fn parse_input_layout_line(line: usize, text: &str) -> Result<InputLayoutElement, RunnerError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.as_slice() {
        [slot, format, name] => Ok(InputLayoutElement {
            slot: parse_u32(line, slot)?,
            format: format.to_string(),
            name: name.to_string(),
            index: None,
        }),
        [slot, format, name, index] => Ok(InputLayoutElement {
            slot: parse_u32(line, slot)?,
            format: format.to_string(),
            name: name.to_string(),
            index: Some(parse_u32(line, index)?),
        }),
        _ => Err(malformed(
            line,
            format!("malformed input layout directive '{text}'"),
        )),
    }
}

fn parse_probe_format(line: usize, token: &str) -> Result<ProbeFormat, RunnerError> {
    Ok(match token {
        "rgba" => ProbeFormat::Rgba,
        "rgbai" => ProbeFormat::RgbaI,
        "rgbaui" => ProbeFormat::RgbaUi,
        "rg" => ProbeFormat::Rg,
        "r" => ProbeFormat::R,
        "ri" => ProbeFormat::Ri,
        "rui" => ProbeFormat::Rui,
        "rd" => ProbeFormat::Rd,
        "ri64" => ProbeFormat::Ri64,
        "rui64" => ProbeFormat::Rui64,
        _ => return Err(malformed(line, format!("unknown probe format '{token}'"))),
    })
}

fn parse_uniform_kind(line: usize, token: &str) -> Result<UniformKind, RunnerError> {
    Ok(match token {
        "float" => UniformKind::Float,
        "float4" => UniformKind::Float4,
        "int" => UniformKind::Int,
        "int4" => UniformKind::Int4,
        "uint" => UniformKind::Uint,
        "uint4" => UniformKind::Uint4,
        "int64_t2" => UniformKind::Int64x2,
        "uint64_t2" => UniformKind::Uint64x2,
        "double2" => UniformKind::Double2,
        _ => return Err(malformed(line, format!("unknown uniform type '{token}'"))),
    })
}

fn parse_vec4(line: usize, tokens: &[&str]) -> Result<[f32; 4], RunnerError> {
    let [x, y, z, w] = tokens else {
        return Err(malformed(line, "expected four components"));
    };
    Ok([
        parse_f32(line, x)?,
        parse_f32(line, y)?,
        parse_f32(line, z)?,
        parse_f32(line, w)?,
    ])
}

fn parse_draw(line: usize, rest: &str) -> Result<TestCommand, RunnerError> {
    if match_string(rest, "quad").is_some() {
        return Ok(TestCommand::DrawQuad);
    }
    let (topology, rest) = if let Some(rest) = match_string(rest, "triangle list") {
        (Topology::TriangleList, rest)
    } else if let Some(rest) = match_string(rest, "triangle strip") {
        (Topology::TriangleStrip, rest)
    } else if let Some(rest) = match_string(rest, "point list") {
        (Topology::PointList, rest)
    } else {
        // `N control point patch list`
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let [n, "control", "point", "patch", "list", tail @ ..] = tokens.as_slice() else {
            return Err(malformed(line, format!("malformed draw '{rest}'")));
        };
        let count = parse_u32(line, n)?;
        let vertex_count = match tail {
            [v] | [v, _] => parse_u32(line, v)?,
            _ => return Err(malformed(line, format!("malformed draw '{rest}'"))),
        };
        let instance_count = match tail {
            [_, i] => Some(parse_u32(line, i)?),
            _ => None,
        };
        return Ok(TestCommand::Draw {
            topology: Topology::PatchList(count),
            vertex_count,
            instance_count,
        });
    };
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    match tokens.as_slice() {
        [v] => Ok(TestCommand::Draw {
            topology,
            vertex_count: parse_u32(line, v)?,
            instance_count: None,
        }),
        [v, i] => Ok(TestCommand::Draw {
            topology,
            vertex_count: parse_u32(line, v)?,
            instance_count: Some(parse_u32(line, i)?),
        }),
        _ => Err(malformed(line, format!("malformed draw '{rest}'"))),
    }
}

fn parse_probe(line: usize, rest: &str) -> Result<TestCommand, RunnerError> {
    let (is_rect, rest) = if let Some(rest) = match_string(rest, "rect") {
        (true, rest)
    } else if let Some(rest) = match_string(rest, "point") {
        (false, rest)
    } else {
        return Err(malformed(line, format!("malformed probe '{rest}'")));
    };

    // Coordinates: a parenthesized tuple.
    let close = rest
        .find(')')
        .ok_or_else(|| malformed(line, "probe coordinates must be parenthesized"))?;
    let coords = tuple_tokens(&rest[..=close]);
    let area = if is_rect {
        let [x, y, w, h] = coords.as_slice() else {
            return Err(malformed(line, "probe rect takes four coordinates"));
        };
        ProbeArea::Rect {
            x: parse_u32(line, x)?,
            y: parse_u32(line, y)?,
            w: parse_u32(line, w)?,
            h: parse_u32(line, h)?,
        }
    } else {
        let [x, y] = coords.as_slice() else {
            return Err(malformed(line, "probe point takes two coordinates"));
        };
        ProbeArea::Point {
            x: parse_u32(line, x)?,
            y: parse_u32(line, y)?,
        }
    };

    let rest = rest[close + 1..].trim_start();
    let (format_token, rest) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim_start()),
        None => (rest, ""),
    };
    let format = parse_probe_format(line, format_token)?;

    // Values, then an optional `N ulps` suffix.
    let (values_text, ulps) = match rest.find("ulps") {
        Some(pos) => {
            let head = rest[..pos].trim_end();
            let ulps_start = head
                .rfind(char::is_whitespace)
                .ok_or_else(|| malformed(line, "malformed ulps suffix"))?;
            (
                &head[..ulps_start],
                Some(parse_u32(line, head[ulps_start..].trim())?),
            )
        }
        None => (rest, None),
    };
    let values = tuple_tokens(values_text)
        .into_iter()
        .map(|t| parse_f64(line, t))
        .collect::<Result<Vec<f64>, _>>()?;
    Ok(TestCommand::Probe {
        area,
        format,
        values,
        ulps,
    })
}

fn parse_test_line(line: usize, text: &str) -> Result<TestCommand, RunnerError> {
    if let Some(rest) = match_string(text, "dispatch") {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let [x, y, z] = tokens.as_slice() else {
            return Err(malformed(line, format!("malformed dispatch '{rest}'")));
        };
        return Ok(TestCommand::Dispatch {
            x: parse_u32(line, x)?,
            y: parse_u32(line, y)?,
            z: parse_u32(line, z)?,
        });
    }
    if let Some(rest) = match_string(text, "clear rtv") {
        let tokens = tuple_tokens(rest);
        let (slot, color) = tokens
            .split_first()
            .ok_or_else(|| malformed(line, "clear rtv takes a slot and colour"))?;
        return Ok(TestCommand::ClearRtv {
            slot: parse_u32(line, slot)?,
            color: parse_vec4(line, color)?,
        });
    }
    if let Some(rest) = match_string(text, "clear dsv") {
        return Ok(TestCommand::ClearDsv {
            depth: parse_f32(line, rest.trim())?,
        });
    }
    if let Some(rest) = match_string(text, "draw") {
        return parse_draw(line, rest);
    }
    if let Some(rest) = match_string(text, "probe") {
        return parse_probe(line, rest);
    }
    if let Some(rest) = match_string(text, "uniform") {
        let mut tokens = rest.split_whitespace();
        let offset = parse_u32(line, tokens.next().unwrap_or(""))?;
        let kind = parse_uniform_kind(line, tokens.next().unwrap_or(""))?;
        let values: Vec<String> = tokens.map(str::to_string).collect();
        if values.is_empty() {
            return Err(malformed(line, "uniform directive without values"));
        }
        return Ok(TestCommand::Uniform {
            offset,
            kind,
            values,
        });
    }
    if let Some(rest) = match_string(text, "sample mask") {
        return Ok(TestCommand::SampleMask(parse_u32(line, rest.trim())?));
    }
    if let Some(rest) = match_string(text, "alpha test") {
        let (func_text, reference) = rest
            .rsplit_once(char::is_whitespace)
            .ok_or_else(|| malformed(line, format!("malformed alpha test '{rest}'")))?;
        return Ok(TestCommand::AlphaTest {
            func: parse_comparison(line, func_text)?,
            reference: parse_f32(line, reference)?,
        });
    }
    if let Some(rest) = match_string(text, "depth-bounds") {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let [min, max] = tokens.as_slice() else {
            return Err(malformed(line, format!("malformed depth-bounds '{rest}'")));
        };
        return Ok(TestCommand::DepthBounds {
            min: parse_f32(line, min)?,
            max: parse_f32(line, max)?,
        });
    }
    if let Some(rest) = match_string(text, "depth") {
        return Ok(TestCommand::DepthFunc(parse_comparison(line, rest)?));
    }
    if let Some(rest) = match_string(text, "clip-plane") {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        return match tokens.as_slice() {
            [index, "disable"] => Ok(TestCommand::ClipPlane {
                index: parse_u32(line, index)?,
                plane: None,
            }),
            [index, rest @ ..] if rest.len() == 4 => Ok(TestCommand::ClipPlane {
                index: parse_u32(line, index)?,
                plane: Some(parse_vec4(line, rest)?),
            }),
            _ => Err(malformed(line, format!("malformed clip-plane '{rest}'"))),
        };
    }
    if let Some(rest) = match_string(text, "point-size") {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let [size, min, max] = tokens.as_slice() else {
            return Err(malformed(line, format!("malformed point-size '{rest}'")));
        };
        return Ok(TestCommand::PointSize {
            size: parse_f32(line, size)?,
            min: parse_f32(line, min)?,
            max: parse_f32(line, max)?,
        });
    }
    if let Some(rest) = match_string(text, "point-sprite") {
        return match rest.trim() {
            "on" => Ok(TestCommand::PointSprite(true)),
            "off" => Ok(TestCommand::PointSprite(false)),
            other => Err(malformed(line, format!("malformed point-sprite '{other}'"))),
        };
    }
    if let Some(rest) = match_string(text, "fog-colour").or_else(|| match_string(text, "fog-color"))
    {
        let tokens = tuple_tokens(rest);
        return Ok(TestCommand::FogColour(parse_vec4(line, &tokens)?));
    }
    if let Some(rest) = match_string(text, "fog") {
        let mode = match rest.trim() {
            "disable" => FogMode::Disable,
            "none" => FogMode::None,
            "linear" => FogMode::Linear,
            "exp" => FogMode::Exp,
            "exp2" => FogMode::Exp2,
            other => return Err(malformed(line, format!("unknown fog mode '{other}'"))),
        };
        return Ok(TestCommand::Fog(mode));
    }
    if let Some(rest) = match_string(text, "shade mode") {
        let mode = match rest.trim() {
            "flat" => ShadeMode::Flat,
            "gouraud" => ShadeMode::Gouraud,
            other => return Err(malformed(line, format!("unknown shade mode '{other}'"))),
        };
        return Ok(TestCommand::ShadeMode(mode));
    }
    if let Some(rest) = match_string(text, "copy") {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let [src, dst] = tokens.as_slice() else {
            return Err(malformed(line, format!("malformed copy '{rest}'")));
        };
        return Ok(TestCommand::Copy {
            src: src.to_string(),
            dst: dst.to_string(),
        });
    }
    Err(malformed(line, format!("unknown test directive '{text}'")))
}

struct PendingSection {
    start: SectionStart,
    header_line: usize,
    lines: Vec<(usize, String)>,
}

fn finish_section(pending: PendingSection) -> Result<SectionBlock, RunnerError> {
    let content = match pending.start {
        SectionStart::Require => {
            let mut directives = Vec::new();
            for (line, text) in &pending.lines {
                directives.push(parse_require_line(*line, text)?);
            }
            SectionContent::Require(directives)
        }
        SectionStart::Shader(stage, qualifiers) => {
            let source: Vec<&str> = pending.lines.iter().map(|(_, t)| t.as_str()).collect();
            SectionContent::Shader(ShaderSource {
                stage,
                qualifiers,
                source: source.join("\n"),
            })
        }
        SectionStart::Resource(kind, slot) => {
            let mut block = ResourceBlock {
                kind,
                slot,
                format: None,
                size: None,
                stride: None,
                levels: None,
                values: Vec::new(),
            };
            for (line, text) in &pending.lines {
                parse_resource_line(*line, text, &mut block)?;
            }
            SectionContent::Resource(block)
        }
        SectionStart::Sampler(slot) => {
            let mut block = SamplerBlock {
                slot,
                filter: None,
                address: None,
                comparison: None,
            };
            for (line, text) in &pending.lines {
                parse_sampler_line(*line, text, &mut block)?;
            }
            SectionContent::Sampler(block)
        }
        SectionStart::InputLayout => {
            let mut elements = Vec::new();
            for (line, text) in &pending.lines {
                elements.push(parse_input_layout_line(*line, text)?);
            }
            SectionContent::InputLayout(elements)
        }
        SectionStart::Test => {
            let mut commands = Vec::new();
            for (line, text) in &pending.lines {
                commands.push(parse_test_line(*line, text)?);
            }
            SectionContent::Test(commands)
        }
    };
    Ok(SectionBlock {
        header_line: pending.header_line,
        content,
    })
}

/// Parse a directive file from text.
pub fn parse_str(text: &str) -> Result<ShaderTestFile, RunnerError> {
    let mut file = ShaderTestFile::default();
    let mut pending: Option<PendingSection> = None;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        let in_shader = matches!(
            pending,
            Some(PendingSection {
                start: SectionStart::Shader(..),
                ..
            })
        );

        if trimmed.starts_with('[') {
            let header = trimmed.strip_prefix('[').and_then(|h| h.strip_suffix(']'));
            let start = header.and_then(|h| parse_section_header(line, h).ok());
            match start {
                Some(start) => {
                    if let Some(done) = pending.take() {
                        file.blocks.push(finish_section(done)?);
                    }
                    pending = Some(PendingSection {
                        start,
                        header_line: line,
                        lines: Vec::new(),
                    });
                    continue;
                }
                // Shader attributes like `[numthreads(8, 8, 1)]` start a
                // line with a bracket without opening a section.
                None if in_shader => {}
                None => {
                    let header = header.ok_or_else(|| {
                        malformed(line, format!("malformed section header '{trimmed}'"))
                    })?;
                    return Err(RunnerError::UnknownSection {
                        line,
                        header: header.to_string(),
                    });
                }
            }
        }

        if !in_shader && (trimmed.is_empty() || trimmed.starts_with('%')) {
            continue;
        }
        match &mut pending {
            Some(section) => {
                // Shader sections keep their source verbatim.
                let text = if in_shader { raw } else { trimmed };
                section.lines.push((line, text.to_string()));
            }
            None => {
                return Err(malformed(
                    line,
                    format!("directive '{trimmed}' outside any section"),
                ));
            }
        }
    }
    if let Some(done) = pending.take() {
        file.blocks.push(finish_section(done)?);
    }
    tracing::debug!(target: "runner.parse", blocks = file.blocks.len(), "parsed test file");
    Ok(file)
}

/// Parse a directive file from disk.
pub fn parse_file(path: &Path) -> Result<ShaderTestFile, RunnerError> {
    let text = std::fs::read_to_string(path)?;
    parse_str(&text)
}
