//! Whole-file parses of representative shader-test inputs.

use shade_runner::*;
use std::io::Write as _;

const SAMPLE: &str = r#"
[require]
shader model >= 4.0
options: row-major backcompat

[srv 0]
format r32g32b32a32-float
size (2, 2)
1.0 0.0 0.0 1.0
0.0 1.0 0.0 1.0
0.0 0.0 1.0 1.0
1.0 1.0 1.0 1.0

[sampler 0]
filter linear linear linear
address clamp clamp clamp

[input layout]
0 r32g32b32a32-float position
0 r32g32-float texcoord 0

[vertex shader]
void main(float4 pos : position, out float4 out_pos : sv_position)
{
    out_pos = pos;
}

[pixel shader todo(sm>=6)]
float4 main() : sv_target
{
    return float4(0.25, 0.5, 0.75, 1.0);
}

[test]
clear rtv 0 0.0 0.0 0.0 0.0
draw quad
probe point (0, 0) rgba (0.25, 0.5, 0.75, 1.0)
"#;

#[test]
fn sample_file_parses_fully() {
    let file = parse_str(SAMPLE).unwrap();
    assert_eq!(file.blocks.len(), 7);
    assert_eq!(file.min_shader_model(), Some(ShaderModel::new(4, 0)));
    assert_eq!(file.shaders().count(), 2);

    let pixel = file
        .shaders()
        .find(|s| s.stage == ShaderStageKind::Pixel)
        .unwrap();
    assert!(pixel.qualifiers.todo);
    assert_eq!(
        pixel.qualifiers.guards,
        vec![Guard::MinModel(ShaderModel::new(6, 0))]
    );
    assert!(pixel.source.contains("return float4"));
}

#[test]
fn resource_block_collects_values() {
    let file = parse_str(SAMPLE).unwrap();
    let srv = file
        .blocks
        .iter()
        .find_map(|b| match &b.content {
            SectionContent::Resource(r) => Some(r),
            _ => None,
        })
        .unwrap();
    assert_eq!(srv.kind, ResourceKind::Srv);
    assert_eq!(srv.slot, 0);
    assert_eq!(srv.format.as_deref(), Some("r32g32b32a32-float"));
    assert_eq!(srv.size, Some((2, 2)));
    assert_eq!(srv.values.len(), 16);
}

#[test]
fn test_section_commands() {
    let file = parse_str(SAMPLE).unwrap();
    let commands = file
        .blocks
        .iter()
        .find_map(|b| match &b.content {
            SectionContent::Test(commands) => Some(commands),
            _ => None,
        })
        .unwrap();
    assert_eq!(commands.len(), 3);
    assert_eq!(
        commands[0],
        TestCommand::ClearRtv {
            slot: 0,
            color: [0.0; 4]
        }
    );
    assert_eq!(commands[1], TestCommand::DrawQuad);
    let TestCommand::Probe {
        area,
        format,
        values,
        ulps,
    } = &commands[2]
    else {
        panic!("expected probe");
    };
    assert_eq!(*area, ProbeArea::Point { x: 0, y: 0 });
    assert_eq!(*format, ProbeFormat::Rgba);
    assert_eq!(values, &vec![0.25, 0.5, 0.75, 1.0]);
    assert_eq!(*ulps, None);
}

#[test]
fn compute_shader_attributes_stay_in_source() {
    let text = "[compute shader]\n[numthreads(8, 8, 1)]\nvoid main() {}\n\n[test]\ndispatch 1 1 1\n";
    let file = parse_str(text).unwrap();
    let shader = file.shaders().next().unwrap();
    assert_eq!(shader.stage, ShaderStageKind::Compute);
    assert!(shader.source.contains("[numthreads(8, 8, 1)]"));
}

#[test]
fn parse_file_reads_from_disk() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(SAMPLE.as_bytes()).unwrap();
    let file = parse_file(tmp.path()).unwrap();
    assert_eq!(file.blocks.len(), 7);
}

#[test]
fn unknown_section_is_an_error_with_line() {
    let err = parse_str("[bogus]\n").unwrap_err();
    let RunnerError::UnknownSection { line, header } = err else {
        panic!("expected an unknown-section error");
    };
    assert_eq!(line, 1);
    assert_eq!(header, "bogus");
}

#[test]
fn state_verbs_parse() {
    let text = "[test]\n\
                sample mask 3\n\
                alpha test greater equal 0.5\n\
                depth less\n\
                depth-bounds 0.0 1.0\n\
                clip-plane 1 disable\n\
                clip-plane 0 1.0 0.0 0.0 0.5\n\
                point-size 4.0 1.0 16.0\n\
                point-sprite on\n\
                fog linear\n\
                fog-colour 0.5 0.5 0.5 1.0\n\
                shade mode flat\n\
                copy rtv0 srv1\n\
                uniform 0 float4 1 2 3 4\n\
                draw triangle list 3\n\
                draw 4 control point patch list 8\n";
    let file = parse_str(text).unwrap();
    let SectionContent::Test(commands) = &file.blocks[0].content else {
        panic!("expected test section");
    };
    assert_eq!(commands.len(), 15);
    assert_eq!(
        commands[1],
        TestCommand::AlphaTest {
            func: ComparisonFunc::GreaterEqual,
            reference: 0.5
        }
    );
    assert_eq!(commands[2], TestCommand::DepthFunc(ComparisonFunc::Less));
    assert_eq!(
        commands[5],
        TestCommand::ClipPlane {
            index: 0,
            plane: Some([1.0, 0.0, 0.0, 0.5])
        }
    );
    assert_eq!(
        commands[12],
        TestCommand::Uniform {
            offset: 0,
            kind: UniformKind::Float4,
            values: vec!["1".into(), "2".into(), "3".into(), "4".into()]
        }
    );
    assert_eq!(
        commands[14],
        TestCommand::Draw {
            topology: Topology::PatchList(4),
            vertex_count: 8,
            instance_count: None
        }
    );
}
