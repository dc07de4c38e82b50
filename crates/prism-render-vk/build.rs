use anyhow::{Context, Result};
use naga::back::spv;
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;
use std::{env, fs, path::PathBuf};

// No vertex input: positions and colors are indexed by gl_VertexIndex.
// Winding is clockwise in framebuffer space (y down), matching the
// pipeline's front face.
const VS_SRC: &str = r#"
#version 450

layout(location = 0) out vec3 vColor;

void main() {
    vec2 positions[3] = vec2[3](
        vec2(0.0, -0.5),
        vec2(0.5, 0.5),
        vec2(-0.5, 0.5)
    );
    vec3 colors[3] = vec3[3](
        vec3(1.0, 0.0, 0.0),
        vec3(0.0, 1.0, 0.0),
        vec3(0.0, 0.0, 1.0)
    );
    gl_Position = vec4(positions[gl_VertexIndex], 0.0, 1.0);
    vColor = colors[gl_VertexIndex];
}
"#;

const FS_SRC: &str = r#"
#version 450

layout(location = 0) in vec3 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(vColor, 1.0);
}
"#;

fn compile(src: &str, stage: ShaderStage, name: &str) -> Result<Vec<u8>> {
    let mut frontend = Frontend::default();
    let module = frontend
        .parse(&Options::from(stage), src)
        .with_context(|| format!("parse {name}"))?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator
        .validate(&module)
        .with_context(|| format!("validate {name}"))?;

    // The GLSL here is already written for Vulkan clip space.
    let mut opts = spv::Options::default();
    opts.flags.remove(spv::WriterFlags::ADJUST_COORDINATE_SPACE);

    let words = spv::write_vec(&module, &info, &opts, None)
        .with_context(|| format!("emit SPIR-V for {name}"))?;
    Ok(words.iter().flat_map(|w| w.to_le_bytes()).collect())
}

fn main() -> Result<()> {
    let out = PathBuf::from(env::var("OUT_DIR")?);

    let vs_spv = compile(VS_SRC, ShaderStage::Vertex, "tri.vert")?;
    let fs_spv = compile(FS_SRC, ShaderStage::Fragment, "tri.frag")?;

    fs::write(out.join("tri.vert.spv"), vs_spv)?;
    fs::write(out.join("tri.frag.spv"), fs_spv)?;

    // Re-run if this file changes (inline sources live here)
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
