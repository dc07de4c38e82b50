// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use std::borrow::Cow;
use std::ffi::CStr;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::error::VkError;

/// Entry point name both stages are compiled with.
pub const ENTRY_POINT: &CStr = c"main";

static BUILTIN_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.vert.spv"));
static BUILTIN_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.frag.spv"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

/// Where a stage's SPIR-V comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ShaderSource {
    /// The triangle shaders compiled by the build script.
    #[default]
    Builtin,
    File(PathBuf),
}

impl ShaderSource {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        path.map_or(ShaderSource::Builtin, ShaderSource::File)
    }

    pub fn load(&self, stage: Stage) -> Result<Cow<'static, [u8]>, VkError> {
        let bytes = match self {
            ShaderSource::Builtin => Cow::Borrowed(match stage {
                Stage::Vertex => BUILTIN_VERT,
                Stage::Fragment => BUILTIN_FRAG,
            }),
            ShaderSource::File(path) => {
                Cow::Owned(fs::read(path).map_err(|source| VkError::ShaderRead {
                    path: path.clone(),
                    source,
                })?)
            }
        };
        if bytes.is_empty() {
            return Err(VkError::EmptyShader);
        }
        Ok(bytes)
    }
}

/// Reinterpret a SPIR-V byte stream as little-endian words. A trailing
/// partial word is zero-padded.
pub fn spirv_words(bytes: &[u8]) -> Vec<u32> {
    let mut words = vec![0u32; bytes.len().div_ceil(4)];
    bytemuck::cast_slice_mut::<u32, u8>(&mut words)[..bytes.len()].copy_from_slice(bytes);
    for w in &mut words {
        *w = u32::from_le(*w);
    }
    words
}

unsafe fn create_module(device: &ash::Device, bytes: &[u8]) -> Result<vk::ShaderModule> {
    let code = spirv_words(bytes);
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        // the byte length, not the padded word storage
        code_size: bytes.len(),
        p_code: code.as_ptr(),
        ..Default::default()
    };
    Ok(device.create_shader_module(&ci, None)?)
}

/// Vertex + fragment modules. Created once at startup and kept until
/// shutdown; swapchain rebuilds reuse them.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShaderModules {
    pub vertex: vk::ShaderModule,
    pub fragment: vk::ShaderModule,
}

impl ShaderModules {
    pub unsafe fn create(
        device: &ash::Device,
        vertex: &ShaderSource,
        fragment: &ShaderSource,
    ) -> Result<Self> {
        let vs_bytes = vertex.load(Stage::Vertex)?;
        let fs_bytes = fragment.load(Stage::Fragment)?;

        let vs = create_module(device, &vs_bytes).context("create_shader_module(vertex)")?;
        let fs = match create_module(device, &fs_bytes) {
            Ok(m) => m,
            Err(e) => {
                device.destroy_shader_module(vs, None);
                return Err(e.context("create_shader_module(fragment)"));
            }
        };
        debug!(
            "shader modules ready (vs {} bytes, fs {} bytes)",
            vs_bytes.len(),
            fs_bytes.len()
        );
        Ok(ShaderModules {
            vertex: vs,
            fragment: fs,
        })
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_shader_module(self.vertex, None);
        device.destroy_shader_module(self.fragment, None);
        *self = ShaderModules::default();
    }

    pub fn stages(&self) -> [vk::PipelineShaderStageCreateInfo<'static>; 2] {
        [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: self.vertex,
                p_name: ENTRY_POINT.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: self.fragment,
                p_name: ENTRY_POINT.as_ptr(),
                ..Default::default()
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_trailing_word_is_padded() {
        let words = spirv_words(&[0x03, 0x02, 0x23, 0x07, 0xaa]);
        assert_eq!(words, vec![0x0723_0203, 0x0000_00aa]);
    }

    #[test]
    fn whole_words_are_little_endian() {
        let words = spirv_words(&[1, 0, 0, 0, 0, 0, 0, 0x80]);
        assert_eq!(words, vec![1, 0x8000_0000]);
        assert!(spirv_words(&[]).is_empty());
    }

    #[test]
    fn builtin_shaders_start_with_spirv_magic() {
        for stage in [Stage::Vertex, Stage::Fragment] {
            let bytes = ShaderSource::Builtin.load(stage).unwrap();
            assert_eq!(bytes.len() % 4, 0);
            assert_eq!(spirv_words(&bytes)[0], 0x0723_0203);
        }
    }

    #[test]
    fn missing_shader_file_is_fatal_and_names_the_path() {
        let src = ShaderSource::from_path(Some(PathBuf::from("no/such/shader.spv")));
        let err = src.load(Stage::Vertex).unwrap_err();
        match err {
            VkError::ShaderRead { path, .. } => {
                assert_eq!(path, PathBuf::from("no/such/shader.spv"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn no_path_means_builtin() {
        assert_eq!(ShaderSource::from_path(None), ShaderSource::Builtin);
    }
}
