// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;
use thiserror::Error;

/// Startup failures that cannot be retried.
#[derive(Debug, Error)]
pub enum VkError {
    #[error("no adapter supports presentation to this surface with {extension}")]
    NoSuitableAdapter { extension: String },

    #[error("required instance extension {0} is not available")]
    MissingInstanceExtension(String),

    #[error("surface reports no supported formats")]
    NoSurfaceFormats,

    #[error("failed to read shader {path}: {source}")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader blob is empty")]
    EmptyShader,
}
