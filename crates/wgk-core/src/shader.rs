//! Shader templating.
//!
//! Kernel sources are WGSL text carrying `{{workgroupSize}}` and
//! `{{precision}}` placeholders. Substitution happens once, ahead of kernel
//! construction; the text is never parsed here.

use tracing::trace;

use crate::dtype::NumType;
use crate::shape::Shape;

pub const WORKGROUP_SIZE_PLACEHOLDER: &str = "{{workgroupSize}}";
pub const PRECISION_PLACEHOLDER: &str = "{{precision}}";

/// Entry point every kernel shader must define.
pub const ENTRY_POINT: &str = "main";

/// Default scalar workgroup size, expanded to `{256, 1, 1}`.
pub const DEFAULT_WORKGROUP_SIZE: usize = 256;

/// Templated shader source with the workgroup size and precision it was
/// instantiated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderCode {
    source: String,
    workgroup_size: Shape,
    precision: NumType,
}

impl ShaderCode {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn workgroup_size(&self) -> &Shape {
        &self.workgroup_size
    }

    pub fn precision(&self) -> NumType {
        self.precision
    }
}

/// Replace every occurrence of `from` in `text` with `to`.
///
/// Scanning resumes after each inserted replacement, so a `to` containing
/// `from` does not recurse.
pub fn replace_all(text: &mut String, from: &str, to: &str) {
    if from.is_empty() {
        return;
    }
    let mut start = 0;
    while let Some(pos) = text[start..].find(from) {
        let at = start + pos;
        text.replace_range(at..at + from.len(), to);
        start = at + to.len();
    }
}

/// Instantiate a shader template for a 3-axis workgroup size and precision.
pub fn create_shader(template: &str, workgroup_size: Shape, precision: NumType) -> ShaderCode {
    let mut source = template.to_string();
    replace_all(&mut source, WORKGROUP_SIZE_PLACEHOLDER, &workgroup_size.to_string());
    replace_all(&mut source, PRECISION_PLACEHOLDER, precision.as_wgsl());
    trace!(workgroup_size = %workgroup_size, %precision, "templated shader:\n{source}");
    ShaderCode {
        source,
        workgroup_size,
        precision,
    }
}

/// Scalar form of [`create_shader`]: `workgroup_size` becomes `{n, 1, 1}`.
pub fn create_shader_1d(template: &str, workgroup_size: usize, precision: NumType) -> ShaderCode {
    create_shader(template, Shape::from([workgroup_size, 1, 1]), precision)
}
