//! Renders graphviz dot source to PNG by piping it through a locally
//! installed `dot` binary.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

/// A piece of graphviz dot source.
pub struct GraphvizSource(String);

impl GraphvizSource {
    /// Wraps already rendered dot source.
    pub fn new(dot: impl Into<String>) -> Self {
        Self(dot.into())
    }

    /// The raw dot source.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A rendered PNG image.
pub struct PngImage(Vec<u8>);

impl PngImage {
    /// The encoded PNG bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("could not invoke dot, is graphviz installed? \"{0}\"")]
    DotUnavailable(#[from] std::io::Error),
    #[error("dot exited with non-zero status \"{0}\"")]
    NonZeroExit(std::process::ExitStatus),
}

/// Pipes the given dot source through `dot -Tpng` and returns the rendered
/// image.
pub fn render_png(source: &GraphvizSource) -> Result<PngImage, RenderError> {
    let mut child = Command::new("dot")
        .arg("-Tpng")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(source.as_str().as_bytes())?;
    }

    let mut output = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout.read_to_end(&mut output)?;
    }

    let status = child.wait()?;
    if !status.success() {
        return Err(RenderError::NonZeroExit(status));
    }

    Ok(PngImage(output))
}

/// Renders the dot source and writes the PNG to `path`.
pub fn render_to_file(source: &GraphvizSource, path: impl AsRef<Path>) -> Result<(), RenderError> {
    let png = render_png(source)?;
    std::fs::write(path, png.bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_roundtrips() {
        let source = GraphvizSource::new("digraph { a -> b }");
        assert_eq!(source.as_str(), "digraph { a -> b }");
    }
}
