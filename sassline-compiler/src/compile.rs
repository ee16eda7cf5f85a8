//! Entry-point compilation: SCSS → CSS + source map in an output folder.

use std::path::{Path, PathBuf};

use sassline_core::{OutputStyle, SourcePaths};

use crate::error::{io_err, CompileError};
use crate::source_map::{mapping_url_comment, SourceMap};
use crate::writer::{atomic_write, WriteResult};

/// Knobs handed to the compiler for every entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub style: OutputStyle,
    pub source_maps: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            style: OutputStyle::Compressed,
            source_maps: true,
        }
    }
}

impl From<&SourcePaths> for CompileOptions {
    fn from(paths: &SourcePaths) -> Self {
        Self {
            style: paths.output_style,
            source_maps: paths.source_maps,
        }
    }
}

/// Files produced for one entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    pub source: PathBuf,
    pub css: WriteResult,
    pub map: Option<WriteResult>,
}

impl CompileOutput {
    /// Paths whose content actually changed on disk.
    pub fn written(&self) -> Vec<PathBuf> {
        std::iter::once(&self.css)
            .chain(self.map.as_ref())
            .filter(|w| w.is_written())
            .map(|w| w.path().to_path_buf())
            .collect()
    }
}

/// `<dest_dir>/<stem>.css` and `<dest_dir>/<stem>.css.map`: pure, no I/O.
///
/// The stem drops only the final extension: `app.rtl.scss` → `app.rtl.css`.
pub fn output_paths(source: &Path, dest_dir: &Path) -> (PathBuf, PathBuf) {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "style".to_string());
    let css = dest_dir.join(format!("{stem}.css"));
    let map = dest_dir.join(format!("{stem}.css.map"));
    (css, map)
}

/// Compile `source` to a CSS string without touching the output folder.
pub fn render(source: &Path, style: OutputStyle) -> Result<String, CompileError> {
    let style = match style {
        OutputStyle::Compressed => grass::OutputStyle::Compressed,
        OutputStyle::Expanded => grass::OutputStyle::Expanded,
    };
    let options = grass::Options::default().style(style);
    grass::from_path(source, &options).map_err(|err| CompileError::Sass {
        path: source.to_path_buf(),
        message: err.to_string(),
    })
}

/// Compile one entry point into `dest_dir`.
///
/// No pre-flight existence check: a missing `source` surfaces as
/// [`CompileError::Sass`] from the compiler. Nothing is written on error.
pub fn compile(
    source: &Path,
    dest_dir: &Path,
    options: &CompileOptions,
) -> Result<CompileOutput, CompileError> {
    let mut css = render(source, options.style)?;
    let (css_path, map_path) = output_paths(source, dest_dir);

    std::fs::create_dir_all(dest_dir).map_err(|e| io_err(dest_dir, e))?;

    let map = if options.source_maps {
        let content = std::fs::read_to_string(source).map_err(|e| io_err(source, e))?;
        let css_file = file_name(&css_path);
        let map_file = file_name(&map_path);
        let document = SourceMap::for_entry_point(&css_file, source, dest_dir, content);

        if !css.is_empty() && !css.ends_with('\n') {
            css.push('\n');
        }
        css.push_str(&mapping_url_comment(&map_file));

        Some(document.to_json()?)
    } else {
        None
    };

    // Map first: the CSS never points at a map that failed to land.
    let map_result = match map {
        Some(json) => Some(atomic_write(&map_path, json.as_bytes())?),
        None => None,
    };
    let css_result = atomic_write(&css_path, css.as_bytes())?;

    tracing::debug!(
        "compiled {} ({}) -> {}",
        source.display(),
        options.style,
        css_path.display()
    );

    Ok(CompileOutput {
        source: source.to_path_buf(),
        css: css_result,
        map: map_result,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
