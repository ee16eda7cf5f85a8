//! Source Map v3 documents for compiled stylesheets.
//!
//! The compiler reports no span information, so a map carries one segment
//! tying the start of the generated CSS to the start of its entry point, plus
//! the embedded entry-point source. Browsers use it to show the original
//! file in devtools.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// `AAAA`: generated column 0 → source 0, line 0, column 0.
const FILE_LEVEL_MAPPING: &str = "AAAA";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    /// Map for `css_file` (a name inside `out_dir`) compiled from `source`.
    pub fn for_entry_point(css_file: &str, source: &Path, out_dir: &Path, content: String) -> Self {
        Self {
            version: 3,
            file: css_file.to_string(),
            sources: vec![url_path(&relative_path(out_dir, source))],
            sources_content: vec![content],
            names: Vec::new(),
            mappings: FILE_LEVEL_MAPPING.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Trailer appended to the CSS so browsers locate the sibling map.
pub fn mapping_url_comment(map_file: &str) -> String {
    format!("/*# sourceMappingURL={map_file} */\n")
}

/// Path of `to` as seen from the directory `from`.
///
/// Both paths must be of the same kind (both absolute or both relative to
/// the same base); otherwise `to` is returned unchanged.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    if from.is_absolute() != to.is_absolute() {
        return to.to_path_buf();
    }

    let from: Vec<Component<'_>> = from
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    let to: Vec<Component<'_>> = to
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }
    rel
}

fn url_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_directories_walk_up_once() {
        let rel = relative_path(Path::new("/p/css"), Path::new("/p/sass/app.scss"));
        assert_eq!(rel, PathBuf::from("../sass/app.scss"));
    }

    #[test]
    fn nested_output_walks_up_twice() {
        let rel = relative_path(
            Path::new("public/css"),
            Path::new("./sass/app.rtl.scss"),
        );
        assert_eq!(rel, PathBuf::from("../../sass/app.rtl.scss"));
    }

    #[test]
    fn mixed_kinds_fall_back_to_target() {
        let rel = relative_path(Path::new("/p/css"), Path::new("sass/app.scss"));
        assert_eq!(rel, PathBuf::from("sass/app.scss"));
    }

    #[test]
    fn map_json_uses_v3_field_names() {
        let map = SourceMap::for_entry_point(
            "app.css",
            Path::new("/p/sass/app.scss"),
            Path::new("/p/css"),
            "a { b: c; }".to_string(),
        );
        let json: serde_json::Value =
            serde_json::from_str(&map.to_json().expect("json")).expect("parse");
        assert_eq!(json["version"], 3);
        assert_eq!(json["file"], "app.css");
        assert_eq!(json["sources"][0], "../sass/app.scss");
        assert_eq!(json["sourcesContent"][0], "a { b: c; }");
        assert_eq!(json["mappings"], "AAAA");
    }
}
