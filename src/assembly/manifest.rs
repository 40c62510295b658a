//! Chapter manifest and its FFMETADATA rendering.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One chapter's span in the assembled audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestChapter {
    pub title: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Ordered chapter spans plus sanitised book metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyManifest {
    pub title: String,
    pub author: String,
    pub duration_ms: u64,
    pub chapters: Vec<ManifestChapter>,
}

impl AssemblyManifest {
    /// Render as an `;FFMETADATA1` file with millisecond chapter timestamps.
    ///
    /// ```
    /// use audiobook_converter::assembly::{AssemblyManifest, ManifestChapter};
    ///
    /// let m = AssemblyManifest {
    ///     title: "Book".into(),
    ///     author: "A=B".into(),
    ///     duration_ms: 1500,
    ///     chapters: vec![ManifestChapter { title: "One".into(), start_ms: 0, end_ms: 1500 }],
    /// };
    /// let meta = m.to_ffmetadata();
    /// assert!(meta.starts_with(";FFMETADATA1\n"));
    /// assert!(meta.contains("artist=A\\=B\n"));
    /// assert!(meta.contains("[CHAPTER]\nTIMEBASE=1/1000\nSTART=0\nEND=1500\ntitle=One\n"));
    /// ```
    pub fn to_ffmetadata(&self) -> String {
        let mut out = String::from(";FFMETADATA1\n");
        out.push_str(&format!("title={}\n", escape_ffmetadata(&self.title)));
        out.push_str(&format!("artist={}\n", escape_ffmetadata(&self.author)));
        out.push_str(&format!("album={}\n", escape_ffmetadata(&self.title)));
        for ch in &self.chapters {
            out.push_str("\n[CHAPTER]\nTIMEBASE=1/1000\n");
            out.push_str(&format!("START={}\nEND={}\n", ch.start_ms, ch.end_ms));
            out.push_str(&format!("title={}\n", escape_ffmetadata(&ch.title)));
        }
        out
    }

    pub fn write_ffmetadata(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_ffmetadata())
    }

    /// Write the manifest as pretty JSON.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    pub fn read_json(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// `<output>.chapters.json`, next to the final artifact.
pub fn manifest_path_for(output: &Path) -> PathBuf {
    let mut name: OsString = output.as_os_str().to_os_string();
    name.push(".chapters.json");
    PathBuf::from(name)
}

/// Escape the characters FFMETADATA treats specially.
pub fn escape_ffmetadata(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '=' | ';' | '#' | '\\' | '\n' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}
