//! Source languages the loader and splitter understand.
//!
//! Each language contributes the file globs the loader selects and the
//! ordered separator list the splitter tries, from the most structural
//! (top-level definitions) down to plain whitespace.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    Rust,
    JavaScript,
    TypeScript,
    Go,
    Java,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Python,
        Language::Rust,
        Language::JavaScript,
        Language::TypeScript,
        Language::Go,
        Language::Java,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Rust => "rust",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
        }
    }

    /// Glob patterns (relative to the repository root) selecting this
    /// language's files.
    pub fn include_globs(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["**/*.py"],
            Language::Rust => &["**/*.rs"],
            Language::JavaScript => &["**/*.js", "**/*.jsx", "**/*.mjs"],
            Language::TypeScript => &["**/*.ts", "**/*.tsx"],
            Language::Go => &["**/*.go"],
            Language::Java => &["**/*.java"],
        }
    }

    /// Separators in priority order. The splitter keeps each separator at
    /// the start of the piece that follows it.
    pub fn separators(self) -> &'static [&'static str] {
        match self {
            Language::Python => &[
                "\nclass ",
                "\ndef ",
                "\n\tdef ",
                "\n    def ",
                "\n\n",
                "\n",
                " ",
            ],
            Language::Rust => &[
                "\nfn ",
                "\npub fn ",
                "\nimpl ",
                "\nstruct ",
                "\npub struct ",
                "\nenum ",
                "\npub enum ",
                "\nmod ",
                "\n    fn ",
                "\n    pub fn ",
                "\n\n",
                "\n",
                " ",
            ],
            Language::JavaScript | Language::TypeScript => &[
                "\nfunction ",
                "\nexport ",
                "\nclass ",
                "\nconst ",
                "\nlet ",
                "\nif ",
                "\nfor ",
                "\nwhile ",
                "\n\n",
                "\n",
                " ",
            ],
            Language::Go => &[
                "\nfunc ",
                "\ntype ",
                "\nvar ",
                "\nconst ",
                "\n\n",
                "\n",
                " ",
            ],
            Language::Java => &[
                "\nclass ",
                "\npublic ",
                "\nprotected ",
                "\nprivate ",
                "\nstatic ",
                "\n    public ",
                "\n    private ",
                "\n\n",
                "\n",
                " ",
            ],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!(
                    "Unknown language: '{}'. Must be one of: python, rust, javascript, typescript, go, java",
                    s
                )
            })
    }
}
