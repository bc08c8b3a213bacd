use crate::compile::CompileMode;
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// The file format a manuscript is exported as
///
/// The format only decides the document around the compiled chapters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// html
    Html,
    /// word
    Word,
    /// epub
    Epub,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat::Html
    }
}

/// Unknown export format {0:?}
#[derive(Debug, Error, Display)]
pub struct UnknownFormat(String);

impl FromStr for ExportFormat {
    type Err = UnknownFormat;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(Self::Html),
            "word" | "doc" | "docx" => Ok(Self::Word),
            "epub" => Ok(Self::Epub),
            _ => Err(UnknownFormat(s.to_owned())),
        }
    }
}

const BYTE_ORDER_MARK: char = '\u{feff}';

const WORD_ROOT: &str = "<html xmlns:o=\"urn:schemas-microsoft-com:office:office\" \
xmlns:w=\"urn:schemas-microsoft-com:office:word\" \
xmlns=\"http://www.w3.org/TR/REC-html40\">";

const HTML_ROOT: &str = "<!DOCTYPE html>\n<html lang=\"en\">";

const STYLE: &str = "\
body { font-family: 'Times New Roman', serif; line-height: 1.5; font-size: 12pt; color: #000; }
h1 { page-break-before: always; font-size: 24pt; margin-top: 2em; margin-bottom: 1em; }
p { margin-bottom: 1em; text-indent: 1.5em; }
.suggestion-add { background-color: #dcfce7; color: #166534; }
.suggestion-del { background-color: #fee2e2; color: #991b1b; text-decoration: line-through; }
.comment-mark { background-color: #fef9c3; }
.compile-error { color: #991b1b; font-style: italic; }
";

impl ExportFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ExportFormat::Word => "application/msword",
            ExportFormat::Html | ExportFormat::Epub => "text/html",
        }
    }

    /// Epub is exported as an HTML package that ebook tools import
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Word => "doc",
            ExportFormat::Html | ExportFormat::Epub => "html",
        }
    }

    pub fn file_name(&self, mode: CompileMode) -> String {
        format!("Manuscript_{}.{}", mode, self.extension())
    }

    /// Wrap the compiled body in this format's document
    pub fn wrap(&self, body: &str) -> String {
        let mut out = String::with_capacity(body.len() + STYLE.len() + 256);
        match self {
            ExportFormat::Word => {
                out.push(BYTE_ORDER_MARK);
                out.push_str(WORD_ROOT);
            }
            ExportFormat::Html | ExportFormat::Epub => out.push_str(HTML_ROOT),
        }
        out.push_str("\n<head>\n<meta charset=\"utf-8\">\n<title>Manuscript</title>\n<style>\n");
        out.push_str(STYLE);
        out.push_str("</style>\n</head>\n<body>\n");
        out.push_str(body);
        out.push_str("\n</body>\n</html>\n");
        out
    }
}
