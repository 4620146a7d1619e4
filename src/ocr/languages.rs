//! Static catalog of OCR language codes

use serde::Serialize;

/// An OCR language, identified by its Tesseract-style code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

const CATALOG: &[Language] = &[
    Language { code: "eng", name: "English" },
    Language { code: "deu", name: "German" },
    Language { code: "fra", name: "French" },
    Language { code: "spa", name: "Spanish" },
    Language { code: "ita", name: "Italian" },
    Language { code: "por", name: "Portuguese" },
    Language { code: "nld", name: "Dutch" },
    Language { code: "pol", name: "Polish" },
    Language { code: "rus", name: "Russian" },
    Language { code: "ara", name: "Arabic" },
    Language { code: "hin", name: "Hindi" },
    Language { code: "jpn", name: "Japanese" },
    Language { code: "kor", name: "Korean" },
    Language { code: "chi_sim", name: "Chinese (Simplified)" },
    Language { code: "chi_tra", name: "Chinese (Traditional)" },
];

/// Every language code a caller may request.
pub fn supported_languages() -> &'static [Language] {
    CATALOG
}

pub fn find(code: &str) -> Option<&'static Language> {
    CATALOG.iter().find(|language| language.code == code)
}

pub fn is_supported(code: &str) -> bool {
    find(code).is_some()
}
