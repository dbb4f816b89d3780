use std::fmt;

use bytes::Bytes;
use serde::{Serialize, Deserialize};

/// Product type that scopes which templates are offered.
///
/// Anything outside the known list is kept verbatim in `Other` and forwarded to the thumbnail
/// service, which is responsible for rejecting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Blankets,
    Hoodies,
    Mugs,
    Ornaments,
    Phone,
    Pillows,
    Puzzles,
    Sweatshirts,
    Totes,
    Tshirt,
    Tumblers,
    Other(String),
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Blankets,
        Category::Hoodies,
        Category::Mugs,
        Category::Ornaments,
        Category::Phone,
        Category::Pillows,
        Category::Puzzles,
        Category::Sweatshirts,
        Category::Totes,
        Category::Tshirt,
        Category::Tumblers,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Category::Blankets => "blankets",
            Category::Hoodies => "hoodies",
            Category::Mugs => "mugs",
            Category::Ornaments => "ornaments",
            Category::Phone => "phone",
            Category::Pillows => "pillows",
            Category::Puzzles => "puzzles",
            Category::Sweatshirts => "sweatshirts",
            Category::Totes => "totes",
            Category::Tshirt => "tshirt",
            Category::Tumblers => "tumblers",
            Category::Other(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Category::Other(_))
    }
}

impl From<String> for Category {
    fn from(raw: String) -> Self {
        Category::ALL
            .iter()
            .find(|c| c.as_str() == raw)
            .cloned()
            .unwrap_or(Category::Other(raw))
    }
}

impl From<&str> for Category {
    fn from(raw: &str) -> Self { Category::from(raw.to_string()) }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        match c {
            Category::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WizardStep {
    CategorySelect = 1,
    Upload = 2,
    ThumbnailSelect = 3,
    Results = 4,
}

impl WizardStep {
    pub fn number(self) -> u8 { self as u8 }
}

/// A file chosen by the user, before upload.
#[derive(Debug, Clone)]
pub struct DesignFile {
    pub name: String,
    pub bytes: Bytes,
}

impl DesignFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self { name: name.into(), bytes: bytes.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDesign {
    pub file_name: String,
    /// Object-storage key the file was written to; this is what the generation service receives.
    pub storage_key: String,
    pub preview_data_uri: String,
}

/// Mockup ids come back as numbers from some generators and as strings from others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MockupId {
    Number(i64),
    Text(String),
}

impl fmt::Display for MockupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MockupId::Number(n) => write!(f, "{n}"),
            MockupId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedMockup {
    pub id: MockupId,
    pub template_name: String,
    pub design_name: String,
    pub mockup_key: String,
}

// --- Wire types for the external services ---

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    pub file_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub upload_url: String,
    /// Some deployments report the storage key they signed for; older ones key by file name.
    #[serde(default)]
    pub key: Option<String>,
}

/// Where a design should be PUT and under which key it will be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub upload_url: String,
    pub storage_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GenerateMockupsRequest {
    pub templates: Vec<String>,
    pub designs: Vec<String>,
    pub category: Category,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateMockupsResponse {
    pub mockups: Vec<GeneratedMockup>,
}

// --- Wire types for the wizard API ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SelectCategoryRequest {
    pub category: Category,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToggleThumbnailRequest {
    pub thumbnail: String,
}
