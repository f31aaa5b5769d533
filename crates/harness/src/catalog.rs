//! The fixed registry of test types and what each one expects as input

use std::fmt;

use serde::{Deserialize, Serialize};

/// Embedded viewers whose successful load is a test subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Viewer {
    OpenSeadragon,
    Mirador,
    AblePlayer,
}

impl Viewer {
    /// Class name of the viewer's container element
    pub fn container_class(self) -> &'static str {
        match self {
            Viewer::OpenSeadragon => "openseadragon-container",
            Viewer::Mirador => "mirador-viewer",
            Viewer::AblePlayer => "able",
        }
    }

    /// Tag that must render inside the container, if any
    pub fn rendered_tag(self) -> Option<&'static str> {
        match self {
            Viewer::OpenSeadragon | Viewer::Mirador => Some("canvas"),
            Viewer::AblePlayer => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Viewer::OpenSeadragon => "OpenSeadragon",
            Viewer::Mirador => "Mirador",
            Viewer::AblePlayer => "AblePlayer",
        }
    }
}

/// Search-page filter blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    Subject,
    Genre,
    PublicationDate,
    RelatedArchivalFonds,
}

impl Facet {
    pub const ALL: [Facet; 4] = [
        Facet::Subject,
        Facet::Genre,
        Facet::PublicationDate,
        Facet::RelatedArchivalFonds,
    ];

    pub const KEYWORDS: &'static [&'static str] =
        &["subject", "genre", "publication_date", "related_archival_fonds"];

    pub fn keyword(self) -> &'static str {
        match self {
            Facet::Subject => "subject",
            Facet::Genre => "genre",
            Facet::PublicationDate => "publication_date",
            Facet::RelatedArchivalFonds => "related_archival_fonds",
        }
    }

    pub fn element_id(self) -> &'static str {
        match self {
            Facet::Subject => "block-barriodepartments-subject",
            Facet::Genre => "block-barriodepartments-genre",
            Facet::PublicationDate => "block-barriodepartments-publicationdatecollection",
            Facet::RelatedArchivalFonds => "block-relatedarchivalfondstesting",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let key = normalize_keyword(raw);
        Self::ALL.into_iter().find(|f| f.keyword() == key)
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Shape of the `test_input` column for a test type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    None,
    /// One token out of a closed set
    Enum(&'static [&'static str]),
    Integer,
    /// Two non-empty parts joined by `|`
    Pair,
    /// Absolute http(s) URL
    Url,
}

/// Input requirements of one test type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contract {
    pub requires_input: bool,
    pub shape: InputShape,
}

impl Contract {
    const NO_INPUT: Contract = Contract {
        requires_input: false,
        shape: InputShape::None,
    };

    const fn with(shape: InputShape) -> Contract {
        Contract {
            requires_input: true,
            shape,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    SiteAvailability,
    FacetLoad,
    CollectionCount,
    ViewerLoad(Viewer),
    MiradorPageCount,
    AbleplayerTranscriptLoad,
    ElementPresent,
    InvalidLinks,
    PermalinkRedirect,
    RestOaiPmhXmlValidity,
}

impl TestType {
    pub const ALL: [TestType; 12] = [
        TestType::SiteAvailability,
        TestType::FacetLoad,
        TestType::CollectionCount,
        TestType::ViewerLoad(Viewer::OpenSeadragon),
        TestType::ViewerLoad(Viewer::Mirador),
        TestType::MiradorPageCount,
        TestType::ViewerLoad(Viewer::AblePlayer),
        TestType::AbleplayerTranscriptLoad,
        TestType::ElementPresent,
        TestType::InvalidLinks,
        TestType::PermalinkRedirect,
        TestType::RestOaiPmhXmlValidity,
    ];

    /// Keyword used in the `test_type` column
    pub fn keyword(self) -> &'static str {
        match self {
            TestType::SiteAvailability => "site_availability_test",
            TestType::FacetLoad => "facet_load_test",
            TestType::CollectionCount => "collection_count_test",
            TestType::ViewerLoad(Viewer::OpenSeadragon) => "openseadragon_load_test",
            TestType::ViewerLoad(Viewer::Mirador) => "mirador_viewer_load_test",
            TestType::ViewerLoad(Viewer::AblePlayer) => "ableplayer_load_test",
            TestType::MiradorPageCount => "mirador_page_count_test",
            TestType::AbleplayerTranscriptLoad => "ableplayer_transcript_load_test",
            TestType::ElementPresent => "element_present_test",
            TestType::InvalidLinks => "invalid_links_test",
            TestType::PermalinkRedirect => "permalink_redirect_test",
            TestType::RestOaiPmhXmlValidity => "rest_oai_pmh_xml_validity_test",
        }
    }

    /// Human-readable name used in logs and messages
    pub fn label(self) -> &'static str {
        match self {
            TestType::SiteAvailability => "Site Availability Test",
            TestType::FacetLoad => "Facet Load Test",
            TestType::CollectionCount => "Collection Count Test",
            TestType::ViewerLoad(Viewer::OpenSeadragon) => "OpenSeadragon Load Test",
            TestType::ViewerLoad(Viewer::Mirador) => "Mirador Load Test",
            TestType::ViewerLoad(Viewer::AblePlayer) => "AblePlayer Load Test",
            TestType::MiradorPageCount => "Mirador Page Count Test",
            TestType::AbleplayerTranscriptLoad => "AblePlayer Transcript Load Test",
            TestType::ElementPresent => "Element Present Test",
            TestType::InvalidLinks => "Invalid Links Test",
            TestType::PermalinkRedirect => "Permalink Redirect Test",
            TestType::RestOaiPmhXmlValidity => "REST OAI-PMH XML Validity Test",
        }
    }

    /// Case-insensitive; spaces and hyphens count as underscores.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = normalize_keyword(raw);
        Self::ALL.into_iter().find(|t| t.keyword() == key)
    }

    pub fn contract(self) -> Contract {
        match self {
            TestType::SiteAvailability
            | TestType::ViewerLoad(_)
            | TestType::AbleplayerTranscriptLoad
            | TestType::InvalidLinks
            | TestType::RestOaiPmhXmlValidity => Contract::NO_INPUT,
            TestType::FacetLoad => Contract::with(InputShape::Enum(Facet::KEYWORDS)),
            TestType::CollectionCount | TestType::MiradorPageCount => {
                Contract::with(InputShape::Integer)
            }
            TestType::ElementPresent => Contract::with(InputShape::Pair),
            TestType::PermalinkRedirect => Contract::with(InputShape::Url),
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

fn normalize_keyword(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}
