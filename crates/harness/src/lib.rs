//! SiteWatch check harness
//!
//! Turns rows of a monitoring sheet into verified page checks:
//! - Validates every row against the catalog of test types before anything runs
//! - Dispatches each row to a page predicate and normalizes the result
//! - Probes outbound links concurrently over plain HTTP
//! - Drives a real browser through W3C WebDriver
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RawRow ──validate_batch──▶ TestRow ──Check::from_row──▶    │
//! │                                                             │
//! │  Dispatcher (sequential, one Outcome per row)               │
//! │    ├── PageHandle predicates                                │
//! │    │     ├── is_available        (HttpProbe + PageDriver)   │
//! │    │     ├── contains_element / facet_present               │
//! │    │     ├── collection_count / mirador_page_count          │
//! │    │     ├── viewer_loaded / ableplayer_transcript_status   │
//! │    │     ├── redirect_target / is_valid_oai_pmh_xml         │
//! │    │     └── harvest_links ──▶ LinkChecker (bounded fan-out)│
//! │    └── timeout per row ──▶ Passed | Failed | Errored        │
//! │                                                             │
//! │  ReportSink ◀── Outcome          Report ──▶ JSON            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod dispatch;
pub mod driver;
pub mod driver_process;
pub mod error;
pub mod links;
pub mod pages;
pub mod probe;
pub mod report;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validate;
pub mod webdriver;

pub use catalog::{Facet, TestType, Viewer};
pub use dispatch::{DispatchSettings, Dispatcher, Outcome, Verdict};
pub use driver::{Locator, PageDriver};
pub use error::{DriverError, HarnessError, HarnessResult, ValidationError};
pub use pages::WaitPolicy;
pub use probe::{AvailabilityPolicy, HttpProbe, ReqwestProbe};
pub use report::{Report, ReportSink};
pub use validate::{validate_batch, RawRow, TestRow};
pub use webdriver::{Browser, WebDriverConfig, WebDriverSession};
