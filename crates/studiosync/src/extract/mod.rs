//! Turning a rendered schedule page into lesson data.

pub mod dates;
pub mod patterns;
pub mod program;
pub mod resolver;
pub mod schedule;
pub mod status;
pub mod studios;

pub use patterns::{PatternSet, Role};
pub use program::ProgramCatalog;
pub use resolver::{first_match, resolve, Resolved};
pub use schedule::{
    Alignment, DateEntry, ExtractedLesson, Extraction, ExtractionDiagnostics, ScheduleExtractor,
    StructuralError,
};
pub use studios::{studio_options, StudioOption};
