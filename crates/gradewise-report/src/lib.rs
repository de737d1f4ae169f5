//! gradewise-report: Self-contained HTML rendering for grading runs and
//! quality reports.

pub mod html;

pub use html::{generate_quality_html, generate_run_html, write_quality_html, write_run_html};
