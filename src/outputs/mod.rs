//! Durable outputs: per-batch record logs and the failure report.
//!
//! # Submodules
//!
//! - [`jsonl`]: Append-only success/failure logs and their lenient readers
//! - [`report`]: Failure counts per batch and requeueing of noisy batches
//!
//! # Output Structure
//!
//! ```text
//! <base>/<site>/
//! ├── unseen/                     # pending URL lists
//! │   └── st_2024_01.txt
//! ├── seen/                       # processed URL lists
//! ├── scraped/
//! │   └── st_2024_01.jsonl        # one article object per line
//! └── unsuccessful/
//!     └── st_2024_01_errors.jsonl # ["ERROR", url, message, trace] per line
//! ```

pub mod jsonl;
pub mod report;
