//! Destination layout, filename template, sanitization, tag-patch, and the
//! applier that turns a resolved directory into moved files and written
//! tags.

pub mod applier;
pub mod canon;
pub mod filename;
pub mod layout;
pub mod planner;
pub mod sanitize;
pub mod tagpatch;

pub use applier::{apply, ApplyError, ApplyReport, AppliedFile, MetaJsonTagWriter, MutagenTagWriter, TagWriter};
pub use canon::{NameCanonicalizer, NameCategory, NoopCanonicalizer};
pub use filename::build_filename;
pub use layout::{compute_destination_path, LayoutInput};
pub use planner::{plan, ConflictPolicy, Plan, PlanInput, PlannedFile, PlannerError, SourceTrackFile};
pub use sanitize::sanitize_segment;
pub use tagpatch::{build_patch, FileTagPatch, ResolvedBy, TagPatch};
