// SPDX-License-Identifier: GPL-3.0-or-later
//! Evidence extraction, release scoring, confidence tiering, and
//! multi-provider fusion. Everything here is pure except for the sidecar
//! tag reads in `evidence`; provider network I/O lives in
//! `resonance-providers` behind the `ProviderClient` trait.

pub mod evidence;
pub mod fusion;
pub mod identify;
pub mod matchkey;
pub mod scoring;

pub use evidence::{extract_evidence, read_existing_tags, read_sidecar_signal, RawTrack};
pub use fusion::{CombinedProviderClient, NamedProvider};
pub use identify::{identify, IdentifierError, ProviderClient};
pub use scoring::{calculate_tier, merge_and_rank_candidates, score_release, ScoringThresholds, SCORING_V1_THRESHOLDS, SCORING_VERSION};
