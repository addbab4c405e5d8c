// SPDX-License-Identifier: GPL-3.0-or-later

//! Concrete `ProviderClient` implementations for MusicBrainz and Discogs.
//!
//! The core only depends on `resonance_identifier::ProviderClient`; this
//! crate is an external collaborator that happens to live in the same
//! workspace. Fusing multiple providers behind one client is
//! `resonance_identifier::fusion::CombinedProviderClient`, not anything
//! here — these clients are meant to be wrapped by that, never consulted
//! directly by the resolver.

pub mod discogs;
pub mod error;
pub mod musicbrainz;
pub mod rate_limiter;

pub use discogs::DiscogsProviderClient;
pub use error::{ProviderError, Result};
pub use musicbrainz::MusicBrainzProviderClient;
pub use rate_limiter::RateLimiter;
