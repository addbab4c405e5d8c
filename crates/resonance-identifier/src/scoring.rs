//! Deterministic release scoring and confidence tiering.
//!
//! Port of the v1 scoring model: fingerprint coverage is the dominant
//! signal, track/disc count agreement and duration fit fill the rest, and a
//! small penalty discourages matching a handful of tracks to a much larger
//! album release.

use std::collections::BTreeSet;

use resonance_domain::{ConfidenceTier, DirectoryEvidence, ProviderRelease, ReleaseKind, ReleaseScore};

#[derive(Debug, Clone, Copy)]
pub struct ScoringThresholds {
    pub fingerprint_weight: f64,
    pub track_count_weight: f64,
    pub duration_weight: f64,
    pub certain_min_score: f64,
    pub certain_min_coverage: f64,
    pub probable_min_score: f64,
    pub multi_release_min_support: f64,
    pub conflict_gap_max: f64,
}

/// Scoring version "v1".
pub const SCORING_V1_THRESHOLDS: ScoringThresholds = ScoringThresholds {
    fingerprint_weight: 0.6,
    track_count_weight: 0.2,
    duration_weight: 0.2,
    certain_min_score: 0.85,
    certain_min_coverage: 0.85,
    probable_min_score: 0.65,
    multi_release_min_support: 0.30,
    conflict_gap_max: 0.15,
};

pub const SCORING_VERSION: &str = "v1";

fn disc_numbers_from_tags(evidence: &DirectoryEvidence) -> BTreeSet<u32> {
    evidence
        .tracks
        .iter()
        .flat_map(|track| {
            ["discnumber", "disc_number"]
                .iter()
                .filter_map(|key| track.existing_tags.get(*key))
                .filter_map(|v| v.trim().parse::<u32>().ok())
        })
        .collect()
}

fn infer_release_kind(release: &ProviderRelease) -> ReleaseKind {
    ReleaseKind::infer_from_track_count(release.track_count())
}

/// Score a single release candidate against directory evidence.
pub fn score_release(
    evidence: &DirectoryEvidence,
    release: &ProviderRelease,
    thresholds: &ScoringThresholds,
) -> ReleaseScore {
    let coverage = if evidence.has_fingerprints() {
        let matched = evidence
            .tracks
            .iter()
            .filter(|ev_track| {
                ev_track.fingerprint_id.as_deref().is_some_and(|fp| {
                    release
                        .tracks
                        .iter()
                        .any(|pv| pv.fingerprint_id.as_deref() == Some(fp))
                })
            })
            .count();
        if evidence.track_count > 0 {
            matched as f64 / evidence.track_count as f64
        } else {
            0.0
        }
    } else {
        0.0
    };

    let evidence_discs = disc_numbers_from_tags(evidence);
    let release_discs: BTreeSet<u32> = release.tracks.iter().filter_map(|t| t.disc_number).collect();
    let disc_count_match = if !evidence_discs.is_empty() && !release_discs.is_empty() {
        evidence_discs.len() == release_discs.len()
    } else {
        true
    };

    let track_count_match = evidence.track_count == release.track_count() && disc_count_match;

    let all_release_durations_known = !release.tracks.is_empty()
        && release.tracks.iter().all(|t| t.duration_seconds.is_some());
    let duration_fit = if evidence.total_duration_seconds > 0 && all_release_durations_known {
        let release_total: u64 = release
            .tracks
            .iter()
            .map(|t| u64::from(t.duration_seconds.unwrap_or(0)))
            .sum();
        if release_total > 0 {
            let diff = evidence.total_duration_seconds.abs_diff(release_total);
            match diff {
                0 => 1.0,
                d if d <= 5 => 0.9,
                d if d <= 30 => 0.8,
                d if d <= 60 => 0.7,
                _ => 0.5,
            }
        } else if track_count_match {
            1.0
        } else {
            0.5
        }
    } else if track_count_match {
        1.0
    } else {
        0.5
    };

    let year_penalty = 0.0;

    let mut single_album_penalty = 0.0;
    if evidence.track_count <= 3 {
        let release_kind = release.release_kind.unwrap_or_else(|| infer_release_kind(release));
        if release_kind == ReleaseKind::Album && release.track_count() >= evidence.track_count + 3 {
            single_album_penalty = 0.2;
        }
    }

    let total_score = coverage * thresholds.fingerprint_weight
        + if track_count_match { 1.0 } else { 0.0 } * thresholds.track_count_weight
        + duration_fit * thresholds.duration_weight
        - year_penalty
        - single_album_penalty;

    ReleaseScore {
        release: release.clone(),
        fingerprint_coverage: coverage,
        track_count_match,
        duration_fit,
        year_penalty,
        total_score,
    }
}

/// Sort scored releases by total score descending, then provider, then
/// release id — `ReleaseScore`'s `Ord` impl already encodes this.
pub fn merge_and_rank_candidates(mut scored: Vec<ReleaseScore>) -> Vec<ReleaseScore> {
    scored.sort();
    scored
}

/// Determine the confidence tier for a ranked candidate list.
pub fn calculate_tier(
    candidates: &[ReleaseScore],
    thresholds: &ScoringThresholds,
) -> (ConfidenceTier, Vec<String>) {
    let Some(best) = candidates.first() else {
        return (ConfidenceTier::Unsure, vec!["No candidates found".to_string()]);
    };

    if let Some(second_best) = candidates.get(1) {
        if second_best.total_score >= thresholds.multi_release_min_support
            && (best.total_score - second_best.total_score) < thresholds.conflict_gap_max
        {
            return (
                ConfidenceTier::Unsure,
                vec![format!(
                    "Multiple releases with similar scores: {:.2} vs {:.2}",
                    best.total_score, second_best.total_score
                )],
            );
        }
    }

    if best.total_score >= thresholds.certain_min_score
        && best.fingerprint_coverage >= thresholds.certain_min_coverage
        && best.track_count_match
    {
        return (
            ConfidenceTier::Certain,
            vec![format!(
                "High confidence: score={:.2}, coverage={:.2}",
                best.total_score, best.fingerprint_coverage
            )],
        );
    }

    if best.total_score >= thresholds.probable_min_score {
        return (
            ConfidenceTier::Probable,
            vec![format!("Probable match: score={:.2}", best.total_score)],
        );
    }

    (
        ConfidenceTier::Unsure,
        vec![format!("Low confidence: score={:.2}", best.total_score)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use resonance_domain::{ProviderTrack, TrackEvidence};

    fn evidence_with_fingerprints(fps: &[&str], durations: &[u32]) -> DirectoryEvidence {
        let tracks = fps
            .iter()
            .zip(durations.iter())
            .map(|(fp, dur)| TrackEvidence::new(Some(fp.to_string()), Some(*dur)))
            .collect();
        DirectoryEvidence::new(tracks)
    }

    fn release_with_tracks(provider: &str, id: &str, tracks: Vec<ProviderTrack>) -> ProviderRelease {
        ProviderRelease {
            provider: provider.to_string(),
            release_id: id.to_string(),
            title: "Title".to_string(),
            artist: "Artist".to_string(),
            tracks,
            year: None,
            release_kind: None,
        }
    }

    #[test]
    fn full_fingerprint_and_duration_match_is_certain() {
        let evidence = evidence_with_fingerprints(&["fp1", "fp2"], &[180, 200]);
        let mut t1 = ProviderTrack::new(1, "One");
        t1.fingerprint_id = Some("fp1".into());
        t1.duration_seconds = Some(180);
        let mut t2 = ProviderTrack::new(2, "Two");
        t2.fingerprint_id = Some("fp2".into());
        t2.duration_seconds = Some(200);
        let release = release_with_tracks("musicbrainz", "r1", vec![t1, t2]);

        let score = score_release(&evidence, &release, &SCORING_V1_THRESHOLDS);
        assert_eq!(score.fingerprint_coverage, 1.0);
        assert!(score.track_count_match);
        assert_eq!(score.duration_fit, 1.0);

        let (tier, _) = calculate_tier(&[score], &SCORING_V1_THRESHOLDS);
        assert_eq!(tier, ConfidenceTier::Certain);
    }

    #[test]
    fn no_fingerprints_yields_zero_coverage() {
        let evidence = DirectoryEvidence::new(vec![TrackEvidence::new(None, Some(180))]);
        let release = release_with_tracks("discogs", "d1", vec![ProviderTrack::new(1, "One")]);
        let score = score_release(&evidence, &release, &SCORING_V1_THRESHOLDS);
        assert_eq!(score.fingerprint_coverage, 0.0);
    }

    #[test]
    fn single_track_against_large_album_is_penalized() {
        let evidence = evidence_with_fingerprints(&["fp1"], &[180]);
        let mut matching_track = ProviderTrack::new(1, "One");
        matching_track.fingerprint_id = Some("fp1".into());
        matching_track.duration_seconds = Some(180);
        let mut tracks = vec![matching_track];
        for i in 2..=10 {
            tracks.push(ProviderTrack::new(i, format!("Track {i}")));
        }
        let release = release_with_tracks("musicbrainz", "album1", tracks);
        let score = score_release(&evidence, &release, &SCORING_V1_THRESHOLDS);
        // fingerprint_coverage=1.0*0.6 + track_count_match(false)=0 + duration_fit unknown(0.5*0.2) - 0.2 penalty
        assert!((score.total_score - (0.6 + 0.1 - 0.2)).abs() < 1e-9);
    }

    #[test]
    fn conflicting_close_scores_are_unsure() {
        let best = ReleaseScore {
            release: release_with_tracks("musicbrainz", "a", vec![]),
            fingerprint_coverage: 0.9,
            track_count_match: true,
            duration_fit: 0.9,
            year_penalty: 0.0,
            total_score: 0.80,
        };
        let second = ReleaseScore {
            release: release_with_tracks("discogs", "b", vec![]),
            fingerprint_coverage: 0.8,
            track_count_match: true,
            duration_fit: 0.8,
            year_penalty: 0.0,
            total_score: 0.70,
        };
        let ranked = merge_and_rank_candidates(vec![second, best]);
        let (tier, reasons) = calculate_tier(&ranked, &SCORING_V1_THRESHOLDS);
        assert_eq!(tier, ConfidenceTier::Unsure);
        assert!(reasons[0].contains("Multiple releases"));
    }

    #[test]
    fn empty_candidates_is_unsure() {
        let (tier, reasons) = calculate_tier(&[], &SCORING_V1_THRESHOLDS);
        assert_eq!(tier, ConfidenceTier::Unsure);
        assert_eq!(reasons[0], "No candidates found");
    }
}
