use crosstune_core::model::TrackCandidate;

/// Default similarity threshold; both the title and artist ratios must reach it.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

/// Case-insensitive normalized similarity ratio in `[0, 1]`, where 1.0 is an exact match after
/// case folding. Symmetric, and non-increasing as edit distance grows.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
  strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Whether `candidate` denotes the same song as the given title and artist: both the title ratio
/// and the artist ratio must be at least `threshold`.
pub fn is_match(candidate: &TrackCandidate, title: &str, artist: &str, threshold: f64) -> bool {
  similarity_ratio(&candidate.title, title) >= threshold
    && similarity_ratio(&candidate.artist, artist) >= threshold
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(title: &str, artist: &str) -> TrackCandidate {
    TrackCandidate {
      title: title.to_owned(),
      artist: artist.to_owned(),
      album: None,
      duration_ms: None,
      platform_id: "id".to_owned(),
      url: None,
    }
  }

  #[test]
  fn exact_match_has_ratio_one() {
    assert_eq!(similarity_ratio("Bohemian Rhapsody", "Bohemian Rhapsody"), 1.0);
    assert!(is_match(&candidate("Bohemian Rhapsody", "Queen"), "Bohemian Rhapsody", "Queen", DEFAULT_MATCH_THRESHOLD));
  }

  #[test]
  fn match_is_case_insensitive() {
    assert_eq!(similarity_ratio("bohemian rhapsody", "BOHEMIAN RHAPSODY"), 1.0);
    assert!(is_match(&candidate("bohemian rhapsody", "QUEEN"), "Bohemian Rhapsody", "Queen", DEFAULT_MATCH_THRESHOLD));
  }

  #[test]
  fn unrelated_tracks_do_not_match() {
    assert!(!is_match(&candidate("Stairway to Heaven", "Led Zeppelin"), "Bohemian Rhapsody", "Queen", DEFAULT_MATCH_THRESHOLD));
  }

  #[test]
  fn near_duplicate_titles_match() {
    assert!(is_match(
      &candidate("Bohemian Rhapsody (Remastered)", "Queen"),
      "Bohemian Rhapsody",
      "Queen",
      DEFAULT_MATCH_THRESHOLD,
    ));
  }

  #[test]
  fn both_sides_must_reach_the_threshold() {
    // Same title, unrelated artist: a cover must not match on title similarity alone.
    assert!(!is_match(&candidate("Bohemian Rhapsody", "Led Zeppelin"), "Bohemian Rhapsody", "Queen", DEFAULT_MATCH_THRESHOLD));
  }

  #[test]
  fn ratio_is_symmetric() {
    let a = "Bohemian Rhapsody";
    let b = "Bohemian Rapsody";
    assert_eq!(similarity_ratio(a, b), similarity_ratio(b, a));
  }
}
