use itertools::Itertools;

use crosstune_core::model::TrackCandidate;

pub mod spotify;
pub mod youtube;

/// Delimiter used to join multiple artist names into the single canonical artist field.
pub const ARTIST_DELIMITER: &str = ", ";

/// Converts one raw platform record into a normalized track candidate. An implementation may
/// reject a record by returning `None`, dropping it from the batch.
pub trait PlatformNormalizer {
  type Raw;

  fn normalize(&self, raw: &Self::Raw) -> Option<TrackCandidate>;
}

/// Splits a combined "Artist - Title" string on the first hyphen. Returns `None` when there is no
/// hyphen or either side ends up empty, in which case callers fall back to the raw fields.
pub(crate) fn split_combined_title(combined: &str) -> Option<(String, String)> {
  let (artist, title) = combined.split_once('-')?;
  let artist = artist.trim();
  let title = title.trim();
  if artist.is_empty() || title.is_empty() {
    return None;
  }
  Some((artist.to_owned(), title.to_owned()))
}

/// Strips parenthesized `(...)` and bracketed `[...]` substrings ("(Official Video)" noise) from
/// a title. Falls back to the raw title when stripping would leave nothing.
pub(crate) fn strip_title_noise(title: &str) -> String {
  let mut stripped = String::with_capacity(title.len());
  let mut parenthesis_depth = 0usize;
  let mut bracket_depth = 0usize;
  for c in title.chars() {
    match c {
      '(' => parenthesis_depth += 1,
      ')' => parenthesis_depth = parenthesis_depth.saturating_sub(1),
      '[' => bracket_depth += 1,
      ']' => bracket_depth = bracket_depth.saturating_sub(1),
      _ if parenthesis_depth == 0 && bracket_depth == 0 => stripped.push(c),
      _ => {}
    }
  }
  let stripped = stripped.split_whitespace().join(" ");
  if stripped.is_empty() {
    title.trim().to_owned()
  } else {
    stripped
  }
}

/// Converts an ISO-8601 duration (`PT3M12S`) to whole milliseconds, truncating below the
/// millisecond. Returns `None` for anything unparseable; `P0D` converts to zero.
pub(crate) fn iso8601_duration_ms(duration: &str) -> Option<i32> {
  let rest = duration.strip_prefix('P')?;
  let (date_part, time_part) = match rest.split_once('T') {
    Some((date_part, time_part)) => (date_part, time_part),
    None => (rest, ""),
  };
  let mut total_ms: i64 = 0;
  let mut number = String::new();
  for c in date_part.chars() {
    if c.is_ascii_digit() {
      number.push(c);
    } else {
      let value: i64 = number.parse().ok()?;
      number.clear();
      match c {
        'D' => total_ms += value * 24 * 60 * 60 * 1000,
        'W' => total_ms += value * 7 * 24 * 60 * 60 * 1000,
        _ => return None, // Year/month designators have no fixed length in milliseconds.
      }
    }
  }
  if !number.is_empty() {
    return None;
  }
  for c in time_part.chars() {
    if c.is_ascii_digit() || c == '.' {
      number.push(c);
    } else {
      match c {
        'H' => total_ms += number.parse::<i64>().ok()? * 60 * 60 * 1000,
        'M' => total_ms += number.parse::<i64>().ok()? * 60 * 1000,
        'S' => total_ms += (number.parse::<f64>().ok()? * 1000.0).trunc() as i64,
        _ => return None,
      }
      number.clear();
    }
  }
  if !number.is_empty() {
    return None;
  }
  i32::try_from(total_ms).ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn split_on_first_hyphen() {
    assert_eq!(
      split_combined_title("Queen - Bohemian Rhapsody"),
      Some(("Queen".to_owned(), "Bohemian Rhapsody".to_owned()))
    );
    // Only the first hyphen splits; the rest stays in the title.
    assert_eq!(
      split_combined_title("Queen - Bohemian Rhapsody - Live"),
      Some(("Queen".to_owned(), "Bohemian Rhapsody - Live".to_owned()))
    );
  }

  #[test]
  fn split_requires_a_hyphen_and_two_sides() {
    assert_eq!(split_combined_title("Bohemian Rhapsody"), None);
    assert_eq!(split_combined_title(" - Bohemian Rhapsody"), None);
    assert_eq!(split_combined_title("Queen - "), None);
  }

  #[test]
  fn strip_removes_parenthesized_and_bracketed_noise() {
    assert_eq!(strip_title_noise("Bohemian Rhapsody (Official Video)"), "Bohemian Rhapsody");
    assert_eq!(strip_title_noise("Bohemian Rhapsody [HD] (Remastered)"), "Bohemian Rhapsody");
    assert_eq!(strip_title_noise("Bohemian (Live) Rhapsody"), "Bohemian Rhapsody");
  }

  #[test]
  fn strip_falls_back_on_unbalanced_or_empty_results() {
    assert_eq!(strip_title_noise("(Official Video)"), "(Official Video)");
    assert_eq!(strip_title_noise("Bohemian Rhapsody )("), "Bohemian Rhapsody");
  }

  #[test]
  fn duration_converts_to_whole_milliseconds() {
    assert_eq!(iso8601_duration_ms("PT3M12S"), Some(192_000));
    assert_eq!(iso8601_duration_ms("PT1H2M3S"), Some(3_723_000));
    assert_eq!(iso8601_duration_ms("PT2.5S"), Some(2_500));
    assert_eq!(iso8601_duration_ms("P1DT1S"), Some(86_401_000));
  }

  #[test]
  fn zero_length_live_content_converts_to_zero() {
    assert_eq!(iso8601_duration_ms("P0D"), Some(0));
  }

  #[test]
  fn unparseable_durations_are_unknown() {
    assert_eq!(iso8601_duration_ms(""), None);
    assert_eq!(iso8601_duration_ms("3:12"), None);
    assert_eq!(iso8601_duration_ms("PT3X"), None);
    assert_eq!(iso8601_duration_ms("P1Y"), None);
    assert_eq!(iso8601_duration_ms("PT3M12"), None);
  }
}
