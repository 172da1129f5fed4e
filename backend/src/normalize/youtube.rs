use crosstune_core::model::TrackCandidate;
use crosstune_youtube_client::MUSIC_CATEGORY_ID;

use super::{iso8601_duration_ms, split_combined_title, strip_title_noise, PlatformNormalizer};

/// Normalizer for raw YouTube video objects. Only videos in the music category become track
/// candidates; everything else a user likes on YouTube is rejected.
///
/// YouTube has no structured artist/title fields, so a combined "Artist - Title" video title is
/// split on the first hyphen and cleaned of "(Official Video)"-style noise. The heuristic is
/// best-effort and allowed to be wrong; when it does not apply, the channel title stands in for
/// the artist.
#[derive(Clone, Copy, Debug, Default)]
pub struct YoutubeNormalizer;

impl PlatformNormalizer for YoutubeNormalizer {
  type Raw = crosstune_youtube_client::Video;

  fn normalize(&self, raw: &Self::Raw) -> Option<TrackCandidate> {
    if raw.id.is_empty() || raw.snippet.title.is_empty() {
      return None;
    }
    if raw.snippet.category_id.as_deref() != Some(MUSIC_CATEGORY_ID) {
      return None;
    }
    let (artist, title) = match split_combined_title(&raw.snippet.title) {
      Some((artist, title)) => (artist, strip_title_noise(&title)),
      None => (raw.snippet.channel_title.clone(), strip_title_noise(&raw.snippet.title)),
    };
    if artist.is_empty() || title.is_empty() {
      return None;
    }
    // Durations come as ISO-8601 strings; unparseable ones degrade to unknown. Live content is
    // reported as zero-length by the platform, and the zero is passed through as-is.
    let duration_ms = raw.content_details.as_ref().and_then(|content_details| iso8601_duration_ms(&content_details.duration));
    Some(TrackCandidate {
      title,
      artist,
      album: None,
      duration_ms,
      platform_id: raw.id.clone(),
      url: Some(format!("https://www.youtube.com/watch?v={}", raw.id)),
    })
  }
}

#[cfg(test)]
mod tests {
  use crosstune_youtube_client::{ContentDetails, Video, VideoSnippet};

  use super::*;

  fn raw_video(title: &str) -> Video {
    Video {
      id: "fJ9rUzIMcZQ".to_owned(),
      snippet: VideoSnippet {
        title: title.to_owned(),
        channel_title: "Queen Official".to_owned(),
        category_id: Some(MUSIC_CATEGORY_ID.to_owned()),
      },
      content_details: Some(ContentDetails { duration: "PT5M59S".to_owned() }),
    }
  }

  #[test]
  fn splits_combined_title_and_strips_noise() {
    let candidate = YoutubeNormalizer.normalize(&raw_video("Queen - Bohemian Rhapsody (Official Video)")).unwrap();
    assert_eq!(candidate.artist, "Queen");
    assert_eq!(candidate.title, "Bohemian Rhapsody");
    assert_eq!(candidate.duration_ms, Some(359_000));
    assert_eq!(candidate.platform_id, "fJ9rUzIMcZQ");
    assert_eq!(candidate.url.as_deref(), Some("https://www.youtube.com/watch?v=fJ9rUzIMcZQ"));
  }

  #[test]
  fn falls_back_to_channel_title_without_a_hyphen() {
    let candidate = YoutubeNormalizer.normalize(&raw_video("Bohemian Rhapsody [HD]")).unwrap();
    assert_eq!(candidate.artist, "Queen Official");
    assert_eq!(candidate.title, "Bohemian Rhapsody");
  }

  #[test]
  fn rejects_non_music_categories() {
    let mut raw = raw_video("Queen - Bohemian Rhapsody");
    raw.snippet.category_id = Some("22".to_owned());
    assert!(YoutubeNormalizer.normalize(&raw).is_none());

    let mut raw = raw_video("Queen - Bohemian Rhapsody");
    raw.snippet.category_id = None;
    assert!(YoutubeNormalizer.normalize(&raw).is_none());
  }

  #[test]
  fn live_content_passes_zero_duration_through() {
    let mut raw = raw_video("Queen - Bohemian Rhapsody");
    raw.content_details = Some(ContentDetails { duration: "P0D".to_owned() });
    let candidate = YoutubeNormalizer.normalize(&raw).unwrap();
    assert_eq!(candidate.duration_ms, Some(0));
  }

  #[test]
  fn unparseable_duration_degrades_to_unknown() {
    let mut raw = raw_video("Queen - Bohemian Rhapsody");
    raw.content_details = Some(ContentDetails { duration: "5:59".to_owned() });
    let candidate = YoutubeNormalizer.normalize(&raw).unwrap();
    assert_eq!(candidate.duration_ms, None);
  }
}
