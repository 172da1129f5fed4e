use itertools::Itertools;

use crosstune_core::model::TrackCandidate;

use super::{PlatformNormalizer, ARTIST_DELIMITER};

/// Normalizer for raw Spotify track objects. Spotify is a music-only catalog, so records are only
/// rejected when a mandatory field is absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpotifyNormalizer;

impl PlatformNormalizer for SpotifyNormalizer {
  type Raw = crosstune_spotify_client::Track;

  fn normalize(&self, raw: &Self::Raw) -> Option<TrackCandidate> {
    if raw.id.is_empty() || raw.name.is_empty() || raw.artists.is_empty() {
      return None;
    }
    let artist = raw.artists.iter().map(|artist| artist.name.as_str()).join(ARTIST_DELIMITER);
    if artist.is_empty() {
      return None;
    }
    let album = Some(raw.album.name.clone()).filter(|name| !name.is_empty());
    let duration_ms = i32::try_from(raw.duration_ms).ok().filter(|duration_ms| *duration_ms > 0);
    Some(TrackCandidate {
      title: raw.name.clone(),
      artist,
      album,
      duration_ms,
      platform_id: raw.id.clone(),
      url: raw.external_urls.spotify.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use crosstune_spotify_client::{AlbumSimple, ArtistSimple, ExternalUrls, Track};

  use super::*;

  fn raw_track() -> Track {
    Track {
      id: "4u7EnebtmKWzUH433cf5Qv".to_owned(),
      name: "Bohemian Rhapsody".to_owned(),
      artists: vec![ArtistSimple { id: "1dfeR4HaWDbWqFHLkxsg1d".to_owned(), name: "Queen".to_owned() }],
      album: AlbumSimple { id: "1GbtB4zTqAsyfZEsm1RZfx".to_owned(), name: "A Night at the Opera".to_owned() },
      duration_ms: 354_320,
      external_urls: ExternalUrls { spotify: Some("https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv".to_owned()) },
    }
  }

  #[test]
  fn normalizes_all_fields() {
    let candidate = SpotifyNormalizer.normalize(&raw_track()).unwrap();
    assert_eq!(candidate.title, "Bohemian Rhapsody");
    assert_eq!(candidate.artist, "Queen");
    assert_eq!(candidate.album.as_deref(), Some("A Night at the Opera"));
    assert_eq!(candidate.duration_ms, Some(354_320));
    assert_eq!(candidate.platform_id, "4u7EnebtmKWzUH433cf5Qv");
    assert_eq!(candidate.url.as_deref(), Some("https://open.spotify.com/track/4u7EnebtmKWzUH433cf5Qv"));
  }

  #[test]
  fn joins_multiple_artists_with_the_fixed_delimiter() {
    let mut raw = raw_track();
    raw.artists.push(ArtistSimple { id: "0oSGxfWSnnOXhD2fKuz2Gy".to_owned(), name: "David Bowie".to_owned() });
    let candidate = SpotifyNormalizer.normalize(&raw).unwrap();
    assert_eq!(candidate.artist, "Queen, David Bowie");
  }

  #[test]
  fn rejects_records_without_mandatory_fields() {
    let mut raw = raw_track();
    raw.artists.clear();
    assert!(SpotifyNormalizer.normalize(&raw).is_none());

    let mut raw = raw_track();
    raw.name.clear();
    assert!(SpotifyNormalizer.normalize(&raw).is_none());
  }

  #[test]
  fn missing_duration_stays_unknown() {
    let mut raw = raw_track();
    raw.duration_ms = 0;
    let candidate = SpotifyNormalizer.normalize(&raw).unwrap();
    assert_eq!(candidate.duration_ms, None);
  }
}
