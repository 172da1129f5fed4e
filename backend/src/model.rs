use chrono::Utc;

use crosstune_core::model::*;
use crosstune_core::schema::*;

// Helper macros

macro_rules! update {
  ($t:expr, $u:expr, $c:expr) => {
    if $t != $u {
      $t = $u;
      $c = true;
    }
  }
}

// Track

pub trait TrackEx {
  fn merge_missing_metadata(&mut self, album: Option<&str>, duration_ms: Option<i32>) -> bool;
}

impl TrackEx for Track {
  /// Fills album and duration only when they are currently missing; populated fields are never
  /// overwritten. A zero duration counts as missing on both sides, because platforms that cannot
  /// report a duration report zero.
  fn merge_missing_metadata(&mut self, album: Option<&str>, duration_ms: Option<i32>) -> bool {
    let mut changed = false;
    if self.album.is_none() {
      if let Some(album) = album {
        if !album.is_empty() {
          self.album = Some(album.to_owned());
          changed = true;
        }
      }
    }
    if matches!(self.duration_ms, None | Some(0)) {
      if let Some(duration_ms) = duration_ms {
        if duration_ms > 0 {
          self.duration_ms = Some(duration_ms);
          changed = true;
        }
      }
    }
    if changed {
      self.updated_at = Utc::now().naive_utc();
    }
    changed
  }
}

// Platform credential

pub trait PlatformCredentialEx {
  fn update_from_tokens(&mut self, access_token: &str, refresh_token: Option<&str>, expiry_date: Option<chrono::NaiveDateTime>) -> bool;
}

impl PlatformCredentialEx for PlatformCredential {
  /// Copies refreshed token material into the credential, returning whether anything changed. A
  /// missing refresh token in the update keeps the stored one, as platforms only hand out
  /// refresh tokens on the initial authorization.
  fn update_from_tokens(&mut self, access_token: &str, refresh_token: Option<&str>, expiry_date: Option<chrono::NaiveDateTime>) -> bool {
    let mut changed = false;
    update!(self.access_token, access_token.to_owned(), changed);
    if let Some(refresh_token) = refresh_token {
      update!(self.refresh_token, Some(refresh_token.to_owned()), changed);
    }
    if let Some(expiry_date) = expiry_date {
      update!(self.expiry_date, Some(expiry_date), changed);
    }
    if changed {
      self.updated_at = Utc::now().naive_utc();
    }
    changed
  }
}

// Internal user (includes password hash and salt)

#[derive(Clone, PartialOrd, Ord, PartialEq, Eq, Hash, Debug, Identifiable, Queryable, AsChangeset)]
#[table_name = "user"]
#[changeset_options(treat_none_as_null = "true")]
pub(crate) struct InternalUser {
  pub id: i32,
  pub name: String,
  pub hash: Vec<u8>,
  pub salt: Vec<u8>,
}

impl From<InternalUser> for User {
  fn from(internal_user: InternalUser) -> Self {
    User {
      id: internal_user.id,
      name: internal_user.name,
    }
  }
}

#[derive(Debug, Insertable)]
#[table_name = "user"]
pub(crate) struct InternalNewUser {
  pub name: String,
  pub hash: Vec<u8>,
  pub salt: Vec<u8>,
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn track() -> Track {
    let at = NaiveDate::from_ymd(2025, 3, 18).and_hms(10, 45, 0);
    Track {
      id: 1,
      title: "Bohemian Rhapsody".to_owned(),
      artist: "Queen".to_owned(),
      album: None,
      duration_ms: None,
      created_at: at,
      updated_at: at,
    }
  }

  #[test]
  fn merge_fills_missing_fields() {
    let mut track = track();
    assert!(track.merge_missing_metadata(Some("A Night at the Opera"), Some(354_000)));
    assert_eq!(track.album.as_deref(), Some("A Night at the Opera"));
    assert_eq!(track.duration_ms, Some(354_000));
  }

  #[test]
  fn merge_never_overwrites_populated_fields() {
    let mut track = track();
    track.album = Some("A Night at the Opera".to_owned());
    track.duration_ms = Some(354_000);
    assert!(!track.merge_missing_metadata(Some("Greatest Hits"), Some(1)));
    assert_eq!(track.album.as_deref(), Some("A Night at the Opera"));
    assert_eq!(track.duration_ms, Some(354_000));
  }

  #[test]
  fn merge_treats_zero_duration_as_missing() {
    {
      let mut track = track();
      track.duration_ms = Some(0);
      assert!(track.merge_missing_metadata(None, Some(354_000)));
      assert_eq!(track.duration_ms, Some(354_000));
    }

    let mut track = track();
    assert!(!track.merge_missing_metadata(None, Some(0)));
    assert_eq!(track.duration_ms, None);
  }
}
