use std::fmt::{Display, Error, Formatter};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::schema::*;

//
// Platforms
//

/// A streaming platform the application can link accounts with. Stored in the database as its
/// lower-case string form.
#[derive(Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
  Spotify,
  Youtube,
}

impl Platform {
  pub const ALL: [Platform; 2] = [Platform::Spotify, Platform::Youtube];

  pub fn as_str(&self) -> &'static str {
    match self {
      Platform::Spotify => "spotify",
      Platform::Youtube => "youtube",
    }
  }
}

impl Display for Platform {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
    f.write_str(self.as_str())
  }
}

#[derive(Clone, Debug, ThisError)]
#[error("'{0}' is not a known platform")]
pub struct ParsePlatformError(pub String);

impl FromStr for Platform {
  type Err = ParsePlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "spotify" => Ok(Platform::Spotify),
      "youtube" => Ok(Platform::Youtube),
      _ => Err(ParsePlatformError(s.to_owned())),
    }
  }
}

//
// Canonical track data, and its per-platform linkage.
//

// Track

#[derive(Clone, PartialOrd, PartialEq, Debug, Identifiable, Queryable, AsChangeset, Serialize, Deserialize)]
#[table_name = "track"]
#[changeset_options(treat_none_as_null = "true")]
pub struct Track {
  pub id: i32,
  pub title: String,
  pub artist: String,
  pub album: Option<String>,
  pub duration_ms: Option<i32>,
  pub created_at: NaiveDateTime,
  pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[table_name = "track"]
pub struct NewTrack {
  pub title: String,
  pub artist: String,
  pub album: Option<String>,
  pub duration_ms: Option<i32>,
  pub created_at: NaiveDateTime,
  pub updated_at: NaiveDateTime,
}

// Track platform info

#[derive(Clone, PartialOrd, PartialEq, Debug, Identifiable, Queryable, Associations, AsChangeset, Serialize, Deserialize)]
#[belongs_to(Track)]
#[table_name = "track_platform_info"]
#[changeset_options(treat_none_as_null = "true")]
pub struct TrackPlatformInfo {
  pub id: i32,
  pub track_id: i32,
  pub platform: String,
  pub platform_id: String,
  pub url: Option<String>,
  pub created_at: NaiveDateTime,
  pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[table_name = "track_platform_info"]
pub struct NewTrackPlatformInfo {
  pub track_id: i32,
  pub platform: String,
  pub platform_id: String,
  pub url: Option<String>,
  pub created_at: NaiveDateTime,
  pub updated_at: NaiveDateTime,
}

//
// Normalized platform records, pre-reconciliation.
//

/// A platform-agnostic normalized representation of a raw platform record, as produced by the
/// per-platform normalizers. Title, artist, and platform_id are mandatory; the rest is
/// best-effort metadata.
#[derive(Clone, PartialOrd, PartialEq, Debug, Serialize, Deserialize)]
pub struct TrackCandidate {
  pub title: String,
  pub artist: String,
  pub album: Option<String>,
  pub duration_ms: Option<i32>,
  pub platform_id: String,
  pub url: Option<String>,
}

impl TrackCandidate {
  /// Returns the name of the first missing mandatory field, if any.
  pub fn missing_mandatory_field(&self) -> Option<&'static str> {
    if self.title.is_empty() { return Some("title"); }
    if self.artist.is_empty() { return Some("artist"); }
    if self.platform_id.is_empty() { return Some("platform_id"); }
    None
  }
}

//
// User and user data
//

// User

#[derive(Clone, PartialOrd, Ord, PartialEq, Eq, Hash, Debug, Identifiable, Queryable, Serialize, Deserialize)]
#[table_name = "user"]
pub struct User {
  pub id: i32,
  pub name: String,
}

#[derive(Clone, PartialOrd, Ord, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct UserLogin {
  pub name: String,
  pub password: String,
}

#[derive(Clone, PartialOrd, Ord, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct NewUser {
  pub name: String,
  pub password: String,
}

// User saved track

#[derive(Clone, PartialOrd, PartialEq, Debug, Identifiable, Queryable, Associations, Serialize, Deserialize)]
#[belongs_to(User)]
#[belongs_to(Track)]
#[table_name = "user_saved_track"]
pub struct UserSavedTrack {
  pub id: i32,
  pub user_id: i32,
  pub track_id: i32,
  pub platform: String,
  pub created_at: NaiveDateTime,
  pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[table_name = "user_saved_track"]
pub struct NewUserSavedTrack {
  pub user_id: i32,
  pub track_id: i32,
  pub platform: String,
  pub created_at: NaiveDateTime,
  pub updated_at: NaiveDateTime,
}

//
// Platform credentials and action log
//

// Platform credential

#[derive(Clone, PartialOrd, PartialEq, Debug, Identifiable, Queryable, Associations, AsChangeset, Serialize, Deserialize)]
#[belongs_to(User)]
#[table_name = "platform_credential"]
#[changeset_options(treat_none_as_null = "true")]
pub struct PlatformCredential {
  pub id: i32,
  pub user_id: i32,
  pub platform: String,
  pub access_token: String,
  pub refresh_token: Option<String>,
  pub expiry_date: Option<NaiveDateTime>,
  pub scope: Option<String>,
  pub created_at: NaiveDateTime,
  pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[table_name = "platform_credential"]
pub struct NewPlatformCredential {
  pub user_id: i32,
  pub platform: String,
  pub access_token: String,
  pub refresh_token: Option<String>,
  pub expiry_date: Option<NaiveDateTime>,
  pub scope: Option<String>,
  pub created_at: NaiveDateTime,
  pub updated_at: NaiveDateTime,
}

// Platform action log

#[derive(Clone, PartialOrd, PartialEq, Debug, Identifiable, Queryable, Associations, Serialize, Deserialize)]
#[belongs_to(User)]
#[table_name = "platform_action_log"]
pub struct PlatformActionLog {
  pub id: i32,
  pub user_id: i32,
  pub platform: String,
  pub action: String,
  pub metadata: String,
  pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[table_name = "platform_action_log"]
pub struct NewPlatformActionLog {
  pub user_id: i32,
  pub platform: String,
  pub action: String,
  pub metadata: String,
  pub created_at: NaiveDateTime,
}

//
// Display implementations
//

impl Display for Track {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
    write!(f, "{:>6}: {:<50} - {:<30}", self.id, self.title, self.artist)?;
    if let Some(album) = &self.album {
      write!(f, " ({})", album)?;
    }
    if let Some(duration_ms) = self.duration_ms {
      let duration_s = duration_ms / 1000;
      write!(f, " [{}:{:02}]", duration_s / 60, duration_s % 60)?;
    }
    Ok(())
  }
}

impl Display for TrackPlatformInfo {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
    write!(f, "{}: {} ({})", self.platform, self.track_id, self.platform_id)
  }
}

impl Display for User {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
    write!(f, "{:>6}: {}", self.id, self.name)
  }
}
