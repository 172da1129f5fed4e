use std::collections::HashSet;

use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{event, instrument, Level};

use crosstune_core::model::{NewTrack, NewTrackPlatformInfo, NewUserSavedTrack, Platform, Track, TrackCandidate, TrackPlatformInfo, User, UserSavedTrack};
use crosstune_core::schema;

use crate::matcher::{is_match, DEFAULT_MATCH_THRESHOLD};
use crate::model::TrackEx;

use super::platform::PlatformOperationError;
use super::DatabaseConnection;

// Shared find-or-create result

pub(crate) enum SelectOrInsertOne<T> {
  Selected(T),
  Inserted(T),
}

// Reconciliation

#[derive(Debug, Error)]
pub enum ReconcileError {
  #[error("Platform '{0}' is not registered")]
  UnknownPlatformFail(Platform),
  #[error("Track candidate is missing mandatory field '{0}'")]
  IncompleteCandidateFail(&'static str),
  #[error("Failed to create an asynchronous runtime")]
  RuntimeCreateFail(#[from] std::io::Error),
  #[error("Failed to execute a database query")]
  DatabaseQueryFail(#[from] diesel::result::Error),
}

impl DatabaseConnection {
  /// Reconciles `candidate`, saved by `user` through `platform`, into the library: finds or
  /// creates the canonical track, attaches the platform link, fans the track out to the other
  /// registered platforms when it is new, and records the user's saved-track association.
  ///
  /// Returns the canonical track and whether the (user, track, platform) association was newly
  /// created by this call. All writes happen in one transaction; a failure leaves no partial
  /// rows behind.
  #[instrument(level = "debug", skip(self, candidate), fields(platform_id = %candidate.platform_id))]
  pub fn reconcile(&self, user: &User, platform: Platform, candidate: &TrackCandidate) -> Result<(Track, bool), ReconcileError> {
    let runtime = Runtime::new()?;
    self.reconcile_with_runtime(&runtime, user, platform, candidate)
  }

  pub(crate) fn reconcile_with_runtime(&self, runtime: &Runtime, user: &User, platform: Platform, candidate: &TrackCandidate) -> Result<(Track, bool), ReconcileError> {
    use ReconcileError::*;
    if !self.inner.registry.contains(platform) {
      return Err(UnknownPlatformFail(platform));
    }
    if let Some(field) = candidate.missing_mandatory_field() {
      return Err(IncompleteCandidateFail(field));
    }
    self.connection.transaction(|| {
      let (db_track, track_created) = match self.select_or_insert_track(candidate)? {
        SelectOrInsertOne::Selected(db_track) => (db_track, false),
        SelectOrInsertOne::Inserted(db_track) => (db_track, true),
      };
      self.ensure_platform_info_exists(db_track.id, platform, &candidate.platform_id, candidate.url.as_deref())?;
      let db_track = if track_created {
        self.fan_out_to_other_platforms(runtime, user, platform, db_track)?
      } else {
        db_track
      };
      let (_, created) = self.ensure_user_saved_track_exists(user, &db_track, platform)?;
      Ok((db_track, created))
    })
  }

  /// Best-effort propagation of a newly created track to all other registered platforms: one
  /// search per platform, linking the track when the result matches. A missing credential is a
  /// normal outcome and skipped silently; any other failure is logged and skipped. Database
  /// errors do propagate, rolling the surrounding transaction back.
  fn fan_out_to_other_platforms(&self, runtime: &Runtime, user: &User, origin: Platform, mut db_track: Track) -> Result<Track, diesel::result::Error> {
    let other_platforms: Vec<Platform> = self.inner.registry.platforms().filter(|platform| *platform != origin).collect();
    for other_platform in other_platforms {
      let found = match runtime.block_on(self.gateway_search_track(user, other_platform, &db_track.title, &db_track.artist)) {
        Ok(found) => found,
        Err(PlatformOperationError::NoCredentialFail { .. }) => {
          event!(Level::TRACE, platform = %other_platform, "User has no credential for platform: skipping fan-out");
          continue;
        }
        Err(error) => {
          event!(Level::WARN, platform = %other_platform, %error, "Best-effort track search failed: skipping fan-out for this platform");
          continue;
        }
      };
      let found = match found {
        Some(found) => found,
        None => {
          event!(Level::TRACE, platform = %other_platform, "Track not found on platform");
          continue;
        }
      };
      if !is_match(&found, &db_track.title, &db_track.artist, DEFAULT_MATCH_THRESHOLD) {
        event!(Level::TRACE, platform = %other_platform, found_title = %found.title, found_artist = %found.artist, "Search result does not match the track: skipping");
        continue;
      }
      if self.select_platform_info_by_track(db_track.id, other_platform)?.is_some() {
        continue; // Already linked: keep the existing link.
      }
      self.ensure_platform_info_exists(db_track.id, other_platform, &found.platform_id, found.url.as_deref())?;
      if db_track.merge_missing_metadata(found.album.as_deref(), found.duration_ms) {
        event!(Level::DEBUG, ?db_track, "Track metadata enriched by fan-out, updating the database");
        db_track = db_track.save_changes::<Track>(&*self.connection)?;
      }
    }
    Ok(db_track)
  }
}

// Synchronization

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("Platform '{0}' is not registered")]
  UnknownPlatformFail(Platform),
  #[error("Failed to create an asynchronous runtime")]
  RuntimeCreateFail(#[from] std::io::Error),
  #[error("Failed to fetch saved tracks from the platform")]
  FetchSavedTracksFail(#[from] PlatformOperationError),
  #[error("Failed to reconcile a fetched track")]
  ReconcileFail(#[from] ReconcileError),
  #[error("Failed to execute a database query")]
  DatabaseQueryFail(#[from] diesel::result::Error),
}

impl DatabaseConnection {
  /// Synchronizes the user's saved tracks on `platform` against the platform's live state:
  /// reconciles tracks the platform newly reports as saved, and removes saved-track rows the
  /// platform no longer reports. Returns false without changing anything when the platform
  /// reports nothing.
  ///
  /// Each reconciliation is atomic on its own, but the overall pass deliberately is not: a
  /// failure partway leaves already-applied changes in place, and re-running the
  /// synchronization repairs the rest.
  #[instrument(skip(self))]
  pub fn sync(&self, user: &User, platform: Platform) -> Result<bool, SyncError> {
    use SyncError::*;
    if !self.inner.registry.contains(platform) {
      return Err(UnknownPlatformFail(platform));
    }
    let runtime = Runtime::new()?;

    event!(Level::INFO, "Starting saved track synchronization...");
    let fetched = runtime.block_on(self.gateway_fetch_saved_tracks(user, platform))?;
    if fetched.is_empty() {
      event!(Level::INFO, "... platform reported no saved tracks; nothing to do");
      return Ok(false);
    }

    let fetched_ids: HashSet<String> = fetched.iter().map(|candidate| candidate.platform_id.clone()).collect();
    let current_ids: HashSet<String> = self.select_saved_platform_ids(user, platform)?;
    let new_candidates: Vec<&TrackCandidate> = fetched.iter()
      .filter(|candidate| !current_ids.contains(&candidate.platform_id))
      .collect();
    let removed_ids: Vec<&String> = current_ids.difference(&fetched_ids).collect();
    event!(Level::DEBUG, new = new_candidates.len(), removed = removed_ids.len(), "Computed synchronization delta");

    for candidate in new_candidates {
      self.reconcile_with_runtime(&runtime, user, platform, candidate)?;
    }
    let deleted = self.delete_user_saved_tracks_by_platform_ids(user, platform, removed_ids)?;

    event!(Level::INFO, deleted, "... successfully completed saved track synchronization");
    Ok(true)
  }
}

// Helpers for selecting/inserting.

// Track

impl DatabaseConnection {
  fn select_track_by_title_and_artist(&self, input_title: &str, input_artist: &str) -> Result<Option<Track>, diesel::result::Error> {
    use schema::track::dsl::*;
    Ok(track
      .filter(title.eq(input_title))
      .filter(artist.eq(input_artist))
      .order(id.asc())
      .first::<Track>(&self.connection)
      .optional()?)
  }

  fn insert_track(&self, candidate: &TrackCandidate) -> Result<Track, diesel::result::Error> {
    use schema::track::dsl::*;
    let now = Utc::now().naive_utc();
    let new_track = NewTrack {
      title: candidate.title.clone(),
      artist: candidate.artist.clone(),
      album: candidate.album.clone(),
      duration_ms: candidate.duration_ms,
      created_at: now,
      updated_at: now,
    };
    event!(Level::DEBUG, ?new_track, "Inserting track");
    time!("insert_track.insert", diesel::insert_into(track).values(new_track).execute(&self.connection)?);
    // NOTE: must be executed in a transaction for consistency
    Ok(time!("insert_track.select_inserted", track.order(id.desc()).first(&self.connection)?))
  }

  /// Finds the canonical track by exact (title, artist) equality, filling missing metadata from
  /// the candidate, or inserts a new track.
  fn select_or_insert_track(&self, candidate: &TrackCandidate) -> Result<SelectOrInsertOne<Track>, diesel::result::Error> {
    let result = match self.select_track_by_title_and_artist(&candidate.title, &candidate.artist)? {
      Some(mut db_track) => {
        if db_track.merge_missing_metadata(candidate.album.as_deref(), candidate.duration_ms) {
          event!(Level::DEBUG, ?db_track, "Track metadata has changed, updating the database");
          db_track = db_track.save_changes::<Track>(&*self.connection)?;
        }
        SelectOrInsertOne::Selected(db_track)
      }
      None => SelectOrInsertOne::Inserted(self.insert_track(candidate)?),
    };
    Ok(result)
  }
}

// Track platform info

impl DatabaseConnection {
  pub(crate) fn select_platform_info_by_track(&self, input_track_id: i32, input_platform: Platform) -> Result<Option<TrackPlatformInfo>, diesel::result::Error> {
    use schema::track_platform_info::dsl::*;
    Ok(track_platform_info
      .filter(track_id.eq(input_track_id))
      .filter(platform.eq(input_platform.as_str()))
      .first::<TrackPlatformInfo>(&self.connection)
      .optional()?)
  }

  fn insert_platform_info(&self, input_track_id: i32, input_platform: Platform, input_platform_id: &str, input_url: Option<&str>) -> Result<TrackPlatformInfo, diesel::result::Error> {
    use schema::track_platform_info::dsl::*;
    let now = Utc::now().naive_utc();
    let new_platform_info = NewTrackPlatformInfo {
      track_id: input_track_id,
      platform: input_platform.as_str().to_owned(),
      platform_id: input_platform_id.to_owned(),
      url: input_url.map(|input_url| input_url.to_owned()),
      created_at: now,
      updated_at: now,
    };
    event!(Level::DEBUG, ?new_platform_info, "Inserting track platform info");
    time!("insert_platform_info.insert", diesel::insert_into(track_platform_info).values(new_platform_info).execute(&self.connection)?);
    // NOTE: must be executed in a transaction for consistency
    Ok(time!("insert_platform_info.select_inserted", track_platform_info
      .filter(track_id.eq(input_track_id))
      .filter(platform.eq(input_platform.as_str()))
      .first::<TrackPlatformInfo>(&self.connection)?))
  }

  /// Find-or-create of the (track, platform) link, with the candidate's platform id and URL as
  /// insert-only defaults: an existing link is never overwritten. A unique-constraint conflict
  /// from a concurrent insert is recovered by re-reading the row.
  fn ensure_platform_info_exists(&self, input_track_id: i32, input_platform: Platform, input_platform_id: &str, input_url: Option<&str>) -> Result<TrackPlatformInfo, diesel::result::Error> {
    if let Some(db_platform_info) = self.select_platform_info_by_track(input_track_id, input_platform)? {
      return Ok(db_platform_info);
    }
    match self.insert_platform_info(input_track_id, input_platform, input_platform_id, input_url) {
      Ok(db_platform_info) => Ok(db_platform_info),
      Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
        // Lost a concurrent find-or-create race: the link exists now, treat it as found.
        self.select_platform_info_by_track(input_track_id, input_platform)?
          .ok_or(diesel::result::Error::NotFound)
      }
      Err(error) => Err(error),
    }
  }
}

// User saved track

impl DatabaseConnection {
  fn select_user_saved_track(&self, input_user: &User, input_track: &Track, input_platform: Platform) -> Result<Option<UserSavedTrack>, diesel::result::Error> {
    use schema::user_saved_track::dsl::*;
    Ok(user_saved_track
      .filter(user_id.eq(input_user.id))
      .filter(track_id.eq(input_track.id))
      .filter(platform.eq(input_platform.as_str()))
      .first::<UserSavedTrack>(&self.connection)
      .optional()?)
  }

  fn insert_user_saved_track(&self, input_user: &User, input_track: &Track, input_platform: Platform) -> Result<UserSavedTrack, diesel::result::Error> {
    use schema::user_saved_track::dsl::*;
    let now = Utc::now().naive_utc();
    let new_user_saved_track = NewUserSavedTrack {
      user_id: input_user.id,
      track_id: input_track.id,
      platform: input_platform.as_str().to_owned(),
      created_at: now,
      updated_at: now,
    };
    event!(Level::DEBUG, ?new_user_saved_track, "Inserting user saved track");
    time!("insert_user_saved_track.insert", diesel::insert_into(user_saved_track).values(new_user_saved_track).execute(&self.connection)?);
    // NOTE: must be executed in a transaction for consistency
    Ok(time!("insert_user_saved_track.select_inserted", user_saved_track
      .filter(user_id.eq(input_user.id))
      .filter(track_id.eq(input_track.id))
      .filter(platform.eq(input_platform.as_str()))
      .first::<UserSavedTrack>(&self.connection)?))
  }

  /// Find-or-create of the (user, track, platform) association, recovering a unique-constraint
  /// conflict from a concurrent insert by re-reading. The flag is true only when this call
  /// inserted the row.
  fn ensure_user_saved_track_exists(&self, input_user: &User, input_track: &Track, input_platform: Platform) -> Result<(UserSavedTrack, bool), diesel::result::Error> {
    if let Some(db_user_saved_track) = self.select_user_saved_track(input_user, input_track, input_platform)? {
      return Ok((db_user_saved_track, false));
    }
    match self.insert_user_saved_track(input_user, input_track, input_platform) {
      Ok(db_user_saved_track) => Ok((db_user_saved_track, true)),
      Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
        // Lost a concurrent find-or-create race: the association exists now, treat it as found.
        let db_user_saved_track = self.select_user_saved_track(input_user, input_track, input_platform)?
          .ok_or(diesel::result::Error::NotFound)?;
        Ok((db_user_saved_track, false))
      }
      Err(error) => Err(error),
    }
  }
}
