use std::collections::HashSet;

use diesel::prelude::*;
use tracing::{event, Level};

use crosstune_core::model::{Platform, Track, TrackPlatformInfo, User, UserSavedTrack};
use crosstune_core::schema;

use super::{DatabaseConnection, DatabaseQueryError};

// User saved track queries

impl DatabaseConnection {
  pub fn list_user_saved_tracks(&self, input_user: &User) -> Result<Vec<UserSavedTrack>, DatabaseQueryError> {
    use schema::user_saved_track::dsl::*;
    Ok(user_saved_track
      .filter(user_id.eq(input_user.id))
      .order(created_at.desc())
      .load::<UserSavedTrack>(&self.connection)?)
  }

  /// Lists a user's saved tracks joined with their canonical tracks, newest first.
  pub fn list_user_saved_tracks_with_tracks(&self, input_user: &User) -> Result<Vec<(UserSavedTrack, Track)>, DatabaseQueryError> {
    use schema::{track, user_saved_track};
    Ok(user_saved_track::table
      .inner_join(track::table)
      .filter(user_saved_track::user_id.eq(input_user.id))
      .order(user_saved_track::created_at.desc())
      .load::<(UserSavedTrack, Track)>(&self.connection)?)
  }

  /// Deletes one saved track of `input_user`, scoped to that user so one user cannot delete
  /// another user's association. Returns whether a row was deleted.
  pub fn delete_user_saved_track_by_id(&self, input_user: &User, input_id: i32) -> Result<bool, DatabaseQueryError> {
    use schema::user_saved_track::dsl::*;
    let result = time!("delete_user_saved_track_by_id.delete", diesel::delete(user_saved_track
      .filter(id.eq(input_id))
      .filter(user_id.eq(input_user.id)))
      .execute(&self.connection)?);
    Ok(result == 1)
  }

  /// Deletes all saved tracks of `input_user`, across all platforms. Returns the number of
  /// deleted rows. Canonical tracks and their platform links are left in place.
  pub fn clear_user_saved_tracks(&self, input_user: &User) -> Result<usize, DatabaseQueryError> {
    use schema::user_saved_track::dsl::*;
    let result = time!("clear_user_saved_tracks.delete", diesel::delete(user_saved_track
      .filter(user_id.eq(input_user.id)))
      .execute(&self.connection)?);
    event!(Level::DEBUG, user_id = input_user.id, deleted = result, "Cleared user saved tracks");
    Ok(result)
  }
}

// Synchronization support queries

impl DatabaseConnection {
  /// The platform ids currently recorded for this user and platform, following
  /// UserSavedTrack -> Track -> TrackPlatformInfo(platform).
  pub(crate) fn select_saved_platform_ids(&self, input_user: &User, input_platform: Platform) -> Result<HashSet<String>, diesel::result::Error> {
    use schema::{track_platform_info, user_saved_track};
    let platform_ids: Vec<String> = user_saved_track::table
      .inner_join(track_platform_info::table.on(track_platform_info::track_id.eq(user_saved_track::track_id)))
      .filter(user_saved_track::user_id.eq(input_user.id))
      .filter(user_saved_track::platform.eq(input_platform.as_str()))
      .filter(track_platform_info::platform.eq(input_platform.as_str()))
      .select(track_platform_info::platform_id)
      .load(&self.connection)?;
    Ok(platform_ids.into_iter().collect())
  }

  /// Deletes the user's saved tracks whose track maps to one of the given platform ids on this
  /// platform. Returns the number of deleted rows.
  pub(crate) fn delete_user_saved_tracks_by_platform_ids<'a>(
    &self,
    input_user: &User,
    input_platform: Platform,
    input_platform_ids: impl IntoIterator<Item=&'a String>,
  ) -> Result<usize, diesel::result::Error> {
    let mut deleted = 0;
    for input_platform_id in input_platform_ids {
      let db_platform_infos: Vec<TrackPlatformInfo> = {
        use schema::track_platform_info::dsl::*;
        track_platform_info
          .filter(platform.eq(input_platform.as_str()))
          .filter(platform_id.eq(input_platform_id))
          .load(&self.connection)?
      };
      for db_platform_info in db_platform_infos {
        event!(Level::DEBUG, track_id = db_platform_info.track_id, platform_id = %input_platform_id, "Platform no longer reports track as saved: removing the user saved track");
        let delete_query = {
          use schema::user_saved_track::dsl::*;
          diesel::delete(user_saved_track
            .filter(user_id.eq(input_user.id))
            .filter(platform.eq(input_platform.as_str()))
            .filter(track_id.eq(db_platform_info.track_id)))
        };
        deleted += time!("delete_user_saved_tracks_by_platform_ids.delete", delete_query.execute(&self.connection)?);
      }
    }
    Ok(deleted)
  }
}
