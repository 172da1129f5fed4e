use diesel::prelude::*;

use crosstune_core::model::{Track, TrackPlatformInfo};
use crosstune_core::schema;

use super::{DatabaseConnection, DatabaseQueryError};

// Canonical track queries

impl DatabaseConnection {
  pub fn list_tracks(&self) -> Result<Vec<Track>, DatabaseQueryError> {
    use schema::track::dsl::*;
    Ok(track.order(id.asc()).load::<Track>(&self.connection)?)
  }

  pub fn get_track_by_id(&self, input_id: i32) -> Result<Option<Track>, DatabaseQueryError> {
    use schema::track::dsl::*;
    Ok(track.find(input_id).first::<Track>(&self.connection).optional()?)
  }

  /// Lists the per-platform links of a track, ordered by platform name.
  pub fn list_platform_infos_of_track(&self, input_track_id: i32) -> Result<Vec<TrackPlatformInfo>, DatabaseQueryError> {
    use schema::track_platform_info::dsl::*;
    Ok(track_platform_info
      .filter(track_id.eq(input_track_id))
      .order(platform.asc())
      .load::<TrackPlatformInfo>(&self.connection)?)
  }
}
