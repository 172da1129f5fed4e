use std::fmt::{Display, Formatter};

use chrono::Utc;
use diesel::prelude::*;
use tracing::{event, Level};

use crosstune_core::model::{NewPlatformActionLog, Platform, PlatformActionLog, User};
use crosstune_core::schema;

use super::{DatabaseConnection, DatabaseQueryError};

/// Kind tag of one action taken against a platform on behalf of a user. Stored as its string
/// form in the append-only action log.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ActionKind {
  FetchSavedTracks,
  SearchTrack,
  AuthorizationCallback,
  RefreshToken,
}

impl ActionKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ActionKind::FetchSavedTracks => "fetch_saved_tracks",
      ActionKind::SearchTrack => "search_track",
      ActionKind::AuthorizationCallback => "authorization_callback",
      ActionKind::RefreshToken => "refresh_token",
    }
  }
}

impl Display for ActionKind {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl DatabaseConnection {
  /// Appends one action record. Written by the gateway wrappers around every external call;
  /// nothing in the reconciliation core reads it back.
  pub(crate) fn insert_platform_action(
    &self,
    input_user: &User,
    input_platform: Platform,
    input_action: ActionKind,
    input_metadata: serde_json::Value,
  ) -> Result<(), diesel::result::Error> {
    use schema::platform_action_log::dsl::*;
    let new_platform_action_log = NewPlatformActionLog {
      user_id: input_user.id,
      platform: input_platform.as_str().to_owned(),
      action: input_action.as_str().to_owned(),
      metadata: input_metadata.to_string(),
      created_at: Utc::now().naive_utc(),
    };
    event!(Level::TRACE, ?new_platform_action_log, "Inserting platform action log record");
    time!("insert_platform_action.insert", diesel::insert_into(platform_action_log).values(new_platform_action_log).execute(&self.connection)?);
    Ok(())
  }

  pub fn list_platform_actions(&self, input_user: &User) -> Result<Vec<PlatformActionLog>, DatabaseQueryError> {
    use schema::platform_action_log::dsl::*;
    Ok(platform_action_log
      .filter(user_id.eq(input_user.id))
      .order(created_at.desc())
      .load::<PlatformActionLog>(&self.connection)?)
  }
}
