use chrono::Utc;
use diesel::prelude::*;
use serde_json::json;
use thiserror::Error;
use tracing::{event, Level};

use crosstune_core::model::{NewPlatformCredential, Platform, PlatformCredential, TrackCandidate, User};
use crosstune_core::schema;

use crate::gateway::{GatewayError, NewAuthorization, PlatformGateway};

use super::action_log::ActionKind;
use super::{DatabaseConnection, DatabaseQueryError};

// Errors of operations against a platform on behalf of a user.

#[derive(Debug, Error)]
pub enum PlatformOperationError {
  #[error("Platform '{0}' is not registered")]
  NotRegisteredFail(Platform),
  #[error("User with ID '{user_id}' has no credential for platform '{platform}'")]
  NoCredentialFail { user_id: i32, platform: Platform },
  #[error(transparent)]
  GatewayFail(#[from] GatewayError),
  #[error("Failed to execute a database query")]
  DatabaseQueryFail(#[from] diesel::result::Error),
}

// Credential queries

impl DatabaseConnection {
  pub fn list_platform_credentials(&self, input_user: &User) -> Result<Vec<PlatformCredential>, DatabaseQueryError> {
    use schema::platform_credential::dsl::*;
    Ok(platform_credential
      .filter(user_id.eq(input_user.id))
      .order(platform.asc())
      .load::<PlatformCredential>(&self.connection)?)
  }

  pub fn get_platform_credential(&self, input_user: &User, input_platform: Platform) -> Result<Option<PlatformCredential>, DatabaseQueryError> {
    Ok(self.select_platform_credential(input_user, input_platform)?)
  }

  /// Whether the user has a credential for the platform that is currently usable: either not yet
  /// expired, or refreshable.
  pub fn is_user_connected(&self, input_user: &User, input_platform: Platform) -> Result<bool, DatabaseQueryError> {
    let credential = self.select_platform_credential(input_user, input_platform)?;
    Ok(match credential {
      Some(credential) => {
        credential.refresh_token.is_some()
          || credential.expiry_date.map_or(true, |expiry_date| expiry_date > Utc::now().naive_utc())
      }
      None => false,
    })
  }

  pub(crate) fn select_platform_credential(&self, input_user: &User, input_platform: Platform) -> Result<Option<PlatformCredential>, diesel::result::Error> {
    use schema::platform_credential::dsl::*;
    Ok(platform_credential
      .filter(user_id.eq(input_user.id))
      .filter(platform.eq(input_platform.as_str()))
      .first::<PlatformCredential>(&self.connection)
      .optional()?)
  }

  /// Creates the credential row for (user, platform), or updates the existing one with the new
  /// token material.
  pub fn set_platform_credential(&self, input_user: &User, input_platform: Platform, authorization: NewAuthorization) -> Result<PlatformCredential, DatabaseQueryError> {
    Ok(self.upsert_platform_credential(input_user, input_platform, authorization)?)
  }

  fn upsert_platform_credential(&self, input_user: &User, input_platform: Platform, authorization: NewAuthorization) -> Result<PlatformCredential, diesel::result::Error> {
    let now = Utc::now().naive_utc();
    if let Some(mut db_credential) = self.select_platform_credential(input_user, input_platform)? {
      db_credential.access_token = authorization.access_token;
      // A callback without a refresh token keeps the stored one; platforms only hand refresh
      // tokens out on the initial consent.
      if authorization.refresh_token.is_some() {
        db_credential.refresh_token = authorization.refresh_token;
      }
      db_credential.expiry_date = authorization.expiry_date;
      db_credential.scope = authorization.scope;
      db_credential.updated_at = now;
      event!(Level::DEBUG, user_id = input_user.id, platform = %input_platform, "Updating platform credential");
      Ok(time!("set_platform_credential.update", db_credential.save_changes::<PlatformCredential>(&*self.connection)?))
    } else {
      let new_credential = NewPlatformCredential {
        user_id: input_user.id,
        platform: input_platform.as_str().to_owned(),
        access_token: authorization.access_token,
        refresh_token: authorization.refresh_token,
        expiry_date: authorization.expiry_date,
        scope: authorization.scope,
        created_at: now,
        updated_at: now,
      };
      event!(Level::DEBUG, user_id = input_user.id, platform = %input_platform, "Inserting platform credential");
      {
        use schema::platform_credential::dsl::*;
        time!("set_platform_credential.insert", diesel::insert_into(platform_credential).values(new_credential).execute(&self.connection)?);
      }
      // NOTE: must be executed in a transaction for consistency
      use schema::platform_credential::dsl::*;
      Ok(time!("set_platform_credential.select_inserted", platform_credential
        .filter(user_id.eq(input_user.id))
        .filter(platform.eq(input_platform.as_str()))
        .first::<PlatformCredential>(&self.connection)?))
    }
  }

  /// Disconnects the user from the platform by deleting the credential row. Saved tracks and
  /// catalog links are left in place.
  pub fn delete_platform_credential(&self, input_user: &User, input_platform: Platform) -> Result<bool, DatabaseQueryError> {
    use schema::platform_credential::dsl::*;
    let result = time!("delete_platform_credential.delete", diesel::delete(platform_credential
      .filter(user_id.eq(input_user.id))
      .filter(platform.eq(input_platform.as_str())))
      .execute(&self.connection)?);
    Ok(result == 1)
  }
}

// Platform connect flow

impl DatabaseConnection {
  pub fn create_platform_authorization_url(
    &self,
    input_platform: Platform,
    redirect_uri: &str,
    state: Option<String>,
  ) -> Result<String, PlatformOperationError> {
    let gateway = self.gateway(input_platform)?;
    Ok(gateway.create_authorization_url(redirect_uri, state)?)
  }

  /// Handles the authorization callback of the platform's OAuth flow: exchanges the code and
  /// persists the resulting token material for the user.
  pub async fn create_platform_credential_from_authorization_callback(
    &self,
    input_user: &User,
    input_platform: Platform,
    code: &str,
    redirect_uri: &str,
  ) -> Result<PlatformCredential, PlatformOperationError> {
    let gateway = self.gateway(input_platform)?;
    let authorization = gateway.authorization_callback(code, redirect_uri).await?;
    event!(Level::DEBUG, user_id = input_user.id, platform = %input_platform, "Callback from platform with authorization info");
    let credential = self.upsert_platform_credential(input_user, input_platform, authorization)?;
    self.insert_platform_action(input_user, input_platform, ActionKind::AuthorizationCallback, json!({}))?;
    Ok(credential)
  }

  /// Proactively refreshes the user's access token for the platform and persists it.
  pub async fn refresh_platform_credential(&self, input_user: &User, input_platform: Platform) -> Result<PlatformCredential, PlatformOperationError> {
    let gateway = self.gateway(input_platform)?;
    let mut credential = self.require_platform_credential(input_user, input_platform)?;
    gateway.refresh(&mut credential).await?;
    let credential = credential.save_changes::<PlatformCredential>(&*self.connection)?;
    self.insert_platform_action(input_user, input_platform, ActionKind::RefreshToken, json!({}))?;
    Ok(credential)
  }
}

// Gateway operations wrapped with credential loading/persistence and action logging.

impl DatabaseConnection {
  pub(crate) async fn gateway_fetch_saved_tracks(&self, input_user: &User, input_platform: Platform) -> Result<Vec<TrackCandidate>, PlatformOperationError> {
    let gateway = self.gateway(input_platform)?;
    let mut credential = self.require_platform_credential(input_user, input_platform)?;
    let unchanged_credential = credential.clone();
    let result = gateway.fetch_saved_tracks(&mut credential).await;
    self.persist_credential_if_changed(credential, &unchanged_credential)?;
    let candidates = result?;
    self.insert_platform_action(input_user, input_platform, ActionKind::FetchSavedTracks, json!({ "count": candidates.len() }))?;
    Ok(candidates)
  }

  pub(crate) async fn gateway_search_track(
    &self,
    input_user: &User,
    input_platform: Platform,
    title: &str,
    artist: &str,
  ) -> Result<Option<TrackCandidate>, PlatformOperationError> {
    let gateway = self.gateway(input_platform)?;
    let mut credential = self.require_platform_credential(input_user, input_platform)?;
    let unchanged_credential = credential.clone();
    let result = gateway.search_track(&mut credential, title, artist).await;
    self.persist_credential_if_changed(credential, &unchanged_credential)?;
    let candidate = result?;
    self.insert_platform_action(input_user, input_platform, ActionKind::SearchTrack, json!({ "found": candidate.is_some() }))?;
    Ok(candidate)
  }

  fn gateway(&self, input_platform: Platform) -> Result<&dyn PlatformGateway, PlatformOperationError> {
    use PlatformOperationError::*;
    self.inner.registry.get(input_platform).ok_or(NotRegisteredFail(input_platform))
  }

  fn require_platform_credential(&self, input_user: &User, input_platform: Platform) -> Result<PlatformCredential, PlatformOperationError> {
    use PlatformOperationError::*;
    self.select_platform_credential(input_user, input_platform)?
      .ok_or(NoCredentialFail { user_id: input_user.id, platform: input_platform })
  }

  fn persist_credential_if_changed(&self, credential: PlatformCredential, unchanged_credential: &PlatformCredential) -> Result<(), diesel::result::Error> {
    if &credential != unchanged_credential {
      event!(Level::DEBUG, id = credential.id, platform = %credential.platform, "Platform credential has changed, updating the database");
      credential.save_changes::<PlatformCredential>(&*self.connection)?;
    }
    Ok(())
  }
}
