use async_trait::async_trait;
use chrono::{Duration, Utc};

use crosstune_core::model::{Platform, PlatformCredential, TrackCandidate};
use crosstune_spotify_client::{Authorization, SpotifyClient};

use crate::model::PlatformCredentialEx;
use crate::normalize::spotify::SpotifyNormalizer;
use crate::normalize::PlatformNormalizer;

use super::{GatewayError, NewAuthorization, PlatformGateway};

pub struct SpotifyGateway {
  client: SpotifyClient,
  normalizer: SpotifyNormalizer,
}

impl SpotifyGateway {
  pub fn new(client: SpotifyClient) -> Self {
    Self { client, normalizer: SpotifyNormalizer }
  }

  fn authorization(&self, credential: &PlatformCredential) -> Result<Authorization, GatewayError> {
    use GatewayError::*;
    let refresh_token = credential.refresh_token.clone()
      .ok_or_else(|| UnusableCredentialFail(Platform::Spotify, "missing refresh token".to_owned()))?;
    // An unknown expiry date is treated as already expired, forcing a refresh before first use.
    let expiry_date = credential.expiry_date.unwrap_or_else(|| Utc::now().naive_utc() - Duration::seconds(1));
    Ok(Authorization {
      access_token: credential.access_token.clone(),
      expiry_date,
      refresh_token,
      scope: credential.scope.clone(),
    })
  }

  fn write_back(&self, credential: &mut PlatformCredential, authorization: &Authorization) {
    credential.update_from_tokens(
      &authorization.access_token,
      Some(authorization.refresh_token.as_str()),
      Some(authorization.expiry_date),
    );
  }
}

#[async_trait]
impl PlatformGateway for SpotifyGateway {
  fn platform(&self) -> Platform {
    Platform::Spotify
  }

  fn create_authorization_url(&self, redirect_uri: &str, state: Option<String>) -> Result<String, GatewayError> {
    Ok(self.client.create_authorization_url(redirect_uri, state)?)
  }

  async fn authorization_callback(&self, code: &str, redirect_uri: &str) -> Result<NewAuthorization, GatewayError> {
    let authorization = self.client.authorization_callback(code, redirect_uri, None::<String>).await?;
    Ok(NewAuthorization {
      access_token: authorization.access_token,
      refresh_token: Some(authorization.refresh_token),
      expiry_date: Some(authorization.expiry_date),
      scope: authorization.scope,
    })
  }

  async fn refresh(&self, credential: &mut PlatformCredential) -> Result<(), GatewayError> {
    let refresh_token = credential.refresh_token.clone()
      .ok_or_else(|| GatewayError::UnusableCredentialFail(Platform::Spotify, "missing refresh token".to_owned()))?;
    let refresh_info = self.client.refresh_access_token(refresh_token).await?;
    let expiry_date = (Utc::now() + Duration::seconds(refresh_info.expires_in as i64)).naive_utc();
    credential.update_from_tokens(&refresh_info.access_token, None, Some(expiry_date));
    Ok(())
  }

  async fn fetch_saved_tracks(&self, credential: &mut PlatformCredential) -> Result<Vec<TrackCandidate>, GatewayError> {
    let mut authorization = self.authorization(credential)?;
    let result = self.client.get_saved_tracks(&mut authorization).await;
    // Refreshed token material is written back even when a later page of the fetch failed.
    self.write_back(credential, &authorization);
    let items = result?;
    Ok(items.iter().filter_map(|item| self.normalizer.normalize(&item.track)).collect())
  }

  async fn search_track(&self, credential: &mut PlatformCredential, title: &str, artist: &str) -> Result<Option<TrackCandidate>, GatewayError> {
    let mut authorization = self.authorization(credential)?;
    let result = self.client.search_tracks(title, artist, &mut authorization).await;
    self.write_back(credential, &authorization);
    let tracks = result?;
    Ok(tracks.iter().find_map(|track| self.normalizer.normalize(track)))
  }
}
