use async_trait::async_trait;
use chrono::{Duration, Utc};

use crosstune_core::model::{Platform, PlatformCredential, TrackCandidate};
use crosstune_youtube_client::{Authorization, YoutubeClient};

use crate::model::PlatformCredentialEx;
use crate::normalize::youtube::YoutubeNormalizer;
use crate::normalize::PlatformNormalizer;

use super::{GatewayError, NewAuthorization, PlatformGateway};

pub struct YoutubeGateway {
  client: YoutubeClient,
  normalizer: YoutubeNormalizer,
}

impl YoutubeGateway {
  pub fn new(client: YoutubeClient) -> Self {
    Self { client, normalizer: YoutubeNormalizer }
  }

  fn authorization(&self, credential: &PlatformCredential) -> Authorization {
    // An unknown expiry date is treated as already expired, forcing a refresh before first use.
    let expiry_date = credential.expiry_date.unwrap_or_else(|| Utc::now().naive_utc() - Duration::seconds(1));
    Authorization {
      access_token: credential.access_token.clone(),
      expiry_date,
      refresh_token: credential.refresh_token.clone(),
      scope: credential.scope.clone(),
    }
  }

  fn write_back(&self, credential: &mut PlatformCredential, authorization: &Authorization) {
    credential.update_from_tokens(
      &authorization.access_token,
      authorization.refresh_token.as_deref(),
      Some(authorization.expiry_date),
    );
  }
}

#[async_trait]
impl PlatformGateway for YoutubeGateway {
  fn platform(&self) -> Platform {
    Platform::Youtube
  }

  fn create_authorization_url(&self, redirect_uri: &str, state: Option<String>) -> Result<String, GatewayError> {
    Ok(self.client.create_authorization_url(redirect_uri, state)?)
  }

  async fn authorization_callback(&self, code: &str, redirect_uri: &str) -> Result<NewAuthorization, GatewayError> {
    let authorization = self.client.authorization_callback(code, redirect_uri, None::<String>).await?;
    Ok(NewAuthorization {
      access_token: authorization.access_token,
      refresh_token: authorization.refresh_token,
      expiry_date: Some(authorization.expiry_date),
      scope: authorization.scope,
    })
  }

  async fn refresh(&self, credential: &mut PlatformCredential) -> Result<(), GatewayError> {
    let refresh_token = credential.refresh_token.clone()
      .ok_or_else(|| GatewayError::UnusableCredentialFail(Platform::Youtube, "missing refresh token".to_owned()))?;
    let refresh_info = self.client.refresh_access_token(refresh_token).await?;
    let expiry_date = (Utc::now() + Duration::seconds(refresh_info.expires_in as i64)).naive_utc();
    credential.update_from_tokens(&refresh_info.access_token, None, Some(expiry_date));
    Ok(())
  }

  async fn fetch_saved_tracks(&self, credential: &mut PlatformCredential) -> Result<Vec<TrackCandidate>, GatewayError> {
    let mut authorization = self.authorization(credential);
    let result = self.client.get_liked_videos(&mut authorization).await;
    // Refreshed token material is written back even when a later page of the fetch failed.
    self.write_back(credential, &authorization);
    let videos = result?;
    Ok(videos.iter().filter_map(|video| self.normalizer.normalize(video)).collect())
  }

  async fn search_track(&self, credential: &mut PlatformCredential, title: &str, artist: &str) -> Result<Option<TrackCandidate>, GatewayError> {
    let mut authorization = self.authorization(credential);
    let query = format!("{} {}", artist, title);
    let result = self.client.search_music_videos(&query, &mut authorization).await;
    self.write_back(credential, &authorization);
    let videos = result?;
    Ok(videos.iter().find_map(|video| self.normalizer.normalize(video)))
  }
}
