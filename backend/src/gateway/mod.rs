use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use crosstune_core::model::{Platform, PlatformCredential, TrackCandidate};

pub mod spotify;
pub mod youtube;

/// Token material produced by an authorization-code exchange, not yet tied to a user.
#[derive(Clone, Debug)]
pub struct NewAuthorization {
  pub access_token: String,
  pub refresh_token: Option<String>,
  pub expiry_date: Option<NaiveDateTime>,
  pub scope: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("Failed to create a Spotify authorization URL")]
  SpotifyCreateAuthorizationUrlFail(#[from] crosstune_spotify_client::CreateAuthorizationUrlError),
  #[error("Failed to create a YouTube authorization URL")]
  YoutubeCreateAuthorizationUrlFail(#[from] crosstune_youtube_client::CreateAuthorizationUrlError),
  #[error("Spotify authorization request failed")]
  SpotifyAuthorizationFail(#[from] crosstune_spotify_client::AuthorizationHttpRequestError),
  #[error("YouTube authorization request failed")]
  YoutubeAuthorizationFail(#[from] crosstune_youtube_client::AuthorizationHttpRequestError),
  #[error("Call to the Spotify API failed")]
  SpotifyApiFail(#[from] crosstune_spotify_client::HttpRequestError),
  #[error("Call to the YouTube API failed")]
  YoutubeApiFail(#[from] crosstune_youtube_client::HttpRequestError),
  #[error("Stored credential for platform '{0}' is unusable: {1}")]
  UnusableCredentialFail(Platform, String),
}

/// The capability interface of one streaming platform: the OAuth operations and the two data
/// operations the reconciliation core consumes. Implemented once per platform as a composition
/// of the platform's HTTP client and normalizer; object-safe so the registry can hold trait
/// objects and tests can substitute mocks.
///
/// Implementations manage token refresh internally and copy refreshed token material back into
/// the passed credential, so callers can persist it.
#[async_trait]
pub trait PlatformGateway: Send + Sync {
  fn platform(&self) -> Platform;

  fn create_authorization_url(&self, redirect_uri: &str, state: Option<String>) -> Result<String, GatewayError>;

  async fn authorization_callback(&self, code: &str, redirect_uri: &str) -> Result<NewAuthorization, GatewayError>;

  async fn refresh(&self, credential: &mut PlatformCredential) -> Result<(), GatewayError>;

  async fn fetch_saved_tracks(&self, credential: &mut PlatformCredential) -> Result<Vec<TrackCandidate>, GatewayError>;

  async fn search_track(&self, credential: &mut PlatformCredential, title: &str, artist: &str) -> Result<Option<TrackCandidate>, GatewayError>;
}

// Registry

#[derive(Debug, Error)]
pub enum RegistryCreateError {
  #[error("Platform '{0}' was registered more than once")]
  DuplicatePlatformFail(Platform),
}

/// Static platform registry: the set of gateways configured at startup. Operations naming a
/// platform outside this set fail fast instead of at first use.
pub struct PlatformRegistry {
  gateways: Vec<Box<dyn PlatformGateway>>,
}

impl PlatformRegistry {
  pub fn new(gateways: Vec<Box<dyn PlatformGateway>>) -> Result<Self, RegistryCreateError> {
    use RegistryCreateError::*;
    for (index, gateway) in gateways.iter().enumerate() {
      if gateways[..index].iter().any(|other| other.platform() == gateway.platform()) {
        return Err(DuplicatePlatformFail(gateway.platform()));
      }
    }
    Ok(Self { gateways })
  }

  pub fn get(&self, platform: Platform) -> Option<&dyn PlatformGateway> {
    self.gateways.iter().find(|gateway| gateway.platform() == platform).map(|gateway| gateway.as_ref())
  }

  pub fn contains(&self, platform: Platform) -> bool {
    self.get(platform).is_some()
  }

  pub fn platforms(&self) -> impl Iterator<Item=Platform> + '_ {
    self.gateways.iter().map(|gateway| gateway.platform())
  }
}
