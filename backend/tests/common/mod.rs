#![allow(dead_code)] // Not every test binary exercises every helper.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tempfile::TempDir;

use crosstune_backend::database::{Database, DatabaseConnection};
use crosstune_backend::gateway::{GatewayError, NewAuthorization, PlatformGateway, PlatformRegistry};
use crosstune_backend::password::PasswordHasher;
use crosstune_core::model::{NewUser, Platform, PlatformCredential, TrackCandidate, User};

/// Programmable state of one mock platform, shared between the test and the gateway held by the
/// registry.
#[derive(Default)]
pub struct MockPlatformState {
  pub saved_tracks: Mutex<Vec<TrackCandidate>>,
  pub search_result: Mutex<Option<TrackCandidate>>,
  pub fail_fetch: Mutex<bool>,
  pub fail_search: Mutex<bool>,
  pub search_calls: Mutex<u32>,
}

impl MockPlatformState {
  pub fn set_saved_tracks(&self, candidates: Vec<TrackCandidate>) {
    *self.saved_tracks.lock().unwrap() = candidates;
  }

  pub fn set_search_result(&self, candidate: Option<TrackCandidate>) {
    *self.search_result.lock().unwrap() = candidate;
  }

  pub fn set_fail_fetch(&self, fail: bool) {
    *self.fail_fetch.lock().unwrap() = fail;
  }

  pub fn set_fail_search(&self, fail: bool) {
    *self.fail_search.lock().unwrap() = fail;
  }

  pub fn search_calls(&self) -> u32 {
    *self.search_calls.lock().unwrap()
  }
}

pub struct MockGateway {
  platform: Platform,
  state: Arc<MockPlatformState>,
}

impl MockGateway {
  pub fn new(platform: Platform, state: Arc<MockPlatformState>) -> Self {
    Self { platform, state }
  }

  fn upstream_failure(&self) -> GatewayError {
    GatewayError::SpotifyApiFail(crosstune_spotify_client::HttpRequestError::UrlJoinFail(url::ParseError::EmptyHost))
  }
}

#[async_trait]
impl PlatformGateway for MockGateway {
  fn platform(&self) -> Platform {
    self.platform
  }

  fn create_authorization_url(&self, redirect_uri: &str, _state: Option<String>) -> Result<String, GatewayError> {
    Ok(format!("https://auth.example.com/{}?redirect_uri={}", self.platform, redirect_uri))
  }

  async fn authorization_callback(&self, _code: &str, _redirect_uri: &str) -> Result<NewAuthorization, GatewayError> {
    Ok(test_authorization())
  }

  async fn refresh(&self, _credential: &mut PlatformCredential) -> Result<(), GatewayError> {
    Ok(())
  }

  async fn fetch_saved_tracks(&self, _credential: &mut PlatformCredential) -> Result<Vec<TrackCandidate>, GatewayError> {
    if *self.state.fail_fetch.lock().unwrap() {
      return Err(self.upstream_failure());
    }
    Ok(self.state.saved_tracks.lock().unwrap().clone())
  }

  async fn search_track(&self, _credential: &mut PlatformCredential, _title: &str, _artist: &str) -> Result<Option<TrackCandidate>, GatewayError> {
    *self.state.search_calls.lock().unwrap() += 1;
    if *self.state.fail_search.lock().unwrap() {
      return Err(self.upstream_failure());
    }
    Ok(self.state.search_result.lock().unwrap().clone())
  }
}

pub struct TestContext {
  pub database: Database,
  pub spotify: Arc<MockPlatformState>,
  pub youtube: Arc<MockPlatformState>,
  _temp_dir: TempDir,
}

/// A database over a temporary file with mock Spotify and YouTube gateways.
pub fn test_context() -> TestContext {
  test_context_with_platforms(&[Platform::Spotify, Platform::Youtube])
}

pub fn test_context_with_platforms(platforms: &[Platform]) -> TestContext {
  let temp_dir = tempfile::tempdir().unwrap();
  let database_file = temp_dir.path().join("crosstune.db");
  let spotify = Arc::new(MockPlatformState::default());
  let youtube = Arc::new(MockPlatformState::default());
  let mut gateways: Vec<Box<dyn PlatformGateway>> = Vec::new();
  for platform in platforms {
    let state = match platform {
      Platform::Spotify => spotify.clone(),
      Platform::Youtube => youtube.clone(),
    };
    gateways.push(Box::new(MockGateway::new(*platform, state)));
  }
  let registry = PlatformRegistry::new(gateways).unwrap();
  let database = Database::new(
    database_file.to_string_lossy(),
    registry,
    PasswordHasher::new("test-secret-key"),
  ).unwrap();
  TestContext { database, spotify, youtube, _temp_dir: temp_dir }
}

impl TestContext {
  pub fn connect(&self) -> DatabaseConnection {
    self.database.connect().unwrap()
  }
}

pub fn create_user(connection: &DatabaseConnection, name: &str) -> User {
  connection.create_user(NewUser { name: name.to_owned(), password: "password".to_owned() }).unwrap()
}

/// Stores a usable credential for (user, platform), as the authorization callback would.
pub fn connect_platform(connection: &DatabaseConnection, user: &User, platform: Platform) {
  connection.set_platform_credential(user, platform, test_authorization()).unwrap();
}

pub fn test_authorization() -> NewAuthorization {
  NewAuthorization {
    access_token: "access-token".to_owned(),
    refresh_token: Some("refresh-token".to_owned()),
    expiry_date: Some((Utc::now() + Duration::hours(1)).naive_utc()),
    scope: None,
  }
}

pub fn candidate(title: &str, artist: &str, platform_id: &str) -> TrackCandidate {
  TrackCandidate {
    title: title.to_owned(),
    artist: artist.to_owned(),
    album: None,
    duration_ms: None,
    platform_id: platform_id.to_owned(),
    url: Some(format!("https://platform.example.com/track/{}", platform_id)),
  }
}
