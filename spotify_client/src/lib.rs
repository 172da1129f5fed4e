use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{Duration, NaiveDateTime, Utc};
use reqwest::{header, Client, IntoUrl, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{event, instrument, Level};

#[derive(Clone)]
pub struct SpotifyClient {
  http_client: Client,
  accounts_api_base_url: Url,
  api_base_url: Url,
  client_id: String,
  client_secret: String,
  max_retries: u8,
}

// Creation

#[derive(Debug, Error)]
pub enum CreateError {
  #[error(transparent)]
  UrlCreateFail(#[from] url::ParseError),
  #[error(transparent)]
  HttpClientCreateFail(#[from] reqwest::Error),
}

impl SpotifyClient {
  pub fn new<U1: IntoUrl, U2: IntoUrl>(
    http_client: Client,
    accounts_api_base_url: U1,
    api_base_url: U2,
    client_id: String,
    client_secret: String,
    max_retries: u8,
  ) -> Result<Self, CreateError> {
    let accounts_api_base_url = accounts_api_base_url.into_url()?;
    let api_base_url = api_base_url.into_url()?;
    Ok(Self {
      http_client,
      accounts_api_base_url,
      api_base_url,
      client_id,
      client_secret,
      max_retries,
    })
  }

  pub fn new_from_client_id_secret(
    client_id: String,
    client_secret: String,
  ) -> Result<Self, CreateError> {
    let http_client = Client::builder().build()?;
    let accounts_api_base_url = "https://accounts.spotify.com/";
    let api_base_url = "https://api.spotify.com/v1/";
    let max_retries = 2;
    Self::new(http_client, accounts_api_base_url, api_base_url, client_id, client_secret, max_retries)
  }
}

// Create authorization URL

#[derive(Debug, Error)]
pub enum CreateAuthorizationUrlError {
  #[error(transparent)]
  UrlJoinFail(#[from] url::ParseError),
  #[error(transparent)]
  HttpRequestBuildFail(#[from] reqwest::Error),
}

impl SpotifyClient {
  pub fn create_authorization_url(
    &self,
    redirect_uri: impl Into<String>,
    state: Option<impl Into<String>>,
  ) -> Result<String, CreateAuthorizationUrlError> {
    let url = self.accounts_api_base_url.join("authorize")?;
    let query_map = {
      let mut map = HashMap::new();
      map.insert("client_id", self.client_id.clone());
      map.insert("response_type", "code".to_owned());
      map.insert("redirect_uri", redirect_uri.into());
      if let Some(state) = state {
        map.insert("state", state.into());
      }
      map.insert("scope", "user-library-read".to_owned());
      map
    };
    let request = self.http_client
      .get(url)
      .query(&query_map)
      ;
    Ok(request.build()?.url().to_string())
  }
}

// Authorization requests

#[derive(Debug, Error)]
pub enum SpotifyAuthError {
  #[error("status code '{0}', error message '{1}', and error description '{2}'")]
  Error(StatusCode, String, String),
  #[error("status code '{0}'")]
  ErrorWithoutMessage(StatusCode),
}

#[derive(Debug, Error)]
pub enum AuthorizationHttpRequestError {
  #[error(transparent)]
  UrlJoinFail(#[from] url::ParseError),
  #[error("HTTP request failed")]
  HttpRequestFail(#[from] reqwest::Error),
  #[error("Server responded with {0}")]
  UnexpectedStatusCodeFail(SpotifyAuthError),
}

impl SpotifyClient {
  async fn send_authorization_request(&self, request_builder: RequestBuilder) -> Result<Response, AuthorizationHttpRequestError> {
    use AuthorizationHttpRequestError::*;
    let response = request_builder.send().await?;
    match response.status() {
      StatusCode::OK => Ok(response),
      _ => {
        Err(UnexpectedStatusCodeFail(Self::response_to_spotify_auth_error(response).await))
      }
    }
  }

  async fn response_to_spotify_auth_error(response: Response) -> SpotifyAuthError {
    #[derive(Deserialize)]
    struct Error {
      error: String,
      error_description: String,
    }
    let status_code = response.status();
    let error: Option<Error> = response.json().await.ok();
    if let Some(error) = error {
      SpotifyAuthError::Error(status_code, error.error, error.error_description)
    } else {
      SpotifyAuthError::ErrorWithoutMessage(status_code)
    }
  }
}

// Authorization callback

#[derive(Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub struct Authorization {
  pub access_token: String,
  pub expiry_date: NaiveDateTime,
  pub refresh_token: String,
  pub scope: Option<String>,
}

impl SpotifyClient {
  pub async fn authorization_callback(
    &self,
    code: impl Into<String>,
    redirect_uri: impl Into<String>,
    _state: Option<impl Into<String>>, // TODO: verify
  ) -> Result<Authorization, AuthorizationHttpRequestError> {
    let url = self.accounts_api_base_url.join("api/token")?;
    let request = self.http_client
      .post(url)
      .form(&{
        let mut map = HashMap::new();
        map.insert("grant_type", "authorization_code".to_owned());
        map.insert("code", code.into());
        map.insert("redirect_uri", redirect_uri.into());
        map
      })
      .basic_auth(&self.client_id, Some(&self.client_secret))
      ;
    let response = self.send_authorization_request(request).await?;
    #[derive(Deserialize)]
    struct AuthorizationInfo {
      pub access_token: String,
      pub scope: Option<String>,
      pub expires_in: i32,
      pub refresh_token: String,
    }
    let authorization_info: AuthorizationInfo = response.json().await?;
    Ok(Authorization {
      access_token: authorization_info.access_token,
      expiry_date: (Utc::now() + Duration::seconds(authorization_info.expires_in as i64)).naive_utc(),
      refresh_token: authorization_info.refresh_token,
      scope: authorization_info.scope,
    })
  }
}

// Refresh access token

#[derive(Deserialize, Debug)]
pub struct RefreshInfo {
  pub access_token: String,
  pub scope: Option<String>,
  pub expires_in: i32,
}

impl SpotifyClient {
  #[instrument(level = "trace", skip(self, refresh_token))]
  pub async fn refresh_access_token(&self, refresh_token: impl Into<String>) -> Result<RefreshInfo, AuthorizationHttpRequestError> {
    let url = self.accounts_api_base_url.join("api/token")?;
    let request = self.http_client
      .post(url)
      .form(&{
        let mut map = HashMap::new();
        map.insert("grant_type", "refresh_token".to_owned());
        map.insert("refresh_token", refresh_token.into());
        map
      })
      .basic_auth(&self.client_id, Some(&self.client_secret))
      ;
    let response = self.send_authorization_request(request).await?;
    Ok(response.json().await?)
  }
}

// Keeping authorization info up-to-date

impl SpotifyClient {
  #[instrument(level = "trace", skip(self, authorization))]
  async fn update_authorization_info(&self, authorization: &mut Authorization) -> Result<String, AuthorizationHttpRequestError> {
    let refresh_info = self.refresh_access_token(authorization.refresh_token.clone()).await?;
    event!(Level::DEBUG, ?refresh_info, "Updating Spotify authorization with new access token");
    authorization.access_token = refresh_info.access_token.clone();
    authorization.expiry_date = (Utc::now() + Duration::seconds(refresh_info.expires_in as i64)).naive_utc();
    Ok(authorization.access_token.clone())
  }

  #[instrument(level = "trace", skip(self, authorization))]
  async fn update_authorization_info_if_needed(&self, authorization: &mut Authorization) -> Result<String, AuthorizationHttpRequestError> {
    if Utc::now().naive_utc() >= authorization.expiry_date {
      self.update_authorization_info(authorization).await
    } else {
      Ok(authorization.access_token.clone())
    }
  }
}

// Sending a request, taking care of authorization, 401 Unauthorized errors, 429 Too Many Requests errors, and retries.

#[derive(Debug, Error)]
pub enum SpotifyError {
  #[error("status code '{0}' and error message '{1}'")]
  Error(StatusCode, String),
  #[error("status code '{0}'")]
  ErrorWithoutMessage(StatusCode),
}

#[derive(Debug, Error)]
pub enum HttpRequestError {
  #[error("Failed to join URLs")]
  UrlJoinFail(#[from] url::ParseError),
  #[error("HTTP request failed")]
  HttpRequestFail(#[from] reqwest::Error),
  #[error("Authorization HTTP request failed")]
  AuthorizationHttpRequestFail(#[from] AuthorizationHttpRequestError),
  #[error("Server responded with {0}")]
  UnexpectedStatusCodeFail(SpotifyError),
  #[error("Server responded with {0}, even after {1} retries")]
  RetryFail(SpotifyError, u8),
  #[error("Server responded with {0}, but a retry was not possible due to the request builder not being cloneable")]
  CannotRetryFail(SpotifyError),
}

impl SpotifyClient {
  async fn send_request(
    &self,
    request_builder: RequestBuilder,
    expected_status_codes: impl AsRef<[StatusCode]> + Send,
    authorization: &mut Authorization,
  ) -> Result<Response, HttpRequestError> {
    self.send_request_with_retry(request_builder, expected_status_codes, authorization, 0).await
  }

  #[instrument(level = "trace", skip(self, request_builder, expected_status_codes, authorization))]
  fn send_request_with_retry<'a>(
    &'a self,
    request_builder: RequestBuilder,
    expected_status_codes: impl AsRef<[StatusCode]> + Send + 'a,
    authorization: &'a mut Authorization,
    retry: u8,
  ) -> Pin<Box<dyn 'a + Send + Future<Output=Result<Response, HttpRequestError>>>> {
    use HttpRequestError::*;
    Box::pin(async move { // Pin box future because this is a recursive async method.
      let access_token = self.update_authorization_info_if_needed(authorization).await?;
      let request_builder = request_builder.bearer_auth(access_token);
      let request_builder_clone = request_builder.try_clone();
      let response = request_builder.send().await?;
      match response.status() {
        StatusCode::UNAUTHORIZED => {
          let error = Self::response_to_spotify_error(response).await;
          if retry >= self.max_retries {
            return Err(RetryFail(error, retry));
          }

          // When the request was unauthorized, request a new access token and then retry.
          event!(Level::TRACE, ?request_builder_clone, "Server responded with {}; retrying with new access token", error);
          let access_token = self.update_authorization_info(authorization).await?;
          let request_builder = request_builder_clone.ok_or(CannotRetryFail(error))?.bearer_auth(access_token);
          Ok(self.send_request_with_retry(request_builder, expected_status_codes, authorization, retry + 1).await?)
        }
        StatusCode::TOO_MANY_REQUESTS => {
          let default_duration = tokio::time::Duration::from_secs(5);
          let retry_after = if let Some(retry_after) = response.headers().get(header::RETRY_AFTER) {
            if let Ok(retry_after) = retry_after.to_str() {
              if let Ok(retry_after_seconds) = retry_after.parse::<u32>() {
                tokio::time::Duration::from_secs((retry_after_seconds + 1 + retry as u32) as u64)
              } else {
                default_duration
              }
            } else {
              default_duration
            }
          } else {
            default_duration
          };

          let error = Self::response_to_spotify_error(response).await;
          if retry >= self.max_retries {
            return Err(RetryFail(error, retry));
          }

          // When the request was rate limited, delay for some time and then retry.
          event!(Level::TRACE, ?request_builder_clone, "Server responded with {}; retrying after {:?}", error, retry_after);
          tokio::time::sleep(retry_after).await;
          let request_builder = request_builder_clone.ok_or(CannotRetryFail(error))?;
          Ok(self.send_request_with_retry(request_builder, expected_status_codes, authorization, retry + 1).await?)
        }
        c if !expected_status_codes.as_ref().contains(&c) => {
          let error = Self::response_to_spotify_error(response).await;
          Err(UnexpectedStatusCodeFail(error))
        }
        _ => Ok(response)
      }
    })
  }

  async fn response_to_spotify_error(response: Response) -> SpotifyError {
    #[derive(Deserialize)]
    struct RegularError {
      error: Error
    }
    #[derive(Deserialize)]
    struct Error {
      message: String
    }
    let status_code = response.status();
    let regular_error: Option<RegularError> = response.json().await.ok();
    if let Some(regular_error) = regular_error {
      SpotifyError::Error(status_code, regular_error.error.message)
    } else {
      SpotifyError::ErrorWithoutMessage(status_code)
    }
  }
}

// Paging

#[derive(Deserialize, Debug)]
pub struct Paging<T> {
  pub items: Vec<T>,
  pub offset: usize,
  pub total: usize,
}

// Artist, album, and track objects

#[derive(Deserialize, Debug)]
pub struct ArtistSimple {
  pub id: String,
  pub name: String,
}

#[derive(Deserialize, Debug)]
pub struct AlbumSimple {
  pub id: String,
  pub name: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct ExternalUrls {
  pub spotify: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Track {
  pub id: String,
  pub name: String,
  pub artists: Vec<ArtistSimple>,
  pub album: AlbumSimple,
  pub duration_ms: i64,
  #[serde(default)]
  pub external_urls: ExternalUrls,
}

#[derive(Deserialize, Debug)]
pub struct SavedTrackItem {
  pub added_at: Option<String>,
  pub track: Track,
}

// Saved tracks of the authorized user

impl SpotifyClient {
  #[instrument(level = "trace", skip(self, authorization))]
  pub async fn get_saved_tracks(&self, authorization: &mut Authorization) -> Result<Vec<SavedTrackItem>, HttpRequestError> {
    let mut all_items = Vec::new();
    let mut offset = 0;
    loop {
      let page = self.get_saved_tracks_raw(offset, authorization).await?;
      let len = page.items.len();
      all_items.extend(page.items);
      offset += len;
      if len == 0 || offset >= page.total { break; }
    }
    Ok(all_items)
  }

  #[instrument(level = "trace", skip(self, authorization))]
  async fn get_saved_tracks_raw(&self, offset: usize, authorization: &mut Authorization) -> Result<Paging<SavedTrackItem>, HttpRequestError> {
    let url = self.api_base_url.join("me/tracks")?;
    let request = self.http_client
      .get(url)
      .query(&[("limit", "50"), ("offset", &offset.to_string())])
      ;
    let response = self.send_request(request, [StatusCode::OK], authorization).await?;
    Ok(response.json().await?)
  }
}

// Track search

impl SpotifyClient {
  #[instrument(level = "trace", skip(self, authorization))]
  pub async fn search_tracks(&self, title: &str, artist: &str, authorization: &mut Authorization) -> Result<Vec<Track>, HttpRequestError> {
    let url = self.api_base_url.join("search")?;
    let query = format!("track:{} artist:{}", title, artist);
    let request = self.http_client
      .get(url)
      .query(&[("type", "track"), ("q", &query), ("limit", "5")])
      ;
    let response = self.send_request(request, [StatusCode::OK], authorization).await?;
    #[derive(Deserialize, Debug)]
    struct Tracks {
      pub tracks: Paging<Track>,
    }
    let tracks: Tracks = response.json().await?;
    Ok(tracks.tracks.items)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> SpotifyClient {
    SpotifyClient::new_from_client_id_secret("client-id".to_owned(), "client-secret".to_owned()).unwrap()
  }

  #[test]
  fn authorization_url_carries_client_id_and_redirect_uri() {
    let url = client().create_authorization_url("http://localhost:8088/callback", Some("state-1")).unwrap();
    assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
    assert!(url.contains("client_id=client-id"));
    assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8088%2Fcallback"));
    assert!(url.contains("state=state-1"));
    assert!(url.contains("scope=user-library-read"));
  }
}
