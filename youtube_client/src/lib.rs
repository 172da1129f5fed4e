use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{Duration, NaiveDateTime, Utc};
use itertools::Itertools;
use reqwest::{Client, IntoUrl, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{event, instrument, Level};

/// The YouTube category identifier for music content.
pub const MUSIC_CATEGORY_ID: &str = "10";

#[derive(Clone)]
pub struct YoutubeClient {
  http_client: Client,
  accounts_api_base_url: Url,
  token_api_base_url: Url,
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

impl YoutubeClient {
  pub fn new<U1: IntoUrl, U2: IntoUrl, U3: IntoUrl>(
    http_client: Client,
    accounts_api_base_url: U1,
    token_api_base_url: U2,
    api_base_url: U3,
    client_id: String,
    client_secret: String,
    max_retries: u8,
  ) -> Result<Self, CreateError> {
    let accounts_api_base_url = accounts_api_base_url.into_url()?;
    let token_api_base_url = token_api_base_url.into_url()?;
    let api_base_url = api_base_url.into_url()?;
    Ok(Self {
      http_client,
      accounts_api_base_url,
      token_api_base_url,
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
    let accounts_api_base_url = "https://accounts.google.com/o/oauth2/v2/";
    let token_api_base_url = "https://oauth2.googleapis.com/";
    let api_base_url = "https://www.googleapis.com/youtube/v3/";
    let max_retries = 2;
    Self::new(http_client, accounts_api_base_url, token_api_base_url, api_base_url, client_id, client_secret, max_retries)
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

impl YoutubeClient {
  pub fn create_authorization_url(
    &self,
    redirect_uri: impl Into<String>,
    state: Option<impl Into<String>>,
  ) -> Result<String, CreateAuthorizationUrlError> {
    let url = self.accounts_api_base_url.join("auth")?;
    let query_map = {
      let mut map = HashMap::new();
      map.insert("client_id", self.client_id.clone());
      map.insert("response_type", "code".to_owned());
      map.insert("redirect_uri", redirect_uri.into());
      if let Some(state) = state {
        map.insert("state", state.into());
      }
      map.insert("scope", "https://www.googleapis.com/auth/youtube.readonly".to_owned());
      // Offline access is required to receive a refresh token on the authorization callback.
      map.insert("access_type", "offline".to_owned());
      map.insert("prompt", "consent".to_owned());
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
pub enum YoutubeAuthError {
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
  UnexpectedStatusCodeFail(YoutubeAuthError),
}

impl YoutubeClient {
  async fn send_authorization_request(&self, request_builder: RequestBuilder) -> Result<Response, AuthorizationHttpRequestError> {
    use AuthorizationHttpRequestError::*;
    let response = request_builder.send().await?;
    match response.status() {
      StatusCode::OK => Ok(response),
      _ => {
        Err(UnexpectedStatusCodeFail(Self::response_to_youtube_auth_error(response).await))
      }
    }
  }

  async fn response_to_youtube_auth_error(response: Response) -> YoutubeAuthError {
    #[derive(Deserialize)]
    struct Error {
      error: String,
      #[serde(default)]
      error_description: String,
    }
    let status_code = response.status();
    let error: Option<Error> = response.json().await.ok();
    if let Some(error) = error {
      YoutubeAuthError::Error(status_code, error.error, error.error_description)
    } else {
      YoutubeAuthError::ErrorWithoutMessage(status_code)
    }
  }
}

// Authorization callback

#[derive(Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub struct Authorization {
  pub access_token: String,
  pub expiry_date: NaiveDateTime,
  /// Google only returns a refresh token on the first consent; subsequent authorizations may
  /// omit it.
  pub refresh_token: Option<String>,
  pub scope: Option<String>,
}

impl YoutubeClient {
  pub async fn authorization_callback(
    &self,
    code: impl Into<String>,
    redirect_uri: impl Into<String>,
    _state: Option<impl Into<String>>, // TODO: verify
  ) -> Result<Authorization, AuthorizationHttpRequestError> {
    let url = self.token_api_base_url.join("token")?;
    let request = self.http_client
      .post(url)
      .form(&{
        let mut map = HashMap::new();
        map.insert("grant_type", "authorization_code".to_owned());
        map.insert("code", code.into());
        map.insert("redirect_uri", redirect_uri.into());
        map.insert("client_id", self.client_id.clone());
        map.insert("client_secret", self.client_secret.clone());
        map
      })
      ;
    let response = self.send_authorization_request(request).await?;
    #[derive(Deserialize)]
    struct AuthorizationInfo {
      pub access_token: String,
      pub scope: Option<String>,
      pub expires_in: i32,
      pub refresh_token: Option<String>,
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

impl YoutubeClient {
  #[instrument(level = "trace", skip(self, refresh_token))]
  pub async fn refresh_access_token(&self, refresh_token: impl Into<String>) -> Result<RefreshInfo, AuthorizationHttpRequestError> {
    let url = self.token_api_base_url.join("token")?;
    let request = self.http_client
      .post(url)
      .form(&{
        let mut map = HashMap::new();
        map.insert("grant_type", "refresh_token".to_owned());
        map.insert("refresh_token", refresh_token.into());
        map.insert("client_id", self.client_id.clone());
        map.insert("client_secret", self.client_secret.clone());
        map
      })
      ;
    let response = self.send_authorization_request(request).await?;
    Ok(response.json().await?)
  }
}

// Keeping authorization info up-to-date

#[derive(Debug, Error)]
pub enum UpdateAuthorizationError {
  #[error("Authorization HTTP request failed")]
  AuthorizationHttpRequestFail(#[from] AuthorizationHttpRequestError),
  #[error("Cannot refresh the access token because the authorization has no refresh token")]
  NoRefreshTokenFail,
}

impl YoutubeClient {
  #[instrument(level = "trace", skip(self, authorization))]
  async fn update_authorization_info(&self, authorization: &mut Authorization) -> Result<String, UpdateAuthorizationError> {
    use UpdateAuthorizationError::*;
    let refresh_token = authorization.refresh_token.clone().ok_or(NoRefreshTokenFail)?;
    let refresh_info = self.refresh_access_token(refresh_token).await?;
    event!(Level::DEBUG, ?refresh_info, "Updating YouTube authorization with new access token");
    authorization.access_token = refresh_info.access_token.clone();
    authorization.expiry_date = (Utc::now() + Duration::seconds(refresh_info.expires_in as i64)).naive_utc();
    Ok(authorization.access_token.clone())
  }

  #[instrument(level = "trace", skip(self, authorization))]
  async fn update_authorization_info_if_needed(&self, authorization: &mut Authorization) -> Result<String, UpdateAuthorizationError> {
    if Utc::now().naive_utc() >= authorization.expiry_date {
      self.update_authorization_info(authorization).await
    } else {
      Ok(authorization.access_token.clone())
    }
  }
}

// Sending a request, taking care of authorization, 401 Unauthorized errors, 429 Too Many Requests errors, and retries.

#[derive(Debug, Error)]
pub enum YoutubeError {
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
  #[error("Failed to update authorization info")]
  UpdateAuthorizationFail(#[from] UpdateAuthorizationError),
  #[error("Server responded with {0}")]
  UnexpectedStatusCodeFail(YoutubeError),
  #[error("Server responded with {0}, even after {1} retries")]
  RetryFail(YoutubeError, u8),
  #[error("Server responded with {0}, but a retry was not possible due to the request builder not being cloneable")]
  CannotRetryFail(YoutubeError),
}

impl YoutubeClient {
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
          let error = Self::response_to_youtube_error(response).await;
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
          let error = Self::response_to_youtube_error(response).await;
          if retry >= self.max_retries {
            return Err(RetryFail(error, retry));
          }

          // When the request was rate limited, delay for some time and then retry.
          let retry_after = tokio::time::Duration::from_secs(5 * (retry as u64 + 1));
          event!(Level::TRACE, ?request_builder_clone, "Server responded with {}; retrying after {:?}", error, retry_after);
          tokio::time::sleep(retry_after).await;
          let request_builder = request_builder_clone.ok_or(CannotRetryFail(error))?;
          Ok(self.send_request_with_retry(request_builder, expected_status_codes, authorization, retry + 1).await?)
        }
        c if !expected_status_codes.as_ref().contains(&c) => {
          let error = Self::response_to_youtube_error(response).await;
          Err(UnexpectedStatusCodeFail(error))
        }
        _ => Ok(response)
      }
    })
  }

  async fn response_to_youtube_error(response: Response) -> YoutubeError {
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
      YoutubeError::Error(status_code, regular_error.error.message)
    } else {
      YoutubeError::ErrorWithoutMessage(status_code)
    }
  }
}

// Paging

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Paging<T> {
  pub items: Vec<T>,
  pub next_page_token: Option<String>,
}

// Video objects

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
  pub title: String,
  pub channel_title: String,
  pub category_id: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ContentDetails {
  /// ISO-8601 duration, e.g. `PT3M12S`. Live content is reported as `P0D`.
  pub duration: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Video {
  pub id: String,
  pub snippet: VideoSnippet,
  pub content_details: Option<ContentDetails>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchResultId {
  video_id: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SearchResult {
  id: SearchResultId,
}

// Liked videos of the authorized user

impl YoutubeClient {
  #[instrument(level = "trace", skip(self, authorization))]
  pub async fn get_liked_videos(&self, authorization: &mut Authorization) -> Result<Vec<Video>, HttpRequestError> {
    let mut all_videos = Vec::new();
    let mut page_token = None;
    loop {
      let page = self.get_liked_videos_raw(page_token, authorization).await?;
      all_videos.extend(page.items);
      page_token = page.next_page_token;
      if page_token.is_none() { break; }
    }
    Ok(all_videos)
  }

  #[instrument(level = "trace", skip(self, authorization))]
  async fn get_liked_videos_raw(&self, page_token: Option<String>, authorization: &mut Authorization) -> Result<Paging<Video>, HttpRequestError> {
    let url = self.api_base_url.join("videos")?;
    let mut request = self.http_client
      .get(url)
      .query(&[("part", "snippet,contentDetails"), ("myRating", "like"), ("maxResults", "50")])
      ;
    if let Some(page_token) = page_token {
      request = request.query(&[("pageToken", page_token)]);
    }
    let response = self.send_request(request, [StatusCode::OK], authorization).await?;
    Ok(response.json().await?)
  }
}

// Video search

impl YoutubeClient {
  /// Searches music videos and resolves the results into full video objects, so durations from
  /// `contentDetails` are available.
  #[instrument(level = "trace", skip(self, authorization))]
  pub async fn search_music_videos(&self, query: &str, authorization: &mut Authorization) -> Result<Vec<Video>, HttpRequestError> {
    let url = self.api_base_url.join("search")?;
    let request = self.http_client
      .get(url)
      .query(&[
        ("part", "snippet"),
        ("type", "video"),
        ("videoCategoryId", MUSIC_CATEGORY_ID),
        ("q", query),
        ("maxResults", "5"),
      ])
      ;
    let response = self.send_request(request, [StatusCode::OK], authorization).await?;
    let results: Paging<SearchResult> = response.json().await?;
    let video_ids: Vec<String> = results.items.into_iter().filter_map(|r| r.id.video_id).collect();
    if video_ids.is_empty() {
      return Ok(Vec::new());
    }
    self.get_videos_by_ids(video_ids, authorization).await
  }

  #[instrument(level = "trace", skip(self, video_ids, authorization))]
  pub async fn get_videos_by_ids(&self, video_ids: impl IntoIterator<Item=String> + Send, authorization: &mut Authorization) -> Result<Vec<Video>, HttpRequestError> {
    let url = self.api_base_url.join("videos")?;
    let mut all_videos = Vec::new();
    let video_ids: Vec<String> = video_ids.into_iter().collect();
    let video_id_chunks: Vec<Vec<String>> = video_ids
      .into_iter()
      .chunks(50)
      .into_iter()
      .map(|chunk| chunk.collect())
      .collect();
    for video_ids_per_50 in video_id_chunks {
      let request = self.http_client
        .get(url.clone())
        .query(&[("part", "snippet,contentDetails"), ("id", &video_ids_per_50.join(","))])
        ;
      let response = self.send_request(request, [StatusCode::OK], authorization).await?;
      let videos: Paging<Video> = response.json().await?;
      all_videos.extend(videos.items)
    }
    Ok(all_videos)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> YoutubeClient {
    YoutubeClient::new_from_client_id_secret("client-id".to_owned(), "client-secret".to_owned()).unwrap()
  }

  #[test]
  fn authorization_url_carries_offline_access_and_scope() {
    let url = client().create_authorization_url("http://localhost:8088/callback", None::<String>).unwrap();
    assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(url.contains("client_id=client-id"));
    assert!(url.contains("access_type=offline"));
    assert!(url.contains("youtube.readonly"));
  }
}
