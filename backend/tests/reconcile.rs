use crosstune_backend::database::sync::ReconcileError;
use crosstune_core::model::{Platform, TrackCandidate};

use crate::common::{candidate, connect_platform, create_user, test_context, test_context_with_platforms};

mod common;

#[test]
fn reconcile_creates_track_link_and_saved_track() {
  let context = test_context();
  let connection = context.connect();
  let user = create_user(&connection, "alice");
  connect_platform(&connection, &user, Platform::Spotify);

  let mut candidate = candidate("Bohemian Rhapsody", "Queen", "spotify-1");
  candidate.album = Some("A Night at the Opera".to_owned());
  candidate.duration_ms = Some(354_320);

  let (track, created) = connection.reconcile(&user, Platform::Spotify, &candidate).unwrap();
  assert!(created);
  assert_eq!(track.title, "Bohemian Rhapsody");
  assert_eq!(track.artist, "Queen");
  assert_eq!(track.album.as_deref(), Some("A Night at the Opera"));
  assert_eq!(track.duration_ms, Some(354_320));

  assert_eq!(connection.list_tracks().unwrap().len(), 1);
  let platform_infos = connection.list_platform_infos_of_track(track.id).unwrap();
  assert_eq!(platform_infos.len(), 1);
  assert_eq!(platform_infos[0].platform, "spotify");
  assert_eq!(platform_infos[0].platform_id, "spotify-1");
  assert_eq!(platform_infos[0].url.as_deref(), Some("https://platform.example.com/track/spotify-1"));
  assert_eq!(connection.list_user_saved_tracks(&user).unwrap().len(), 1);
}

#[test]
fn reconcile_is_idempotent() {
  let context = test_context();
  let connection = context.connect();
  let user = create_user(&connection, "alice");
  connect_platform(&connection, &user, Platform::Spotify);
  let candidate = candidate("Bohemian Rhapsody", "Queen", "spotify-1");

  let (track_1, created_1) = connection.reconcile(&user, Platform::Spotify, &candidate).unwrap();
  let (track_2, created_2) = connection.reconcile(&user, Platform::Spotify, &candidate).unwrap();

  assert!(created_1);
  assert!(!created_2);
  assert_eq!(track_1.id, track_2.id);
  assert_eq!(connection.list_tracks().unwrap().len(), 1);
  assert_eq!(connection.list_platform_infos_of_track(track_1.id).unwrap().len(), 1);
  assert_eq!(connection.list_user_saved_tracks(&user).unwrap().len(), 1);
}

#[test]
fn reconcile_fills_missing_metadata_but_never_overwrites() {
  let context = test_context();
  let connection = context.connect();
  let user = create_user(&connection, "alice");
  connect_platform(&connection, &user, Platform::Spotify);

  let bare = candidate("Bohemian Rhapsody", "Queen", "spotify-1");
  let (track, _) = connection.reconcile(&user, Platform::Spotify, &bare).unwrap();
  assert_eq!(track.album, None);
  assert_eq!(track.duration_ms, None);

  let mut enriched = bare.clone();
  enriched.album = Some("A Night at the Opera".to_owned());
  enriched.duration_ms = Some(354_320);
  let (track, _) = connection.reconcile(&user, Platform::Spotify, &enriched).unwrap();
  assert_eq!(track.album.as_deref(), Some("A Night at the Opera"));
  assert_eq!(track.duration_ms, Some(354_320));

  // First write wins: a different album on a later pass does not replace the stored one.
  let mut conflicting = bare.clone();
  conflicting.album = Some("Greatest Hits".to_owned());
  conflicting.duration_ms = Some(1);
  let (track, _) = connection.reconcile(&user, Platform::Spotify, &conflicting).unwrap();
  assert_eq!(track.album.as_deref(), Some("A Night at the Opera"));
  assert_eq!(track.duration_ms, Some(354_320));
}

#[test]
fn reconcile_keeps_existing_link_defaults() {
  let context = test_context();
  let connection = context.connect();
  let user = create_user(&connection, "alice");
  connect_platform(&connection, &user, Platform::Spotify);

  let first = candidate("Bohemian Rhapsody", "Queen", "spotify-1");
  let (track, _) = connection.reconcile(&user, Platform::Spotify, &first).unwrap();

  // A later candidate with another id for the same platform does not overwrite the link.
  let second = candidate("Bohemian Rhapsody", "Queen", "spotify-other");
  connection.reconcile(&user, Platform::Spotify, &second).unwrap();

  let platform_infos = connection.list_platform_infos_of_track(track.id).unwrap();
  assert_eq!(platform_infos.len(), 1);
  assert_eq!(platform_infos[0].platform_id, "spotify-1");
}

#[test]
fn reconcile_rejects_incomplete_candidates_without_writing() {
  let context = test_context();
  let connection = context.connect();
  let user = create_user(&connection, "alice");
  connect_platform(&connection, &user, Platform::Spotify);

  let mut incomplete = candidate("", "Queen", "spotify-1");
  let result = connection.reconcile(&user, Platform::Spotify, &incomplete);
  assert!(matches!(result, Err(ReconcileError::IncompleteCandidateFail("title"))));

  incomplete = candidate("Bohemian Rhapsody", "Queen", "");
  let result = connection.reconcile(&user, Platform::Spotify, &incomplete);
  assert!(matches!(result, Err(ReconcileError::IncompleteCandidateFail("platform_id"))));

  assert!(connection.list_tracks().unwrap().is_empty());
  assert!(connection.list_user_saved_tracks(&user).unwrap().is_empty());
}

#[test]
fn reconcile_rejects_unregistered_platforms() {
  let context = test_context_with_platforms(&[Platform::Spotify]);
  let connection = context.connect();
  let user = create_user(&connection, "alice");

  let result = connection.reconcile(&user, Platform::Youtube, &candidate("Bohemian Rhapsody", "Queen", "yt-1"));
  assert!(matches!(result, Err(ReconcileError::UnknownPlatformFail(Platform::Youtube))));
}

// Fan-out

#[test]
fn fan_out_links_matching_track_on_other_platform() {
  let context = test_context();
  let connection = context.connect();
  let user = create_user(&connection, "alice");
  connect_platform(&connection, &user, Platform::Spotify);
  connect_platform(&connection, &user, Platform::Youtube);

  let mut found: TrackCandidate = candidate("Bohemian Rhapsody (Remastered)", "Queen", "yt-42");
  found.duration_ms = Some(354_000);
  context.youtube.set_search_result(Some(found));

  let (track, created) = connection.reconcile(&user, Platform::Spotify, &candidate("Bohemian Rhapsody", "Queen", "spotify-1")).unwrap();
  assert!(created);
  assert_eq!(context.youtube.search_calls(), 1);

  let platform_infos = connection.list_platform_infos_of_track(track.id).unwrap();
  assert_eq!(platform_infos.len(), 2);
  let youtube_info = platform_infos.iter().find(|info| info.platform == "youtube").unwrap();
  assert_eq!(youtube_info.platform_id, "yt-42");
  // Metadata missing on the original candidate is opportunistically filled from the fan-out hit.
  assert_eq!(track.duration_ms, Some(354_000));

  // The fan-out must not create a saved-track association on the other platform.
  let saved = connection.list_user_saved_tracks(&user).unwrap();
  assert_eq!(saved.len(), 1);
  assert_eq!(saved[0].platform, "spotify");
}

#[test]
fn fan_out_ignores_non_matching_search_results() {
  let context = test_context();
  let connection = context.connect();
  let user = create_user(&connection, "alice");
  connect_platform(&connection, &user, Platform::Spotify);
  connect_platform(&connection, &user, Platform::Youtube);

  context.youtube.set_search_result(Some(candidate("Stairway to Heaven", "Led Zeppelin", "yt-13")));

  let (track, _) = connection.reconcile(&user, Platform::Spotify, &candidate("Bohemian Rhapsody", "Queen", "spotify-1")).unwrap();
  assert_eq!(context.youtube.search_calls(), 1);
  let platform_infos = connection.list_platform_infos_of_track(track.id).unwrap();
  assert_eq!(platform_infos.len(), 1);
  assert_eq!(platform_infos[0].platform, "spotify");
}

#[test]
fn fan_out_survives_an_upstream_failure() {
  let context = test_context();
  let connection = context.connect();
  let user = create_user(&connection, "alice");
  connect_platform(&connection, &user, Platform::Spotify);
  connect_platform(&connection, &user, Platform::Youtube);
  context.youtube.set_fail_search(true);

  let (track, created) = connection.reconcile(&user, Platform::Spotify, &candidate("Bohemian Rhapsody", "Queen", "spotify-1")).unwrap();
  assert!(created);
  let platform_infos = connection.list_platform_infos_of_track(track.id).unwrap();
  assert_eq!(platform_infos.len(), 1);
  assert_eq!(platform_infos[0].platform, "spotify");
  assert_eq!(connection.list_user_saved_tracks(&user).unwrap().len(), 1);
}

#[test]
fn fan_out_silently_skips_platforms_without_credential() {
  let context = test_context();
  let connection = context.connect();
  let user = create_user(&connection, "alice");
  connect_platform(&connection, &user, Platform::Spotify);
  // No YouTube credential: the fan-out must not even search.
  context.youtube.set_search_result(Some(candidate("Bohemian Rhapsody", "Queen", "yt-42")));

  let (track, created) = connection.reconcile(&user, Platform::Spotify, &candidate("Bohemian Rhapsody", "Queen", "spotify-1")).unwrap();
  assert!(created);
  // The credential check happens before the gateway is called, so no search is attempted and
  // no link is created; the reconciliation itself succeeds.
  assert_eq!(context.youtube.search_calls(), 0);
  let platform_infos = connection.list_platform_infos_of_track(track.id).unwrap();
  assert_eq!(platform_infos.len(), 1);
  assert_eq!(platform_infos[0].platform, "spotify");
}

#[test]
fn fan_out_only_runs_for_newly_created_tracks() {
  let context = test_context();
  let connection = context.connect();
  let user = create_user(&connection, "alice");
  connect_platform(&connection, &user, Platform::Spotify);
  connect_platform(&connection, &user, Platform::Youtube);

  connection.reconcile(&user, Platform::Spotify, &candidate("Bohemian Rhapsody", "Queen", "spotify-1")).unwrap();
  let calls_after_first = context.youtube.search_calls();
  connection.reconcile(&user, Platform::Spotify, &candidate("Bohemian Rhapsody", "Queen", "spotify-1")).unwrap();

  assert_eq!(calls_after_first, 1);
  assert_eq!(context.youtube.search_calls(), 1);
}
