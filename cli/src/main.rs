use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use metrics_core::{Builder, Drain, Observe};
use metrics_observer_yaml::{YamlBuilder, YamlObserver};
use metrics_runtime::{Controller, Receiver};
use structopt::StructOpt;
use tracing::info;
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use crosstune_backend::database::{Database, DatabaseConnection};
use crosstune_backend::gateway::{PlatformGateway, PlatformRegistry};
use crosstune_backend::gateway::spotify::SpotifyGateway;
use crosstune_backend::gateway::youtube::YoutubeGateway;
use crosstune_backend::password::PasswordHasher;
use crosstune_core::model::{NewUser, Platform, User};
use crosstune_spotify_client::SpotifyClient;
use crosstune_youtube_client::YoutubeClient;

#[derive(Debug, StructOpt)]
#[structopt(name = "crosstune", about = "Crosstune CLI")]
struct Opt {
  #[structopt(subcommand)]
  command: Command,

  /// Database file to use. Relative paths are resolved relative to the current directory
  #[structopt(long, env = "CROSSTUNE_DATABASE_URL", parse(from_os_str))]
  database_file: PathBuf,
  /// Password hasher secret key to use
  #[structopt(long, env = "CROSSTUNE_PASSWORD_HASHER_SECRET_KEY")]
  password_hasher_secret_key: String,

  /// Spotify application client ID; Spotify is left unconfigured when absent
  #[structopt(long, env = "CROSSTUNE_SPOTIFY_CLIENT_ID")]
  spotify_client_id: Option<String>,
  /// Spotify application client secret
  #[structopt(long, env = "CROSSTUNE_SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
  spotify_client_secret: Option<String>,
  /// YouTube application client ID; YouTube is left unconfigured when absent
  #[structopt(long, env = "CROSSTUNE_YOUTUBE_CLIENT_ID")]
  youtube_client_id: Option<String>,
  /// YouTube application client secret
  #[structopt(long, env = "CROSSTUNE_YOUTUBE_CLIENT_SECRET", hide_env_values = true)]
  youtube_client_secret: Option<String>,
  /// Redirect URI handed to platforms during the authorization flow
  #[structopt(long, env = "CROSSTUNE_REDIRECT_URI", default_value = "http://localhost:8088/callback")]
  redirect_uri: String,

  /// Minimum level at which tracing events will be printed to stderr
  #[structopt(long, env = "CROSSTUNE_TRACING_LEVEL", default_value = "WARN")]
  tracing_level: tracing::Level,
  /// Whether to print metrics to stderr before the program exits
  #[structopt(long, env = "CROSSTUNE_PRINT_METRICS")]
  print_metrics: bool,
}

#[derive(Debug, StructOpt)]
enum Command {
  /// Lists all users
  ListUsers,
  /// Creates a new user
  CreateUser {
    /// Name of the user to add
    name: String,
    /// Password of the user to add
    password: String,
  },
  /// Deletes a user, found by name
  DeleteUserByName {
    /// Name of the user to delete
    name: String,
  },

  /// Connects a user with a platform: prints the authorization URL, then reads the
  /// authorization code from stdin and stores the resulting credential
  ConnectPlatform {
    /// Name of the user to connect
    user_name: String,
    /// Platform to connect with: spotify or youtube
    platform: Platform,
  },
  /// Disconnects a user from a platform, deleting the stored credential
  DisconnectPlatform {
    user_name: String,
    platform: Platform,
  },
  /// Shows which platforms a user is connected with
  ShowConnections {
    user_name: String,
  },

  /// Synchronizes a user's saved tracks with a platform
  Sync {
    user_name: String,
    platform: Platform,
  },

  /// Lists all canonical tracks
  ListTracks,
  /// Shows a track and its platform links, found by id
  ShowTrackById {
    id: i32,
  },
  /// Lists a user's saved tracks
  ListSavedTracks {
    user_name: String,
  },
  /// Deletes one of a user's saved tracks, found by id
  DeleteSavedTrack {
    user_name: String,
    id: i32,
  },
  /// Deletes all of a user's saved tracks
  ClearSavedTracks {
    user_name: String,
  },
  /// Lists the platform actions taken on behalf of a user
  ListActionLog {
    user_name: String,
  },
}

fn main() -> Result<()> {
  // Load environment variables from .env file, before parsing command-line arguments, as some
  // options can use environment variables as defaults.
  dotenv::dotenv().ok();
  // Parse command-line arguments.
  let opt: Opt = Opt::from_args();
  // Setup tracing
  let subscriber = FmtSubscriber::builder()
    .with_writer(std::io::stderr)
    .with_max_level(opt.tracing_level.clone())
    .finish();
  tracing::subscriber::set_global_default(subscriber)
    .with_context(|| "Failed to initialize global tracing subscriber")?;
  // Setup log to forward to tracing.
  LogTracer::init()
    .with_context(|| "Failed to initialize log to tracing forwarder")?;
  // Setup metrics
  let metrics_receiver: Receiver = Receiver::builder().build()
    .with_context(|| "Failed to initialize metrics receiver")?;
  let controller: Controller = metrics_receiver.controller();
  let mut observer: YamlObserver = YamlBuilder::new().build();
  metrics_receiver.install();
  // Create database
  let registry = create_registry(&opt)
    .with_context(|| "Failed to create the platform registry")?;
  let database = Database::new(
    opt.database_file.to_string_lossy(),
    registry,
    PasswordHasher::new(opt.password_hasher_secret_key.as_bytes()))
    .with_context(|| "Failed to create database")?;
  // Run command
  run_command(&opt, &database)?;
  // Print metrics
  if opt.print_metrics {
    controller.observe(&mut observer);
    let output = observer.drain();
    info!(metrics = %output);
  }
  Ok(())
}

fn create_registry(opt: &Opt) -> Result<PlatformRegistry> {
  let mut gateways: Vec<Box<dyn PlatformGateway>> = Vec::new();
  if let (Some(client_id), Some(client_secret)) = (&opt.spotify_client_id, &opt.spotify_client_secret) {
    let client = SpotifyClient::new_from_client_id_secret(client_id.clone(), client_secret.clone())?;
    gateways.push(Box::new(SpotifyGateway::new(client)));
  }
  if let (Some(client_id), Some(client_secret)) = (&opt.youtube_client_id, &opt.youtube_client_secret) {
    let client = YoutubeClient::new_from_client_id_secret(client_id.clone(), client_secret.clone())?;
    gateways.push(Box::new(YoutubeGateway::new(client)));
  }
  Ok(PlatformRegistry::new(gateways)?)
}

fn run_command(opt: &Opt, database: &Database) -> Result<()> {
  let connection = database.connect()?;
  match &opt.command {
    Command::ListUsers => {
      for user in connection.list_users()? {
        println!("{}", user);
      }
    }
    Command::CreateUser { name, password } => {
      let user = connection.create_user(NewUser { name: name.clone(), password: password.clone() })?;
      println!("{}", user);
    }
    Command::DeleteUserByName { name } => {
      if !connection.delete_user_by_name(name)? {
        return Err(anyhow!("No user with name '{}'", name));
      }
    }

    Command::ConnectPlatform { user_name, platform } => {
      let user = get_user(&connection, user_name)?;
      let url = connection.create_platform_authorization_url(*platform, &opt.redirect_uri, None)?;
      println!("Open the following URL in a browser and authorize the application:");
      println!("{}", url);
      print!("Paste the authorization code here: ");
      io::stdout().flush()?;
      let mut code = String::new();
      io::stdin().read_line(&mut code)?;
      if code.trim().is_empty() {
        return Err(anyhow!("No authorization code was provided"));
      }
      let runtime = tokio::runtime::Runtime::new()?;
      runtime.block_on(connection.create_platform_credential_from_authorization_callback(&user, *platform, code.trim(), &opt.redirect_uri))?;
      println!("Connected '{}' with {}", user.name, platform);
    }
    Command::DisconnectPlatform { user_name, platform } => {
      let user = get_user(&connection, user_name)?;
      if !connection.delete_platform_credential(&user, *platform)? {
        return Err(anyhow!("User '{}' has no credential for {}", user.name, platform));
      }
    }
    Command::ShowConnections { user_name } => {
      let user = get_user(&connection, user_name)?;
      for platform in connection.registry().platforms() {
        let connected = connection.is_user_connected(&user, platform)?;
        println!("{}: {}", platform, if connected { "connected" } else { "not connected" });
      }
    }

    Command::Sync { user_name, platform } => {
      let user = get_user(&connection, user_name)?;
      let changed = connection.sync(&user, *platform)?;
      if changed {
        println!("Saved tracks synchronized with {}", platform);
      } else {
        println!("{} reported no saved tracks; nothing to do", platform);
      }
    }

    Command::ListTracks => {
      for track in connection.list_tracks()? {
        println!("{}", track);
      }
    }
    Command::ShowTrackById { id } => {
      let track = connection.get_track_by_id(*id)?
        .ok_or_else(|| anyhow!("No track with ID '{}'", id))?;
      println!("{}", track);
      for platform_info in connection.list_platform_infos_of_track(track.id)? {
        println!("  {}", platform_info);
      }
    }
    Command::ListSavedTracks { user_name } => {
      let user = get_user(&connection, user_name)?;
      for (user_saved_track, track) in connection.list_user_saved_tracks_with_tracks(&user)? {
        println!("{} (saved via {})", track, user_saved_track.platform);
      }
    }
    Command::DeleteSavedTrack { user_name, id } => {
      let user = get_user(&connection, user_name)?;
      if !connection.delete_user_saved_track_by_id(&user, *id)? {
        return Err(anyhow!("User '{}' has no saved track with ID '{}'", user.name, id));
      }
    }
    Command::ClearSavedTracks { user_name } => {
      let user = get_user(&connection, user_name)?;
      let deleted = connection.clear_user_saved_tracks(&user)?;
      println!("Deleted {} saved tracks", deleted);
    }
    Command::ListActionLog { user_name } => {
      let user = get_user(&connection, user_name)?;
      for action in connection.list_platform_actions(&user)? {
        println!("{} {} {} {}", action.created_at, action.platform, action.action, action.metadata);
      }
    }
  }
  Ok(())
}

fn get_user(connection: &DatabaseConnection, user_name: &str) -> Result<User> {
  connection.get_user_by_name(user_name)?
    .ok_or_else(|| anyhow!("No user with name '{}'", user_name))
}
