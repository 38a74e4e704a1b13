use std::path::PathBuf;
use std::process::ExitCode;

use catalog::store::FileStore;
use clap::{Parser, Subcommand};
use log::{error, info};
use reqwest::Client;

use web_music_player::api::{create_router, AppState};
use web_music_player::client::PlayerClient;
use web_music_player::config::Config;
use web_music_player::github::{GithubClient, Repository};
use web_music_player::library::{AddOutcome, AddSong, ImportRepo, Library, LibraryError};
use web_music_player::logger;
use web_music_player::scanner::{self, ScanConfig};

#[derive(Parser)]
#[command(name = "web-music-player", version, about = "Music player backend and library tools")]
struct Cli {
    /// Directory holding the persisted track lists
    #[arg(long, global = true, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Base URL of a running player server
    #[arg(long, global = true, env = "PLAYER_URL")]
    player_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the static site and the /api endpoints
    Serve,
    /// Write public/manifest.json from the files under public/music
    GenerateManifest,
    /// Print the current catalog
    List {
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Add a song from an external URL
    Add {
        #[arg(long)]
        url: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        mv_url: Option<String>,
    },
    /// Replace the catalog with the audio files of a GitHub repository
    ImportRepo {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        path: Option<String>,
    },
    /// Replace the catalog with a remote player's playlist
    ImportApi {
        #[arg(long)]
        url: String,
    },
    /// Delete a song from the catalog and the repository
    Delete {
        #[arg(long)]
        url: String,
        #[arg(long)]
        password: String,
    },
    /// Drop every local change and reload the manifest
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(player_url) = cli.player_url {
        config.player_url = player_url;
    }

    let progress = match logger::init(config.log_level) {
        Ok(progress) => progress,
        Err(e) => {
            eprintln!("Failed to initialize logger: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Serve => serve(config).await,
        Command::GenerateManifest => scanner::generate_manifest(ScanConfig {
            public_dir: config.public_dir.clone(),
            progress: Some(progress),
        })
        .await
        .map(|result| {
            println!(
                "{} tracks from {} files -> {}",
                result.tracks_written,
                result.files_scanned,
                result.manifest_path.display()
            )
        })
        .map_err(|e| e.to_string()),
        command => run_library_command(config, command).await.map_err(|e| e.to_string()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: Config) -> Result<(), String> {
    if config.repository_credentials().is_none() {
        info!("GIT_REPO/GIT_TOKEN not set, /api/delete will answer 500");
    }
    let address = config.bind_address();
    let state = AppState::new(config).map_err(|e| e.to_string())?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", address, e))?;
    info!("API server running on http://{}", address);
    axum::serve(listener, app).await.map_err(|e| e.to_string())
}

async fn run_library_command(config: Config, command: Command) -> Result<(), LibraryError> {
    let http = Client::new();
    let player = PlayerClient::new(http.clone(), &config.player_url);
    let mut library = Library::new(FileStore::new(config.data_dir.clone()), player, &config.github_api_url)
        .with_admin_password(config.admin_password.clone());
    if let Some((repo, token)) = config.repository_credentials() {
        let repository = Repository::parse(repo, &config.git_branch)?;
        library = library.with_uploader(GithubClient::new(http, &config.github_api_url, token, repository));
    }

    library.load().await?;

    match command {
        Command::List { query } => {
            library.set_query(&query);
            for (index, track) in library.filtered().iter().enumerate() {
                println!(
                    "{:>3}. {}  {}  {}",
                    index + 1,
                    track.title,
                    track.url,
                    track.cover.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Add { url, title, mv_url } => {
            match library.add_song(AddSong { url, title, mv_url }).await? {
                AddOutcome::Uploaded { raw_url } => println!("Uploaded to {}", raw_url),
                AddOutcome::Linked { reason: Some(reason) } => {
                    println!("Upload failed ({}), using the external link", reason)
                }
                AddOutcome::Linked { reason: None } => println!("Added as an external link"),
            }
        }
        Command::ImportRepo {
            repo,
            token,
            branch,
            path,
        } => {
            let count = library
                .import_repo(ImportRepo {
                    repo,
                    token,
                    branch,
                    path,
                })
                .await?;
            if count == 0 {
                println!("No audio files found");
            } else {
                println!("Imported {} tracks", count);
            }
        }
        Command::ImportApi { url } => {
            let count = library.import_api(&url).await?;
            println!("Imported {} tracks", count);
        }
        Command::Delete { url, password } => {
            let outcome = library.delete_song(&url, &password).await?;
            if outcome.skipped {
                println!("Removed from the catalog; the file was already gone");
            } else {
                println!("Deleted");
            }
        }
        Command::Reset => {
            library.reset().await?;
            println!("Reset to {} manifest tracks", library.tracks().len());
        }
        Command::Serve | Command::GenerateManifest => {}
    }
    Ok(())
}
