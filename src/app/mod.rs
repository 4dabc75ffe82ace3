mod lastfm;
mod overlap;
mod scrobbler;
mod ytmusic;


use anyhow::Result;

use crate::cli::{Cli, Command};
use crate::config::{Settings, db_path_from_env};
use crate::db::Database;

use self::lastfm::LastFmClient;
use self::scrobbler::{RunMode, Scrobbler};
use self::ytmusic::YtMusicClient;

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Scrobble => {
            let count = run_scrobble(RunMode::scrobble())?;
            println!("Scrobbled {count} tracks to Last.fm");
        }
        Command::Sync => {
            let count = run_scrobble(RunMode::sync())?;
            println!("Synced {count} tracks in database without scrobbling");
        }
        Command::DryRun => {
            let count = run_scrobble(RunMode::dry_run())?;
            println!("Dry-run finished. Would scrobble {count} tracks to Last.fm");
        }
        Command::List => run_list(&open_db()?)?,
        Command::Clear => {
            let deleted = open_db()?.delete_all_tracks()?;
            println!("Deleted {deleted} stored scrobbles");
        }
    }

    Ok(())
}

fn run_scrobble(mode: RunMode) -> Result<usize> {
    let settings = Settings::from_env()?;
    let db = Database::open(&settings.db_path)?;
    let mut lastfm = LastFmClient::connect(&settings.lastfm)?;
    let mut ytmusic = YtMusicClient::new(&settings.ytmusic)?;

    let scrobbler = Scrobbler::new(&db, settings.scrobbler);
    let tracks = scrobbler
        .run(&mut ytmusic, &mut lastfm, mode)
        .inspect_err(|err| log::error!("Scrobbling process failed: {err:#}"))?;

    log::info!("Scrobbling process completed successfully");
    Ok(tracks.len())
}

fn run_list(db: &Database) -> Result<()> {
    let items = db.fetch_latest_scrobbles()?;
    if items.is_empty() {
        println!("No stored scrobbles yet. Run `ytm2lfm sync` or `ytm2lfm scrobble` first.");
        return Ok(());
    }

    println!(
        "{:<14} {:<36} {:<28} {:<28} {:<12}",
        "VIDEO ID", "TITLE", "ARTIST", "ALBUM", "PLAYED"
    );
    for item in items {
        println!(
            "{:<14} {:<36} {:<28} {:<28} {:<12}",
            truncate(&item.video_id, 14),
            truncate(&item.title, 36),
            truncate(&item.artist, 28),
            truncate(&item.album, 28),
            truncate(&item.played, 12)
        );
    }
    Ok(())
}

fn open_db() -> Result<Database> {
    Database::open(&db_path_from_env()?)
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}
