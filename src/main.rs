//! Command-line entry point: reads a `.torrent` file, announces to its
//! tracker, runs the download to completion, and writes the result to
//! disk.

use std::fs;
use std::process;

use single_torrent::conf::Conf;
use single_torrent::error::ConfigError;
use single_torrent::metainfo::TorrentDescriptor;
use single_torrent::{torrent, tracker};

/// The TCP port this downloader advertises to the tracker.
///
/// Nothing actually listens on it: this is a leecher-only client, but
/// trackers expect a port regardless.
const LISTEN_PORT: u16 = 6881;

#[tokio::main]
async fn main() {
    env_logger::init();

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("expected a torrent file");
            process::exit(1);
        }
    };

    if let Err(e) = run(path).await {
        log::error!("{}", e);
        process::exit(1);
    }
}

async fn run(path: String) -> single_torrent::Result<()> {
    let bytes = fs::read(&path).map_err(ConfigError::Unreadable)?;
    let descriptor = TorrentDescriptor::from_bytes(&bytes)?;
    log::info!(
        "Loaded {:?} ({}): {} pieces, {} bytes",
        descriptor.name,
        hex::encode(descriptor.info_hash),
        descriptor.piece_count(),
        descriptor.total_length
    );

    let conf = Conf::new();
    let response = tracker::announce(
        &descriptor,
        &conf.client_id,
        LISTEN_PORT,
        conf.tracker_timeout,
    )
    .await?;
    log::info!("Tracker returned {} peers", response.peers.len());

    let output =
        torrent::download(&descriptor, response.peers, conf.client_id, &conf).await;

    fs::write(&descriptor.name, output)?;
    log::info!("Wrote {:?}", descriptor.name);

    Ok(())
}
