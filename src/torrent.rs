//! The download orchestrator: seeds a work queue with every piece, spawns
//! one worker task per peer, and reassembles hash-verified pieces into the
//! output buffer as they arrive.

use tokio::sync::mpsc;

use crate::conf::Conf;
use crate::metainfo::TorrentDescriptor;
use crate::peer::PeerSession;
use crate::verify::verify;
use crate::{PeerAddress, PeerId, PieceResult, PieceWork, Sha1Hash};

/// Downloads every piece of `descriptor` from `peers` and returns the
/// reassembled file.
///
/// One worker task is spawned per peer; workers race each other to pull
/// [`PieceWork`] off a shared, bounded queue, and this function itself acts
/// as the collector, stitching completed pieces into the output buffer as
/// they land on `results`.
pub async fn download(
    descriptor: &TorrentDescriptor,
    peers: Vec<PeerAddress>,
    our_peer_id: PeerId,
    conf: &Conf,
) -> Vec<u8> {
    let num_pieces = descriptor.piece_count();
    // An MPMC queue, not an `mpsc::Receiver` behind a mutex: every worker
    // holds its own cloned `Receiver` and calls `recv` on it directly, so an
    // idle worker parked in `recv` never holds a lock the collector needs in
    // order to shut the queue down.
    let (work_tx, work_rx) =
        async_channel::bounded::<PieceWork>(num_pieces.max(1));
    let (results_tx, mut results_rx) = mpsc::unbounded_channel::<PieceResult>();

    for (index, expected_hash) in descriptor.piece_hashes.iter().enumerate() {
        let work = PieceWork {
            index: index as u32,
            expected_hash: *expected_hash,
            length: descriptor.piece_len(index as u32),
        };
        // the queue's capacity equals num_pieces, so this never blocks
        work_tx.send(work).await.expect("work queue not closed during seeding");
    }

    let mut worker_count = 0usize;
    for addr in peers {
        let work_tx = work_tx.clone();
        let work_rx = work_rx.clone();
        let results_tx = results_tx.clone();
        let info_hash = descriptor.info_hash;
        let conf = conf.clone();
        tokio::spawn(async move {
            run_worker(addr, info_hash, our_peer_id, work_tx, work_rx, results_tx, conf)
                .await;
        });
        worker_count += 1;
    }
    // drop our own handle so the channel's liveness rests entirely on the
    // worker tasks' clones
    drop(work_tx);
    drop(results_tx);

    log::info!(
        "Starting download of {:?}: {} pieces, {} peers",
        descriptor.name,
        num_pieces,
        worker_count
    );

    let mut output = vec![0u8; descriptor.total_length as usize];
    let mut done = 0usize;
    while done < num_pieces {
        let result = match results_rx.recv().await {
            Some(r) => r,
            None => {
                log::warn!(
                    "All workers exited with {}/{} pieces collected; download stalled",
                    done,
                    num_pieces
                );
                break;
            }
        };

        let begin = result.index as u64 * descriptor.piece_length as u64;
        let end = std::cmp::min(
            begin + descriptor.piece_length as u64,
            descriptor.total_length,
        );
        output[begin as usize..end as usize].copy_from_slice(&result.bytes);
        done += 1;
        log::info!("Downloaded piece {} ({}/{})", result.index, done, num_pieces);
    }

    // Closes the queue for every clone, not just this one: any worker still
    // idling in `recv` on an empty queue wakes up with `Err` and exits.
    work_rx.close();
    output
}

/// One peer's worker task: pulls jobs until the queue closes or
/// `request_piece` fails, at which point this connection is dropped and
/// the remaining workers absorb its share.
async fn run_worker(
    addr: PeerAddress,
    info_hash: Sha1Hash,
    our_peer_id: PeerId,
    work_tx: async_channel::Sender<PieceWork>,
    work_rx: async_channel::Receiver<PieceWork>,
    results_tx: mpsc::UnboundedSender<PieceResult>,
    conf: Conf,
) {
    let mut session = match PeerSession::connect(
        addr.socket_addr(),
        info_hash,
        our_peer_id,
        &conf,
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            log::info!("Dropping peer {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = session.send_unchoke().await {
        log::info!("Dropping peer {}: {}", addr, e);
        return;
    }
    if let Err(e) = session.send_interested().await {
        log::info!("Dropping peer {}: {}", addr, e);
        return;
    }

    loop {
        let work = match work_rx.recv().await {
            Ok(work) => work,
            Err(_) => break,
        };

        if !session.has_piece(work.index) {
            if work_tx.send(work).await.is_err() {
                break;
            }
            continue;
        }

        let bytes = match session.request_piece(work.index, work.length).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!(
                    "Peer {} failed piece {}: {}; dropping peer",
                    addr,
                    work.index,
                    e
                );
                let _ = work_tx.send(work).await;
                break;
            }
        };

        if !verify(&bytes, &work.expected_hash) {
            log::warn!("Peer {} sent piece {} with a bad hash", addr, work.index);
            let _ = work_tx.send(work).await;
            continue;
        }

        if results_tx
            .send(PieceResult {
                index: work.index,
                bytes,
            })
            .is_err()
        {
            break;
        }
    }

    log::debug!("Worker for peer {} exiting", addr);
}
