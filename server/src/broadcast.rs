//! Fan-out of per-tick STATE snapshots to joined clients

use crate::client_manager::Frame;
use crate::network::ConnectionManager;
use log::{debug, error, warn};
use shared::{encode, ServerMessage, StateMessage};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

/// Sends one tick's snapshot to every joined client that is part of it.
///
/// Players whose connection already left the registry are dropped from the
/// snapshot; their removal reaches the world only at the next tick.
/// The message is encoded once and shared between all queues. A client
/// whose queue is full is too slow to keep up and is disconnected, the same
/// as one whose connection task already exited. Returns the number of
/// clients the frame was queued for.
pub async fn broadcast_state(connections: &ConnectionManager, mut state: StateMessage) -> usize {
    let recipients = {
        let clients = connections.clients().read().await;
        state.players.retain(|p| clients.get(p.id).is_some());
        // Clients not yet in the world wait for the first tick that includes them
        clients.joined_outboxes(state.players.iter().map(|p| &p.id))
    };
    if state.players.is_empty() {
        return 0;
    }

    let tick = state.tick;

    let frame: Frame = match encode(&ServerMessage::State(state)) {
        Ok(bytes) => Arc::from(bytes),
        Err(e) => {
            error!("Failed to encode STATE for tick {}: {}", tick, e);
            return 0;
        }
    };

    let mut delivered = 0;
    let mut dropped = Vec::new();
    for (id, outbox) in recipients {
        match outbox.try_send(Arc::clone(&frame)) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!("Player {} is not keeping up, disconnecting", id);
                dropped.push(id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Player {} outbox closed", id);
                dropped.push(id);
            }
        }
    }

    for id in dropped {
        connections.remove_player(id).await;
    }

    delivered
}
