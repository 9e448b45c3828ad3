//! Machine player: a client component answering `turn_started` with the
//! click pair of the searched action.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};

use crate::{
    client::{SharedClientState, lock_state},
    config::AiConfig,
    events::{Component, Emitter, Event, EventData},
    protocol::names,
};

use super::{CheckersAi, Searcher, checkers::decide};

/// Searcher kept between turns, taken out while a search runs
type SharedSearcher = Arc<Mutex<Option<Searcher<CheckersAi>>>>;

async fn play_turn(
    state: SharedClientState,
    engine: SharedSearcher,
    config: AiConfig,
    emitter: Emitter,
) -> Result<()> {
    // Snapshot the replica
    let snapshot = {
        let state = lock_state(&state)?;
        if state.is_over() {
            return Ok(());
        }
        state.state().cloned()
    };
    let Some(snapshot) = snapshot else {
        return Ok(());
    };
    let player = snapshot.player();

    let searcher = engine
        .lock()
        .map_err(|_| anyhow!("Searcher lock poisoned"))?
        .take()
        .filter(|searcher| searcher.game().size() == snapshot.size())
        .unwrap_or_else(|| {
            Searcher::new(CheckersAi::new(snapshot.size()), config.table_capacity)
        });

    log::debug!("[Player {player}] Thinking");
    let (searcher, decision) = tokio::task::spawn_blocking(move || {
        let mut searcher = searcher;
        let decision = decide(&mut searcher, &snapshot, &config);
        (searcher, decision)
    })
    .await
    .context("Search task failed")?;

    let nodes = searcher.nodes();
    *engine
        .lock()
        .map_err(|_| anyhow!("Searcher lock poisoned"))? = Some(searcher);

    let decision = decision.with_context(|| format!("Search failed for {player}"))?;
    let Some(action) = decision.action else {
        log::warn!("[Player {player}] No action available");
        return Ok(());
    };
    log::info!(
        "[Player {player}] Playing {action} (value {value:.3}, {nodes} nodes)",
        value = decision.value
    );

    emitter.emit(names::PIECE_CLICKED, EventData::Position(action.from))?;
    emitter.emit(names::TILE_CLICKED, EventData::Position(action.to))?;
    Ok(())
}

/// Component playing every turn of the local team
pub fn machine_component(state: SharedClientState, config: AiConfig) -> Component {
    let engine: SharedSearcher = Arc::new(Mutex::new(None));

    Component::new("machine")
        .on(names::TURN_STARTED, move |_: Event, emitter: Emitter| {
            play_turn(state.clone(), engine.clone(), config.clone(), emitter)
        })
        .on(names::GAME_OVER, |_: Event, emitter: Emitter| async move {
            log::info!("Game over, leaving");
            emitter.emit(names::CLIENT_DISCONNECTED, EventData::Empty)?;
            anyhow::Ok(())
        })
}
